use std::sync::Mutex;

use sysinfo::System;

use crate::consts::BYTES_PER_MB;
use crate::error::{LuckyError, Result};

/// Reports available system memory in megabytes.
pub trait MemoryProbe: Send + Sync {
    fn available_mb(&self) -> Result<f64>;
}

/// Live system memory via `sysinfo`.
pub struct SystemMemoryProbe {
    system: Mutex<System>,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn available_mb(&self) -> Result<f64> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| LuckyError::ResourceUnavailable("memory probe lock poisoned".into()))?;
        system.refresh_memory();
        match system.available_memory() {
            0 => Err(LuckyError::ResourceUnavailable(
                "available memory not reported".into(),
            )),
            bytes => Ok(bytes as f64 / BYTES_PER_MB),
        }
    }
}

/// Always reports the same value.
#[derive(Clone, Copy, Debug)]
pub struct FixedMemoryProbe(pub f64);

impl MemoryProbe for FixedMemoryProbe {
    fn available_mb(&self) -> Result<f64> {
        Ok(self.0)
    }
}

/// Probe backed by a closure.
pub struct FnMemoryProbe<F>(pub F);

impl<F> MemoryProbe for FnMemoryProbe<F>
where
    F: Fn() -> Result<f64> + Send + Sync,
{
    fn available_mb(&self) -> Result<f64> {
        (self.0)()
    }
}
