use std::io::{Seek, SeekFrom, Write};

use crate::error::{LuckyError, Result};

/// Byte offsets of header fields whose final value is only known at close.
///
/// Writers emit a placeholder for each field, record where it landed, and
/// patch it once the run is over.
#[derive(Clone, Debug, Default)]
pub struct PatchTable {
    fields: Vec<(&'static str, u64)>,
}

impl PatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: &'static str, offset: u64) {
        self.fields.push((field, offset));
    }

    pub fn offset(&self, field: &str) -> Option<u64> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|&(_, offset)| offset)
    }

    /// Overwrite `field` with `bytes`, then restore the stream position.
    pub fn patch<W: Write + Seek>(&self, w: &mut W, field: &str, bytes: &[u8]) -> Result<()> {
        let offset = self.offset(field).ok_or_else(|| {
            LuckyError::InvalidState(format!("no deferred field named {field}"))
        })?;
        let resume = w.stream_position()?;
        w.seek(SeekFrom::Start(offset))?;
        w.write_all(bytes)?;
        w.seek(SeekFrom::Start(resume))?;
        Ok(())
    }
}
