use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::warn;

use super::sink::{FrameSink, PersistRequest};

/// Persistence work held back until the capture loop is done.
#[derive(Debug, Default)]
pub struct PersistQueue {
    jobs: VecDeque<PersistRequest>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub completed: usize,
    pub failed: usize,
}

impl PersistQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PersistRequest) {
        self.jobs.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Fan the queue out over `workers` tasks and wait for all of them.
    ///
    /// Completion order across workers is unspecified.
    pub async fn drain(self, sink: Arc<dyn FrameSink>, workers: usize) -> PersistOutcome {
        if self.jobs.is_empty() {
            return PersistOutcome::default();
        }
        let workers = if workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            workers
        }
        .min(self.jobs.len());

        let queue = Arc::new(Mutex::new(self.jobs));
        let handles = (0..workers).map(|_| {
            let queue = Arc::clone(&queue);
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let mut outcome = PersistOutcome::default();
                loop {
                    let Some(job) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let frame_number = job.frame_number;
                    match sink.persist(job).await {
                        Ok(()) => outcome.completed += 1,
                        Err(e) => {
                            warn!(frame = frame_number, error = %e, "Failed to persist frame");
                            outcome.failed += 1;
                        }
                    }
                }
                outcome
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .fold(PersistOutcome::default(), |mut acc, joined| {
                match joined {
                    Ok(outcome) => {
                        acc.completed += outcome.completed;
                        acc.failed += outcome.failed;
                    }
                    Err(e) => warn!(error = %e, "Persistence worker panicked"),
                }
                acc
            })
    }
}
