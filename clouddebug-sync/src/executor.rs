//! UI executors
//!
//! `SerialExecutor` plays the role of a UI thread: one task running jobs in order.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::{UiExecutor, UiJob};

/// Runs each job immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl UiExecutor for InlineExecutor {
    fn invoke_later(&self, job: UiJob) {
        job();
    }
}

/// Queues jobs until [`QueuedExecutor::run_pending`] is called
#[derive(Default)]
pub struct QueuedExecutor {
    jobs: Mutex<VecDeque<UiJob>>,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Run queued jobs in order, including jobs queued while running. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.jobs.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl UiExecutor for QueuedExecutor {
    fn invoke_later(&self, job: UiJob) {
        self.jobs.lock().push_back(job);
    }
}

/// Runs jobs in submission order on a dedicated tokio task
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<UiJob>,
}

impl SerialExecutor {
    /// Must be called within a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<UiJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self { tx }
    }
}

impl UiExecutor for SerialExecutor {
    fn invoke_later(&self, job: UiJob) {
        if self.tx.send(job).is_err() {
            tracing::warn!("UI executor stopped, dropping job");
        }
    }
}
