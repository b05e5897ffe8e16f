//! Background execution of physical writes.
//!
//! Writes are keyed. Every job submitted under one key runs after every job
//! submitted earlier under the same key. Jobs under different keys may run in
//! any relative order.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::mpsc as std_mpsc;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::{BackendError, BackendResult};

/// A unit of physical write work.
pub type WriteJob = Box<dyn FnOnce() -> BackendResult<()> + Send + 'static>;

/// Runs write jobs off the owner thread, in order per key.
///
/// Failed jobs are logged; there is no caller left to return the error to.
pub trait WriteExecutor: Send + Sync {
    /// Queue `job` behind every job previously submitted under `key`.
    fn submit(&self, key: &str, job: WriteJob);

    /// Block until every job already submitted under `key` has run.
    fn barrier(&self, key: &str);

    /// Block until every job already submitted has run.
    fn flush(&self);
}

/// Executor that runs each job immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl InlineExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl WriteExecutor for InlineExecutor {
    fn submit(&self, key: &str, job: WriteJob) {
        if let Err(e) = job() {
            error!(key, error = %e, "write failed");
        }
    }

    fn barrier(&self, _key: &str) {}

    fn flush(&self) {}
}

enum LaneMessage {
    Job(WriteJob),
    Barrier(std_mpsc::Sender<()>),
}

/// Executor backed by a tokio runtime with a fixed set of sequential lanes.
///
/// A key always hashes to the same lane and each lane runs one job at a time,
/// so there is exactly one writer per key. Blocking file I/O runs through
/// `spawn_blocking`.
pub struct LaneExecutor {
    runtime: Option<Runtime>,
    lanes: Vec<mpsc::UnboundedSender<LaneMessage>>,
}

impl LaneExecutor {
    /// Start an executor with `lanes` sequential lanes (at least one).
    ///
    /// Must not be called from within a tokio runtime.
    pub fn new(lanes: usize) -> BackendResult<Self> {
        let lane_count = lanes.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(lane_count.min(4))
            .max_blocking_threads(lane_count)
            .thread_name("burrow-writer")
            .build()
            .map_err(|e| BackendError::Executor(e.to_string()))?;

        let lanes = (0..lane_count)
            .map(|lane| {
                let (tx, rx) = mpsc::unbounded_channel();
                runtime.spawn(drain_lane(lane, rx));
                tx
            })
            .collect();

        debug!(lanes = lane_count, "write executor started");
        Ok(Self {
            runtime: Some(runtime),
            lanes,
        })
    }

    /// Number of lanes.
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    fn lane_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.lanes.len() as u64) as usize
    }

    fn wait_for(&self, lanes: impl Iterator<Item = usize>) {
        let (tx, rx) = std_mpsc::channel();
        let mut pending = 0;
        for lane in lanes {
            if self.lanes[lane]
                .send(LaneMessage::Barrier(tx.clone()))
                .is_ok()
            {
                pending += 1;
            }
        }
        drop(tx);
        for _ in 0..pending {
            if rx.recv().is_err() {
                break;
            }
        }
    }
}

impl WriteExecutor for LaneExecutor {
    fn submit(&self, key: &str, job: WriteJob) {
        let lane = self.lane_for(key);
        if let Err(mpsc::error::SendError(message)) = self.lanes[lane].send(LaneMessage::Job(job)) {
            // The lane task is gone; run the write here rather than drop it.
            error!(lane, key, "write lane closed; running job inline");
            if let LaneMessage::Job(job) = message {
                if let Err(e) = job() {
                    error!(key, error = %e, "write failed");
                }
            }
        }
    }

    fn barrier(&self, key: &str) {
        self.wait_for(std::iter::once(self.lane_for(key)));
    }

    fn flush(&self) {
        self.wait_for(0..self.lanes.len());
    }
}

impl Drop for LaneExecutor {
    fn drop(&mut self) {
        self.flush();
        self.lanes.clear();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for LaneExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaneExecutor")
            .field("lanes", &self.lanes.len())
            .finish()
    }
}

async fn drain_lane(lane: usize, mut rx: mpsc::UnboundedReceiver<LaneMessage>) {
    while let Some(message) = rx.recv().await {
        match message {
            LaneMessage::Job(job) => match tokio::task::spawn_blocking(job).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(lane, error = %e, "background write failed"),
                Err(e) => error!(lane, error = %e, "background write panicked"),
            },
            LaneMessage::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
    debug!(lane, "write lane closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn inline_runs_immediately() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let executor = InlineExecutor::new();
        let sink = Arc::clone(&seen);
        executor.submit(
            "k",
            Box::new(move || {
                sink.lock().unwrap().push(1);
                Ok(())
            }),
        );
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn inline_logs_failures_without_panicking() {
        let executor = InlineExecutor::new();
        executor.submit(
            "k",
            Box::new(|| Err(BackendError::Serialization("boom".into()))),
        );
    }

    #[test]
    fn lane_preserves_order_per_key() {
        let executor = LaneExecutor::new(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..50u32 {
            let sink = Arc::clone(&seen);
            executor.submit(
                "lib/skins",
                Box::new(move || {
                    if i % 7 == 0 {
                        std::thread::sleep(Duration::from_millis(2));
                    }
                    sink.lock().unwrap().push(i);
                    Ok(())
                }),
            );
        }
        executor.barrier("lib/skins");

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn flush_waits_for_every_lane() {
        let executor = LaneExecutor::new(3).unwrap();
        let count = Arc::new(Mutex::new(0usize));

        for i in 0..30 {
            let sink = Arc::clone(&count);
            executor.submit(
                &format!("key-{i}"),
                Box::new(move || {
                    std::thread::sleep(Duration::from_millis(1));
                    *sink.lock().unwrap() += 1;
                    Ok(())
                }),
            );
        }
        executor.flush();
        assert_eq!(*count.lock().unwrap(), 30);
    }

    #[test]
    fn same_key_maps_to_same_lane() {
        let executor = LaneExecutor::new(8).unwrap();
        assert_eq!(executor.lane_count(), 8);
        assert_eq!(executor.lane_for("lib/a"), executor.lane_for("lib/a"));
    }

    #[test]
    fn zero_lanes_rounds_up_to_one() {
        let executor = LaneExecutor::new(0).unwrap();
        assert_eq!(executor.lane_count(), 1);
    }

    #[test]
    fn failed_job_does_not_stall_lane() {
        let executor = LaneExecutor::new(1).unwrap();
        let seen = Arc::new(Mutex::new(false));
        executor.submit(
            "k",
            Box::new(|| Err(BackendError::Serialization("boom".into()))),
        );
        let sink = Arc::clone(&seen);
        executor.submit(
            "k",
            Box::new(move || {
                *sink.lock().unwrap() = true;
                Ok(())
            }),
        );
        executor.flush();
        assert!(*seen.lock().unwrap());
    }
}
