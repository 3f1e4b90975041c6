//! Worker pool for copy tasks.
//!
//! A single traversal closure runs on the calling thread and feeds a bounded
//! channel; `workers` scoped threads drain it. Each worker keeps its own
//! outcome list and the lists are merged once every thread has joined.
//!
//! A task that panics is turned into a `Failed` outcome on the spot, so one
//! corrupt entry never costs the outcomes its worker already collected.

use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use crossbeam_channel::{bounded, Sender};

use crate::cancel::CancelToken;
use crate::error::RecoveryError;
use crate::extract;
use crate::outcome::RecoveryOutcome;
use crate::output::OutputWriter;
use crate::source::{ByteSource, FsEntry};

/// Queue slots per worker
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Where a task's bytes come from
pub(crate) enum TaskSource {
    /// An entry of a mounted filesystem
    Entry(Box<dyn FsEntry>),
    /// A host file or any other byte source
    Bytes(Box<dyn ByteSource>),
}

impl TaskSource {
    fn size(&self) -> u64 {
        match self {
            TaskSource::Entry(e) => e.size(),
            TaskSource::Bytes(b) => b.size(),
        }
    }

    fn read_at(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        match self {
            TaskSource::Entry(e) => e.read_at(offset, len),
            TaskSource::Bytes(b) => b.read_at(offset, len),
        }
    }
}

/// One entry to copy into an already reserved destination
pub(crate) struct CopyTask {
    pub descriptor: String,
    pub destination: PathBuf,
    pub source: TaskSource,
    pub type_name: Option<String>,
}

pub(crate) struct WorkerPool<'a> {
    output: &'a OutputWriter,
    cancel: &'a CancelToken,
    chunk_size: usize,
    workers: usize,
}

impl<'a> WorkerPool<'a> {
    pub fn new(
        output: &'a OutputWriter,
        cancel: &'a CancelToken,
        chunk_size: usize,
        workers: usize,
    ) -> Self {
        Self {
            output,
            cancel,
            chunk_size,
            workers: workers.max(1),
        }
    }

    /// Run `traverse` on this thread while workers copy what it sends.
    /// Returns every outcome, traversal-side and worker-side, unsorted.
    pub fn run<F>(&self, traverse: F) -> Vec<RecoveryOutcome>
    where
        F: FnOnce(&Sender<CopyTask>) -> Vec<RecoveryOutcome>,
    {
        let (tx, rx) = bounded::<CopyTask>(self.workers * QUEUE_DEPTH_PER_WORKER);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move || rx.iter().map(|task| self.copy(task)).collect::<Vec<_>>())
                })
                .collect();
            drop(rx);

            let mut outcomes = traverse(&tx);
            drop(tx);

            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(local) => outcomes.extend(local),
                    Err(_) => tracing::error!(worker = index, "Copy worker panicked"),
                }
            }
            outcomes
        })
    }

    /// Stream one task into its destination. Never fails the run, not even
    /// when a source implementation panics mid-read.
    pub fn copy(&self, task: CopyTask) -> RecoveryOutcome {
        let descriptor = task.descriptor.clone();
        let destination = task.destination.clone();

        match panic::catch_unwind(AssertUnwindSafe(|| self.copy_task(task))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(entry = %descriptor, reason = %reason, "Copy task panicked");
                if destination.exists() {
                    if let Err(e) = fs::remove_file(&destination) {
                        tracing::warn!(
                            path = %destination.display(),
                            error = %e,
                            "Failed to remove partial output"
                        );
                    }
                }
                RecoveryOutcome::failed(descriptor, None, format!("copy aborted: {}", reason))
            }
        }
    }

    fn copy_task(&self, task: CopyTask) -> RecoveryOutcome {
        let CopyTask {
            descriptor,
            destination,
            source,
            type_name,
        } = task;

        if self.cancel.is_cancelled() {
            return RecoveryOutcome::failed(descriptor, None, "cancelled");
        }

        let mut out = match self.output.open(&destination) {
            Ok(out) => out,
            Err(e) => {
                tracing::warn!(entry = %descriptor, error = %e, "Cannot create output file");
                return RecoveryOutcome::failed(descriptor, Some(destination), e.to_string());
            }
        };

        let copied = extract::copy_bounded(
            source.size(),
            self.chunk_size,
            self.cancel,
            |offset, len| source.read_at(offset, len),
            |chunk| out.write_chunk(chunk),
        );

        let result = match copied {
            Ok(_) => out.finish(),
            Err(e) => {
                out.discard();
                Err(e.into_recovery(&descriptor, &destination))
            }
        };

        match result {
            Ok(written) => {
                tracing::debug!(
                    entry = %descriptor,
                    destination = %written.path.display(),
                    bytes = written.bytes,
                    "Recovered"
                );
                let outcome = RecoveryOutcome::recovered(
                    descriptor,
                    written.path,
                    written.bytes,
                    written.blake3,
                );
                match type_name {
                    Some(t) => outcome.with_type(t),
                    None => outcome,
                }
            }
            Err(RecoveryError::Cancelled) => {
                RecoveryOutcome::failed(descriptor, None, "cancelled")
            }
            Err(e) => {
                tracing::warn!(entry = %descriptor, error = %e, "Recovery failed");
                RecoveryOutcome::failed(descriptor, None, e.to_string())
            }
        }
    }
}

/// Send a task, reporting whether the pool is still accepting work
pub(crate) fn submit(tx: &Sender<CopyTask>, task: CopyTask) -> bool {
    tx.send(task).is_ok()
}
