// src/mesh/task.rs
// Background partitioning on the rayon pool.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

use glam::Vec3;
use log::{error, info};

use crate::mesh::{MeshInput, PartitionError, Partitioner, ReservedBand, Segmentation};

pub type SegmentationOutcome = Result<Segmentation, PartitionError>;

/// Requests cancellation of a background run. The run notices at its next
/// chunk boundary and reports [`PartitionError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Handle to a segmentation running on the rayon pool.
///
/// The outcome is delivered exactly once. Dropping the task before it has
/// been collected requests cancellation.
#[derive(Debug)]
pub struct SegmentationTask {
    receiver: Receiver<SegmentationOutcome>,
    cancel: CancelHandle,
    delivered: bool,
}

impl SegmentationTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Returns the outcome if the worker has finished. Yields `Some` once;
    /// every later call returns `None`.
    pub fn try_poll(&mut self) -> Option<SegmentationOutcome> {
        if self.delivered {
            return None;
        }
        let outcome = match self.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(PartitionError::WorkerLost),
        };
        self.delivered = true;
        Some(outcome)
    }

    /// Blocks until the worker reports.
    pub fn wait(mut self) -> SegmentationOutcome {
        if self.delivered {
            return Err(PartitionError::AlreadyDelivered);
        }
        self.delivered = true;
        self.receiver.recv().unwrap_or(Err(PartitionError::WorkerLost))
    }

    /// Cancels and blocks until the worker has retired and released its
    /// scratch memory. A run that finished first still returns its result.
    pub fn cancel_and_wait(self) -> SegmentationOutcome {
        self.cancel();
        self.wait()
    }
}

impl Drop for SegmentationTask {
    fn drop(&mut self) {
        if !self.delivered {
            self.cancel.cancel();
        }
    }
}

impl Partitioner {
    /// Runs [`segment`](Self::segment) on the rayon pool and returns a
    /// handle to collect the outcome.
    pub fn spawn(
        &self,
        input: Arc<MeshInput>,
        seeds: Vec<Vec3>,
        band: Option<ReservedBand>,
    ) -> SegmentationTask {
        let (sender, receiver) = mpsc::channel();
        let cancel = self.spawn_with_callback(input, seeds, band, move |outcome| {
            // The task may already be gone; nobody is left to tell.
            let _ = sender.send(outcome);
        });
        SegmentationTask {
            receiver,
            cancel,
            delivered: false,
        }
    }

    /// Runs the segmentation on the rayon pool and hands its single outcome
    /// to `callback` on the worker thread. Scratch memory is released before
    /// the callback runs. A panicking run reports
    /// [`PartitionError::WorkerLost`].
    pub fn spawn_with_callback<F>(
        &self,
        input: Arc<MeshInput>,
        seeds: Vec<Vec3>,
        band: Option<ReservedBand>,
        callback: F,
    ) -> CancelHandle
    where
        F: FnOnce(SegmentationOutcome) + Send + 'static,
    {
        let handle = CancelHandle::default();
        let flag = handle.flag.clone();
        let partitioner = self.clone();
        rayon::spawn(move || {
            let run = panic::catch_unwind(AssertUnwindSafe(|| {
                partitioner.run(&input, &seeds, band, &flag)
            }));
            let outcome = match run {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!("Segmentation worker panicked");
                    Err(PartitionError::WorkerLost)
                }
            };
            if let Err(PartitionError::Cancelled) = outcome {
                info!("Segmentation cancelled");
            }
            callback(outcome);
        });
        handle
    }
}
