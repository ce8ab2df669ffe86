// src/mesh/scratch.rs

use std::mem;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;

/// Byte accounting for the working buffers of one partitioning run.
///
/// Every scratch buffer the run allocates is registered here. Dropping the
/// arena releases the registration, so the shared gauge reads zero once the
/// run has retired, whether it finished, failed, was cancelled or unwound.
pub(crate) struct ScratchArena {
    gauge: Arc<AtomicUsize>,
    bytes: usize,
}

impl ScratchArena {
    pub fn new(gauge: Arc<AtomicUsize>) -> Self {
        ScratchArena { gauge, bytes: 0 }
    }

    /// Allocates a zero-filled buffer of `len` items and registers it.
    pub fn buffer<T: Clone + Default>(&mut self, len: usize) -> Vec<T> {
        let buf = vec![T::default(); len];
        self.register(&buf);
        buf
    }

    /// Registers a buffer built elsewhere.
    pub fn register<T>(&mut self, buf: &Vec<T>) {
        let bytes = buf.capacity() * mem::size_of::<T>();
        self.bytes += bytes;
        self.gauge.fetch_add(bytes, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        self.gauge.fetch_sub(self.bytes, Ordering::SeqCst);
        trace!("Released {} scratch bytes", self.bytes);
    }
}
