//! Sample buffer for handing gaze samples from the engine thread to the host
//!
//! The engine callback thread appends, the host's polling thread drains.
//! Both sides hold the lock only for an append or a `Vec` swap, so the
//! callback thread never waits on anything the host does with the samples.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::sample::GazeSample;

/// Thread-safe, growable FIFO of gaze samples with drain-all reads
///
/// - Producer (engine callback thread): calls `push()` for every sample
/// - Consumer (host thread): calls `drain_all()` on each poll
///
/// ```ignore
/// let buffer = SampleBuffer::new();
///
/// // In the engine callback:
/// buffer.push(sample);
///
/// // On each host poll:
/// let samples = buffer.drain_all();
/// ```
pub struct SampleBuffer {
    inner: Arc<Mutex<BufferInner>>,
}

struct BufferInner {
    /// Samples in arrival order, oldest first
    samples: Vec<GazeSample>,
    /// Number of samples pushed since creation
    samples_written: u64,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BufferInner {
                samples: Vec::new(),
                samples_written: 0,
            })),
        }
    }

    /// A poisoned lock still guards a consistent `Vec`: every critical
    /// section is a single push, swap or clear.
    fn lock(&self) -> MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a sample at the tail
    ///
    /// Growth is unbounded between drains. Allocation failure aborts the
    /// process, it is never swallowed here.
    pub fn push(&self, sample: GazeSample) {
        let mut inner = self.lock();
        inner.samples.push(sample);
        inner.samples_written += 1;
    }

    /// Remove and return every buffered sample, oldest first
    ///
    /// The buffer is left empty. An empty result is the normal
    /// "nothing arrived since last poll" case.
    pub fn drain_all(&self) -> Vec<GazeSample> {
        std::mem::take(&mut self.lock().samples)
    }

    /// Number of samples currently waiting to be drained
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Get the total number of samples pushed since creation
    pub fn samples_written(&self) -> u64 {
        self.lock().samples_written
    }

    /// Discard all buffered samples
    pub fn clear(&self) {
        // Release the storage too; a long session may have grown it a lot.
        self.lock().samples = Vec::new();
    }

    /// Clone the Arc to share with the engine callback thread
    pub fn clone_ref(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SampleBuffer {
    fn clone(&self) -> Self {
        self.clone_ref()
    }
}
