//! Progress tracking types for ingestion runs.

use instant::Instant;

/// Snapshot of an ingestion run, reported after every flushed batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestProgress {
    /// Chunks embedded and upserted so far
    pub chunks_indexed: usize,
    /// Upsert requests sent so far
    pub batches_flushed: usize,
    /// Documents rejected with a structural error so far
    pub failed_documents: usize,
    /// Time elapsed since start (milliseconds)
    pub elapsed_ms: u64,
}

impl IngestProgress {
    /// Returns throughput in chunks per second.
    pub fn chunks_per_second(&self) -> f64 {
        if self.elapsed_ms == 0 {
            0.0
        } else {
            self.chunks_indexed as f64 / (self.elapsed_ms as f64 / 1000.0)
        }
    }
}

/// Helper for tracking elapsed time during processing.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTimer {
    start: Instant,
}

impl ProgressTimer {
    /// Creates a new timer starting now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for ProgressTimer {
    fn default() -> Self {
        Self::new()
    }
}
