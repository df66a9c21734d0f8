//! Progress reporting hooks for a harvest run.
//!
//! The pipeline only talks to [`ProgressCallback`]; the CLI plugs in
//! `indicatif` bars while tests and library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates. Must be `Send + Sync` so one instance can be
/// shared by every concurrently running partition.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total expected units of work.
    fn set_total(&self, total: u64);

    /// Grows the total as more work is discovered (e.g. after a listing).
    fn add_total(&self, delta: u64);

    /// Advances progress by `delta` units.
    fn inc(&self, delta: u64);

    fn set_message(&self, msg: String);

    /// Marks progress as complete with a final message.
    fn finish(&self, msg: String);
}

/// Ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn add_total(&self, _delta: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

/// The two progress channels of a run: partitions settled and records
/// enriched.
#[derive(Clone)]
pub struct HarvestProgress {
    pub partitions: Arc<dyn ProgressCallback>,
    pub records: Arc<dyn ProgressCallback>,
}

impl Default for HarvestProgress {
    fn default() -> Self {
        Self {
            partitions: null_progress(),
            records: null_progress(),
        }
    }
}
