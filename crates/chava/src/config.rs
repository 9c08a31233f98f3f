//! Kernel configuration.

/// Configuration for [`Chava`](crate::Chava).
#[derive(Debug, Clone)]
pub struct ChavaConfig {
    /// Re-verify the evidence chain and obligation accounting on every load.
    pub verify_on_load: bool,
    /// Attempts after a storage conflict before giving up, for operations
    /// that re-read and retry on their own.
    pub max_conflict_retries: u32,
    /// Maximum number of objects processed in parallel by a batch.
    pub batch_concurrency: usize,
}

impl Default for ChavaConfig {
    fn default() -> Self {
        Self {
            verify_on_load: true,
            max_conflict_retries: 8,
            batch_concurrency: 16,
        }
    }
}
