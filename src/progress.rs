//! Run progress reporting
//!
//! The engine reports each built user, each rejected document and the final
//! summary to a [`ProgressSink`]. The library never installs a tracing
//! subscriber; [`TracingSink`] only emits events.

use crate::dataset::DatasetSummary;
use crate::error::ComputeError;
use crate::features::UserFeatures;
use tracing::{debug, info, warn};

/// Receives progress events during a run.
///
/// # Example
///
/// ```ignore
/// struct CountingSink(AtomicUsize);
///
/// impl ProgressSink for CountingSink {
///     fn on_user_built(&self, _features: &UserFeatures) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
///     fn on_document_failed(&self, _index: usize, _error: &ComputeError) {}
///     fn on_finished(&self, _summary: &DatasetSummary) {}
/// }
/// ```
pub trait ProgressSink: Send + Sync {
    /// Called once per user document, in document order
    fn on_user_built(&self, features: &UserFeatures);

    /// Called for a document that was skipped
    fn on_document_failed(&self, index: usize, error: &ComputeError);

    /// Called once when the run completes
    fn on_finished(&self, summary: &DatasetSummary);
}

/// Logs progress through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_user_built(&self, features: &UserFeatures) {
        debug!(
            user_id = %features.user.user_id,
            sleep_rows = features.sleep.len(),
            activity_rows = features.activity.len(),
            readiness_rows = features.readiness.len(),
            "user processed"
        );
    }

    fn on_document_failed(&self, index: usize, error: &ComputeError) {
        warn!(index, error = %error, "skipping document");
    }

    fn on_finished(&self, summary: &DatasetSummary) {
        info!(
            run_id = %summary.run_id,
            users = summary.users,
            active_users = summary.active_users,
            failed_documents = summary.failed_documents,
            sleep_rows = summary.sleep_rows,
            activity_rows = summary.activity_rows,
            elapsed_ms = summary.elapsed_ms,
            "feature tables built"
        );
    }
}

/// Discards all progress events
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_user_built(&self, _features: &UserFeatures) {}

    fn on_document_failed(&self, _index: usize, _error: &ComputeError) {}

    fn on_finished(&self, _summary: &DatasetSummary) {}
}
