//! Synheart Cohort - Per-user feature derivation for wearable cohort exports
//!
//! Cohort turns a stacked multi-user wearable export into training tables
//! through a deterministic pipeline: stacked decode → document extraction →
//! per-user feature derivation → dataset accumulation.
//!
//! ## Outputs
//!
//! - **users**: identity and demographics, one row per user
//! - **sleep**: nightly records with lag, rolling, target and deviation features
//! - **activity**: daily records joined to bedtimes, with exercise-window minutes
//! - **readiness** and **experiments**: passed through per user

pub mod activity_window;
pub mod config;
pub mod dataset;
pub mod decoder;
pub mod demographics;
pub mod deviation;
pub mod document;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod progress;
pub mod types;
pub mod window;

pub use config::{EngineConfig, FeatureConfig, RollingWindow};
pub use dataset::{Dataset, DatasetAccumulator, DatasetSummary, PeriodChangeRow};
pub use decoder::{decode_stacked, StackedRecordDecoder};
pub use document::UserDocument;
pub use error::ComputeError;
pub use features::{ActivityMetric, SleepMetric, UserFeatureBuilder, UserFeatures};
pub use pipeline::{build_feature_tables, FeatureEngine};
pub use progress::{NullSink, ProgressSink, TracingSink};

/// Cohort version reported by the CLI
pub const COHORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run reports
pub const PRODUCER_NAME: &str = "synheart-cohort";
