//! Pipeline orchestration
//!
//! This module provides the public API for Synheart Cohort.
//! It runs a whole cohort export through decode → document extraction →
//! per-user feature derivation → accumulation.

use crate::config::EngineConfig;
use crate::dataset::{Dataset, DatasetAccumulator};
use crate::decoder::StackedRecordDecoder;
use crate::document::UserDocument;
use crate::error::ComputeError;
use crate::features::{UserFeatureBuilder, UserFeatures};
use crate::progress::{ProgressSink, TracingSink};
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

/// Build all feature tables of a stacked cohort export with default settings.
///
/// # Example
/// ```ignore
/// let dataset = build_feature_tables(&export_text)?;
/// println!("{} active users", dataset.summary.active_users);
/// ```
pub fn build_feature_tables(input: &str) -> Result<Dataset, ComputeError> {
    FeatureEngine::new(EngineConfig::default())?.run(input)
}

/// Runs the feature derivation over a cohort export.
///
/// Sequential runs decode and build one document at a time. Parallel runs
/// decode the whole export, build users on a local rayon pool and merge the
/// results in document order, so both modes produce the same tables.
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    config: EngineConfig,
    builder: UserFeatureBuilder,
}

impl FeatureEngine {
    /// Create an engine, rejecting invalid configuration
    pub fn new(config: EngineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let builder = UserFeatureBuilder::new(config.features.clone());
        Ok(Self { config, builder })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run with progress logged through `tracing`
    pub fn run(&self, input: &str) -> Result<Dataset, ComputeError> {
        self.run_with_sink(input, &TracingSink)
    }

    pub fn run_with_sink(
        &self,
        input: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Dataset, ComputeError> {
        let dataset = if self.config.parallel {
            self.run_parallel(input, sink)?
        } else {
            self.run_sequential(input, sink)
        };
        sink.on_finished(&dataset.summary);
        Ok(dataset)
    }

    fn run_sequential(&self, input: &str, sink: &dyn ProgressSink) -> Dataset {
        let mut accumulator = DatasetAccumulator::new();
        let mut decoder = StackedRecordDecoder::new(input);

        for (index, value) in decoder.by_ref().enumerate() {
            let result = self.build_document(index, value);
            merge(&mut accumulator, index, result, sink);
        }

        warn_on_trailing(decoder.remainder());
        accumulator.finish()
    }

    fn run_parallel(&self, input: &str, sink: &dyn ProgressSink) -> Result<Dataset, ComputeError> {
        let mut decoder = StackedRecordDecoder::new(input);
        let documents: Vec<Value> = decoder.by_ref().collect();
        warn_on_trailing(decoder.remainder());

        let threads = self.config.num_threads.unwrap_or(0);
        debug!(documents = documents.len(), threads, "building users in parallel");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;

        let results: Vec<Result<UserFeatures, ComputeError>> = pool.install(|| {
            documents
                .into_par_iter()
                .enumerate()
                .map(|(index, value)| self.build_document(index, value))
                .collect()
        });

        let mut accumulator = DatasetAccumulator::new();
        for (index, result) in results.into_iter().enumerate() {
            merge(&mut accumulator, index, result, sink);
        }

        Ok(accumulator.finish())
    }

    fn build_document(&self, index: usize, value: Value) -> Result<UserFeatures, ComputeError> {
        let document = UserDocument::from_value(index, value)?;
        Ok(self.builder.build(document))
    }
}

fn merge(
    accumulator: &mut DatasetAccumulator,
    index: usize,
    result: Result<UserFeatures, ComputeError>,
    sink: &dyn ProgressSink,
) {
    match result {
        Ok(features) => {
            sink.on_user_built(&features);
            accumulator.append(features);
        }
        Err(e) => {
            sink.on_document_failed(index, &e);
            accumulator.record_failure();
        }
    }
}

fn warn_on_trailing(remainder: &str) {
    let trailing = remainder.trim();
    if !trailing.is_empty() {
        warn!(trailing_bytes = trailing.len(), "ignoring undecodable trailing input");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetSummary;
    use crate::progress::NullSink;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn export() -> String {
        let users = [
            json!({
                "userInfo": {"userInfo": {"user_id": "a", "gender": "male", "age": 28}},
                "sleep": [
                    {"summary_date": "2021-02-01", "score": 70, "duration": 28000},
                    {"summary_date": "2021-02-02", "score": 75, "duration": 29000}
                ],
                "activity": [{"summary_date": "2021-02-02", "steps": 5000}],
                "readiness": [{"summary_date": "2021-02-02", "score": 60}],
                "previousExperiments": [{"name": "less screen time"}]
            }),
            json!({"userInfo": {}}),
            json!({
                "userInfo": {"userInfo": {"user_id": "b"}},
                "activity": [{"summary_date": "2021-02-02", "steps": 100}]
            }),
            json!({
                "userInfo": {"userInfo": {"user_id": "c"}},
                "sleep": [{"summary_date": "2021-02-03", "score": 90}]
            }),
        ];
        users.iter().map(|u| u.to_string()).collect()
    }

    #[derive(Default)]
    struct CountingSink {
        built: AtomicUsize,
        failed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ProgressSink for CountingSink {
        fn on_user_built(&self, _features: &UserFeatures) {
            self.built.fetch_add(1, Ordering::Relaxed);
        }

        fn on_document_failed(&self, index: usize, error: &ComputeError) {
            assert_eq!(index, 1);
            assert!(error.is_document_local());
            self.failed.fetch_add(1, Ordering::Relaxed);
        }

        fn on_finished(&self, _summary: &DatasetSummary) {
            self.finished.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_sequential_run() {
        let dataset = build_feature_tables(&export()).unwrap();
        let s = &dataset.summary;
        assert_eq!(s.documents_decoded, 4);
        assert_eq!(s.users, 3);
        assert_eq!(s.active_users, 2);
        assert_eq!(s.failed_documents, 1);
        assert_eq!(s.sleep_rows, 3);
        assert_eq!(s.activity_rows, 1);
        assert_eq!(s.readiness_rows, 1);
        assert_eq!(s.experiment_rows, 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let input = export();
        let sequential = FeatureEngine::new(EngineConfig::default())
            .unwrap()
            .run_with_sink(&input, &NullSink)
            .unwrap();

        let config = EngineConfig {
            parallel: true,
            num_threads: Some(2),
            ..EngineConfig::default()
        };
        let parallel = FeatureEngine::new(config)
            .unwrap()
            .run_with_sink(&input, &NullSink)
            .unwrap();

        assert_eq!(sequential.users, parallel.users);
        assert_eq!(sequential.sleep, parallel.sleep);
        assert_eq!(sequential.activity, parallel.activity);
        assert_eq!(sequential.readiness, parallel.readiness);
        assert_eq!(sequential.experiments, parallel.experiments);
        assert_eq!(sequential.summary.active_users, parallel.summary.active_users);
    }

    #[test]
    fn test_sink_receives_every_event() {
        let sink = CountingSink::default();
        FeatureEngine::new(EngineConfig::default())
            .unwrap()
            .run_with_sink(&export(), &sink)
            .unwrap();

        assert_eq!(sink.built.load(Ordering::Relaxed), 3);
        assert_eq!(sink.failed.load(Ordering::Relaxed), 1);
        assert_eq!(sink.finished.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_trailing_partial_document_is_ignored() {
        let mut input = export();
        input.push_str(r#"{"userInfo": {"userInfo": {"user_id": "z""#);
        let dataset = build_feature_tables(&input).unwrap();
        assert_eq!(dataset.summary.documents_decoded, 4);
        assert!(!dataset.users.contains_key("z"));
    }

    #[test]
    fn test_empty_input() {
        let dataset = build_feature_tables("").unwrap();
        assert_eq!(dataset.summary.users, 0);
        assert!(dataset.sleep.is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.features.short_window.days = 0;
        assert!(matches!(
            FeatureEngine::new(config),
            Err(ComputeError::ConfigError(_))
        ));
    }
}
