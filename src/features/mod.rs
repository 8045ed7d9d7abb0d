//! Per-user feature derivation
//!
//! [`UserFeatureBuilder`] turns one [`UserDocument`] into the user's slice of
//! every output table:
//! - the users row (identity and demographics)
//! - sleep rows with normalization, history, target and deviation features
//! - activity rows joined to same-date bedtimes
//! - readiness rows and completed experiments, passed through
//!
//! A user without any sleep history contributes only the users row.

pub mod activity;
pub mod sleep;

pub use activity::{build_activity_rows, ActivityFeatures, ActivityMetric, ActivityRow};
pub use sleep::{
    build_sleep_rows, sleep_quality, SleepFeatures, SleepMetric, SleepQuality, SleepRow,
    WeekdayIndicators,
};

use crate::config::FeatureConfig;
use crate::document::UserDocument;
use crate::types::{ExperimentRecord, Extra, ReadinessRecord, RowKey, User};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// One row of the readiness table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessRow {
    #[serde(rename = "user_date")]
    pub key: RowKey,
    pub user_id: String,
    #[serde(flatten)]
    pub record: ReadinessRecord,
}

/// Everything one user contributes to the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct UserFeatures {
    pub user: User,
    pub sleep: Vec<SleepRow>,
    pub activity: Vec<ActivityRow>,
    pub readiness: Vec<ReadinessRow>,
    pub experiments: Vec<ExperimentRecord>,
}

impl UserFeatures {
    fn identity_only(user: User) -> Self {
        Self {
            user,
            sleep: Vec::new(),
            activity: Vec::new(),
            readiness: Vec::new(),
            experiments: Vec::new(),
        }
    }

    /// Users with sleep history count towards the active-user total
    pub fn is_active(&self) -> bool {
        !self.sleep.is_empty()
    }
}

/// Builds the per-user feature frames
#[derive(Debug, Clone, Default)]
pub struct UserFeatureBuilder {
    config: FeatureConfig,
}

impl UserFeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Derive all feature frames of one user
    pub fn build(&self, document: UserDocument) -> UserFeatures {
        let UserDocument {
            mut user,
            sleep,
            activity,
            readiness,
            experiments,
        } = document;

        let user_id = user.user_id.clone();
        drop_shadowed_extras(std::slice::from_mut(&mut user), |u| &mut u.extra, "users", &user_id);

        if sleep.is_empty() {
            debug!(user_id = %user.user_id, "no sleep history, emitting identity only");
            return UserFeatures::identity_only(user);
        }

        let mut sleep = build_sleep_rows(&user.user_id, sleep, &self.config);
        let mut activity = build_activity_rows(&user, activity, &sleep, &self.config);

        let mut readiness: Vec<ReadinessRow> = readiness
            .into_iter()
            .map(|record| ReadinessRow {
                key: RowKey::new(user.user_id.as_str(), record.summary_date),
                user_id: user.user_id.clone(),
                record,
            })
            .collect();

        drop_shadowed_extras(&mut sleep, |r| &mut r.record.extra, "sleep", &user_id);
        drop_shadowed_extras(&mut activity, |r| &mut r.record.extra, "activity", &user_id);
        drop_shadowed_extras(&mut readiness, |r| &mut r.record.extra, "readiness", &user_id);

        let experiments = experiments
            .into_iter()
            .map(|fields| ExperimentRecord {
                user_id: user.user_id.clone(),
                fields,
            })
            .collect();

        debug!(
            user_id = %user.user_id,
            sleep_rows = sleep.len(),
            activity_rows = activity.len(),
            "built user features"
        );

        UserFeatures {
            user,
            sleep,
            activity,
            readiness,
            experiments,
        }
    }
}

/// Remove unmodelled fields whose name matches a column the row already emits.
///
/// Flattened extras would otherwise serialize a second value under the same key.
fn drop_shadowed_extras<R: Serialize>(
    rows: &mut [R],
    extra: fn(&mut R) -> &mut Extra,
    table: &str,
    user_id: &str,
) {
    let mut dropped = BTreeSet::new();
    for row in rows.iter_mut() {
        if extra(row).is_empty() {
            continue;
        }
        let kept = std::mem::take(extra(row));
        let columns = match serde_json::to_value(&*row) {
            Ok(Value::Object(columns)) => columns,
            _ => {
                *extra(row) = kept;
                continue;
            }
        };
        *extra(row) = kept
            .into_iter()
            .filter(|(key, _)| {
                let shadowed = columns.contains_key(key);
                if shadowed {
                    dropped.insert(key.clone());
                }
                !shadowed
            })
            .collect();
    }
    for column in dropped {
        warn!(user_id, table, column = %column, "dropping raw field that shadows a column");
    }
}
