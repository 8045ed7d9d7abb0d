//! Global result tables
//!
//! [`DatasetAccumulator`] appends each user's frames into the five output
//! tables. Sleep, activity and readiness rows are keyed by `(user_id, date)`;
//! users are keyed by `user_id`. A key that is already present keeps its first
//! row and is counted as a duplicate.

use crate::features::{
    ActivityMetric, ActivityRow, ReadinessRow, SleepMetric, SleepRow, UserFeatures,
};
use crate::types::{ExperimentRecord, RowKey, User};
use crate::window::{DailySeries, Metric};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Counters describing one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub run_id: Uuid,
    pub elapsed_ms: u64,
    pub documents_decoded: usize,
    pub users: usize,
    /// Users with at least one sleep record
    pub active_users: usize,
    pub failed_documents: usize,
    pub sleep_rows: usize,
    pub activity_rows: usize,
    pub readiness_rows: usize,
    pub experiment_rows: usize,
    pub duplicate_rows: usize,
}

/// Relative changes of selected metrics against an earlier date of the same user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChangeRow {
    pub user_id: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub changes: BTreeMap<String, Option<f64>>,
}

/// The five output tables plus run counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub users: BTreeMap<String, User>,
    pub sleep: BTreeMap<RowKey, SleepRow>,
    pub readiness: BTreeMap<RowKey, ReadinessRow>,
    pub activity: BTreeMap<RowKey, ActivityRow>,
    pub experiments: Vec<ExperimentRecord>,
    pub summary: DatasetSummary,
}

impl Dataset {
    /// Period-over-period changes of sleep metrics, computed per user
    pub fn sleep_period_over_period(
        &self,
        metrics: &[SleepMetric],
        days_offset: u32,
        zero_prior_cap: f64,
    ) -> Vec<PeriodChangeRow> {
        period_over_period(
            self.sleep.values().map(|r| (&r.key, r)),
            metrics,
            |row, metric| metric.value(row),
            days_offset,
            zero_prior_cap,
        )
    }

    /// Period-over-period changes of activity metrics, computed per user
    pub fn activity_period_over_period(
        &self,
        metrics: &[ActivityMetric],
        days_offset: u32,
        zero_prior_cap: f64,
    ) -> Vec<PeriodChangeRow> {
        period_over_period(
            self.activity.values().map(|r| (&r.key, r)),
            metrics,
            |row, metric| metric.value(row),
            days_offset,
            zero_prior_cap,
        )
    }
}

/// Rows must arrive grouped by user and sorted by date, as a `RowKey` map yields them
fn period_over_period<'a, R, M, I, F>(
    rows: I,
    metrics: &[M],
    value: F,
    days_offset: u32,
    zero_prior_cap: f64,
) -> Vec<PeriodChangeRow>
where
    R: 'a,
    M: Metric,
    I: Iterator<Item = (&'a RowKey, &'a R)>,
    F: Fn(&R, M) -> Option<f64>,
{
    let mut by_user: Vec<(&str, Vec<(NaiveDate, &R)>)> = Vec::new();
    for (key, row) in rows {
        match by_user.last_mut() {
            Some((user, days)) if *user == key.user_id => days.push((key.date, row)),
            _ => by_user.push((key.user_id.as_str(), vec![(key.date, row)])),
        }
    }

    let mut out = Vec::new();
    for (user_id, days) in by_user {
        let series: Vec<(M, DailySeries)> = metrics
            .iter()
            .map(|m| {
                let observed = days.iter().map(|(date, row)| (*date, value(row, *m)));
                (*m, DailySeries::from_observations(observed))
            })
            .collect();

        for (date, _) in &days {
            let changes = series
                .iter()
                .map(|(metric, s)| {
                    let change = s.period_over_period(*date, days_offset, zero_prior_cap);
                    (metric.name().to_string(), change)
                })
                .collect();
            out.push(PeriodChangeRow {
                user_id: user_id.to_string(),
                date: *date,
                changes,
            });
        }
    }
    out
}

/// Appends per-user frames into the global tables
pub struct DatasetAccumulator {
    run_id: Uuid,
    started: Instant,
    users: BTreeMap<String, User>,
    sleep: BTreeMap<RowKey, SleepRow>,
    readiness: BTreeMap<RowKey, ReadinessRow>,
    activity: BTreeMap<RowKey, ActivityRow>,
    experiments: Vec<ExperimentRecord>,
    documents: usize,
    active_users: usize,
    failed_documents: usize,
    duplicate_rows: usize,
}

impl Default for DatasetAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetAccumulator {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started: Instant::now(),
            users: BTreeMap::new(),
            sleep: BTreeMap::new(),
            readiness: BTreeMap::new(),
            activity: BTreeMap::new(),
            experiments: Vec::new(),
            documents: 0,
            active_users: 0,
            failed_documents: 0,
            duplicate_rows: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Number of users with sleep history appended so far
    pub fn active_users(&self) -> usize {
        self.active_users
    }

    pub fn append(&mut self, features: UserFeatures) {
        self.documents += 1;
        let active = features.is_active();

        let UserFeatures {
            user,
            sleep,
            activity,
            readiness,
            experiments,
        } = features;

        match self.users.entry(user.user_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(user);
                if active {
                    self.active_users += 1;
                }
            }
            Entry::Occupied(_) => {
                warn!(
                    user_id = %user.user_id,
                    "user appears in more than one document, keeping the first"
                );
                self.duplicate_rows += 1;
            }
        }

        self.duplicate_rows += insert_rows(&mut self.sleep, sleep, |r| &r.key, "sleep");
        self.duplicate_rows += insert_rows(&mut self.activity, activity, |r| &r.key, "activity");
        self.duplicate_rows +=
            insert_rows(&mut self.readiness, readiness, |r| &r.key, "readiness");
        self.experiments.extend(experiments);
    }

    /// Count a document that could not be turned into a user
    pub fn record_failure(&mut self) {
        self.documents += 1;
        self.failed_documents += 1;
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            run_id: self.run_id,
            elapsed_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            documents_decoded: self.documents,
            users: self.users.len(),
            active_users: self.active_users,
            failed_documents: self.failed_documents,
            sleep_rows: self.sleep.len(),
            activity_rows: self.activity.len(),
            readiness_rows: self.readiness.len(),
            experiment_rows: self.experiments.len(),
            duplicate_rows: self.duplicate_rows,
        }
    }

    pub fn finish(self) -> Dataset {
        let summary = self.summary();
        Dataset {
            users: self.users,
            sleep: self.sleep,
            readiness: self.readiness,
            activity: self.activity,
            experiments: self.experiments,
            summary,
        }
    }
}

fn insert_rows<R>(
    table: &mut BTreeMap<RowKey, R>,
    rows: Vec<R>,
    key: impl Fn(&R) -> &RowKey,
    name: &str,
) -> usize {
    let mut duplicates = 0;
    for row in rows {
        match table.entry(key(&row).clone()) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(slot) => {
                warn!(table = name, key = %slot.key(), "duplicate row key, keeping the first");
                duplicates += 1;
            }
        }
    }
    duplicates
}
