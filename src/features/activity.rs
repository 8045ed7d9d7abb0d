//! Activity feature derivation
//!
//! Activity rows are joined to the same-date sleep row for bedtimes, carry a
//! snapshot of the user's demographics, and gain exercise-window minutes plus
//! 7-day rolling means of a fixed metric list.

use super::sleep::SleepRow;
use crate::activity_window::{ActivityWindowFeatures, ExerciseWindows};
use crate::config::FeatureConfig;
use crate::demographics::{age_band, height_band, weight_band, AgeBand, HeightBand, WeightBand};
use crate::types::{ActivityRecord, RowKey, User};
use crate::window::{Aggregation, DailySeries, Metric, RollingMeans};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Numeric activity columns usable in rolling and period-over-period features
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityMetric {
    CalTotal,
    CalActive,
    High,
    Medium,
    Low,
    Steps,
    Inactive,
    NonWear,
    Rest,
    ActivityScore,
    MetMinHigh,
    MetMinMedium,
    MetMinLow,
    MetMinInactive,
    MetMinMediumPlus,
    ScoreMoveEveryHour,
    ScoreStayActive,
    SleepAfterMidnight,
    BeforesleepExerciseMin,
    AfterwakeExerciseMin,
    NoonExerciseMin,
    EveExerciseMin,
}

impl ActivityMetric {
    pub const ALL: [ActivityMetric; 22] = [
        ActivityMetric::CalTotal,
        ActivityMetric::CalActive,
        ActivityMetric::High,
        ActivityMetric::Medium,
        ActivityMetric::Low,
        ActivityMetric::Steps,
        ActivityMetric::Inactive,
        ActivityMetric::NonWear,
        ActivityMetric::Rest,
        ActivityMetric::ActivityScore,
        ActivityMetric::MetMinHigh,
        ActivityMetric::MetMinMedium,
        ActivityMetric::MetMinLow,
        ActivityMetric::MetMinInactive,
        ActivityMetric::MetMinMediumPlus,
        ActivityMetric::ScoreMoveEveryHour,
        ActivityMetric::ScoreStayActive,
        ActivityMetric::SleepAfterMidnight,
        ActivityMetric::BeforesleepExerciseMin,
        ActivityMetric::AfterwakeExerciseMin,
        ActivityMetric::NoonExerciseMin,
        ActivityMetric::EveExerciseMin,
    ];

    /// Metrics that get a 7-day rolling mean on every activity row
    pub const ROLLED_7D: [ActivityMetric; 17] = [
        ActivityMetric::CalTotal,
        ActivityMetric::High,
        ActivityMetric::Medium,
        ActivityMetric::Steps,
        ActivityMetric::Inactive,
        ActivityMetric::NonWear,
        ActivityMetric::ActivityScore,
        ActivityMetric::MetMinMedium,
        ActivityMetric::SleepAfterMidnight,
        ActivityMetric::MetMinHigh,
        ActivityMetric::MetMinMediumPlus,
        ActivityMetric::ScoreMoveEveryHour,
        ActivityMetric::ScoreStayActive,
        ActivityMetric::BeforesleepExerciseMin,
        ActivityMetric::AfterwakeExerciseMin,
        ActivityMetric::NoonExerciseMin,
        ActivityMetric::EveExerciseMin,
    ];

    pub fn value(&self, row: &ActivityRow) -> Option<f64> {
        let r = &row.record;
        let f = &row.features;
        match self {
            ActivityMetric::CalTotal => r.cal_total,
            ActivityMetric::CalActive => r.cal_active,
            ActivityMetric::High => r.high,
            ActivityMetric::Medium => r.medium,
            ActivityMetric::Low => r.low,
            ActivityMetric::Steps => r.steps,
            ActivityMetric::Inactive => r.inactive,
            ActivityMetric::NonWear => r.non_wear,
            ActivityMetric::Rest => r.rest,
            ActivityMetric::ActivityScore => r.activity_score,
            ActivityMetric::MetMinHigh => r.met_min_high,
            ActivityMetric::MetMinMedium => r.met_min_medium,
            ActivityMetric::MetMinLow => r.met_min_low,
            ActivityMetric::MetMinInactive => r.met_min_inactive,
            ActivityMetric::MetMinMediumPlus => f.met_min_medium_plus,
            ActivityMetric::ScoreMoveEveryHour => r.score_move_every_hour,
            ActivityMetric::ScoreStayActive => r.score_stay_active,
            ActivityMetric::SleepAfterMidnight => f.sleep_after_midnight.map(f64::from),
            ActivityMetric::BeforesleepExerciseMin => {
                f.exercise.beforesleep_exercise_min.map(f64::from)
            }
            ActivityMetric::AfterwakeExerciseMin => {
                f.exercise.afterwake_exercise_min.map(f64::from)
            }
            ActivityMetric::NoonExerciseMin => f.exercise.noon_exercise_min.map(f64::from),
            ActivityMetric::EveExerciseMin => f.exercise.eve_exercise_min.map(f64::from),
        }
    }
}

impl Metric for ActivityMetric {
    fn name(&self) -> &'static str {
        match self {
            ActivityMetric::CalTotal => "cal_total",
            ActivityMetric::CalActive => "cal_active",
            ActivityMetric::High => "high",
            ActivityMetric::Medium => "medium",
            ActivityMetric::Low => "low",
            ActivityMetric::Steps => "steps",
            ActivityMetric::Inactive => "inactive",
            ActivityMetric::NonWear => "non_wear",
            ActivityMetric::Rest => "rest",
            ActivityMetric::ActivityScore => "activity_score",
            ActivityMetric::MetMinHigh => "met_min_high",
            ActivityMetric::MetMinMedium => "met_min_medium",
            ActivityMetric::MetMinLow => "met_min_low",
            ActivityMetric::MetMinInactive => "met_min_inactive",
            ActivityMetric::MetMinMediumPlus => "met_min_medium_plus",
            ActivityMetric::ScoreMoveEveryHour => "score_move_every_hour",
            ActivityMetric::ScoreStayActive => "score_stay_active",
            ActivityMetric::SleepAfterMidnight => "sleep_afterMidnight",
            ActivityMetric::BeforesleepExerciseMin => "beforesleep_exercise_min",
            ActivityMetric::AfterwakeExerciseMin => "afterwake_exercise_min",
            ActivityMetric::NoonExerciseMin => "noon_exercise_min",
            ActivityMetric::EveExerciseMin => "eve_exercise_min",
        }
    }
}

/// Columns derived for one activity day
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivityFeatures {
    pub age: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    pub is_male: Option<bool>,
    /// Joined from the same-date sleep row
    pub bedtime_start: Option<String>,
    pub bedtime_end: Option<String>,
    pub met_min_medium_plus: Option<f64>,
    pub age_bin: Option<AgeBand>,
    pub height_bin: Option<HeightBand>,
    pub weight_bin: Option<WeightBand>,
    #[serde(rename = "sleep_afterMidnight")]
    pub sleep_after_midnight: Option<bool>,
    #[serde(flatten)]
    pub exercise: ExerciseWindows,
    #[serde(flatten)]
    pub rolling_7d: RollingMeans<ActivityMetric>,
}

/// One row of the activity table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityRow {
    #[serde(rename = "user_date")]
    pub key: RowKey,
    pub user_id: String,
    #[serde(flatten)]
    pub record: ActivityRecord,
    #[serde(flatten)]
    pub features: ActivityFeatures,
}

impl ActivityRow {
    pub fn date(&self) -> NaiveDate {
        self.key.date
    }
}

/// Build activity rows from date-sorted records with unique dates
pub fn build_activity_rows(
    user: &User,
    records: Vec<ActivityRecord>,
    sleep: &[SleepRow],
    config: &FeatureConfig,
) -> Vec<ActivityRow> {
    let bedtimes: BTreeMap<NaiveDate, &SleepRow> = sleep.iter().map(|r| (r.date(), r)).collect();
    let windows = ActivityWindowFeatures::new(&config.activity);

    let mut rows: Vec<ActivityRow> = records
        .into_iter()
        .map(|record| {
            let night = bedtimes.get(&record.summary_date);
            let bedtime_start = night.and_then(|r| r.record.bedtime_start.clone());
            let bedtime_end = night.and_then(|r| r.record.bedtime_end.clone());

            let features = ActivityFeatures {
                age: user.age,
                height: user.height,
                weight: user.weight,
                is_male: user.is_male,
                met_min_medium_plus: record
                    .met_min_medium
                    .zip(record.met_min_high)
                    .map(|(medium, high)| medium + high),
                age_bin: user.age.and_then(age_band),
                height_bin: user.height.and_then(height_band),
                weight_bin: user.weight.and_then(weight_band),
                sleep_after_midnight: windows.sleep_after_midnight(bedtime_start.as_deref()),
                exercise: windows.compute(
                    record.class_5min.as_ref(),
                    bedtime_start.as_deref(),
                    bedtime_end.as_deref(),
                ),
                rolling_7d: RollingMeans::new(config.short_window.days),
                bedtime_start,
                bedtime_end,
            };

            ActivityRow {
                key: RowKey::new(user.user_id.as_str(), record.summary_date),
                user_id: user.user_id.clone(),
                record,
                features,
            }
        })
        .collect();

    for metric in ActivityMetric::ROLLED_7D {
        let series =
            DailySeries::from_observations(rows.iter().map(|r| (r.date(), metric.value(r))));
        for row in rows.iter_mut() {
            let mean = series.rolling(row.key.date, config.short_window, Aggregation::Mean);
            row.features.rolling_7d.set(metric, mean);
        }
    }

    rows
}
