//! Sleep feature derivation
//!
//! Rows are built in stages over one user's date-sorted sleep history:
//! stage normalization and calendar columns, travel detection, lag and rolling
//! score history, deviation buckets, and finally 7-day means of sub-metrics.

use crate::config::FeatureConfig;
use crate::deviation::{DeviationBucketizer, DeviationFeature};
use crate::types::{RowKey, SleepRecord, Timezone};
use crate::window::{Aggregation, DailySeries, Metric, RollingMeans};
use chrono::{Datelike, Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Sleep score category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepQuality {
    Fair,
    Good,
    Great,
}

/// Categorize a score into `(0, fair] / (fair, good] / (good, 100]`
pub fn sleep_quality(score: f64, fair_max: f64, good_max: f64) -> Option<SleepQuality> {
    match score {
        s if s > 0.0 && s <= fair_max => Some(SleepQuality::Fair),
        s if s > fair_max && s <= good_max => Some(SleepQuality::Good),
        s if s > good_max && s <= 100.0 => Some(SleepQuality::Great),
        _ => None,
    }
}

/// One-hot weekday columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeekdayIndicators {
    #[serde(rename = "weekday_mon")]
    pub mon: bool,
    #[serde(rename = "weekday_tue")]
    pub tue: bool,
    #[serde(rename = "weekday_wed")]
    pub wed: bool,
    #[serde(rename = "weekday_thu")]
    pub thu: bool,
    #[serde(rename = "weekday_fri")]
    pub fri: bool,
    #[serde(rename = "weekday_sat")]
    pub sat: bool,
    #[serde(rename = "weekday_sun")]
    pub sun: bool,
}

impl WeekdayIndicators {
    pub fn for_date(date: NaiveDate) -> Self {
        let mut out = Self::default();
        let slot = match date.weekday().num_days_from_monday() {
            0 => &mut out.mon,
            1 => &mut out.tue,
            2 => &mut out.wed,
            3 => &mut out.thu,
            4 => &mut out.fri,
            5 => &mut out.sat,
            _ => &mut out.sun,
        };
        *slot = true;
        out
    }
}

/// Numeric sleep columns usable in rolling and period-over-period features
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SleepMetric {
    SleepScore,
    Duration,
    Total,
    Awake,
    Light,
    Rem,
    Deep,
    OnsetLatency,
    Restless,
    Efficiency,
    BreathAverage,
    ScoreDisturbances,
    BedtimeStartDelta,
    BedtimeEndDelta,
    DeepNorm,
    RemNorm,
    IsTraveling,
}

impl SleepMetric {
    pub const ALL: [SleepMetric; 17] = [
        SleepMetric::SleepScore,
        SleepMetric::Duration,
        SleepMetric::Total,
        SleepMetric::Awake,
        SleepMetric::Light,
        SleepMetric::Rem,
        SleepMetric::Deep,
        SleepMetric::OnsetLatency,
        SleepMetric::Restless,
        SleepMetric::Efficiency,
        SleepMetric::BreathAverage,
        SleepMetric::ScoreDisturbances,
        SleepMetric::BedtimeStartDelta,
        SleepMetric::BedtimeEndDelta,
        SleepMetric::DeepNorm,
        SleepMetric::RemNorm,
        SleepMetric::IsTraveling,
    ];

    /// Sub-metrics that get a 7-day rolling mean on every sleep row
    pub const ROLLED_7D: [SleepMetric; 7] = [
        SleepMetric::BedtimeEndDelta,
        SleepMetric::BedtimeStartDelta,
        SleepMetric::OnsetLatency,
        SleepMetric::Duration,
        SleepMetric::BreathAverage,
        SleepMetric::IsTraveling,
        SleepMetric::ScoreDisturbances,
    ];

    pub fn value(&self, row: &SleepRow) -> Option<f64> {
        let r = &row.record;
        match self {
            SleepMetric::SleepScore => r.sleep_score,
            SleepMetric::Duration => r.duration,
            SleepMetric::Total => r.total,
            SleepMetric::Awake => r.awake,
            SleepMetric::Light => r.light,
            SleepMetric::Rem => r.rem,
            SleepMetric::Deep => r.deep,
            SleepMetric::OnsetLatency => r.onset_latency,
            SleepMetric::Restless => r.restless,
            SleepMetric::Efficiency => r.efficiency,
            SleepMetric::BreathAverage => r.breath_average,
            SleepMetric::ScoreDisturbances => r.score_disturbances,
            SleepMetric::BedtimeStartDelta => r.bedtime_start_delta,
            SleepMetric::BedtimeEndDelta => r.bedtime_end_delta,
            SleepMetric::DeepNorm => row.features.deep_norm,
            SleepMetric::RemNorm => row.features.rem_norm,
            SleepMetric::IsTraveling => row.features.is_traveling.map(f64::from),
        }
    }
}

impl Metric for SleepMetric {
    fn name(&self) -> &'static str {
        match self {
            SleepMetric::SleepScore => "sleep_score",
            SleepMetric::Duration => "duration",
            SleepMetric::Total => "total",
            SleepMetric::Awake => "awake",
            SleepMetric::Light => "light",
            SleepMetric::Rem => "rem",
            SleepMetric::Deep => "deep",
            SleepMetric::OnsetLatency => "onset_latency",
            SleepMetric::Restless => "restless",
            SleepMetric::Efficiency => "efficiency",
            SleepMetric::BreathAverage => "breath_average",
            SleepMetric::ScoreDisturbances => "score_disturbances",
            SleepMetric::BedtimeStartDelta => "bedtime_start_delta",
            SleepMetric::BedtimeEndDelta => "bedtime_end_delta",
            SleepMetric::DeepNorm => "deep_norm",
            SleepMetric::RemNorm => "rem_norm",
            SleepMetric::IsTraveling => "is_traveling",
        }
    }
}

/// Columns derived from a user's sleep history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SleepFeatures {
    pub awake_norm: Option<f64>,
    pub deep_norm: Option<f64>,
    pub light_norm: Option<f64>,
    pub onset_latency_norm: Option<f64>,
    pub rem_norm: Option<f64>,
    pub restless_norm: Option<f64>,
    pub good_sleep: Option<SleepQuality>,
    #[serde(rename = "sleep_score_D-1")]
    pub sleep_score_d1: Option<f64>,
    #[serde(rename = "sleep_score_D-2")]
    pub sleep_score_d2: Option<f64>,
    #[serde(rename = "deep_D-1")]
    pub deep_d1: Option<f64>,
    #[serde(rename = "deep_D-2")]
    pub deep_d2: Option<f64>,
    #[serde(rename = "rem_D-1")]
    pub rem_d1: Option<f64>,
    #[serde(rename = "rem_D-2")]
    pub rem_d2: Option<f64>,
    pub rol_sleep_score_7d: Option<f64>,
    pub rol_sleep_score_14d: Option<f64>,
    pub rol_sleep_score_21d: Option<f64>,
    /// Target: the 7-day rolling score one horizon ahead
    pub avg_sleep_score_next_week: Option<f64>,
    pub is_traveling: Option<bool>,
    #[serde(flatten)]
    pub bedtime_start_dev: DeviationFeature,
    #[serde(flatten)]
    pub bedtime_end_dev: DeviationFeature,
    #[serde(flatten)]
    pub duration_dev: DeviationFeature,
    #[serde(flatten)]
    pub weekday: WeekdayIndicators,
    pub is_workday: bool,
    #[serde(flatten)]
    pub rolling_7d: RollingMeans<SleepMetric>,
}

impl SleepFeatures {
    fn empty(rolling_days: u32) -> Self {
        Self {
            bedtime_start_dev: DeviationFeature::named("bedtime_start_dev"),
            bedtime_end_dev: DeviationFeature::named("bedtime_end_dev"),
            duration_dev: DeviationFeature::named("duration_dev"),
            rolling_7d: RollingMeans::new(rolling_days),
            ..Default::default()
        }
    }
}

/// One row of the sleep table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepRow {
    #[serde(rename = "user_date")]
    pub key: RowKey,
    pub user_id: String,
    #[serde(flatten)]
    pub record: SleepRecord,
    #[serde(flatten)]
    pub features: SleepFeatures,
}

impl SleepRow {
    pub fn date(&self) -> NaiveDate {
        self.key.date
    }
}

/// Build sleep rows from date-sorted records with unique dates
pub fn build_sleep_rows(
    user_id: &str,
    records: Vec<SleepRecord>,
    config: &FeatureConfig,
) -> Vec<SleepRow> {
    let mut rows: Vec<SleepRow> = records
        .into_iter()
        .map(|record| SleepRow {
            key: RowKey::new(user_id, record.summary_date),
            user_id: user_id.to_string(),
            record,
            features: SleepFeatures::empty(config.short_window.days),
        })
        .collect();

    derive_base_features(&mut rows, config);
    derive_travel(&mut rows);
    derive_score_history(&mut rows, config);
    derive_deviations(&mut rows, config);
    derive_rolling_means(&mut rows, config);
    rows
}

fn ratio(part: Option<f64>, whole: Option<f64>) -> Option<f64> {
    match (part, whole) {
        (Some(p), Some(w)) if w > 0.0 => Some(p / w),
        _ => None,
    }
}

fn series_of(rows: &[SleepRow], value: impl Fn(&SleepRow) -> Option<f64>) -> DailySeries {
    DailySeries::from_observations(rows.iter().map(|row| (row.date(), value(row))))
}

fn derive_base_features(rows: &mut [SleepRow], config: &FeatureConfig) {
    for row in rows.iter_mut() {
        let r = &row.record;
        let f = &mut row.features;

        f.awake_norm = ratio(r.awake, r.duration);
        f.deep_norm = ratio(r.deep, r.duration);
        f.light_norm = ratio(r.light, r.duration);
        f.onset_latency_norm = ratio(r.onset_latency, r.duration);
        f.rem_norm = ratio(r.rem, r.duration);
        f.restless_norm = r.restless.map(|v| v / 100.0);
        f.good_sleep = r
            .sleep_score
            .and_then(|s| sleep_quality(s, config.fair_sleep_max, config.good_sleep_max));

        let date = row.key.date;
        f.weekday = WeekdayIndicators::for_date(date);
        f.is_workday = date.weekday().num_days_from_monday() < 5;
    }
}

/// Most frequent timezone; ties go to the one seen first
fn home_timezone(rows: &[SleepRow]) -> Option<Timezone> {
    let mut counts: HashMap<&Timezone, (usize, usize)> = HashMap::new();
    for (position, tz) in rows.iter().filter_map(|r| r.record.timezone.as_ref()).enumerate() {
        counts.entry(tz).or_insert((0, position)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, pa)), (_, (cb, pb))| ca.cmp(cb).then(pb.cmp(pa)))
        .map(|(tz, _)| tz.clone())
}

fn derive_travel(rows: &mut [SleepRow]) {
    let Some(home) = home_timezone(rows) else {
        return;
    };
    for row in rows.iter_mut() {
        row.features.is_traveling = row.record.timezone.as_ref().map(|tz| *tz != home);
    }
}

fn derive_score_history(rows: &mut [SleepRow], config: &FeatureConfig) {
    let score = series_of(rows, |r| r.record.sleep_score);
    let deep = series_of(rows, |r| r.features.deep_norm);
    let rem = series_of(rows, |r| r.features.rem_norm);

    for row in rows.iter_mut() {
        let d = row.key.date;
        let f = &mut row.features;
        f.sleep_score_d1 = score.lag(d, 1);
        f.sleep_score_d2 = score.lag(d, 2);
        f.deep_d1 = deep.lag(d, 1);
        f.deep_d2 = deep.lag(d, 2);
        f.rem_d1 = rem.lag(d, 1);
        f.rem_d2 = rem.lag(d, 2);
        f.rol_sleep_score_7d = score.rolling(d, config.short_window, Aggregation::Mean);
        f.rol_sleep_score_14d = score.rolling(d, config.medium_window, Aggregation::Mean);
        f.rol_sleep_score_21d = score.rolling(d, config.long_window, Aggregation::Mean);
    }

    // the target only exists where the lead date is itself a row
    let rolled: BTreeMap<NaiveDate, Option<f64>> = rows
        .iter()
        .map(|r| (r.key.date, r.features.rol_sleep_score_7d))
        .collect();
    let lead = Days::new(config.target_lead_days.into());
    for row in rows.iter_mut() {
        row.features.avg_sleep_score_next_week = row
            .key
            .date
            .checked_add_days(lead)
            .and_then(|ahead| rolled.get(&ahead).copied().flatten());
    }
}

fn derive_deviations(rows: &mut [SleepRow], config: &FeatureConfig) {
    let window = config.deviation_window;
    let start = series_of(rows, |r| r.record.bedtime_start_delta);
    let end = series_of(rows, |r| r.record.bedtime_end_delta);
    let duration = series_of(rows, |r| r.record.duration);

    let bucket = |series: &DailySeries, date: NaiveDate| {
        DeviationBucketizer::bucket(
            series.get(date),
            series.rolling(date, window, Aggregation::Mean),
            series.rolling(date, window, Aggregation::Std),
        )
    };

    for row in rows.iter_mut() {
        let d = row.key.date;
        row.features.bedtime_start_dev.bucket = bucket(&start, d);
        row.features.bedtime_end_dev.bucket = bucket(&end, d);
        row.features.duration_dev.bucket = bucket(&duration, d);
    }
}

fn derive_rolling_means(rows: &mut [SleepRow], config: &FeatureConfig) {
    for metric in SleepMetric::ROLLED_7D {
        let series = series_of(rows, |r| metric.value(r));
        for row in rows.iter_mut() {
            let mean = series.rolling(row.key.date, config.short_window, Aggregation::Mean);
            row.features.rolling_7d.set(metric, mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deviation::DeviationBucket;
    use serde_json::json;

    fn day(offset: u64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 1, 1)
            .unwrap()
            .checked_add_days(Days::new(offset))
            .unwrap()
    }

    fn record(offset: u64, score: f64) -> SleepRecord {
        serde_json::from_value(json!({
            "summary_date": day(offset).format("%Y-%m-%d").to_string(),
            "timezone": 60,
            "score": score,
            "duration": 28800,
            "awake": 2880,
            "deep": 5760,
            "light": 14400,
            "rem": 5760,
            "onset_latency": 600,
            "restless": 30,
            "bedtime_start_delta": -3600,
            "bedtime_end_delta": 25200,
            "breath_average": 14.5,
            "score_disturbances": 70
        }))
        .unwrap()
    }

    #[test]
    fn test_stage_normalization() {
        let rows = build_sleep_rows("u", vec![record(0, 80.0)], &FeatureConfig::default());
        let f = &rows[0].features;
        assert_eq!(f.awake_norm, Some(0.1));
        assert_eq!(f.deep_norm, Some(0.2));
        assert_eq!(f.light_norm, Some(0.5));
        assert_eq!(f.restless_norm, Some(0.3));
        assert_eq!(f.good_sleep, Some(SleepQuality::Good));
    }

    #[test]
    fn test_zero_duration_leaves_norms_missing() {
        let mut r = record(0, 80.0);
        r.duration = Some(0.0);
        let rows = build_sleep_rows("u", vec![r], &FeatureConfig::default());
        assert_eq!(rows[0].features.deep_norm, None);
    }

    #[test]
    fn test_sleep_quality_boundaries() {
        assert_eq!(sleep_quality(75.0, 75.0, 85.0), Some(SleepQuality::Fair));
        assert_eq!(sleep_quality(75.5, 75.0, 85.0), Some(SleepQuality::Good));
        assert_eq!(sleep_quality(85.0, 75.0, 85.0), Some(SleepQuality::Good));
        assert_eq!(sleep_quality(86.0, 75.0, 85.0), Some(SleepQuality::Great));
        assert_eq!(sleep_quality(0.0, 75.0, 85.0), None);
    }

    #[test]
    fn test_lags_and_rolling_use_calendar_days() {
        // day 3 missing
        let records = vec![
            record(0, 60.0),
            record(1, 70.0),
            record(2, 80.0),
            record(4, 90.0),
        ];
        let rows = build_sleep_rows("u", records, &FeatureConfig::default());

        assert_eq!(rows[1].features.sleep_score_d1, Some(60.0));
        assert_eq!(rows[2].features.sleep_score_d2, Some(60.0));
        assert_eq!(rows[3].features.sleep_score_d1, None);
        assert_eq!(rows[3].features.sleep_score_d2, Some(80.0));

        assert_eq!(rows[2].features.rol_sleep_score_7d, None);
        assert_eq!(rows[3].features.rol_sleep_score_7d, Some(70.0));
        assert_eq!(rows[3].features.rol_sleep_score_14d, None);
    }

    #[test]
    fn test_next_week_target_requires_lead_row() {
        let records: Vec<SleepRecord> = (0..12).map(|i| record(i, 70.0 + i as f64)).collect();
        let rows = build_sleep_rows("u", records, &FeatureConfig::default());

        // day 3 + 7 = day 10, whose 7-day window (days 3..=9) averages 76
        assert_eq!(rows[3].features.avg_sleep_score_next_week, Some(76.0));
        // day 5 + 7 = day 12 is not a row
        assert_eq!(rows[5].features.avg_sleep_score_next_week, None);
    }

    #[test]
    fn test_travel_against_home_timezone() {
        let mut records: Vec<SleepRecord> = (0..4).map(|i| record(i, 80.0)).collect();
        records[2].timezone = Some(Timezone::Offset(-300));
        records[3].timezone = None;
        let rows = build_sleep_rows("u", records, &FeatureConfig::default());

        let travel: Vec<Option<bool>> = rows.iter().map(|r| r.features.is_traveling).collect();
        assert_eq!(travel, vec![Some(false), Some(false), Some(true), None]);
    }

    #[test]
    fn test_duration_deviation_bucket() {
        // alternating durations give a non-zero std over the first 10 days
        let mut records: Vec<SleepRecord> = (0..11)
            .map(|i| {
                let mut r = record(i, 80.0);
                r.duration = Some(if i % 2 == 0 { 27000.0 } else { 30600.0 });
                r
            })
            .collect();
        records[10].duration = Some(60000.0);
        let rows = build_sleep_rows("u", records, &FeatureConfig::default());

        assert_eq!(rows[9].features.duration_dev.bucket, None);
        assert_eq!(rows[10].features.duration_dev.bucket, Some(DeviationBucket::Plus3));
        // constant bedtime deltas: zero std stays missing
        assert_eq!(rows[10].features.bedtime_start_dev.bucket, None);
    }

    #[test]
    fn test_calendar_columns() {
        // 2021-01-01 is a Friday, 2021-01-02 a Saturday
        let rows = build_sleep_rows(
            "u",
            vec![record(0, 80.0), record(1, 80.0)],
            &FeatureConfig::default(),
        );
        assert!(rows[0].features.weekday.fri);
        assert!(rows[0].features.is_workday);
        assert!(rows[1].features.weekday.sat);
        assert!(!rows[1].features.is_workday);
    }

    #[test]
    fn test_rolled_sub_metrics() {
        let records: Vec<SleepRecord> = (0..4).map(|i| record(i, 80.0)).collect();
        let rows = build_sleep_rows("u", records, &FeatureConfig::default());
        let rolled = &rows[3].features.rolling_7d;
        assert_eq!(rolled.get(SleepMetric::Duration), Some(28800.0));
        assert_eq!(rolled.get(SleepMetric::IsTraveling), Some(0.0));
        assert_eq!(rows[2].features.rolling_7d.get(SleepMetric::Duration), None);
    }

    #[test]
    fn test_row_serializes_flat_columns() {
        let rows = build_sleep_rows("u", vec![record(0, 90.0)], &FeatureConfig::default());
        let value = serde_json::to_value(&rows[0]).unwrap();

        assert_eq!(value["user_date"], json!("u|2021-01-01"));
        assert_eq!(value["sleep_score"], json!(90.0));
        assert_eq!(value["good_sleep"], json!("great"));
        assert_eq!(value["weekday_fri"], json!(true));
        assert_eq!(value["bedtime_start_dev+1"], json!(false));
        assert!(value.get("rol_duration_7d").is_some());
        assert!(value.get("sleep_score_D-1").is_some());
    }
}
