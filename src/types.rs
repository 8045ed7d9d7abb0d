//! Core types for the Synheart Cohort pipeline
//!
//! Raw per-day records as they appear in a cohort export, the user identity
//! record, and the `(user_id, date)` key that joins sleep, activity and
//! readiness tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Columns carried through from the export without interpretation
pub type Extra = BTreeMap<String, serde_json::Value>;

/// Compound row key shared by the sleep, activity and readiness tables.
///
/// Serialized as `"<user_id>|<YYYY-MM-DD>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey {
    pub user_id: String,
    pub date: NaiveDate,
}

impl RowKey {
    pub fn new(user_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            date,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.user_id, self.date.format("%Y-%m-%d"))
    }
}

impl Serialize for RowKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Timezone as exported: either a UTC offset in minutes or a zone name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timezone {
    Offset(i64),
    Named(String),
}

/// Per-day 5-minute intensity classification, as a digit string or code list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntensitySequence {
    Encoded(String),
    Codes(Vec<i64>),
}

/// Records that belong to one calendar date of a user's history
pub trait Dated {
    fn summary_date(&self) -> NaiveDate;
}

/// User identity, one per user document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub user_id: String,
    #[serde(rename = "signupDate")]
    pub signup_date: Option<DateTime<Utc>>,
    pub is_male: Option<bool>,
    pub age: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl User {
    /// A user with only an identifier; every demographic field missing
    pub fn with_id(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            signup_date: None,
            is_male: None,
            age: None,
            height: None,
            weight: None,
            extra: Extra::new(),
        }
    }
}

/// Raw nightly sleep summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepRecord {
    #[serde(deserialize_with = "deserialize_summary_date")]
    pub summary_date: NaiveDate,
    #[serde(default)]
    pub timezone: Option<Timezone>,
    #[serde(default)]
    pub bedtime_start: Option<String>,
    #[serde(default)]
    pub bedtime_end: Option<String>,
    /// Seconds relative to local midnight
    #[serde(default)]
    pub bedtime_start_delta: Option<f64>,
    #[serde(default)]
    pub bedtime_end_delta: Option<f64>,
    /// Time in bed (seconds)
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub awake: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub rem: Option<f64>,
    #[serde(default)]
    pub deep: Option<f64>,
    #[serde(default)]
    pub onset_latency: Option<f64>,
    /// Restlessness percentage (0-100)
    #[serde(default)]
    pub restless: Option<f64>,
    #[serde(default)]
    pub efficiency: Option<f64>,
    #[serde(default)]
    pub breath_average: Option<f64>,
    #[serde(default)]
    pub score_disturbances: Option<f64>,
    #[serde(default, rename(serialize = "sleep_score", deserialize = "score"))]
    pub sleep_score: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Dated for SleepRecord {
    fn summary_date(&self) -> NaiveDate {
        self.summary_date
    }
}

/// Raw daily activity summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(deserialize_with = "deserialize_summary_date")]
    pub summary_date: NaiveDate,
    #[serde(default)]
    pub timezone: Option<Timezone>,
    #[serde(default)]
    pub class_5min: Option<IntensitySequence>,
    #[serde(default, rename(serialize = "activity_score", deserialize = "score"))]
    pub activity_score: Option<f64>,
    #[serde(default)]
    pub cal_total: Option<f64>,
    #[serde(default)]
    pub cal_active: Option<f64>,
    /// Minutes of high-intensity activity
    #[serde(default)]
    pub high: Option<f64>,
    #[serde(default)]
    pub medium: Option<f64>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub inactive: Option<f64>,
    #[serde(default)]
    pub non_wear: Option<f64>,
    #[serde(default)]
    pub rest: Option<f64>,
    #[serde(default)]
    pub steps: Option<f64>,
    #[serde(default)]
    pub met_min_high: Option<f64>,
    #[serde(default)]
    pub met_min_medium: Option<f64>,
    #[serde(default)]
    pub met_min_low: Option<f64>,
    #[serde(default)]
    pub met_min_inactive: Option<f64>,
    #[serde(default)]
    pub score_move_every_hour: Option<f64>,
    #[serde(default)]
    pub score_stay_active: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Dated for ActivityRecord {
    fn summary_date(&self) -> NaiveDate {
        self.summary_date
    }
}

/// Raw daily readiness summary, passed through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessRecord {
    #[serde(deserialize_with = "deserialize_summary_date")]
    pub summary_date: NaiveDate,
    #[serde(default, rename(serialize = "readiness_score", deserialize = "score"))]
    pub readiness_score: Option<f64>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Dated for ReadinessRecord {
    fn summary_date(&self) -> NaiveDate {
        self.summary_date
    }
}

/// A completed experiment, tagged with its owner for later joins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperimentRecord {
    pub user_id: String,
    #[serde(flatten)]
    pub fields: Extra,
}

/// Accepts `YYYY-MM-DD`, or a datetime whose first ten characters are one
fn deserialize_summary_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_summary_date(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid summary_date: {raw}"))
    })
}

pub(crate) fn parse_summary_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_key_serializes_as_user_date() {
        let key = RowKey::new("u1", NaiveDate::from_ymd_opt(2020, 3, 7).unwrap());
        assert_eq!(key.to_string(), "u1|2020-03-07");
        assert_eq!(serde_json::to_value(&key).unwrap(), json!("u1|2020-03-07"));
    }

    #[test]
    fn test_sleep_record_renames_score_and_keeps_extras() {
        let record: SleepRecord = serde_json::from_value(json!({
            "summary_date": "2020-01-02",
            "timezone": 120,
            "score": 81,
            "duration": 28800,
            "hr_lowest": 48
        }))
        .unwrap();

        assert_eq!(record.sleep_score, Some(81.0));
        assert_eq!(record.timezone, Some(Timezone::Offset(120)));
        assert_eq!(record.extra.get("hr_lowest"), Some(&json!(48)));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["sleep_score"], json!(81.0));
        assert!(out.get("score").is_none());
        assert_eq!(out["hr_lowest"], json!(48));
    }

    #[test]
    fn test_summary_date_accepts_datetime_prefix() {
        let record: ReadinessRecord = serde_json::from_value(json!({
            "summary_date": "2020-05-01T00:00:00",
            "score": 70
        }))
        .unwrap();
        assert_eq!(
            record.summary_date,
            NaiveDate::from_ymd_opt(2020, 5, 1).unwrap()
        );
    }

    #[test]
    fn test_invalid_summary_date_is_rejected() {
        let result: Result<ReadinessRecord, _> =
            serde_json::from_value(json!({"summary_date": "yesterday"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_intensity_sequence_forms() {
        let encoded: IntensitySequence = serde_json::from_value(json!("0123")).unwrap();
        assert_eq!(encoded, IntensitySequence::Encoded("0123".to_string()));

        let codes: IntensitySequence = serde_json::from_value(json!([0, 1, 4])).unwrap();
        assert_eq!(codes, IntensitySequence::Codes(vec![0, 1, 4]));
    }
}
