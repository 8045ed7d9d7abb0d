//! User document extraction
//!
//! Maps one decoded JSON object of a cohort export to typed records. Absent
//! sections and fields default to empty/missing. Per-day entries that cannot be
//! deserialized are dropped individually; only a document whose identity cannot
//! be extracted is rejected as a whole.

use crate::error::ComputeError;
use crate::types::{
    parse_summary_date, ActivityRecord, Dated, Extra, ReadinessRecord, SleepRecord, User,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// userInfo keys consumed into typed [`User`] fields
const IDENTITY_KEYS: [&str; 5] = ["user_id", "gender", "age", "height", "weight"];

/// All records of one user, sorted by date with unique dates per section
#[derive(Debug, Clone, PartialEq)]
pub struct UserDocument {
    pub user: User,
    pub sleep: Vec<SleepRecord>,
    pub activity: Vec<ActivityRecord>,
    pub readiness: Vec<ReadinessRecord>,
    /// Raw entries of `previousExperiments`
    pub experiments: Vec<Extra>,
}

impl UserDocument {
    /// Extract a user document; `index` is the document's position in the export
    pub fn from_value(index: usize, value: Value) -> Result<Self, ComputeError> {
        let corrupt = |reason: &str| ComputeError::CorruptDocument {
            index,
            reason: reason.to_string(),
        };

        let Value::Object(mut root) = value else {
            return Err(corrupt("document is not a JSON object"));
        };

        let info = root
            .get("userInfo")
            .and_then(|v| v.get("userInfo"))
            .and_then(Value::as_object)
            .ok_or_else(|| corrupt("missing userInfo.userInfo"))?;

        let user_id = match info.get("user_id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(corrupt("missing user_id")),
        };

        let user = User {
            is_male: info.get("gender").and_then(Value::as_str).map(|g| g == "male"),
            age: info.get("age").and_then(as_number),
            height: info.get("height").and_then(as_number),
            weight: info.get("weight").and_then(as_number),
            signup_date: root.get("signupDate").and_then(parse_signup_date),
            extra: info
                .iter()
                .filter(|(k, _)| !IDENTITY_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            user_id,
        };

        let sleep = take_daily(&mut root, "sleep", &user.user_id);
        let activity = take_daily(&mut root, "activity", &user.user_id);
        let readiness = take_daily(&mut root, "readiness", &user.user_id);
        let experiments = take_experiments(&mut root, &user.user_id);

        Ok(Self {
            user,
            sleep,
            activity,
            readiness,
            experiments,
        })
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn parse_signup_date(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.and_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_summary_date(raw))?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

/// Deserialize a per-day section, dropping bad entries and duplicate dates
fn take_daily<T>(root: &mut Map<String, Value>, section: &str, user_id: &str) -> Vec<T>
where
    T: DeserializeOwned + Dated,
{
    let entries = match root.remove(section) {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) | None => return Vec::new(),
        Some(_) => {
            warn!(user_id, section, "section is not a list, treating as empty");
            return Vec::new();
        }
    };

    let mut records: Vec<T> = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<T>(entry) {
            Ok(record) => records.push(record),
            Err(e) => warn!(user_id, section, position, error = %e, "dropping malformed entry"),
        }
    }

    // stable: the first entry of a date wins
    records.sort_by_key(|r| r.summary_date());
    let mut seen = BTreeSet::new();
    records.retain(|r| {
        let fresh = seen.insert(r.summary_date());
        if !fresh {
            warn!(user_id, section, date = %r.summary_date(), "dropping duplicate date");
        }
        fresh
    });
    records
}

fn take_experiments(root: &mut Map<String, Value>, user_id: &str) -> Vec<Extra> {
    match root.remove("previousExperiments") {
        Some(Value::Array(entries)) => entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(fields) => Some(fields.into_iter().collect()),
                _ => {
                    warn!(user_id, "dropping non-object experiment entry");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}
