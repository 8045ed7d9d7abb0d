//! Calendar-day time-series windows
//!
//! A [`DailySeries`] is a sparse date → value map holding one user's valid
//! observations of a single metric. Lags and rolling windows are resolved by
//! calendar date, never by row position, so gaps in a user's history do not
//! shift the windows.

use crate::config::RollingWindow;
use chrono::{Days, NaiveDate};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Aggregation applied over a rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    /// Sample standard deviation (n - 1 denominator)
    Std,
}

/// Sparse per-user series of valid observations keyed by calendar date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySeries {
    values: BTreeMap<NaiveDate, f64>,
}

impl DailySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(date, value)` pairs, skipping missing and non-finite values
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
    {
        let mut series = Self::new();
        for (date, value) in observations {
            if let Some(v) = value {
                series.insert(date, v);
            }
        }
        series
    }

    pub fn insert(&mut self, date: NaiveDate, value: f64) {
        if value.is_finite() {
            self.values.insert(date, value);
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.values.get(&date).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value observed exactly `n_days` calendar days before `date`
    pub fn lag(&self, date: NaiveDate, n_days: u32) -> Option<f64> {
        let prior = date.checked_sub_days(Days::new(n_days.into()))?;
        self.get(prior)
    }

    /// Value observed exactly `n_days` calendar days after `date`
    pub fn lead(&self, date: NaiveDate, n_days: u32) -> Option<f64> {
        let later = date.checked_add_days(Days::new(n_days.into()))?;
        self.get(later)
    }

    /// Aggregate over the `window.days` calendar days before `date`.
    ///
    /// The current day is excluded. Returns `None` for a zero-day window or
    /// when fewer than `window.min_periods` observations fall inside it.
    pub fn rolling(
        &self,
        date: NaiveDate,
        window: RollingWindow,
        aggregation: Aggregation,
    ) -> Option<f64> {
        if window.days == 0 {
            return None;
        }
        let end = date.checked_sub_days(Days::new(1))?;
        let start = date.checked_sub_days(Days::new(window.days.into()))?;

        let observed: Vec<f64> = self.values.range(start..=end).map(|(_, v)| *v).collect();
        if observed.len() < window.min_periods as usize {
            return None;
        }

        match aggregation {
            Aggregation::Mean => mean(&observed),
            Aggregation::Std => sample_std(&observed),
        }
    }

    /// Relative change against the value `days_offset` calendar days earlier.
    ///
    /// A zero prior value reports `zero_prior_cap` instead of dividing by zero.
    pub fn period_over_period(
        &self,
        date: NaiveDate,
        days_offset: u32,
        zero_prior_cap: f64,
    ) -> Option<f64> {
        let current = self.get(date)?;
        let prior = self.lag(date, days_offset)?;
        if prior == 0.0 {
            Some(zero_prior_cap)
        } else {
            Some(current / prior - 1.0)
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// A numeric column that can be fed into a rolling window
pub trait Metric: Copy + Ord {
    /// Column name of the metric in the source table
    fn name(&self) -> &'static str;
}

/// Look up a metric by its column name
pub fn metric_by_name<M: Metric>(metrics: &[M], name: &str) -> Option<M> {
    metrics.iter().copied().find(|m| m.name() == name)
}

/// Rolling means of a fixed metric list, emitted as `rol_<metric>_<days>d` columns
#[derive(Debug, Clone, PartialEq)]
pub struct RollingMeans<M: Metric> {
    days: u32,
    values: BTreeMap<M, Option<f64>>,
}

impl<M: Metric> Default for RollingMeans<M> {
    fn default() -> Self {
        Self {
            days: 0,
            values: BTreeMap::new(),
        }
    }
}

impl<M: Metric> RollingMeans<M> {
    pub fn new(days: u32) -> Self {
        Self {
            days,
            values: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, metric: M, value: Option<f64>) {
        self.values.insert(metric, value);
    }

    pub fn get(&self, metric: M) -> Option<f64> {
        self.values.get(&metric).copied().flatten()
    }

    pub fn days(&self) -> u32 {
        self.days
    }

    pub fn column_name(&self, metric: M) -> String {
        format!("rol_{}_{}d", metric.name(), self.days)
    }
}

impl<M: Metric> Serialize for RollingMeans<M> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (metric, value) in &self.values {
            map.serialize_entry(&self.column_name(*metric), value)?;
        }
        map.end()
    }
}
