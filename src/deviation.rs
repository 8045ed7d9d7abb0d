//! Standardized deviation buckets
//!
//! A raw value is compared with its rolling mean and standard deviation:
//! `z = (raw - mean) / std`. Positive z rounds up, negative z rounds down, and
//! the result is clipped to `[-3, 3]`. Each non-zero bucket becomes a one-hot
//! indicator column.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Signed, magnitude-capped deviation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviationBucket {
    Minus3,
    Minus2,
    Minus1,
    Zero,
    Plus1,
    Plus2,
    Plus3,
}

impl DeviationBucket {
    /// Buckets with an indicator column, in column order
    pub const INDICATED: [DeviationBucket; 6] = [
        DeviationBucket::Minus3,
        DeviationBucket::Minus2,
        DeviationBucket::Minus1,
        DeviationBucket::Plus1,
        DeviationBucket::Plus2,
        DeviationBucket::Plus3,
    ];

    pub fn value(&self) -> i8 {
        match self {
            DeviationBucket::Minus3 => -3,
            DeviationBucket::Minus2 => -2,
            DeviationBucket::Minus1 => -1,
            DeviationBucket::Zero => 0,
            DeviationBucket::Plus1 => 1,
            DeviationBucket::Plus2 => 2,
            DeviationBucket::Plus3 => 3,
        }
    }

    /// Bucket for an integer step; values beyond ±3 are clipped
    pub fn from_steps(steps: i64) -> Self {
        match steps.clamp(-3, 3) {
            -3 => DeviationBucket::Minus3,
            -2 => DeviationBucket::Minus2,
            -1 => DeviationBucket::Minus1,
            0 => DeviationBucket::Zero,
            1 => DeviationBucket::Plus1,
            2 => DeviationBucket::Plus2,
            _ => DeviationBucket::Plus3,
        }
    }

    /// Column suffix of the indicator, e.g. `-3` or `+1`
    pub fn suffix(&self) -> &'static str {
        match self {
            DeviationBucket::Minus3 => "-3",
            DeviationBucket::Minus2 => "-2",
            DeviationBucket::Minus1 => "-1",
            DeviationBucket::Zero => "0",
            DeviationBucket::Plus1 => "+1",
            DeviationBucket::Plus2 => "+2",
            DeviationBucket::Plus3 => "+3",
        }
    }
}

/// Converts raw values into deviation buckets against rolling statistics
pub struct DeviationBucketizer;

impl DeviationBucketizer {
    /// Bucket one observation.
    ///
    /// Any missing input, or a zero/non-finite standard deviation, yields `None`.
    pub fn bucket(
        raw: Option<f64>,
        mean: Option<f64>,
        std: Option<f64>,
    ) -> Option<DeviationBucket> {
        let (raw, mean, std) = (raw?, mean?, std?);
        if std == 0.0 || !std.is_finite() {
            return None;
        }

        let z = (raw - mean) / std;
        if !z.is_finite() {
            return None;
        }

        let steps = if z >= 0.0 { z.ceil() } else { z.floor() };
        Some(DeviationBucket::from_steps(steps.clamp(-3.0, 3.0) as i64))
    }

    /// Bucket date-aligned series of equal length
    pub fn bucketize(
        raw: &[Option<f64>],
        mean: &[Option<f64>],
        std: &[Option<f64>],
    ) -> Vec<Option<DeviationBucket>> {
        raw.iter()
            .zip(mean)
            .zip(std)
            .map(|((r, m), s)| Self::bucket(*r, *m, *s))
            .collect()
    }

    /// One-hot indicators for `[-3, -2, -1, +1, +2, +3]`; all false when missing or zero
    pub fn indicators(bucket: Option<DeviationBucket>) -> [bool; 6] {
        let mut out = [false; 6];
        if let Some(b) = bucket {
            if let Some(i) = DeviationBucket::INDICATED.iter().position(|x| *x == b) {
                out[i] = true;
            }
        }
        out
    }
}

/// Deviation bucket of one metric, emitted as `<name>` plus six indicator columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviationFeature {
    name: &'static str,
    pub bucket: Option<DeviationBucket>,
}

impl DeviationFeature {
    pub fn named(name: &'static str) -> Self {
        Self { name, bucket: None }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn indicators(&self) -> [bool; 6] {
        DeviationBucketizer::indicators(self.bucket)
    }
}

impl Serialize for DeviationFeature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(7))?;
        map.serialize_entry(self.name, &self.bucket.map(|b| b.value()))?;
        for (bucket, set) in DeviationBucket::INDICATED.iter().zip(self.indicators()) {
            map.serialize_entry(&format!("{}{}", self.name, bucket.suffix()), &set)?;
        }
        map.end()
    }
}
