//! Clock-offset activity aggregates
//!
//! The per-day intensity sequence holds one code (0-4) per 5-minute slot, with
//! slot 0 at 04:00 local time. Exercise minutes in a window are the number of
//! slots at or above the intensity threshold, times five.
//!
//! Timestamps map to slots with the `HHMM` arithmetic used throughout the
//! export: `offset = floor(((HHMM - 400) / 100) * 12)`. Offsets before the
//! 04:00 anchor wrap to the tail of the same activity day.

use crate::config::ActivityWindowConfig;
use crate::types::IntensitySequence;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike};
use serde::Serialize;

const MINUTES_PER_SLOT: u32 = 5;

/// Decode an intensity sequence, rejecting bad codes or a wrong slot count
pub fn parse_intensity(sequence: &IntensitySequence, slots_per_day: usize) -> Option<Vec<u8>> {
    let codes: Vec<u8> = match sequence {
        IntensitySequence::Encoded(text) => text
            .chars()
            .map(|c| c.to_digit(10).filter(|d| *d <= 4).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?,
        IntensitySequence::Codes(values) => values
            .iter()
            .map(|v| u8::try_from(*v).ok().filter(|d| *d <= 4))
            .collect::<Option<Vec<u8>>>()?,
    };

    (codes.len() == slots_per_day).then_some(codes)
}

/// Local time of day of an export timestamp such as `2020-01-01T23:15:00+02:00`
pub fn local_time_of_day(timestamp: &str) -> Option<NaiveTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.time());
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(timestamp, fmt).ok())
        .map(|dt| dt.time())
}

/// Time of day as an `HHMM` integer
pub fn hhmm(time: NaiveTime) -> u32 {
    time.hour() * 100 + time.minute()
}

/// Slot offset of an `HHMM` time relative to the 04:00 anchor (may be negative)
pub fn slot_offset(hhmm: u32) -> i64 {
    (((hhmm as f64 - 400.0) / 100.0) * 12.0).floor() as i64
}

/// Exercise-window minute counts for one activity day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExerciseWindows {
    pub afterwake_exercise_min: Option<u32>,
    pub beforesleep_exercise_min: Option<u32>,
    pub noon_exercise_min: Option<u32>,
    pub eve_exercise_min: Option<u32>,
}

/// Computes exercise minutes in clock-anchored windows of one activity day
pub struct ActivityWindowFeatures<'a> {
    config: &'a ActivityWindowConfig,
}

impl<'a> ActivityWindowFeatures<'a> {
    pub fn new(config: &'a ActivityWindowConfig) -> Self {
        Self { config }
    }

    /// All four windows; missing or malformed inputs leave the affected value empty
    pub fn compute(
        &self,
        sequence: Option<&IntensitySequence>,
        bedtime_start: Option<&str>,
        bedtime_end: Option<&str>,
    ) -> ExerciseWindows {
        let codes = sequence.and_then(|s| parse_intensity(s, self.config.slots_per_day));
        let codes = codes.as_deref();

        ExerciseWindows {
            afterwake_exercise_min: codes.and_then(|c| self.post_wake(c, bedtime_end?)),
            beforesleep_exercise_min: codes.and_then(|c| self.pre_sleep(c, bedtime_start?)),
            noon_exercise_min: codes.map(|c| self.noon(c)),
            eve_exercise_min: codes.map(|c| self.evening(c)),
        }
    }

    /// Minutes in the window starting at wake time
    pub fn post_wake(&self, codes: &[u8], bedtime_end: &str) -> Option<u32> {
        let start = self.anchor_slot(bedtime_end)?;
        Some(self.minutes_in(codes, start, start + self.config.exercise_window_slots))
    }

    /// Minutes in the window ending at bedtime
    pub fn pre_sleep(&self, codes: &[u8], bedtime_start: &str) -> Option<u32> {
        let end = self.anchor_slot(bedtime_start)?;
        let start = end.saturating_sub(self.config.exercise_window_slots);
        Some(self.minutes_in(codes, start, end))
    }

    pub fn noon(&self, codes: &[u8]) -> u32 {
        let start = self.config.noon_start_slot;
        self.minutes_in(codes, start, start + self.config.noon_window_slots)
    }

    pub fn evening(&self, codes: &[u8]) -> u32 {
        let start = self.config.evening_start_slot;
        self.minutes_in(codes, start, start + self.config.evening_window_slots)
    }

    /// Whether a bedtime started in the early-morning hours (00:00 up to the cut-off)
    pub fn sleep_after_midnight(&self, bedtime_start: Option<&str>) -> Option<bool> {
        let time = local_time_of_day(bedtime_start?)?;
        Some(time.hour() < self.config.early_bedtime_hour)
    }

    fn anchor_slot(&self, timestamp: &str) -> Option<usize> {
        let time = local_time_of_day(timestamp)?;
        let offset = slot_offset(hhmm(time));
        let slots = self.config.slots_per_day as i64;
        let wrapped = if offset < 0 { offset + slots } else { offset };
        usize::try_from(wrapped).ok().map(|slot| slot.min(self.config.slots_per_day))
    }

    fn minutes_in(&self, codes: &[u8], start: usize, end: usize) -> u32 {
        let end = end.min(codes.len());
        if start >= end {
            return 0;
        }
        let active = codes[start..end]
            .iter()
            .filter(|c| **c >= self.config.intensity_threshold)
            .count() as u32;
        active * MINUTES_PER_SLOT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day_with_active_slots(active: std::ops::Range<usize>) -> IntensitySequence {
        let text: String = (0..288)
            .map(|i| if active.contains(&i) { '3' } else { '1' })
            .collect();
        IntensitySequence::Encoded(text)
    }

    #[test]
    fn test_offset_formula() {
        assert_eq!(slot_offset(700), 36);
        assert_eq!(slot_offset(400), 0);
        assert_eq!(slot_offset(1200), 96);
        // minutes are treated as hundredths of an hour: 07:30 → 3.3h
        assert_eq!(slot_offset(730), 39);
        assert_eq!(slot_offset(130), -33);
    }

    #[test]
    fn test_post_wake_window_starts_at_wake_slot() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);
        // active exactly in slots 36..72
        let seq = day_with_active_slots(36..72);

        let windows = features.compute(Some(&seq), None, Some("2020-01-02T07:00:00+01:00"));
        assert_eq!(windows.afterwake_exercise_min, Some(180));
        assert_eq!(windows.beforesleep_exercise_min, None);
        assert_eq!(windows.noon_exercise_min, Some(0));
    }

    #[test]
    fn test_pre_sleep_window_ends_at_bedtime_slot() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);
        // 22:00 → floor(18 * 12) = 216; window is 180..216
        let seq = day_with_active_slots(200..230);

        let windows = features.compute(Some(&seq), Some("2020-01-01T22:00:00+00:00"), None);
        assert_eq!(windows.beforesleep_exercise_min, Some(16 * 5));
    }

    #[test]
    fn test_bedtime_after_midnight_wraps_to_day_tail() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);
        // 01:30 → -33 → 255; window 219..255
        let seq = day_with_active_slots(250..288);

        let windows = features.compute(Some(&seq), Some("2020-01-02T01:30:00+00:00"), None);
        assert_eq!(windows.beforesleep_exercise_min, Some(5 * 5));
    }

    #[test]
    fn test_early_anchors_use_partial_windows() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);

        // 03:00 → -12 → 276; window is clipped to 276..288
        let tail = day_with_active_slots(276..288);
        let windows = features.compute(Some(&tail), None, Some("2020-01-02T03:00:00+00:00"));
        assert_eq!(windows.afterwake_exercise_min, Some(12 * 5));

        // 05:00 → 12; window starts at slot 0
        let head = day_with_active_slots(0..12);
        let windows = features.compute(Some(&head), Some("2020-01-01T05:00:00+00:00"), None);
        assert_eq!(windows.beforesleep_exercise_min, Some(12 * 5));
    }

    #[test]
    fn test_fixed_windows() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);
        let seq = day_with_active_slots(100..110);
        let codes = parse_intensity(&seq, 288).unwrap();
        assert_eq!(features.noon(&codes), 50);
        assert_eq!(features.evening(&codes), 0);

        let seq = day_with_active_slots(150..300);
        let codes = parse_intensity(&seq, 288).unwrap();
        assert_eq!(features.evening(&codes), 24 * 5);
    }

    #[test]
    fn test_malformed_inputs_are_missing() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);

        let short = IntensitySequence::Encoded("0123".to_string());
        assert_eq!(features.compute(Some(&short), None, None), ExerciseWindows::default());

        let bad = IntensitySequence::Encoded("9".repeat(288));
        assert_eq!(parse_intensity(&bad, 288), None);

        let seq = day_with_active_slots(0..0);
        let windows = features.compute(Some(&seq), Some("not a timestamp"), Some("22:00"));
        assert_eq!(windows.beforesleep_exercise_min, None);
        assert_eq!(windows.afterwake_exercise_min, None);
        assert_eq!(windows.noon_exercise_min, Some(0));

        assert_eq!(features.compute(None, None, None), ExerciseWindows::default());
    }

    #[test]
    fn test_code_list_sequence() {
        let codes: Vec<i64> = (0..288).map(|i| if i < 36 { 4 } else { 0 }).collect();
        let seq = IntensitySequence::Codes(codes);
        assert_eq!(parse_intensity(&seq, 288).map(|c| c.len()), Some(288));

        let negative = IntensitySequence::Codes(vec![-1; 288]);
        assert_eq!(parse_intensity(&negative, 288), None);
    }

    #[test]
    fn test_sleep_after_midnight() {
        let config = ActivityWindowConfig::default();
        let features = ActivityWindowFeatures::new(&config);
        assert_eq!(
            features.sleep_after_midnight(Some("2020-01-02T00:45:00+02:00")),
            Some(true)
        );
        assert_eq!(
            features.sleep_after_midnight(Some("2020-01-01T23:10:00+02:00")),
            Some(false)
        );
        assert_eq!(
            features.sleep_after_midnight(Some("2020-01-02T06:00:00")),
            Some(false)
        );
        assert_eq!(features.sleep_after_midnight(Some("garbage")), None);
        assert_eq!(features.sleep_after_midnight(None), None);
    }
}
