//! Demographic bands attached to activity rows

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgeBand {
    #[serde(rename = "20s")]
    Twenties,
    #[serde(rename = "30s")]
    Thirties,
    #[serde(rename = "40s")]
    Forties,
    #[serde(rename = "50s plus")]
    FiftiesPlus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HeightBand {
    #[serde(rename = "less than 150 cm")]
    Under150,
    #[serde(rename = "150s")]
    From150,
    #[serde(rename = "160s")]
    From160,
    #[serde(rename = "170s")]
    From170,
    #[serde(rename = "180s")]
    From180,
    #[serde(rename = "greater than 190 cm")]
    Over190,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WeightBand {
    #[serde(rename = "less than 65 kg")]
    Under65,
    #[serde(rename = "65 to 80 kg")]
    From65To80,
    #[serde(rename = "80 to 95 kg")]
    From80To95,
    #[serde(rename = "more than 95 kg")]
    Over95,
}

/// Age in years; under 20 (and missing values) have no band
pub fn age_band(age: f64) -> Option<AgeBand> {
    match age {
        a if (20.0..30.0).contains(&a) => Some(AgeBand::Twenties),
        a if (30.0..40.0).contains(&a) => Some(AgeBand::Thirties),
        a if (40.0..50.0).contains(&a) => Some(AgeBand::Forties),
        a if a >= 50.0 => Some(AgeBand::FiftiesPlus),
        _ => None,
    }
}

/// Height in centimeters. Upper band edges are inclusive (160 cm is "150s").
pub fn height_band(height: f64) -> Option<HeightBand> {
    match height {
        h if h > 0.0 && h < 150.0 => Some(HeightBand::Under150),
        h if (150.0..=160.0).contains(&h) => Some(HeightBand::From150),
        h if h > 160.0 && h <= 170.0 => Some(HeightBand::From160),
        h if h > 170.0 && h <= 180.0 => Some(HeightBand::From170),
        h if h > 180.0 && h <= 190.0 => Some(HeightBand::From180),
        h if h > 190.0 => Some(HeightBand::Over190),
        _ => None,
    }
}

/// Weight in kilograms. Upper band edges are inclusive.
pub fn weight_band(weight: f64) -> Option<WeightBand> {
    match weight {
        w if w > 0.0 && w <= 65.0 => Some(WeightBand::Under65),
        w if w > 65.0 && w <= 80.0 => Some(WeightBand::From65To80),
        w if w > 80.0 && w <= 95.0 => Some(WeightBand::From80To95),
        w if w > 95.0 => Some(WeightBand::Over95),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_bands() {
        assert_eq!(age_band(25.0), Some(AgeBand::Twenties));
        assert_eq!(age_band(39.9), Some(AgeBand::Thirties));
        assert_eq!(age_band(40.0), Some(AgeBand::Forties));
        assert_eq!(age_band(50.0), Some(AgeBand::FiftiesPlus));
        assert_eq!(age_band(55.0), Some(AgeBand::FiftiesPlus));
        assert_eq!(age_band(15.0), None);
        assert_eq!(age_band(f64::NAN), None);
    }

    #[test]
    fn test_height_bands() {
        assert_eq!(height_band(145.0), Some(HeightBand::Under150));
        assert_eq!(height_band(150.0), Some(HeightBand::From150));
        assert_eq!(height_band(160.0), Some(HeightBand::From150));
        assert_eq!(height_band(165.5), Some(HeightBand::From160));
        assert_eq!(height_band(190.0), Some(HeightBand::From180));
        assert_eq!(height_band(201.0), Some(HeightBand::Over190));
        assert_eq!(height_band(0.0), None);
    }

    #[test]
    fn test_weight_bands() {
        assert_eq!(weight_band(65.0), Some(WeightBand::Under65));
        assert_eq!(weight_band(72.0), Some(WeightBand::From65To80));
        assert_eq!(weight_band(95.0), Some(WeightBand::From80To95));
        assert_eq!(weight_band(120.0), Some(WeightBand::Over95));
        assert_eq!(weight_band(-1.0), None);
    }

    #[test]
    fn test_band_labels() {
        assert_eq!(
            serde_json::to_value(AgeBand::FiftiesPlus).unwrap(),
            serde_json::json!("50s plus")
        );
        assert_eq!(
            serde_json::to_value(HeightBand::Over190).unwrap(),
            serde_json::json!("greater than 190 cm")
        );
    }
}
