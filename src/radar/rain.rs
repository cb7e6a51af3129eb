//! Reflectivity → rain rate conversion and intensity classification.

use serde::{Deserialize, Serialize};

/// Rain rate (mm/h) at or above which a pump counts as "it is raining".
///
/// Shared by live alerting and forecast verification so both speak the
/// same definition of rain.
pub const RAIN_THRESHOLD_MM_PER_HOUR: f64 = 2.0;

/// Marshall–Palmer `Z = a·R^b` coefficients.
const MP_A: f64 = 200.0;
const MP_B: f64 = 1.6;

/// Converts reflectivity in dBZ to rain rate in mm/h.
///
/// `Z = 10^(dBZ/10)`, `R = (Z/200)^(1/1.6)`. Non-positive (and NaN) dBZ
/// yields zero.
pub fn rain_rate(dbz: f64) -> f64 {
    if !(dbz > 0.0) {
        return 0.0;
    }
    let z = 10f64.powf(dbz / 10.0);
    (z / MP_A).powf(1.0 / MP_B)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntensityLabel {
    NoRain,
    Light,
    Moderate,
    Heavy,
    VeryHeavy,
}

impl IntensityLabel {
    pub const ALL: [IntensityLabel; 5] = [
        IntensityLabel::NoRain,
        IntensityLabel::Light,
        IntensityLabel::Moderate,
        IntensityLabel::Heavy,
        IntensityLabel::VeryHeavy,
    ];
}

impl std::fmt::Display for IntensityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntensityLabel::NoRain => "no_rain",
            IntensityLabel::Light => "light",
            IntensityLabel::Moderate => "moderate",
            IntensityLabel::Heavy => "heavy",
            IntensityLabel::VeryHeavy => "very_heavy",
        };
        f.write_str(s)
    }
}

/// Lower bounds (mm/h, inclusive) of each rain class above `Light`.
///
/// | Range          | Label     |
/// |----------------|-----------|
/// | `<= 0`         | NoRain    |
/// | `(0, moderate)`| Light     |
/// | `>= moderate`  | Moderate  |
/// | `>= heavy`     | Heavy     |
/// | `>= very_heavy`| VeryHeavy |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityThresholds {
    pub moderate: f64,
    pub heavy: f64,
    pub very_heavy: f64,
}

impl Default for IntensityThresholds {
    fn default() -> Self {
        Self {
            moderate: 5.0,
            heavy: 10.0,
            very_heavy: 20.0,
        }
    }
}

impl IntensityThresholds {
    pub fn classify(&self, mm_per_hour: f64) -> IntensityLabel {
        match mm_per_hour {
            r if r >= self.very_heavy => IntensityLabel::VeryHeavy,
            r if r >= self.heavy => IntensityLabel::Heavy,
            r if r >= self.moderate => IntensityLabel::Moderate,
            r if r > 0.0 => IntensityLabel::Light,
            _ => IntensityLabel::NoRain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_positive_dbz_is_dry() {
        for dbz in [0.0, -0.5, -10.0, -32.0, f64::NAN] {
            assert_eq!(rain_rate(dbz), 0.0);
        }
    }

    #[test]
    fn test_rain_rate_monotonic() {
        let mut prev = 0.0;
        for step in 0..=160 {
            let dbz = step as f64 * 0.5;
            let r = rain_rate(dbz);
            assert!(r >= prev, "rain_rate({dbz}) = {r} < {prev}");
            prev = r;
        }
    }

    #[test]
    fn test_35_dbz_is_moderate() {
        let r = rain_rate(35.0);
        assert!((r - 5.62).abs() < 0.01, "got {r}");
        assert_eq!(IntensityThresholds::default().classify(r), IntensityLabel::Moderate);
    }

    #[test]
    fn test_classify_boundaries() {
        let t = IntensityThresholds::default();
        assert_eq!(t.classify(0.0), IntensityLabel::NoRain);
        assert_eq!(t.classify(0.01), IntensityLabel::Light);
        assert_eq!(t.classify(4.99), IntensityLabel::Light);
        assert_eq!(t.classify(5.0), IntensityLabel::Moderate);
        assert_eq!(t.classify(10.0), IntensityLabel::Heavy);
        assert_eq!(t.classify(19.9), IntensityLabel::Heavy);
        assert_eq!(t.classify(20.0), IntensityLabel::VeryHeavy);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = IntensityThresholds { moderate: 1.0, heavy: 2.0, very_heavy: 3.0 };
        assert_eq!(t.classify(2.5), IntensityLabel::Heavy);
    }
}
