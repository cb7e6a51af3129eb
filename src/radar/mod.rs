//! Radar reflectivity decoding: color legend lookup, georeferenced
//! sampling, and the dBZ → rain-rate conversion.

pub mod frame;
pub mod legend;
pub mod provider;
pub mod rain;

pub use frame::{Bounds, DecodeError, MAX_SAMPLE_RADIUS, RadarFrame, WindowSample};
pub use legend::{ColorLegend, Rgb, match_reflectivity, match_within};
pub use provider::{HttpRadarProvider, RadarProvider};
pub use rain::{IntensityLabel, IntensityThresholds, RAIN_THRESHOLD_MM_PER_HOUR, rain_rate};
