//! Reflectivity color legend and nearest-color lookup.

use serde::{Deserialize, Serialize};

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    /// Squared Euclidean distance in RGB space.
    pub fn distance_sq(&self, other: &Rgb) -> u32 {
        let dr = self.0 as i32 - other.0 as i32;
        let dg = self.1 as i32 - other.1 as i32;
        let db = self.2 as i32 - other.2 as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LegendError {
    #[error("legend has {levels} levels but {colors} colors")]
    LengthMismatch { levels: usize, colors: usize },
    #[error("legend is empty")]
    Empty,
    #[error("legend levels must be strictly increasing (at index {0})")]
    NotIncreasing(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LegendEntry {
    pub level: f64,
    pub color: Rgb,
}

/// Ordered `(dBZ level, color)` pairs, strictly increasing by level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLegend", into = "RawLegend")]
pub struct ColorLegend {
    entries: Vec<LegendEntry>,
}

/// Wire shape: parallel `levels` / `colors` arrays, as radar providers ship them.
#[derive(Serialize, Deserialize)]
struct RawLegend {
    levels: Vec<f64>,
    colors: Vec<Rgb>,
}

impl TryFrom<RawLegend> for ColorLegend {
    type Error = LegendError;

    fn try_from(raw: RawLegend) -> Result<Self, Self::Error> {
        ColorLegend::new(raw.levels, raw.colors)
    }
}

impl From<ColorLegend> for RawLegend {
    fn from(legend: ColorLegend) -> Self {
        RawLegend {
            levels: legend.entries.iter().map(|e| e.level).collect(),
            colors: legend.entries.iter().map(|e| e.color).collect(),
        }
    }
}

impl ColorLegend {
    pub fn new(levels: Vec<f64>, colors: Vec<Rgb>) -> Result<Self, LegendError> {
        if levels.len() != colors.len() {
            return Err(LegendError::LengthMismatch {
                levels: levels.len(),
                colors: colors.len(),
            });
        }
        if levels.is_empty() {
            return Err(LegendError::Empty);
        }
        if let Some(i) = levels.windows(2).position(|w| !(w[0] < w[1])) {
            return Err(LegendError::NotIncreasing(i + 1));
        }

        Ok(Self {
            entries: levels
                .into_iter()
                .zip(colors)
                .map(|(level, color)| LegendEntry { level, color })
                .collect(),
        })
    }

    /// The conventional 5-75 dBZ radar palette in 5 dBZ steps.
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_PALETTE
                .iter()
                .map(|&(level, (r, g, b))| LegendEntry { level, color: Rgb(r, g, b) })
                .collect(),
        }
    }

    pub fn entries(&self) -> &[LegendEntry] {
        &self.entries
    }

    /// Closest legend entry to `pixel` and its squared color distance.
    /// On ties the entry that comes first (lowest level) wins.
    fn closest(&self, pixel: Rgb) -> (&LegendEntry, u32) {
        let mut best = (&self.entries[0], self.entries[0].color.distance_sq(&pixel));
        for entry in &self.entries[1..] {
            let d = entry.color.distance_sq(&pixel);
            if d < best.1 {
                best = (entry, d);
            }
        }
        best
    }
}

static STANDARD_PALETTE: &[(f64, (u8, u8, u8))] = &[
    (5.0, (0, 236, 236)),
    (10.0, (1, 160, 246)),
    (15.0, (0, 0, 246)),
    (20.0, (0, 255, 0)),
    (25.0, (0, 200, 0)),
    (30.0, (0, 144, 0)),
    (35.0, (255, 255, 0)),
    (40.0, (231, 192, 0)),
    (45.0, (255, 144, 0)),
    (50.0, (255, 0, 0)),
    (55.0, (214, 0, 0)),
    (60.0, (192, 0, 0)),
    (65.0, (255, 0, 255)),
    (70.0, (153, 85, 201)),
    (75.0, (235, 235, 235)),
];

/// Returns the dBZ level whose legend color is nearest to `pixel`.
pub fn match_reflectivity(pixel: Rgb, legend: &ColorLegend) -> f64 {
    legend.closest(pixel).0.level
}

/// Like [`match_reflectivity`] but treats pixels farther than `max_distance`
/// from every legend color as background (map tiles, labels, coastline).
pub fn match_within(pixel: Rgb, legend: &ColorLegend, max_distance: f64) -> Option<f64> {
    let (entry, d_sq) = legend.closest(pixel);
    ((d_sq as f64).sqrt() <= max_distance).then_some(entry.level)
}
