//! A captured radar raster with its georeferencing.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::legend::{ColorLegend, Rgb, match_within};
use crate::geo::GeoPoint;

/// Largest sampling radius in pixels (a 51×51 window).
pub const MAX_SAMPLE_RADIUS: usize = 25;

/// Geographic extent of a radar image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl Bounds {
    pub fn contains(&self, p: GeoPoint) -> bool {
        p.lat >= self.lat_min && p.lat <= self.lat_max && p.lng >= self.lon_min && p.lng <= self.lon_max
    }

    fn is_degenerate(&self) -> bool {
        !(self.lat_max > self.lat_min && self.lon_max > self.lon_min)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("point ({lat}, {lng}) lies outside the radar frame")]
    OutOfBounds { lat: f64, lng: f64 },
    #[error("frame bounds are degenerate")]
    DegenerateBounds,
    #[error("pixel ({x}, {y}) could not be read")]
    UnreadablePixel { x: usize, y: usize },
}

/// Result of reading one sampling window.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSample {
    /// Mean dBZ over legend-matchable pixels, 0 when none matched.
    pub dbz: f64,
    pub valid_pixels: usize,
    pub window_pixels: usize,
}

impl WindowSample {
    pub fn confidence(&self) -> f64 {
        if self.window_pixels == 0 {
            0.0
        } else {
            self.valid_pixels as f64 / self.window_pixels as f64
        }
    }
}

/// Row-major RGB raster plus everything needed to interpret it.
#[derive(Debug, Clone)]
pub struct RadarFrame {
    pub width: usize,
    pub height: usize,
    pixels: Vec<Rgb>,
    pub bounds: Bounds,
    pub legend: ColorLegend,
    pub station: String,
    pub captured_at: DateTime<Utc>,
}

impl RadarFrame {
    /// Wraps a raw pixel buffer. A buffer shorter than `width * height` is
    /// accepted; reads past its end surface as [`DecodeError::UnreadablePixel`].
    pub fn new(
        width: usize,
        height: usize,
        pixels: Vec<Rgb>,
        bounds: Bounds,
        legend: ColorLegend,
        station: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            width,
            height,
            pixels,
            bounds,
            legend,
            station: station.into(),
            captured_at,
        }
    }

    /// Decodes an encoded image (PNG, JPEG, GIF) into a frame.
    pub fn from_image_bytes(
        bytes: &[u8],
        bounds: Bounds,
        legend: ColorLegend,
        station: impl Into<String>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self> {
        let img = image::load_from_memory(bytes)
            .context("radar image could not be decoded")?
            .to_rgb8();
        let (width, height) = (img.width() as usize, img.height() as usize);
        let pixels = img.pixels().map(|p| Rgb(p[0], p[1], p[2])).collect();

        Ok(Self::new(width, height, pixels, bounds, legend, station, captured_at))
    }

    /// Linear projection of a coordinate onto pixel space. Row 0 is `lat_max`.
    pub fn project(&self, p: GeoPoint) -> Result<(usize, usize), DecodeError> {
        if self.bounds.is_degenerate() || self.width == 0 || self.height == 0 {
            return Err(DecodeError::DegenerateBounds);
        }
        if !p.lat.is_finite() || !p.lng.is_finite() || !self.bounds.contains(p) {
            return Err(DecodeError::OutOfBounds { lat: p.lat, lng: p.lng });
        }

        let fx = (p.lng - self.bounds.lon_min) / (self.bounds.lon_max - self.bounds.lon_min);
        let fy = (self.bounds.lat_max - p.lat) / (self.bounds.lat_max - self.bounds.lat_min);

        // The far edge maps to `width`/`height`; clamp it onto the last pixel.
        let x = ((fx * self.width as f64) as usize).min(self.width - 1);
        let y = ((fy * self.height as f64) as usize).min(self.height - 1);
        Ok((x, y))
    }

    pub fn pixel(&self, x: usize, y: usize) -> Result<Rgb, DecodeError> {
        if x >= self.width || y >= self.height {
            return Err(DecodeError::UnreadablePixel { x, y });
        }
        self.pixels
            .get(y * self.width + x)
            .copied()
            .ok_or(DecodeError::UnreadablePixel { x, y })
    }

    /// Reads the `(2r+1)²` window centred on `p`, with `r` capped at
    /// [`MAX_SAMPLE_RADIUS`].
    ///
    /// Window cells that fall off the raster count against confidence but
    /// are not errors. A centre pixel that cannot be read is.
    pub fn sample(
        &self,
        p: GeoPoint,
        radius: usize,
        max_color_distance: f64,
    ) -> Result<WindowSample, DecodeError> {
        let (cx, cy) = self.project(p)?;
        self.pixel(cx, cy)?;

        let radius = radius.min(MAX_SAMPLE_RADIUS);
        let side = 2 * radius + 1;
        let mut valid = 0usize;
        let mut dbz_sum = 0.0;

        for y in cy.saturating_sub(radius)..=(cy + radius) {
            for x in cx.saturating_sub(radius)..=(cx + radius) {
                let Ok(pixel) = self.pixel(x, y) else {
                    continue;
                };
                if let Some(level) = match_within(pixel, &self.legend, max_color_distance) {
                    valid += 1;
                    dbz_sum += level;
                }
            }
        }

        Ok(WindowSample {
            dbz: if valid == 0 { 0.0 } else { dbz_sum / valid as f64 },
            valid_pixels: valid,
            window_pixels: side * side,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: Rgb = Rgb(128, 128, 128);

    fn frame(width: usize, height: usize, fill: Rgb) -> RadarFrame {
        RadarFrame::new(
            width,
            height,
            vec![fill; width * height],
            Bounds { lat_min: -7.0, lat_max: -6.0, lon_min: 106.0, lon_max: 107.0 },
            ColorLegend::standard(),
            "JAK",
            Utc::now(),
        )
    }

    #[test]
    fn test_huge_radius_is_capped() {
        let f = frame(10, 10, Rgb(255, 255, 0));
        let w = f.sample(GeoPoint::new(-6.5, 106.5), usize::MAX, 40.0).unwrap();
        let side = 2 * MAX_SAMPLE_RADIUS + 1;
        assert_eq!(w.window_pixels, side * side);
        assert_eq!(w.valid_pixels, 100);
    }

    #[test]
    fn test_projection_corners() {
        let f = frame(100, 50, BG);
        assert_eq!(f.project(GeoPoint::new(-6.0, 106.0)).unwrap(), (0, 0));
        assert_eq!(f.project(GeoPoint::new(-7.0, 107.0)).unwrap(), (99, 49));
        assert_eq!(f.project(GeoPoint::new(-6.5, 106.5)).unwrap(), (50, 25));
    }

    #[test]
    fn test_projection_out_of_bounds() {
        let f = frame(10, 10, BG);
        assert!(matches!(
            f.project(GeoPoint::new(-5.9, 106.5)),
            Err(DecodeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_sample_full_window() {
        let f = frame(20, 20, Rgb(255, 255, 0));
        let s = f.sample(GeoPoint::new(-6.5, 106.5), 2, 40.0).unwrap();
        assert_eq!(s.dbz, 35.0);
        assert_eq!(s.valid_pixels, 25);
        assert_eq!(s.confidence(), 1.0);
    }

    #[test]
    fn test_sample_background_has_zero_confidence() {
        let f = frame(20, 20, BG);
        let s = f.sample(GeoPoint::new(-6.5, 106.5), 1, 40.0).unwrap();
        assert_eq!(s.dbz, 0.0);
        assert_eq!(s.confidence(), 0.0);
    }

    #[test]
    fn test_sample_corner_window_is_clipped() {
        let f = frame(20, 20, Rgb(255, 0, 0));
        let s = f.sample(GeoPoint::new(-6.0, 106.0), 1, 40.0).unwrap();
        assert_eq!(s.valid_pixels, 4);
        assert_eq!(s.window_pixels, 9);
    }

    #[test]
    fn test_truncated_buffer_is_unreadable() {
        let mut f = frame(10, 10, BG);
        f.pixels.truncate(5);
        assert!(matches!(
            f.sample(GeoPoint::new(-6.9, 106.9), 1, 40.0),
            Err(DecodeError::UnreadablePixel { .. })
        ));
    }

    #[test]
    fn test_from_png_bytes() {
        let mut img = image::RgbImage::new(4, 4);
        for p in img.pixels_mut() {
            *p = image::Rgb([255, 0, 0]);
        }
        let mut buf = std::io::Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        let f = RadarFrame::from_image_bytes(
            buf.get_ref(),
            Bounds { lat_min: -7.0, lat_max: -6.0, lon_min: 106.0, lon_max: 107.0 },
            ColorLegend::standard(),
            "JAK",
            Utc::now(),
        )
        .unwrap();
        assert_eq!((f.width, f.height), (4, 4));
        assert_eq!(f.pixel(3, 3).unwrap(), Rgb(255, 0, 0));
    }
}
