//! The fixed set of pump stations the service watches.
//!
//! [`BUILTIN_ROSTER`] is the default source of truth. A deployment can swap
//! it for a JSON file with [`PumpRoster::load`]:
//! ```json
//! [
//!   { "name": "Rumah Pompa Pluit", "lat": -6.1175, "lng": 106.7976 },
//!   { "name": "Pompa Sunter", "lat": -6.1383, "lng": 106.8713 }
//! ]
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::geo::{GeoPoint, Located};

/// A named pump station. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PumpLocation {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Located for PumpLocation {
    fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Built-in roster of North/Central Jakarta pump houses and flood gates.
pub static BUILTIN_ROSTER: &[(&str, f64, f64)] = &[
    ("Rumah Pompa Pluit", -6.1175, 106.7976),
    ("Pompa Waduk Pluit Barat", -6.1130, 106.7905),
    ("Pompa Sunter Utara", -6.1383, 106.8713),
    ("Pompa Sunter Selatan", -6.1520, 106.8650),
    ("Pompa Kali Item", -6.1480, 106.8530),
    ("Pintu Air Manggarai", -6.2087, 106.8497),
    ("Pintu Air Karet", -6.2035, 106.8155),
    ("Pompa Cideng", -6.1750, 106.8110),
    ("Rumah Pompa Marina Ancol", -6.1228, 106.8380),
    ("Pompa Kamal Muara", -6.1010, 106.7310),
    ("Pompa Green Garden", -6.1612, 106.7636),
    ("Pompa Kelapa Gading", -6.1570, 106.9050),
];

/// Immutable list of pumps with unique names.
#[derive(Debug, Clone)]
pub struct PumpRoster {
    pumps: Vec<PumpLocation>,
}

impl PumpRoster {
    /// Validates and wraps a list of pumps. Names must be unique and
    /// coordinates usable.
    pub fn new(pumps: Vec<PumpLocation>) -> Result<Self> {
        let mut seen = HashSet::new();
        for pump in &pumps {
            if !seen.insert(pump.name.as_str()) {
                bail!("duplicate pump name '{}' in roster", pump.name);
            }
            if !pump.position().is_valid() {
                bail!("pump '{}' has unusable coordinates", pump.name);
            }
        }
        Ok(Self { pumps })
    }

    pub fn builtin() -> Self {
        Self {
            pumps: BUILTIN_ROSTER
                .iter()
                .map(|(name, lat, lng)| PumpLocation {
                    name: name.to_string(),
                    lat: *lat,
                    lng: *lng,
                })
                .collect(),
        }
    }

    /// Loads a roster from a JSON array on disk.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pump roster '{path}'"))?;
        let pumps: Vec<PumpLocation> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse pump roster '{path}'"))?;
        Self::new(pumps)
    }

    pub fn pumps(&self) -> &[PumpLocation] {
        &self.pumps
    }

    pub fn get(&self, name: &str) -> Option<&PumpLocation> {
        self.pumps.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_roster_is_valid() {
        let roster = PumpRoster::builtin();
        assert!(!roster.is_empty());
        PumpRoster::new(roster.pumps().to_vec()).unwrap();
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let pump = PumpLocation { name: "A".into(), lat: -6.2, lng: 106.8 };
        assert!(PumpRoster::new(vec![pump.clone(), pump]).is_err());
    }

    #[test]
    fn test_zero_coordinates_rejected() {
        let pump = PumpLocation { name: "A".into(), lat: 0.0, lng: 0.0 };
        assert!(PumpRoster::new(vec![pump]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, r#"[{"name":"A","lat":-6.2,"lng":106.8}]"#).unwrap();

        let roster = PumpRoster::load(path.to_str().unwrap()).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("A").unwrap().lng, 106.8);
    }
}
