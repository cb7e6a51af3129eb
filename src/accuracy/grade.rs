/// Lower bound (inclusive) of each letter band for a skill score in 0.0–1.0.
///
/// | Range       | Grade |
/// |-------------|-------|
/// | >= 0.95     | A+    |
/// | >= 0.90     | A     |
/// | >= 0.80     | B     |
/// | >= 0.65     | C     |
/// | >= 0.40     | D     |
/// | < 0.40      | F     |
static GRADE_BANDS: &[(f64, &str)] = &[
    (0.95, "A+"),
    (0.90, "A"),
    (0.80, "B"),
    (0.65, "C"),
    (0.40, "D"),
];

/// Converts a forecast skill score into a letter grade.
pub fn grade(score: f64) -> &'static str {
    GRADE_BANDS
        .iter()
        .find(|(min, _)| score >= *min)
        .map(|(_, g)| *g)
        .unwrap_or("F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_boundaries() {
        assert_eq!(grade(1.00), "A+");
        assert_eq!(grade(0.95), "A+");
        assert_eq!(grade(0.94), "A");
        assert_eq!(grade(0.80), "B");
        assert_eq!(grade(0.65), "C");
        assert_eq!(grade(0.40), "D");
        assert_eq!(grade(0.39), "F");
        assert_eq!(grade(f64::NAN), "F");
    }
}
