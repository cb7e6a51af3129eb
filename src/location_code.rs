//! Stable short codes for pump display names.
//!
//! A hand-curated synonym table covers the names operators actually type;
//! everything else goes through [`slugify`]. Both paths are pure, so the same
//! name always maps to the same code.

/// Display-name → code overrides. Keys are compared case-insensitively with
/// whitespace collapsed.
static SYNONYMS: &[(&str, &str)] = &[
    ("rumah pompa pluit", "pluit"),
    ("pompa pluit", "pluit"),
    ("waduk pluit", "pluit"),
    ("pompa waduk pluit barat", "pluitbarat"),
    ("pintu air manggarai", "manggarai"),
    ("pa manggarai", "manggarai"),
    ("pintu air karet", "karet"),
    ("rumah pompa marina ancol", "ancol"),
    ("pompa ancol", "ancol"),
    ("pompa kelapa gading", "kelapagading"),
    ("pompa kali item", "kaliitem"),
];

/// Leading phrases that describe the facility type rather than the place.
static PREFIXES: &[&str] = &["rumah pompa", "pintu air", "pompa", "pa.", "rp.", "pa", "rp"];

/// Words dropped wherever they appear.
static STRIP_WORDS: &[&str] = &["pompa", "rumah", "stasiun", "pos"];

/// Returns the location code for a pump display name.
pub fn location_code(name: &str) -> String {
    let normalized = normalize(name);

    if let Some((_, code)) = SYNONYMS.iter().find(|(alias, _)| *alias == normalized) {
        return code.to_string();
    }

    slugify(&normalized)
}

/// Fallback rule: strip facility prefixes and filler words, then drop every
/// non-alphanumeric character. Falls back to the bare alphanumerics of the
/// input if stripping leaves nothing.
pub fn slugify(name: &str) -> String {
    let normalized = normalize(name);

    let mut rest = normalized.as_str();
    for prefix in PREFIXES {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            // Only strip whole words: "pompa" must not eat "pompanegara".
            if stripped.is_empty() || stripped.starts_with(' ') || prefix.ends_with('.') {
                rest = stripped.trim_start();
                break;
            }
        }
    }

    let slug: String = rest
        .split_whitespace()
        .filter(|w| !STRIP_WORDS.contains(w))
        .flat_map(|w| w.chars())
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if slug.is_empty() {
        normalized.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
    } else {
        slug
    }
}

fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synonym_wins_over_slug() {
        assert_eq!(location_code("Rumah Pompa Pluit"), "pluit");
        assert_eq!(location_code("  WADUK   pluit "), "pluit");
        assert_eq!(location_code("Pintu Air Manggarai"), "manggarai");
    }

    #[test]
    fn test_slug_strips_prefix_and_punctuation() {
        assert_eq!(location_code("Pompa Sunter Utara"), "sunterutara");
        assert_eq!(location_code("PA. Karet-Tengsin (2)"), "karettengsin2");
        assert_eq!(location_code("Rumah Pompa Green Garden"), "greengarden");
    }

    #[test]
    fn test_prefix_only_strips_whole_words() {
        assert_eq!(slugify("Pompanegara"), "pompanegara");
        assert_eq!(slugify("Paseban Pos"), "paseban");
    }

    #[test]
    fn test_degenerate_name_falls_back() {
        assert_eq!(location_code("Pompa"), "pompa");
        assert_eq!(location_code("A"), "a");
    }

    #[test]
    fn test_code_is_stable() {
        let name = "Pompa Kamal Muara";
        assert_eq!(location_code(name), location_code(name));
    }
}
