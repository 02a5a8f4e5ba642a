//! Tab color palette for hierarchy branches
//!
//! Branches are colored by their area index, cycling through the palette.
//! Palettes load from TOML; the built-in one is used when none is given.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading or parsing palettes
#[derive(Error, Debug)]
pub enum PaletteError {
    #[error("Failed to read palette file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse palette TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("palette has no colors")]
    Empty,
    #[error("invalid ARGB color '{0}' (expected 8 hex digits)")]
    InvalidColor(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    pub name: Option<String>,
    /// ARGB hex colors, e.g. `FF92D050`
    pub colors: Vec<String>,
}

#[derive(Deserialize)]
struct TomlPalette {
    metadata: Option<TomlMetadata>,
    colors: Vec<String>,
}

#[derive(Deserialize)]
struct TomlMetadata {
    name: Option<String>,
}

const DEFAULT_PALETTE: &str = r##"
colors = [
    "FF92D050", # green
    "FF00B0F0", # light blue
    "FFFF9900", # orange
    "FFFF00FF", # magenta
    "FF7030A0", # purple
    "FFFF0000", # red
    "FF00FF00", # lime
    "FF0070C0", # blue
    "FFFFC000", # gold
    "FF00FFFF", # cyan
]

[metadata]
name = "branch tabs"
"##;

impl Palette {
    pub fn from_file(path: &Path) -> Result<Self, PaletteError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, PaletteError> {
        let parsed: TomlPalette = toml::from_str(content)?;
        if parsed.colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        let mut colors = Vec::with_capacity(parsed.colors.len());
        for color in parsed.colors {
            let normalized = color.trim().trim_start_matches('#').to_ascii_uppercase();
            if normalized.len() != 8 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PaletteError::InvalidColor(color));
            }
            colors.push(normalized);
        }
        Ok(Palette {
            name: parsed.metadata.and_then(|m| m.name),
            colors,
        })
    }

    /// Color for a 1-based area index
    pub fn color_for(&self, area_index: usize) -> &str {
        &self.colors[area_index.saturating_sub(1) % self.colors.len()]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::from_str(DEFAULT_PALETTE).expect("Default palette should be valid TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_palette_cycles() {
        let palette = Palette::default();
        assert_eq!(palette.colors.len(), 10);
        assert_eq!(palette.color_for(1), "FF92D050");
        assert_eq!(palette.color_for(11), "FF92D050");
        assert_eq!(palette.color_for(2), "FF00B0F0");
    }

    #[test]
    fn test_custom_palette_normalizes() {
        let palette = Palette::from_str("colors = [\"#ff112233\"]").unwrap();
        assert_eq!(palette.color_for(5), "FF112233");
        assert_eq!(palette.name, None);
    }

    #[test]
    fn test_rejects_bad_colors() {
        assert!(matches!(
            Palette::from_str("colors = [\"red\"]"),
            Err(PaletteError::InvalidColor(_))
        ));
        assert!(matches!(
            Palette::from_str("colors = []"),
            Err(PaletteError::Empty)
        ));
    }
}
