//! Configuration for document synthesis

use crate::palette::Palette;
use crate::schema::SchemaVersion;

/// Configuration options for synthesis
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Schema version written into the document
    pub version: SchemaVersion,

    /// Tab colors cycled across hierarchy branches
    pub palette: Palette,

    /// Delete catalog blocks that were never allocated
    pub prune_unused: bool,

    /// Compute and cache every formula result before returning
    pub recalculate: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            version: SchemaVersion::CURRENT,
            palette: Palette::default(),
            prune_unused: true,
            recalculate: true,
        }
    }
}

impl SynthesisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_palette(mut self, palette: Palette) -> Self {
        self.palette = palette;
        self
    }

    /// Keep unallocated catalog blocks (hidden) in the output
    pub fn with_prune_unused(mut self, prune: bool) -> Self {
        self.prune_unused = prune;
        self
    }

    pub fn with_recalculate(mut self, recalculate: bool) -> Self {
        self.recalculate = recalculate;
        self
    }
}
