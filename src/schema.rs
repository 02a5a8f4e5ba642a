//! Positional schema tables
//!
//! Every block kind maps logical fields to offsets relative to a slot anchor.
//! Slots repeat down the sheet at a fixed stride. Tables are versioned, and
//! both synthesis and extraction always name the version they use.

use std::fmt;

use crate::model::Subsystem;
use crate::workbook::CellRef;

/// Layout revision of the block templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SchemaVersion {
    /// Original layout: no item numbers, lighting or wall cladding
    V2024_1,
    V2025_1,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V2025_1;
    /// Assumed when a document carries no recognisable version marker
    pub const LEGACY: SchemaVersion = SchemaVersion::V2024_1;

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::V2024_1 => "2024.1",
            SchemaVersion::V2025_1 => "2025.1",
        }
    }

    pub fn parse(marker: &str) -> Option<Self> {
        match marker.trim() {
            "2024.1" => Some(SchemaVersion::V2024_1),
            "2025.1" => Some(SchemaVersion::V2025_1),
            _ => None,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Block kinds in canonical priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKind {
    Canopy,
    FireSuppression,
    UvBaseline,
    UvAlternate,
    UvFiltration,
    SupplyDiffusion,
    AirRecovery,
    VentilatedCeiling,
    AlternateFiltration,
}

impl BlockKind {
    pub const ALL: [BlockKind; 9] = [
        BlockKind::Canopy,
        BlockKind::FireSuppression,
        BlockKind::UvBaseline,
        BlockKind::UvAlternate,
        BlockKind::UvFiltration,
        BlockKind::SupplyDiffusion,
        BlockKind::AirRecovery,
        BlockKind::VentilatedCeiling,
        BlockKind::AlternateFiltration,
    ];

    /// Label used in sheet names and catalog files
    pub fn label(&self) -> &'static str {
        match self {
            BlockKind::Canopy => "CANOPY",
            BlockKind::FireSuppression => "FIRE SUPP",
            BlockKind::UvBaseline => "CANOPY (STD)",
            BlockKind::UvAlternate => "CANOPY (UV)",
            BlockKind::UvFiltration => "EBOX",
            BlockKind::SupplyDiffusion => "SDU",
            BlockKind::AirRecovery => "RECOAIR",
            BlockKind::VentilatedCeiling => "VENT CLG",
            BlockKind::AlternateFiltration => "REACTAWAY",
        }
    }

    pub fn from_label(label: &str) -> Option<BlockKind> {
        let wanted = label.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(wanted))
    }

    pub fn priority(&self) -> usize {
        Self::ALL
            .iter()
            .position(|k| k == self)
            .unwrap_or(Self::ALL.len())
    }

    /// Kinds that hold the UV comparison pair and stay out of the main totals
    pub fn is_delta(&self) -> bool {
        matches!(self, BlockKind::UvBaseline | BlockKind::UvAlternate)
    }

    pub fn from_subsystem(subsystem: Subsystem) -> BlockKind {
        match subsystem {
            Subsystem::UvFiltration => BlockKind::UvFiltration,
            Subsystem::SupplyDiffusion => BlockKind::SupplyDiffusion,
            Subsystem::AirRecovery => BlockKind::AirRecovery,
            Subsystem::VentilatedCeiling => BlockKind::VentilatedCeiling,
            Subsystem::AlternateFiltration => BlockKind::AlternateFiltration,
        }
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        match self {
            BlockKind::UvFiltration => Some(Subsystem::UvFiltration),
            BlockKind::SupplyDiffusion => Some(Subsystem::SupplyDiffusion),
            BlockKind::AirRecovery => Some(Subsystem::AirRecovery),
            BlockKind::VentilatedCeiling => Some(Subsystem::VentilatedCeiling),
            BlockKind::AlternateFiltration => Some(Subsystem::AlternateFiltration),
            _ => None,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Logical fields stored in a block slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Position,
    Reference,
    Configuration,
    Model,
    Width,
    Length,
    Height,
    Sections,
    Lighting,
    SuppressionSystem,
    TankQuantity,
    CladdingKind,
    CladdingSize,
    CladdingPositions,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Position => "position",
            Field::Reference => "reference",
            Field::Configuration => "configuration",
            Field::Model => "model",
            Field::Width => "width",
            Field::Length => "length",
            Field::Height => "height",
            Field::Sections => "sections",
            Field::Lighting => "lighting",
            Field::SuppressionSystem => "suppression system",
            Field::TankQuantity => "tank quantity",
            Field::CladdingKind => "wall cladding",
            Field::CladdingSize => "wall cladding size",
            Field::CladdingPositions => "wall cladding position",
        };
        write!(f, "{}", name)
    }
}

/// Row/column displacement from a slot anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub rows: i32,
    pub cols: i32,
}

const fn at(rows: i32, cols: i32) -> Offset {
    Offset { rows, cols }
}

/// First slot anchor (`B14`)
pub const FIRST_ANCHOR: CellRef = CellRef::new(14, 2);
const STRIDE: u32 = 17;

const REFERENCE: (Field, Offset) = (Field::Reference, at(-2, 0));
const POSITION: (Field, Offset) = (Field::Position, at(-2, -1));

const DIMENSIONS: [(Field, Offset); 6] = [
    (Field::Configuration, at(0, 1)),
    (Field::Model, at(0, 2)),
    (Field::Width, at(0, 3)),
    (Field::Length, at(0, 4)),
    (Field::Height, at(0, 5)),
    (Field::Sections, at(0, 6)),
];

const CANOPY_EXTRAS: [(Field, Offset); 4] = [
    (Field::Lighting, at(1, 1)),
    (Field::CladdingKind, at(5, 1)),
    (Field::CladdingSize, at(5, 14)),
    (Field::CladdingPositions, at(5, 15)),
];

/// Field offsets for one slot of a block kind
pub fn offsets_for(kind: BlockKind, version: SchemaVersion) -> Vec<(Field, Offset)> {
    let current = version >= SchemaVersion::V2025_1;
    let mut fields = Vec::new();
    match kind {
        BlockKind::Canopy | BlockKind::UvBaseline | BlockKind::UvAlternate => {
            if current {
                fields.push(POSITION);
            }
            fields.push(REFERENCE);
            fields.extend(DIMENSIONS);
            if current && kind == BlockKind::Canopy {
                fields.extend(CANOPY_EXTRAS);
            }
        }
        BlockKind::FireSuppression => {
            if current {
                fields.push(POSITION);
            }
            fields.push(REFERENCE);
            if current {
                fields.push((Field::SuppressionSystem, at(2, 1)));
            }
            fields.push((Field::TankQuantity, at(3, 1)));
        }
        _ => {}
    }
    fields
}

pub fn repeat_stride(_kind: BlockKind, _version: SchemaVersion) -> u32 {
    STRIDE
}

/// Anchor cell of a slot
pub fn anchor(kind: BlockKind, version: SchemaVersion, slot: u32) -> CellRef {
    CellRef::new(
        FIRST_ANCHOR.row + slot * repeat_stride(kind, version),
        FIRST_ANCHOR.col,
    )
}

/// Absolute cell of a field in a slot, if the kind carries that field
pub fn field_cell(
    kind: BlockKind,
    version: SchemaVersion,
    slot: u32,
    field: Field,
) -> Option<CellRef> {
    let base = anchor(kind, version, slot);
    offsets_for(kind, version)
        .into_iter()
        .find(|(f, _)| *f == field)
        .and_then(|(_, o)| base.offset(o.rows, o.cols))
}

/// Where a block keeps its own price and cost subtotals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subtotals {
    pub price: CellRef,
    pub cost: CellRef,
}

impl Default for Subtotals {
    fn default() -> Self {
        Self {
            price: header::SUBTOTAL_PRICE,
            cost: header::SUBTOTAL_COST,
        }
    }
}

/// Fixed header cells shared by every branch block and the summary page
pub mod header {
    use crate::workbook::CellRef;

    pub const TITLE: CellRef = CellRef::new(1, 2);
    pub const NUMBER: CellRef = CellRef::new(3, 3);
    pub const CUSTOMER: CellRef = CellRef::new(5, 3);
    pub const INITIALS: CellRef = CellRef::new(7, 3);
    pub const NAME: CellRef = CellRef::new(3, 7);
    pub const LOCATION: CellRef = CellRef::new(5, 7);
    pub const DATE: CellRef = CellRef::new(7, 7);
    pub const REVISION: CellRef = CellRef::new(7, 10);
    pub const SUBTOTAL_COST: CellRef = CellRef::new(9, 11);
    pub const SUBTOTAL_PRICE: CellRef = CellRef::new(9, 14);
    /// Summary page only: UV extra-over, shown but not included
    pub const UV_EXTRA_OVER_COST: CellRef = CellRef::new(10, 11);
    pub const UV_EXTRA_OVER_PRICE: CellRef = CellRef::new(10, 14);
}

/// Hidden project metadata page
pub mod project_data {
    use crate::workbook::CellRef;

    pub const SHEET: &str = "ProjectData";
    pub const COMPANY: CellRef = CellRef::new(1, 2);
    pub const ESTIMATOR: CellRef = CellRef::new(2, 2);
    pub const VERSION: CellRef = CellRef::new(8, 2);
}

/// Sentinel texts left in template slots that were never filled
pub const PLACEHOLDER_REFERENCE: &str = "ITEM";
pub const PLACEHOLDER_MODEL: &str = "CANOPY TYPE";

const UV_PAIRS: [(&str, &str); 4] = [
    ("KVF", "UVF"),
    ("KVI", "UVI"),
    ("KSR", "USR"),
    ("KWF", "UWF"),
];

/// Baseline and alternate model codes for a participating model, if any.
/// Accepts either side of the mapping, case-insensitively.
pub fn uv_pair(model: &str) -> Option<(&'static str, &'static str)> {
    let wanted = model.trim();
    UV_PAIRS
        .into_iter()
        .find(|(base, alt)| base.eq_ignore_ascii_case(wanted) || alt.eq_ignore_ascii_case(wanted))
}

/// Compute Levenshtein edit distance between two strings
pub(crate) fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (m, n) = (a_chars.len(), b_chars.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut prev: Vec<usize> = (0..=n).collect();
    let mut row = vec![0usize; n + 1];
    for i in 1..=m {
        row[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            row[j] = (prev[j] + 1).min(row[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[n]
}

/// Known kind labels close to an unrecognised one
pub fn similar_labels(target: &str, max_distance: usize) -> Vec<String> {
    let upper = target.trim().to_ascii_uppercase();
    let mut candidates: Vec<(&str, usize)> = BlockKind::ALL
        .iter()
        .map(|k| (k.label(), levenshtein_distance(k.label(), &upper)))
        .filter(|(_, d)| *d > 0 && *d <= max_distance)
        .collect();
    candidates.sort_by_key(|(_, d)| *d);
    candidates
        .into_iter()
        .take(3)
        .map(|(label, _)| label.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: BlockKind, version: SchemaVersion, slot: u32, field: Field) -> String {
        field_cell(kind, version, slot, field).unwrap().to_string()
    }

    #[test]
    fn test_slot_zero_cells() {
        let v = SchemaVersion::CURRENT;
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Reference), "B12");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Position), "A12");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Model), "D14");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Sections), "H14");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Lighting), "C15");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::CladdingSize), "P19");
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::CladdingPositions), "Q19");
        assert_eq!(cell(BlockKind::FireSuppression, v, 0, Field::SuppressionSystem), "C16");
        assert_eq!(cell(BlockKind::FireSuppression, v, 0, Field::TankQuantity), "C17");
        let (kind, legacy) = (BlockKind::FireSuppression, SchemaVersion::LEGACY);
        let system = field_cell(kind, legacy, 0, Field::SuppressionSystem);
        assert!(system.is_none());
    }

    #[test]
    fn test_slots_repeat_at_stride() {
        let v = SchemaVersion::CURRENT;
        assert_eq!(cell(BlockKind::UvAlternate, v, 2, Field::Reference), "B46");
        assert_eq!(cell(BlockKind::UvAlternate, v, 2, Field::Width), "E48");
    }

    #[test]
    fn test_legacy_lacks_newer_fields() {
        let v = SchemaVersion::LEGACY;
        assert!(field_cell(BlockKind::Canopy, v, 0, Field::Lighting).is_none());
        assert!(field_cell(BlockKind::Canopy, v, 0, Field::Position).is_none());
        assert_eq!(cell(BlockKind::Canopy, v, 0, Field::Width), "E14");
    }

    #[test]
    fn test_subsystem_blocks_have_no_slot_fields() {
        assert!(offsets_for(BlockKind::AirRecovery, SchemaVersion::CURRENT).is_empty());
    }

    #[test]
    fn test_kind_labels_round_trip() {
        for kind in BlockKind::ALL {
            assert_eq!(BlockKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(BlockKind::from_label("fire supp"), Some(BlockKind::FireSuppression));
    }

    #[test]
    fn test_similar_labels() {
        assert_eq!(similar_labels("CANOPPY", 2), vec!["CANOPY".to_string()]);
        assert!(similar_labels("KITCHEN SINK", 2).is_empty());
    }

    #[test]
    fn test_uv_pair_either_side() {
        assert_eq!(uv_pair("kvf"), Some(("KVF", "UVF")));
        assert_eq!(uv_pair("UVI"), Some(("KVI", "UVI")));
        assert_eq!(uv_pair("CMWF"), None);
    }

    #[test]
    fn test_version_markers() {
        assert_eq!(SchemaVersion::parse(" 2025.1 "), Some(SchemaVersion::V2025_1));
        assert_eq!(SchemaVersion::parse("2023.9"), None);
        assert_eq!(SchemaVersion::default().as_str(), "2025.1");
    }
}
