//! Block catalog: pre-authored template blocks per kind
//!
//! The catalog is immutable configuration. Each kind declares how many copies
//! a document may use, how many slots one block holds, and the cells every
//! copy starts with. `slot_cells` are written once per slot, shifted down by
//! the stride, so the per-slot pricing formulas follow their data.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::error::FormulaError;
use crate::formula;
use crate::schema::{self, BlockKind, SchemaVersion, Subtotals};
use crate::workbook::{Cell, CellRef, Sheet};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse catalog TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("unknown block kind '{label}'{}", format_suggestions(.suggestions))]
    UnknownKind {
        label: String,
        suggestions: Vec<String>,
    },

    #[error("block kind {kind} is declared twice")]
    DuplicateKind { kind: BlockKind },

    #[error("invalid cell address '{address}' in {kind} template")]
    InvalidCell { kind: BlockKind, address: String },

    #[error("invalid formula in {kind} template cell {address}: {source}")]
    InvalidFormula {
        kind: BlockKind,
        address: String,
        formula: String,
        source: FormulaError,
    },

    #[error("{kind} template must declare at least one slot")]
    NoSlots { kind: BlockKind },

    #[error("{kind} template stride {stride} does not match schema {version} stride {expected}")]
    IncompatibleTemplate {
        kind: BlockKind,
        version: SchemaVersion,
        stride: u32,
        expected: u32,
    },

    #[error("catalog exhausted for {kind} (capacity {capacity})")]
    Exhausted { kind: BlockKind, capacity: usize },
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean {}?)", suggestions.join(", "))
    }
}

impl CatalogError {
    pub fn unknown_kind(label: impl Into<String>) -> Self {
        let label = label.into();
        let suggestions = schema::similar_labels(&label, 2);
        Self::UnknownKind { label, suggestions }
    }

    pub fn exhausted(kind: BlockKind, capacity: usize) -> Self {
        Self::Exhausted { kind, capacity }
    }

    pub fn suggestions(&self) -> Option<&[String]> {
        match self {
            Self::UnknownKind { suggestions, .. } => Some(suggestions),
            _ => None,
        }
    }
}

/// One kind's template
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    pub kind: BlockKind,
    /// Number of copies available to one document
    pub capacity: usize,
    pub slots: u32,
    pub stride: u32,
    /// Cells the aggregation and delta pages read this kind's totals from
    pub subtotals: Subtotals,
    /// Fully expanded starting cells, slots included
    cells: BTreeMap<CellRef, Cell>,
}

impl BlockTemplate {
    /// A fresh copy of the template under the given sheet name
    pub fn instantiate(&self, name: impl Into<String>) -> Sheet {
        let mut sheet = Sheet::new(name);
        sheet.cells = self.cells.clone();
        sheet
    }

    pub fn cells(&self) -> &BTreeMap<CellRef, Cell> {
        &self.cells
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub name: Option<String>,
    templates: Vec<BlockTemplate>,
}

#[derive(Deserialize)]
struct TomlCatalog {
    metadata: Option<TomlMetadata>,
    #[serde(default)]
    block: Vec<TomlBlock>,
}

#[derive(Deserialize)]
struct TomlMetadata {
    name: Option<String>,
}

#[derive(Deserialize)]
struct TomlBlock {
    kind: String,
    capacity: usize,
    #[serde(default = "default_slots")]
    slots: u32,
    #[serde(default = "default_stride")]
    stride: u32,
    subtotal_price: Option<String>,
    subtotal_cost: Option<String>,
    #[serde(default)]
    cells: BTreeMap<String, CellSeed>,
    #[serde(default)]
    slot_cells: BTreeMap<String, CellSeed>,
}

fn default_slots() -> u32 {
    1
}

fn default_stride() -> u32 {
    17
}

#[derive(Deserialize, Clone)]
#[serde(untagged)]
enum CellSeed {
    Number(f64),
    Text(String),
}

const DEFAULT_CATALOG: &str = include_str!("default_catalog.toml");

impl Catalog {
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, CatalogError> {
        let parsed: TomlCatalog = toml::from_str(content)?;
        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(parsed.block.len());

        for block in parsed.block {
            let kind = BlockKind::from_label(&block.kind)
                .ok_or_else(|| CatalogError::unknown_kind(&block.kind))?;
            if !seen.insert(kind) {
                return Err(CatalogError::DuplicateKind { kind });
            }
            if block.slots == 0 {
                return Err(CatalogError::NoSlots { kind });
            }

            let mut cells = BTreeMap::new();
            for (address, seed) in &block.cells {
                let at = parse_address(kind, address)?;
                cells.insert(at, seed_cell(kind, address, seed, 0)?);
            }
            for slot in 0..block.slots {
                let shift = (slot * block.stride) as i32;
                for (address, seed) in &block.slot_cells {
                    let at = parse_address(kind, address)?
                        .offset(shift, 0)
                        .ok_or_else(|| CatalogError::InvalidCell {
                            kind,
                            address: address.clone(),
                        })?;
                    cells.insert(at, seed_cell(kind, address, seed, shift)?);
                }
            }

            let mut subtotals = Subtotals::default();
            if let Some(address) = &block.subtotal_price {
                subtotals.price = parse_address(kind, address)?;
            }
            if let Some(address) = &block.subtotal_cost {
                subtotals.cost = parse_address(kind, address)?;
            }

            templates.push(BlockTemplate {
                kind,
                capacity: block.capacity,
                slots: block.slots,
                stride: block.stride,
                subtotals,
                cells,
            });
        }

        templates.sort_by_key(|t| t.kind.priority());
        Ok(Catalog {
            name: parsed.metadata.and_then(|m| m.name),
            templates,
        })
    }

    pub fn template(&self, kind: BlockKind) -> Option<&BlockTemplate> {
        self.templates.iter().find(|t| t.kind == kind)
    }

    pub fn templates(&self) -> &[BlockTemplate] {
        &self.templates
    }

    /// Check every template against the slot stride of a schema version
    pub fn check_compatible(&self, version: SchemaVersion) -> Result<(), CatalogError> {
        for template in &self.templates {
            let expected = schema::repeat_stride(template.kind, version);
            if template.slots > 1 && template.stride != expected {
                return Err(CatalogError::IncompatibleTemplate {
                    kind: template.kind,
                    version,
                    stride: template.stride,
                    expected,
                });
            }
        }
        Ok(())
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::from_str(DEFAULT_CATALOG).expect("Default catalog should be valid")
    }
}

fn parse_address(kind: BlockKind, address: &str) -> Result<CellRef, CatalogError> {
    CellRef::parse(address).map_err(|_| CatalogError::InvalidCell {
        kind,
        address: address.to_string(),
    })
}

fn seed_cell(
    kind: BlockKind,
    address: &str,
    seed: &CellSeed,
    shift: i32,
) -> Result<Cell, CatalogError> {
    Ok(match seed {
        CellSeed::Number(n) => Cell::Number(*n),
        CellSeed::Text(text) if text.starts_with('=') => {
            let invalid = |source| CatalogError::InvalidFormula {
                kind,
                address: address.to_string(),
                formula: text.clone(),
                source,
            };
            let shifted = if shift == 0 {
                formula::parse(text).map_err(invalid)?;
                text.clone()
            } else {
                formula::shift_rows(text, shift).map_err(invalid)?
            };
            Cell::formula(shifted)
        }
        CellSeed::Text(text) => Cell::Text(text.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(addr: &str) -> CellRef {
        CellRef::parse(addr).unwrap()
    }

    #[test]
    fn test_default_catalog_covers_every_kind() {
        let catalog = Catalog::default();
        for kind in BlockKind::ALL {
            let template = catalog.template(kind).expect("kind missing from catalog");
            assert!(template.capacity > 0);
        }
        assert!(catalog.check_compatible(SchemaVersion::CURRENT).is_ok());
    }

    #[test]
    fn test_slot_cells_are_shifted() {
        let catalog = Catalog::default();
        let template = catalog.template(BlockKind::UvAlternate).unwrap();
        assert!(template.slots > 1);
        let second = template
            .cells()
            .get(&at("N29"))
            .and_then(|c| c.formula_text());
        assert_eq!(second, Some("=ROUND(K29*1.35,2)"));
        assert_eq!(
            template.cells().get(&at("B29")),
            Some(&Cell::Text("ITEM".to_string()))
        );
    }

    #[test]
    fn test_unknown_kind_suggests() {
        let err = Catalog::from_str(
            r#"
[[block]]
kind = "CANOPPY"
capacity = 1
"#,
        )
        .unwrap_err();
        assert_eq!(err.suggestions(), Some(&["CANOPY".to_string()][..]));
        assert!(err.to_string().contains("did you mean CANOPY?"));
    }

    #[test]
    fn test_invalid_formula_rejected() {
        let err = Catalog::from_str(
            r#"
[[block]]
kind = "SDU"
capacity = 1

[block.cells]
N9 = "=SUM(N12:"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidFormula { .. }));
    }

    #[test]
    fn test_subtotal_cells_configurable() {
        let catalog = Catalog::from_str(
            r#"
[[block]]
kind = "CANOPY"
capacity = 1
subtotal_price = "P9"
"#,
        )
        .unwrap();
        let template = catalog.template(BlockKind::Canopy).unwrap();
        assert_eq!(template.subtotals.price, at("P9"));
        assert_eq!(template.subtotals.cost, at("K9"));
    }

    #[test]
    fn test_duplicate_kind_rejected() {
        let err = Catalog::from_str(
            r#"
[[block]]
kind = "SDU"
capacity = 1

[[block]]
kind = "sdu"
capacity = 2
"#,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateKind { kind: BlockKind::SupplyDiffusion }));
    }

    #[test]
    fn test_stride_mismatch_is_incompatible() {
        let catalog = Catalog::from_str(
            r#"
[[block]]
kind = "CANOPY (UV)"
capacity = 1
slots = 3
stride = 20
"#,
        )
        .unwrap();
        assert!(matches!(
            catalog.check_compatible(SchemaVersion::CURRENT),
            Err(CatalogError::IncompatibleTemplate { stride: 20, expected: 17, .. })
        ));
    }
}
