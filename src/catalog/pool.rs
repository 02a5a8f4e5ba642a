//! Per-document allocation state over the catalog
//!
//! Opening a pool seeds the workbook with every catalog copy, named
//! `"{LABEL} #{n}"`. Allocation hands them out in catalog order through a
//! monotonic per-kind cursor; nothing is ever returned to the pool.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::registry::{Catalog, CatalogError};
use crate::schema::{BlockKind, SchemaVersion, Subtotals};
use crate::workbook::{Workbook, WorkbookError};

/// An allocated catalog copy, still under its catalog name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHandle {
    pub kind: BlockKind,
    pub sheet: String,
    /// 1-based position of this copy within its kind
    pub ordinal: usize,
    pub slots: u32,
    pub subtotals: Subtotals,
}

pub struct BlockPool {
    version: SchemaVersion,
    copies: HashMap<BlockKind, Vec<String>>,
    slots: HashMap<BlockKind, u32>,
    subtotals: HashMap<BlockKind, Subtotals>,
    cursor: HashMap<BlockKind, usize>,
}

pub fn catalog_sheet_name(kind: BlockKind, ordinal: usize) -> String {
    format!("{} #{}", kind.label(), ordinal)
}

static CATALOG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<label>.+) #(?P<n>[0-9]+)$").expect("valid regex"));

/// Recognise a never-renamed catalog copy
pub fn parse_catalog_sheet_name(name: &str) -> Option<(BlockKind, usize)> {
    let caps = CATALOG_NAME.captures(name)?;
    let kind = BlockKind::from_label(&caps["label"])?;
    let ordinal = caps["n"].parse().ok()?;
    Some((kind, ordinal))
}

impl BlockPool {
    /// Seed `workbook` with the catalog's copies and start every cursor at zero
    pub fn open(
        catalog: &Catalog,
        version: SchemaVersion,
        workbook: &mut Workbook,
    ) -> Result<Self, PoolError> {
        catalog.check_compatible(version)?;
        let mut copies = HashMap::new();
        let mut slots = HashMap::new();
        let mut subtotals = HashMap::new();
        for template in catalog.templates() {
            let mut names = Vec::with_capacity(template.capacity);
            for ordinal in 1..=template.capacity {
                let name = catalog_sheet_name(template.kind, ordinal);
                workbook.add_sheet(template.instantiate(name.clone()))?;
                names.push(name);
            }
            copies.insert(template.kind, names);
            slots.insert(template.kind, template.slots);
            subtotals.insert(template.kind, template.subtotals);
        }
        Ok(Self {
            version,
            copies,
            slots,
            subtotals,
            cursor: HashMap::new(),
        })
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    pub fn capacity(&self, kind: BlockKind) -> usize {
        self.copies.get(&kind).map_or(0, Vec::len)
    }

    pub fn allocated(&self, kind: BlockKind) -> usize {
        self.cursor.get(&kind).copied().unwrap_or(0)
    }

    /// Next unused copy of `kind`; fails fast once the kind is used up
    pub fn allocate(&mut self, kind: BlockKind) -> Result<BlockHandle, CatalogError> {
        let capacity = self.capacity(kind);
        let cursor = self.cursor.entry(kind).or_insert(0);
        let sheet = match self.copies.get(&kind).and_then(|c| c.get(*cursor)) {
            Some(name) => name.clone(),
            None => return Err(CatalogError::exhausted(kind, capacity)),
        };
        *cursor += 1;
        debug!(kind = %kind, sheet = %sheet, "allocated catalog block");
        Ok(BlockHandle {
            kind,
            sheet,
            ordinal: *cursor,
            slots: self.slots.get(&kind).copied().unwrap_or(1),
            subtotals: self.subtotals.get(&kind).copied().unwrap_or_default(),
        })
    }

    /// Catalog copies that were never handed out
    pub fn unallocated(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for kind in BlockKind::ALL {
            let used = self.allocated(kind);
            if let Some(names) = self.copies.get(&kind) {
                out.extend(names.iter().skip(used).map(String::as_str));
            }
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_CANOPIES: &str = r#"
[[block]]
kind = "CANOPY"
capacity = 2

[block.cells]
N9 = "=SUM(N12:N100)"
"#;

    #[test]
    fn test_allocation_is_ordered_and_exhausts() {
        let catalog = Catalog::from_str(TWO_CANOPIES).unwrap();
        let mut wb = Workbook::new();
        let mut pool = BlockPool::open(&catalog, SchemaVersion::CURRENT, &mut wb).unwrap();
        assert_eq!(wb.sheet_names(), vec!["CANOPY #1", "CANOPY #2"]);

        assert_eq!(pool.allocate(BlockKind::Canopy).unwrap().sheet, "CANOPY #1");
        assert_eq!(pool.allocate(BlockKind::Canopy).unwrap().sheet, "CANOPY #2");
        let err = pool.allocate(BlockKind::Canopy).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Exhausted { kind: BlockKind::Canopy, capacity: 2 }
        ));
        // Still exhausted on retry
        assert!(pool.allocate(BlockKind::Canopy).is_err());
    }

    #[test]
    fn test_missing_kind_is_exhausted() {
        let catalog = Catalog::from_str(TWO_CANOPIES).unwrap();
        let mut wb = Workbook::new();
        let mut pool = BlockPool::open(&catalog, SchemaVersion::CURRENT, &mut wb).unwrap();
        assert!(matches!(
            pool.allocate(BlockKind::AirRecovery),
            Err(CatalogError::Exhausted { capacity: 0, .. })
        ));
    }

    #[test]
    fn test_unallocated_lists_remaining_copies() {
        let catalog = Catalog::from_str(TWO_CANOPIES).unwrap();
        let mut wb = Workbook::new();
        let mut pool = BlockPool::open(&catalog, SchemaVersion::CURRENT, &mut wb).unwrap();
        pool.allocate(BlockKind::Canopy).unwrap();
        assert_eq!(pool.unallocated(), vec!["CANOPY #2"]);
    }

    #[test]
    fn test_parse_catalog_sheet_name() {
        assert_eq!(
            parse_catalog_sheet_name("CANOPY (UV) #3"),
            Some((BlockKind::UvAlternate, 3))
        );
        assert_eq!(parse_catalog_sheet_name("CANOPY - Level 1 (1)"), None);
        assert_eq!(parse_catalog_sheet_name("JOB TOTAL"), None);
    }
}
