//! Error types for synthesis

use thiserror::Error;

use crate::catalog::{CatalogError, PoolError};
use crate::schema::BlockKind;
use crate::workbook::WorkbookError;

/// Errors that abort synthesis; no document is produced
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// No catalog copy left for a kind
    #[error("catalog exhausted: no {kind} block left for {branch}")]
    CatalogExhausted { kind: BlockKind, branch: String },

    /// A multi-slot block cannot hold every participating line item
    #[error("{kind} block for {branch} has {slots} slots but {needed} line items need one")]
    SlotsExhausted {
        kind: BlockKind,
        branch: String,
        slots: u32,
        needed: usize,
    },

    #[error("project has no levels")]
    EmptyProject,

    #[error("level '{level}' has no areas")]
    EmptyLevel { level: String },

    #[error("area '{area}' on level '{level}' has no line items or subsystems")]
    EmptyArea { level: String, area: String },

    #[error("invalid line item '{reference}' in {branch}: {reason}")]
    InvalidLineItem {
        branch: String,
        reference: String,
        reason: String,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("workbook error: {0}")]
    Workbook(#[from] WorkbookError),
}

impl SynthesisError {
    pub fn exhausted(kind: BlockKind, branch: impl Into<String>) -> Self {
        Self::CatalogExhausted {
            kind,
            branch: branch.into(),
        }
    }

    pub fn slots_exhausted(
        kind: BlockKind,
        branch: impl Into<String>,
        slots: u32,
        needed: usize,
    ) -> Self {
        Self::SlotsExhausted {
            kind,
            branch: branch.into(),
            slots,
            needed,
        }
    }

    pub fn empty_area(level: impl Into<String>, area: impl Into<String>) -> Self {
        Self::EmptyArea {
            level: level.into(),
            area: area.into(),
        }
    }

    pub fn invalid_line_item(
        branch: impl Into<String>,
        reference: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidLineItem {
            branch: branch.into(),
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Map a pool allocation failure onto the branch that asked for it
    pub fn from_allocation(err: CatalogError, branch: &str) -> Self {
        match err {
            CatalogError::Exhausted { kind, .. } => Self::exhausted(kind, branch),
            other => Self::Catalog(other),
        }
    }
}

impl From<PoolError> for SynthesisError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Catalog(e) => Self::Catalog(e),
            PoolError::Workbook(e) => Self::Workbook(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_names_branch_and_kind() {
        let err = SynthesisError::exhausted(BlockKind::AirRecovery, "Level 1 (2)");
        assert_eq!(
            err.to_string(),
            "catalog exhausted: no RECOAIR block left for Level 1 (2)"
        );
    }

    #[test]
    fn test_allocation_mapping() {
        let err = SynthesisError::from_allocation(
            CatalogError::exhausted(BlockKind::Canopy, 3),
            "Ground (1)",
        );
        match err {
            SynthesisError::CatalogExhausted { kind, branch } => {
                assert_eq!(kind, BlockKind::Canopy);
                assert_eq!(branch, "Ground (1)");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
