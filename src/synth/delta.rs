//! Derived-quantity layer: UV extra-over deltas per branch
//!
//! One hidden row per baseline/alternate pair holding the formula
//! `alternate subtotal - baseline subtotal`, plus a TOTAL row. The totals are
//! shown on the summary page but never feed the main per-kind sums.

use super::instantiate::Allocation;
use super::naming::branch_label;
use crate::formula::sheet_ref;
use crate::schema::{BlockKind, Subtotals};
use crate::workbook::{CellRef, Sheet, Visibility, Workbook, WorkbookError};

pub const SHEET: &str = "UV_EXTRA_OVER_CALC";

pub const COL_BRANCH: u32 = 1;
pub const COL_BASELINE: u32 = 2;
pub const COL_ALTERNATE: u32 = 3;
pub const COL_PRICE: u32 = 4;
pub const COL_COST: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaPair {
    pub branch: String,
    pub area_index: usize,
    pub baseline: String,
    pub alternate: String,
    pub baseline_subtotals: Subtotals,
    pub alternate_subtotals: Subtotals,
}

/// Pair up baseline and alternate blocks of the same area
pub fn pairs(allocations: &[Allocation]) -> Vec<DeltaPair> {
    let mut out: Vec<DeltaPair> = Vec::new();
    let baselines = allocations
        .iter()
        .filter(|a| a.kind == BlockKind::UvBaseline);
    for base in baselines {
        let alternate = allocations
            .iter()
            .find(|a| a.kind == BlockKind::UvAlternate && a.area_index == base.area_index);
        if let Some(alt) = alternate {
            out.push(DeltaPair {
                branch: branch_label(&base.level, base.area_index),
                area_index: base.area_index,
                baseline: base.sheet.clone(),
                alternate: alt.sheet.clone(),
                baseline_subtotals: base.subtotals,
                alternate_subtotals: alt.subtotals,
            });
        }
    }
    out
}

/// Build the hidden delta page. Returns the TOTAL row, or `None` when the
/// project has no comparison pairs.
pub fn build(
    workbook: &mut Workbook,
    allocations: &[Allocation],
) -> Result<Option<u32>, WorkbookError> {
    let pairs = pairs(allocations);
    if pairs.is_empty() {
        return Ok(None);
    }

    let mut sheet = Sheet::new(SHEET);
    sheet.visibility = Visibility::Hidden;
    sheet.set(CellRef::new(1, COL_BRANCH), "BRANCH");
    sheet.set(CellRef::new(1, COL_BASELINE), "BASELINE");
    sheet.set(CellRef::new(1, COL_ALTERNATE), "ALTERNATE");
    sheet.set(CellRef::new(1, COL_PRICE), "PRICE DELTA");
    sheet.set(CellRef::new(1, COL_COST), "COST DELTA");

    let mut row = 2;
    for pair in &pairs {
        sheet.set(CellRef::new(row, COL_BRANCH), pair.branch.as_str());
        sheet.set(CellRef::new(row, COL_BASELINE), pair.baseline.as_str());
        sheet.set(CellRef::new(row, COL_ALTERNATE), pair.alternate.as_str());
        sheet.set_formula(
            CellRef::new(row, COL_PRICE),
            delta_formula(
                (&pair.baseline, pair.baseline_subtotals.price),
                (&pair.alternate, pair.alternate_subtotals.price),
            ),
        );
        sheet.set_formula(
            CellRef::new(row, COL_COST),
            delta_formula(
                (&pair.baseline, pair.baseline_subtotals.cost),
                (&pair.alternate, pair.alternate_subtotals.cost),
            ),
        );
        row += 1;
    }

    let last = row - 1;
    sheet.set(CellRef::new(row, COL_BRANCH), "TOTAL");
    for col in [COL_PRICE, COL_COST] {
        let first = CellRef::new(2, col);
        let end = CellRef::new(last, col);
        sheet.set_formula(CellRef::new(row, col), format!("=SUM({}:{})", first, end));
    }

    workbook.add_sheet(sheet)?;
    Ok(Some(row))
}

fn delta_formula(baseline: (&str, CellRef), alternate: (&str, CellRef)) -> String {
    format!(
        "={}-{}",
        sheet_ref(alternate.0, alternate.1),
        sheet_ref(baseline.0, baseline.1)
    )
}
