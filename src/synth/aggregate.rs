//! Cross-block aggregation
//!
//! `JOB_TOTAL_CALC` (hidden) carries one row per aggregated block that pulls
//! the block's own subtotal cells, then one SUM row per kind. The visible
//! `JOB TOTAL` page only references those per-kind sums, so an edit inside a
//! block reaches the grand total through the formula graph alone.

use super::delta;
use super::instantiate::{write_header, Allocation};
use crate::formula::sheet_ref;
use crate::model::Project;
use crate::schema::{header, BlockKind};
use crate::workbook::{CellRef, Sheet, Visibility, Workbook, WorkbookError};

pub const CALC_SHEET: &str = "JOB_TOTAL_CALC";
pub const SUMMARY_SHEET: &str = "JOB TOTAL";

pub const COL_BLOCK: u32 = 1;
pub const COL_KIND: u32 = 2;
pub const COL_PRICE: u32 = 3;
pub const COL_COST: u32 = 4;

/// First per-kind row on the summary page
pub const SUMMARY_FIRST_ROW: u32 = 12;
const SUMMARY_LABEL: u32 = 2;
const SUMMARY_COST: u32 = 11;
const SUMMARY_PRICE: u32 = 14;
const SUMMARY_MARGIN: u32 = 15;

/// Where each row landed, for callers that need to inspect the graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationLayout {
    /// (block sheet, calc row)
    pub block_rows: Vec<(String, u32)>,
    /// (kind, calc sum row, summary row)
    pub kind_rows: Vec<(BlockKind, u32, u32)>,
}

/// Build the hidden aggregation page and the visible summary page.
/// `delta_total_row` is the TOTAL row of the delta page, if one exists.
pub fn build(
    workbook: &mut Workbook,
    project: &Project,
    allocations: &[Allocation],
    delta_total_row: Option<u32>,
) -> Result<AggregationLayout, WorkbookError> {
    let mut aggregated: Vec<&Allocation> =
        allocations.iter().filter(|a| !a.kind.is_delta()).collect();
    aggregated.sort_by_key(|a| a.kind.priority());

    let mut calc = Sheet::new(CALC_SHEET);
    calc.visibility = Visibility::Hidden;
    calc.set(CellRef::new(1, COL_BLOCK), "BLOCK");
    calc.set(CellRef::new(1, COL_KIND), "KIND");
    calc.set(CellRef::new(1, COL_PRICE), "PRICE");
    calc.set(CellRef::new(1, COL_COST), "COST");

    let mut layout = AggregationLayout::default();
    for (i, allocation) in aggregated.iter().enumerate() {
        let row = 2 + i as u32;
        calc.set(CellRef::new(row, COL_BLOCK), allocation.sheet.as_str());
        calc.set(CellRef::new(row, COL_KIND), allocation.kind.label());
        calc.set_formula(
            CellRef::new(row, COL_PRICE),
            shielded(&allocation.sheet, allocation.subtotals.price),
        );
        calc.set_formula(
            CellRef::new(row, COL_COST),
            shielded(&allocation.sheet, allocation.subtotals.cost),
        );
        layout.block_rows.push((allocation.sheet.clone(), row));
    }

    // Per-kind sums after one blank row
    let mut sum_row = 2 + aggregated.len() as u32 + 1;
    let mut summary_row = SUMMARY_FIRST_ROW;
    for kind in BlockKind::ALL.into_iter().filter(|k| !k.is_delta()) {
        let rows: Vec<u32> = aggregated
            .iter()
            .zip(&layout.block_rows)
            .filter(|(a, _)| a.kind == kind)
            .map(|(_, (_, row))| *row)
            .collect();
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            continue;
        };
        calc.set(CellRef::new(sum_row, COL_BLOCK), "SUM");
        calc.set(CellRef::new(sum_row, COL_KIND), kind.label());
        for col in [COL_PRICE, COL_COST] {
            calc.set_formula(
                CellRef::new(sum_row, col),
                format!("=SUM({}:{})", CellRef::new(*first, col), CellRef::new(*last, col)),
            );
        }
        layout.kind_rows.push((kind, sum_row, summary_row));
        sum_row += 1;
        summary_row += 1;
    }

    let summary = build_summary(project, &layout, delta_total_row);
    workbook.add_sheet(calc)?;
    workbook.add_sheet(summary)?;
    Ok(layout)
}

/// `=IFERROR(N('block'!N9),0)`: missing, blank or textual subtotals count as zero
fn shielded(sheet: &str, cell: CellRef) -> String {
    format!("=IFERROR(N({}),0)", sheet_ref(sheet, cell))
}

fn margin_formula(row: u32) -> String {
    let price = CellRef::new(row, SUMMARY_PRICE);
    let cost = CellRef::new(row, SUMMARY_COST);
    format!("=IF({p}=0,0,({p}-{c})/{p})", p = price, c = cost)
}

fn build_summary(
    project: &Project,
    layout: &AggregationLayout,
    delta_total_row: Option<u32>,
) -> Sheet {
    let mut sheet = Sheet::new(SUMMARY_SHEET);
    write_header(&mut sheet, project, SUMMARY_SHEET);

    sheet.set(CellRef::new(11, SUMMARY_LABEL), "SYSTEM");
    sheet.set(CellRef::new(11, SUMMARY_COST), "COST");
    sheet.set(CellRef::new(11, SUMMARY_PRICE), "PRICE");
    sheet.set(CellRef::new(11, SUMMARY_MARGIN), "MARGIN");

    for (kind, sum_row, row) in &layout.kind_rows {
        sheet.set(CellRef::new(*row, SUMMARY_LABEL), kind.label());
        sheet.set_formula(
            CellRef::new(*row, SUMMARY_COST),
            format!("={}", sheet_ref(CALC_SHEET, CellRef::new(*sum_row, COL_COST))),
        );
        sheet.set_formula(
            CellRef::new(*row, SUMMARY_PRICE),
            format!("={}", sheet_ref(CALC_SHEET, CellRef::new(*sum_row, COL_PRICE))),
        );
        sheet.set_formula(CellRef::new(*row, SUMMARY_MARGIN), margin_formula(*row));
    }

    let last = layout
        .kind_rows
        .last()
        .map_or(SUMMARY_FIRST_ROW, |(_, _, row)| *row);
    sheet.set(CellRef::new(9, SUMMARY_LABEL), "TOTAL");
    for col in [SUMMARY_COST, SUMMARY_PRICE] {
        sheet.set_formula(
            CellRef::new(9, col),
            format!(
                "=SUM({}:{})",
                CellRef::new(SUMMARY_FIRST_ROW, col),
                CellRef::new(last, col)
            ),
        );
    }
    sheet.set_formula(CellRef::new(9, SUMMARY_MARGIN), margin_formula(9));

    if let Some(total_row) = delta_total_row {
        let label = CellRef::new(10, SUMMARY_LABEL);
        sheet.set(label, "UV EXTRA OVER (NOT INCLUDED)");
        let delta_cell = |col| {
            let at = CellRef::new(total_row, col);
            format!("={}", sheet_ref(delta::SHEET, at))
        };
        sheet.set_formula(header::UV_EXTRA_OVER_COST, delta_cell(delta::COL_COST));
        sheet.set_formula(header::UV_EXTRA_OVER_PRICE, delta_cell(delta::COL_PRICE));
    }
    sheet
}
