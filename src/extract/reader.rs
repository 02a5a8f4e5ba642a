//! Values-only field readers
//!
//! A [`SheetReader`] returns the stored result of a cell when one exists and
//! falls back to evaluating the formula otherwise. The slot readers below turn
//! schema fields into model values, recording every failure in a
//! [`ValidationReport`] rather than stopping at the first.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::validate::{Converted, Expected, ValidationReport};
use crate::formula::{eval::to_number, parse, BinOp, Evaluator, Expr};
use crate::model::{LineItem, Pricing, WallCladding};
use crate::schema::{self, BlockKind, Field, SchemaVersion, Subtotals};
use crate::synth::{aggregate, delta};
use crate::workbook::{CellRef, Value, Workbook};

pub struct SheetReader<'w> {
    workbook: &'w Workbook,
    evaluator: Evaluator<'w>,
}

impl<'w> SheetReader<'w> {
    pub fn new(workbook: &'w Workbook) -> Self {
        Self {
            workbook,
            evaluator: Evaluator::new(workbook),
        }
    }

    pub fn workbook(&self) -> &'w Workbook {
        self.workbook
    }

    /// Stored value of a cell, evaluating formulas that have no stored result
    pub fn value(&mut self, sheet: &str, at: CellRef) -> Value {
        match self.workbook.sheet(sheet).and_then(|s| s.cached_value(at)) {
            Some(value) => value,
            None => self.evaluator.cell_value(sheet, at),
        }
    }

    /// Formula text of a cell, if it holds one
    pub fn formula_text(&self, sheet: &str, at: CellRef) -> Option<&'w str> {
        self.workbook.sheet(sheet)?.get(at)?.formula_text()
    }

    /// Evaluate a `'a'!X - 'b'!Y` formula from the values of the two cells it
    /// names. Any other shape yields `None`.
    pub fn difference_of_refs(&mut self, home: &str, formula: &str) -> Option<f64> {
        let Expr::Binary {
            op: BinOp::Sub,
            lhs,
            rhs,
        } = parse(formula).ok()?
        else {
            return None;
        };
        let (Expr::Ref(a), Expr::Ref(b)) = (*lhs, *rhs) else {
            return None;
        };
        if a.is_range() || b.is_range() {
            return None;
        }
        let a_value = self.value(a.sheet.as_deref().unwrap_or(home), a.start);
        let b_value = self.value(b.sheet.as_deref().unwrap_or(home), b.start);
        Some(to_number(&a_value).ok()? - to_number(&b_value).ok()?)
    }
}

/// `Sheet!Cell`, as used in validation messages
pub fn location(sheet: &str, at: CellRef) -> String {
    format!("{}!{}", sheet, at)
}

fn is_sentinel(value: &Value, text: &str) -> bool {
    matches!(value, Value::Text(s) if s.trim().eq_ignore_ascii_case(text))
}

/// Reads the fields of one slot of one block
pub struct SlotCursor<'a, 'w> {
    pub reader: &'a mut SheetReader<'w>,
    pub report: &'a mut ValidationReport,
    pub sheet: &'a str,
    pub kind: BlockKind,
    pub version: SchemaVersion,
    pub slot: u32,
}

impl<'a, 'w> SlotCursor<'a, 'w> {
    fn raw(&mut self, field: Field) -> Option<(CellRef, Value)> {
        let at = schema::field_cell(self.kind, self.version, self.slot, field)?;
        Some((at, self.reader.value(self.sheet, at)))
    }

    fn field_value(&mut self, field: Field) -> Value {
        self.raw(field).map_or(Value::Blank, |(_, v)| v)
    }

    /// `None` when the field failed validation. Fields missing from the
    /// version's table read as absent.
    fn read(&mut self, field: Field, expected: Expected, required: bool) -> Option<Converted> {
        let Some((at, value)) = self.raw(field) else {
            return Some(Converted::Absent);
        };
        let context = format!("{} of {} slot {}", field, self.kind, self.slot + 1);
        let location = location(self.sheet, at);
        if required {
            self.report.require(&location, &value, expected, &context)
        } else {
            self.report.check(&location, &value, expected, &context)
        }
    }

    fn text(&mut self, field: Field, required: bool) -> Option<String> {
        match self.read(field, Expected::Text, required)? {
            Converted::Text(s) => Some(s),
            _ => None,
        }
    }

    fn integer(&mut self, field: Field, expected: Expected, required: bool) -> Option<u32> {
        match self.read(field, expected, required)? {
            Converted::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// A slot still holding the template sentinels was never filled
    pub fn is_placeholder(&mut self) -> bool {
        let reference = self.field_value(Field::Reference);
        let model = self.field_value(Field::Model);
        is_sentinel(&reference, schema::PLACEHOLDER_REFERENCE)
            || is_sentinel(&model, schema::PLACEHOLDER_MODEL)
            || (reference.is_blank() && model.is_blank())
    }

    /// Read a canopy slot. Returns the stored item position (if the version
    /// records one) and the line item; `None` for placeholder slots.
    pub fn line_item(&mut self) -> Option<(Option<u32>, LineItem)> {
        if self.is_placeholder() {
            debug!(sheet = self.sheet, slot = self.slot, "placeholder slot");
            return None;
        }
        let position = self.integer(Field::Position, Expected::Integer, false);
        let item = LineItem {
            reference: self.text(Field::Reference, true).unwrap_or_default(),
            configuration: self.text(Field::Configuration, false).unwrap_or_default(),
            model: self.text(Field::Model, false).unwrap_or_default(),
            width: self.dimension(Field::Width),
            length: self.dimension(Field::Length),
            height: self.dimension(Field::Height),
            sections: self.dimension(Field::Sections),
            lighting: self.text(Field::Lighting, false),
            wall_cladding: self.wall_cladding(),
            ..Default::default()
        };
        Some((position, item))
    }

    /// Required whole number; zero once the failure is recorded
    fn dimension(&mut self, field: Field) -> u32 {
        self.integer(field, Expected::Integer, true).unwrap_or(0)
    }

    fn wall_cladding(&mut self) -> Option<WallCladding> {
        let kind = self.text(Field::CladdingKind, false)?;
        let (width, height) = match self.read(Field::CladdingSize, Expected::Dimensions, true)? {
            Converted::Dimensions(w, h) => (w, h),
            _ => return None,
        };
        let positions: BTreeSet<String> = self
            .text(Field::CladdingPositions, false)
            .unwrap_or_default()
            .split('/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        Some(WallCladding {
            kind,
            width,
            height,
            positions,
        })
    }

    /// Read a fire-suppression slot: (position, reference, tanks)
    pub fn add_on(&mut self) -> Option<(Option<u32>, String, Option<u32>)> {
        let reference = self.field_value(Field::Reference);
        if is_sentinel(&reference, schema::PLACEHOLDER_REFERENCE) {
            debug!(sheet = self.sheet, "skipping placeholder add-on");
            return None;
        }
        let position = self.integer(Field::Position, Expected::Integer, false);
        let reference = self.text(Field::Reference, true).unwrap_or_default();
        let tanks = self.integer(Field::TankQuantity, Expected::TankQuantity, false);
        Some((position, reference, tanks))
    }
}

/// Block subtotal as (price, cost); blank subtotals count as zero
pub fn pricing(
    reader: &mut SheetReader<'_>,
    report: &mut ValidationReport,
    sheet: &str,
    cells: Subtotals,
) -> Pricing {
    let mut read = |at: CellRef, what: &str| {
        let value = reader.value(sheet, at);
        match report.check(&location(sheet, at), &value, Expected::Number, what) {
            Some(Converted::Number(n)) => n,
            _ => 0.0,
        }
    };
    let price = read(cells.price, "subtotal price");
    let cost = read(cells.cost, "subtotal cost");
    Pricing::new(price, cost)
}

/// Subtotal cells of every block the aggregation or delta page pulls from,
/// recovered from the sheet-qualified references in their formulas.
/// Blocks missing from the map use the default cells.
pub fn subtotal_cells(workbook: &Workbook) -> HashMap<String, Subtotals> {
    let pages = [
        (aggregate::CALC_SHEET, aggregate::COL_PRICE, aggregate::COL_COST),
        (delta::SHEET, delta::COL_PRICE, delta::COL_COST),
    ];
    let mut cells: HashMap<String, Subtotals> = HashMap::new();
    for (page, price_col, cost_col) in pages {
        let Some(sheet) = workbook.sheet(page) else {
            continue;
        };
        for (at, cell) in &sheet.cells {
            if at.col != price_col && at.col != cost_col {
                continue;
            }
            let Some(expr) = cell.formula_text().and_then(|f| parse(f).ok()) else {
                continue;
            };
            for reference in expr.references() {
                let Some(block) = &reference.sheet else {
                    continue;
                };
                let entry = cells.entry(block.clone()).or_default();
                if at.col == price_col {
                    entry.price = reference.start;
                } else {
                    entry.cost = reference.start;
                }
            }
        }
    }
    debug!(blocks = cells.len(), "recovered subtotal cells");
    cells
}

/// Optional text from a fixed cell
pub fn header_text(
    reader: &mut SheetReader<'_>,
    report: &mut ValidationReport,
    sheet: &str,
    at: CellRef,
    what: &str,
) -> String {
    let value = reader.value(sheet, at);
    match report.check(&location(sheet, at), &value, Expected::Text, what) {
        Some(Converted::Text(s)) => s,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::header;
    use crate::workbook::{Cell, Sheet};

    fn at(addr: &str) -> CellRef {
        CellRef::parse(addr).unwrap()
    }

    fn canopy_sheet() -> Sheet {
        let mut sheet = Sheet::new("CANOPY - L1 (1) - 1.01");
        sheet.set(at("A12"), 1.0);
        sheet.set(at("B12"), "1.01");
        sheet.set(at("C14"), "WALL");
        sheet.set(at("D14"), "KVF");
        sheet.set(at("E14"), 1815.0);
        sheet.set(at("F14"), "3000.0");
        sheet.set(at("G14"), 555.0);
        sheet.set(at("H14"), 2.0);
        sheet.set(at("C19"), "SS");
        sheet.set(at("P19"), "1000X2100");
        sheet.set(at("Q19"), "rear/left");
        sheet
    }

    fn cursor_read(
        wb: &Workbook,
        sheet: &str,
        version: SchemaVersion,
    ) -> (Option<(Option<u32>, LineItem)>, ValidationReport) {
        let mut reader = SheetReader::new(wb);
        let mut report = ValidationReport::new();
        let item = SlotCursor {
            reader: &mut reader,
            report: &mut report,
            sheet,
            kind: BlockKind::Canopy,
            version,
            slot: 0,
        }
        .line_item();
        (item, report)
    }

    #[test]
    fn test_reads_line_item() {
        let mut wb = Workbook::new();
        wb.add_sheet(canopy_sheet()).unwrap();
        let (read, report) = cursor_read(&wb, "CANOPY - L1 (1) - 1.01", SchemaVersion::CURRENT);
        assert!(report.is_empty());
        let (position, item) = read.unwrap();
        assert_eq!(position, Some(1));
        assert_eq!(item.reference, "1.01");
        assert_eq!(item.length, 3000);
        let cladding = item.wall_cladding.unwrap();
        assert_eq!((cladding.width, cladding.height), (1000, 2100));
        assert_eq!(cladding.positions.len(), 2);
    }

    #[test]
    fn test_legacy_ignores_newer_fields() {
        let mut wb = Workbook::new();
        wb.add_sheet(canopy_sheet()).unwrap();
        let (read, _) = cursor_read(&wb, "CANOPY - L1 (1) - 1.01", SchemaVersion::LEGACY);
        let (position, item) = read.unwrap();
        assert_eq!(position, None);
        assert_eq!(item.wall_cladding, None);
        assert_eq!(item.width, 1815);
    }

    #[test]
    fn test_placeholder_skipped_without_errors() {
        let mut wb = Workbook::new();
        let mut sheet = Sheet::new("s");
        sheet.set(at("B12"), "ITEM");
        sheet.set(at("D14"), "CANOPY TYPE");
        sheet.set(at("E14"), "n/a");
        wb.add_sheet(sheet).unwrap();
        let (read, report) = cursor_read(&wb, "s", SchemaVersion::CURRENT);
        assert!(read.is_none());
        assert!(report.is_empty());
    }

    #[test]
    fn test_bad_fields_all_reported() {
        let mut wb = Workbook::new();
        let mut sheet = canopy_sheet();
        sheet.set(at("E14"), "wide");
        sheet.set(at("H14"), 1.5);
        wb.add_sheet(sheet).unwrap();
        let (_, report) = cursor_read(&wb, "CANOPY - L1 (1) - 1.01", SchemaVersion::CURRENT);
        let locations: Vec<String> = report
            .into_errors()
            .into_iter()
            .map(|e| e.location)
            .collect();
        assert_eq!(
            locations,
            vec!["CANOPY - L1 (1) - 1.01!E14", "CANOPY - L1 (1) - 1.01!H14"]
        );
    }

    #[test]
    fn test_uncached_formula_is_evaluated() {
        let mut wb = Workbook::new();
        let mut sheet = Sheet::new("b");
        sheet.set(at("K12"), 100.0);
        sheet.set(header::SUBTOTAL_COST, Cell::formula("=SUM(K12:K20)"));
        sheet.set(header::SUBTOTAL_PRICE, Cell::formula("=K9*2"));
        wb.add_sheet(sheet).unwrap();
        let mut reader = SheetReader::new(&wb);
        let mut report = ValidationReport::new();
        assert_eq!(
            pricing(&mut reader, &mut report, "b", Subtotals::default()),
            Pricing::new(200.0, 100.0)
        );
    }

    #[test]
    fn test_subtotal_cells_follow_page_formulas() {
        let mut wb = Workbook::new();
        let mut calc = Sheet::new(aggregate::CALC_SHEET);
        let price = Cell::formula("=IFERROR(N('CANOPY - L1 (1) - 1.01'!P9),0)");
        let cost = Cell::formula("=IFERROR(N('CANOPY - L1 (1) - 1.01'!K9),0)");
        calc.set(at("C2"), price);
        calc.set(at("D2"), cost);
        calc.set(at("C4"), Cell::formula("=SUM(C2:C2)"));
        wb.add_sheet(calc).unwrap();
        let mut uv = Sheet::new(delta::SHEET);
        let difference = Cell::formula("='CANOPY (UV) - L1 (1)'!Q9-'CANOPY (STD) - L1 (1)'!N9");
        uv.set(at("D2"), difference);
        wb.add_sheet(uv).unwrap();

        let cells = subtotal_cells(&wb);
        assert_eq!(cells.len(), 3);
        assert_eq!(cells["CANOPY - L1 (1) - 1.01"].price, at("P9"));
        assert_eq!(cells["CANOPY - L1 (1) - 1.01"].cost, at("K9"));
        assert_eq!(cells["CANOPY (UV) - L1 (1)"].price, at("Q9"));
        assert_eq!(cells["CANOPY (STD) - L1 (1)"], Subtotals::default());
    }

    #[test]
    fn test_difference_of_refs() {
        let mut wb = Workbook::new();
        for (name, price) in [("base", 100.0), ("alt", 160.0)] {
            let mut sheet = Sheet::new(name);
            sheet.set(header::SUBTOTAL_PRICE, price);
            wb.add_sheet(sheet).unwrap();
        }
        let mut reader = SheetReader::new(&wb);
        assert_eq!(reader.difference_of_refs("base", "='alt'!N9-'base'!N9"), Some(60.0));
        assert_eq!(reader.difference_of_refs("base", "=SUM(N9)"), None);
    }
}
