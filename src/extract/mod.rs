//! Round-trip extraction: rebuild a [`Project`] from a document
//!
//! Extraction runs as a fixed sequence of stages over a values-only view of
//! the document. Field validation failures are collected across the whole
//! run and reported together; nothing partial is returned.

pub mod linkage;
pub mod reader;
pub mod validate;
pub mod version;

pub use linkage::{default_strategies, resolve, LinkStrategy, Linkage};
pub use validate::{validate, Converted, Expected, FieldValidationError, ValidationReport};
pub use version::{detect_version, Detection};

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use reader::{header_text, pricing, subtotal_cells, SheetReader, SlotCursor};
use crate::formula::eval::to_number;
use crate::model::{Area, Level, LineItem, Pricing, Project};
use crate::schema::{header, project_data, BlockKind, SchemaVersion, Subtotals};
use crate::synth::{aggregate, delta, BlockName};
use crate::workbook::{CellRef, Value, Workbook};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document contains no recognisable blocks")]
    NoBlocks,

    #[error("{} field(s) failed validation: {}", .errors.len(), summarize(.errors))]
    Failed { errors: Vec<FieldValidationError> },
}

impl ExtractionError {
    pub fn errors(&self) -> &[FieldValidationError] {
        match self {
            ExtractionError::Failed { errors } => errors,
            ExtractionError::NoBlocks => &[],
        }
    }
}

fn summarize(errors: &[FieldValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A reconstructed project plus what extraction noticed along the way
#[derive(Debug, Clone)]
pub struct Extraction {
    pub project: Project,
    pub version: SchemaVersion,
    pub detection: Detection,
    /// Non-fatal findings: unlinked add-ons, ambiguous links, odd blocks
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetectVersion,
    LocateBlocks,
    ReconstructHierarchy,
    ReadFields,
    ResolveLinkages,
    Done,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::DetectVersion => Stage::LocateBlocks,
            Stage::LocateBlocks => Stage::ReconstructHierarchy,
            Stage::ReconstructHierarchy => Stage::ReadFields,
            Stage::ReadFields => Stage::ResolveLinkages,
            Stage::ResolveLinkages | Stage::Done => Stage::Done,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DetectVersion => "detect-version",
            Stage::LocateBlocks => "locate-blocks",
            Stage::ReconstructHierarchy => "reconstruct-hierarchy",
            Stage::ReadFields => "read-fields",
            Stage::ResolveLinkages => "resolve-linkages",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Extract with the built-in linkage strategies
pub fn extract(workbook: &Workbook) -> Result<Extraction, ExtractionError> {
    extract_with(workbook, &default_strategies())
}

pub fn extract_with(
    workbook: &Workbook,
    strategies: &[Box<dyn LinkStrategy>],
) -> Result<Extraction, ExtractionError> {
    let mut run = Extractor {
        reader: SheetReader::new(workbook),
        report: ValidationReport::new(),
        strategies,
        version: SchemaVersion::LEGACY,
        detection: Detection::Fallback,
        blocks: Vec::new(),
        areas: Vec::new(),
        warnings: Vec::new(),
    };

    let mut stage = Stage::DetectVersion;
    while stage != Stage::Done {
        debug!(%stage, "extraction stage");
        match stage {
            Stage::DetectVersion => run.detect_version(),
            Stage::LocateBlocks => run.locate_blocks()?,
            Stage::ReconstructHierarchy => run.reconstruct_hierarchy(),
            Stage::ReadFields => run.read_fields(),
            Stage::ResolveLinkages => run.resolve_linkages(),
            Stage::Done => {}
        }
        stage = stage.next();
    }
    run.finish()
}

#[derive(Debug, Clone)]
struct LocatedBlock {
    sheet: String,
    name: BlockName,
    subtotals: Subtotals,
}

/// A FIRE SUPP block read but not yet attached to a line item
#[derive(Debug)]
struct AddOnDraft {
    position: Option<u32>,
    reference: String,
    sheet: String,
    tanks: Option<u32>,
    pricing: Pricing,
}

/// An area being rebuilt: its blocks and, after reading, its content
#[derive(Debug, Default)]
struct AreaDraft {
    level: String,
    index: usize,
    name: String,
    blocks: Vec<LocatedBlock>,
    /// (position, document order, item)
    items: Vec<(Option<u32>, usize, LineItem)>,
    add_ons: Vec<AddOnDraft>,
    area: Area,
}

/// Among `hits` that all carry the same reference, the one recorded at
/// `position`. Distinct references stay ambiguous.
fn same_reference_at(
    items: &[(Option<u32>, usize, LineItem)],
    hits: &[usize],
    position: u32,
) -> Option<usize> {
    let first = items.get(*hits.first()?)?.2.reference.trim();
    let identical = hits
        .iter()
        .all(|&i| items[i].2.reference.trim().eq_ignore_ascii_case(first));
    if !identical {
        return None;
    }
    let mut at = hits
        .iter()
        .copied()
        .filter(|&i| items[i].0 == Some(position));
    match (at.next(), at.next()) {
        (Some(index), None) => Some(index),
        _ => None,
    }
}

struct Extractor<'w, 's> {
    reader: SheetReader<'w>,
    report: ValidationReport,
    strategies: &'s [Box<dyn LinkStrategy>],
    version: SchemaVersion,
    detection: Detection,
    blocks: Vec<LocatedBlock>,
    areas: Vec<AreaDraft>,
    warnings: Vec<String>,
}

impl<'w, 's> Extractor<'w, 's> {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }

    fn detect_version(&mut self) {
        let (version, detection) = detect_version(self.reader.workbook());
        if detection == Detection::Fallback {
            self.warnings.push(format!(
                "no schema version marker; reading as {}",
                version
            ));
        }
        self.version = version;
        self.detection = detection;
    }

    fn locate_blocks(&mut self) -> Result<(), ExtractionError> {
        let workbook = self.reader.workbook();
        let subtotals = subtotal_cells(workbook);
        self.blocks = workbook
            .sheets
            .iter()
            .filter_map(|sheet| {
                BlockName::parse(&sheet.name).map(|name| LocatedBlock {
                    sheet: sheet.name.clone(),
                    name,
                    subtotals: subtotals.get(&sheet.name).copied().unwrap_or_default(),
                })
            })
            .collect();
        debug!(blocks = self.blocks.len(), "located blocks");
        if self.blocks.is_empty() {
            return Err(ExtractionError::NoBlocks);
        }
        Ok(())
    }

    /// Group blocks by area index; the level comes from the block names
    fn reconstruct_hierarchy(&mut self) {
        let mut by_area: BTreeMap<usize, Vec<LocatedBlock>> = BTreeMap::new();
        for block in std::mem::take(&mut self.blocks) {
            by_area
                .entry(block.name.area_index)
                .or_default()
                .push(block);
        }

        let mut conflicts = Vec::new();
        for (index, blocks) in by_area {
            let level = blocks[0].name.level.clone();
            for other in blocks.iter().filter(|b| b.name.level != level) {
                conflicts.push(format!(
                    "block '{}' names level '{}' but area {} belongs to '{}'",
                    other.sheet, other.name.level, index, level
                ));
            }
            let title = header_text(
                &mut self.reader,
                &mut self.report,
                &blocks[0].sheet,
                header::TITLE,
                "branch title",
            );
            let prefix = format!("{} - ", level);
            let name = title.strip_prefix(&prefix).unwrap_or(&title).to_string();
            self.areas.push(AreaDraft {
                level,
                index,
                name,
                blocks,
                ..Default::default()
            });
        }
        for conflict in conflicts {
            self.warn(conflict);
        }
    }

    fn read_fields(&mut self) {
        let version = self.version;
        for draft in &mut self.areas {
            draft.area.name = draft.name.clone();
            for (order, block) in draft.blocks.iter().enumerate() {
                let sheet = block.sheet.as_str();
                let cells = block.subtotals;
                let mut cursor = SlotCursor {
                    reader: &mut self.reader,
                    report: &mut self.report,
                    sheet,
                    kind: block.name.kind,
                    version,
                    slot: 0,
                };
                match block.name.kind {
                    BlockKind::Canopy => {
                        if let Some((position, mut item)) = cursor.line_item() {
                            let cost = pricing(&mut self.reader, &mut self.report, sheet, cells);
                            item.pricing = Some(cost);
                            draft.items.push((position, order, item));
                        }
                    }
                    BlockKind::FireSuppression => {
                        if let Some((position, reference, tanks)) = cursor.add_on() {
                            let cost = pricing(&mut self.reader, &mut self.report, sheet, cells);
                            draft.add_ons.push(AddOnDraft {
                                position,
                                reference,
                                sheet: block.sheet.clone(),
                                tanks,
                                pricing: cost,
                            });
                        }
                    }
                    BlockKind::UvBaseline | BlockKind::UvAlternate => {
                        draft.area.options.uv_comparison = true;
                    }
                    kind => {
                        if let Some(subsystem) = kind.subsystem() {
                            draft.area.options.set(subsystem, true);
                            let cost = pricing(&mut self.reader, &mut self.report, sheet, cells);
                            *draft.area.subsystem_pricing.entry(subsystem).or_default() += cost;
                        }
                    }
                }
            }
            // Recorded position first, document order for ties and legacy blocks
            draft
                .items
                .sort_by_key(|(position, order, _)| (position.unwrap_or(u32::MAX), *order));
        }

        for i in 0..self.areas.len() {
            if self.areas[i].area.options.uv_comparison {
                let extra = self.uv_extra_over(i);
                self.areas[i].area.uv_extra_over = extra;
            }
        }
    }

    /// Price and cost deltas for an area's comparison pair
    fn uv_extra_over(&mut self, area: usize) -> Option<Pricing> {
        let draft = &self.areas[area];
        let find = |kind: BlockKind| {
            draft
                .blocks
                .iter()
                .find(|b| b.name.kind == kind)
                .map(|b| (b.sheet.clone(), b.subtotals))
        };
        let (Some(baseline), Some(alternate)) =
            (find(BlockKind::UvBaseline), find(BlockKind::UvAlternate))
        else {
            let message = format!(
                "area {} has an incomplete UV comparison pair",
                self.areas[area].index
            );
            self.warn(message);
            return None;
        };

        let row = self.delta_row(&baseline.0, &alternate.0);
        let price = self.delta_value(
            row,
            delta::COL_PRICE,
            (&baseline.0, baseline.1.price),
            (&alternate.0, alternate.1.price),
        );
        let cost = self.delta_value(
            row,
            delta::COL_COST,
            (&baseline.0, baseline.1.cost),
            (&alternate.0, alternate.1.cost),
        );
        Some(Pricing::new(price, cost))
    }

    /// One delta from the delta page, falling back to the pair's own
    /// subtotals when the page has no row for it
    fn delta_value(
        &mut self,
        row: Option<u32>,
        col: u32,
        baseline: (&str, CellRef),
        alternate: (&str, CellRef),
    ) -> f64 {
        if let Some(value) = row.and_then(|row| self.delta_cell(row, col)) {
            return value;
        }
        let alt = to_number(&self.reader.value(alternate.0, alternate.1)).unwrap_or(0.0);
        let base = to_number(&self.reader.value(baseline.0, baseline.1)).unwrap_or(0.0);
        alt - base
    }

    /// Row of the delta page that pairs these two blocks
    fn delta_row(&mut self, baseline: &str, alternate: &str) -> Option<u32> {
        let sheet = self.reader.workbook().sheet(delta::SHEET)?;
        let is = |row: u32, col: u32, name: &str| {
            matches!(
                sheet.cached_value(CellRef::new(row, col)),
                Some(Value::Text(s)) if s == name
            )
        };
        let last = sheet.cells.keys().map(|c| c.row).max().unwrap_or(0);
        (2..=last).find(|row| {
            is(*row, delta::COL_BASELINE, baseline) && is(*row, delta::COL_ALTERNATE, alternate)
        })
    }

    /// Stored delta value, or the delta recomputed from the formula's own
    /// references when no value is stored
    fn delta_cell(&mut self, row: u32, col: u32) -> Option<f64> {
        let at = CellRef::new(row, col);
        let workbook = self.reader.workbook();
        if let Some(Value::Number(n)) = workbook.sheet(delta::SHEET)?.cached_value(at) {
            return Some(n);
        }
        let formula = self.reader.formula_text(delta::SHEET, at)?;
        debug!(%at, formula, "delta value not stored, evaluating from referenced blocks");
        self.reader.difference_of_refs(delta::SHEET, formula)
    }

    fn resolve_linkages(&mut self) {
        let mut messages = Vec::new();
        for draft in &mut self.areas {
            let add_ons = std::mem::take(&mut draft.add_ons);
            let mut linked = vec![false; draft.items.len()];
            for add_on in add_ons {
                let AddOnDraft {
                    position,
                    reference,
                    sheet,
                    tanks,
                    pricing: cost,
                } = add_on;
                let candidates: Vec<&str> = draft
                    .items
                    .iter()
                    .map(|(_, _, item)| item.reference.as_str())
                    .collect();
                let linkage = match resolve(&reference, &candidates, self.strategies) {
                    Linkage::Ambiguous { candidates: hits, strategy } => {
                        match position.and_then(|p| same_reference_at(&draft.items, &hits, p)) {
                            Some(index) => Linkage::Linked {
                                index,
                                strategy: "position",
                            },
                            None => Linkage::Ambiguous {
                                candidates: hits,
                                strategy,
                            },
                        }
                    }
                    other => other,
                };
                match linkage {
                    Linkage::Linked { index, strategy } if !linked[index] => {
                        debug!(add_on = %sheet, strategy, "linked add-on");
                        linked[index] = true;
                        let item = &mut draft.items[index].2;
                        item.fire_suppression = true;
                        item.suppression_tanks = tanks;
                        item.suppression_pricing = Some(cost);
                    }
                    Linkage::Linked { index, .. } => messages.push(format!(
                        "add-on '{}' links to line item '{}' which already has one; dropped",
                        sheet, draft.items[index].2.reference
                    )),
                    Linkage::Ambiguous { candidates: hits, strategy } => messages.push(format!(
                        "add-on '{}' matches {} line items by {}; dropped",
                        sheet,
                        hits.len(),
                        strategy
                    )),
                    Linkage::Unlinked => messages.push(format!(
                        "add-on '{}' matches no line item in {} - {}; dropped",
                        sheet, draft.level, draft.name
                    )),
                }
            }
        }
        for message in messages {
            self.warn(message);
        }
    }

    fn finish(mut self) -> Result<Extraction, ExtractionError> {
        let project = self.assemble();
        if !self.report.is_empty() {
            let errors = self.report.into_errors();
            warn!(errors = errors.len(), "extraction failed validation");
            return Err(ExtractionError::Failed { errors });
        }
        info!(
            levels = project.levels.len(),
            version = %self.version,
            warnings = self.warnings.len(),
            "extraction complete"
        );
        Ok(Extraction {
            project,
            version: self.version,
            detection: self.detection,
            warnings: self.warnings,
        })
    }

    /// Header fields plus the area drafts folded into levels
    fn assemble(&mut self) -> Project {
        let workbook = self.reader.workbook();
        let source = if workbook.sheet(aggregate::SUMMARY_SHEET).is_some() {
            aggregate::SUMMARY_SHEET.to_string()
        } else {
            self.areas
                .first()
                .and_then(|a| a.blocks.first())
                .map(|b| b.sheet.clone())
                .unwrap_or_default()
        };

        let reader = &mut self.reader;
        let report = &mut self.report;
        let mut text =
            |sheet: &str, at: CellRef, what: &str| header_text(reader, report, sheet, at, what);

        let mut project = Project {
            number: text(&source, header::NUMBER, "project number"),
            customer: text(&source, header::CUSTOMER, "customer"),
            name: text(&source, header::NAME, "project name"),
            location: text(&source, header::LOCATION, "location"),
            date: text(&source, header::DATE, "date"),
            revision: text(&source, header::REVISION, "revision"),
            ..Default::default()
        };
        if workbook.sheet(project_data::SHEET).is_some() {
            project.company = text(project_data::SHEET, project_data::COMPANY, "company");
            project.estimator = text(project_data::SHEET, project_data::ESTIMATOR, "estimator");
        }
        if project.estimator.is_empty() {
            project.estimator = text(&source, header::INITIALS, "estimator initials");
        }

        for draft in std::mem::take(&mut self.areas) {
            let mut area = draft.area;
            area.line_items = draft.items.into_iter().map(|(_, _, item)| item).collect();
            match project.levels.last_mut() {
                Some(level) if level.name == draft.level => level.areas.push(area),
                _ => project.levels.push(Level {
                    name: draft.level,
                    areas: vec![area],
                }),
            }
        }
        project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::AreaOptions;
    use crate::synth::{synthesize, SynthesisConfig};
    use pretty_assertions::assert_eq;

    fn item(reference: &str, model: &str) -> LineItem {
        LineItem {
            reference: reference.into(),
            configuration: "WALL".into(),
            model: model.into(),
            width: 1500,
            length: 2000,
            height: 555,
            sections: 1,
            ..Default::default()
        }
    }

    fn project() -> Project {
        let mut suppressed = item("1.02", "KVI");
        suppressed.fire_suppression = true;
        suppressed.suppression_tanks = Some(2);
        Project {
            number: "J2002".into(),
            name: "Dock Street".into(),
            customer: "Acme".into(),
            company: "Halton".into(),
            estimator: "Joe Salloum".into(),
            location: "Hull".into(),
            date: "14/03/2025".into(),
            levels: vec![Level {
                name: "Ground".into(),
                areas: vec![Area {
                    name: "Main Kitchen".into(),
                    options: AreaOptions {
                        air_recovery: true,
                        uv_comparison: true,
                        ..Default::default()
                    },
                    line_items: vec![item("1.01", "KVF"), suppressed],
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    fn document(project: &Project) -> Workbook {
        synthesize(project, &Catalog::default(), &SynthesisConfig::default())
            .unwrap()
            .workbook
    }

    #[test]
    fn test_round_trip_structure() {
        let original = project();
        let extracted = extract(&document(&original)).unwrap();
        assert_eq!(extracted.version, SchemaVersion::CURRENT);
        assert_eq!(extracted.detection, Detection::Marker);
        assert!(extracted.warnings.is_empty(), "{:?}", extracted.warnings);
        assert_eq!(extracted.project.without_pricing(), original);
    }

    #[test]
    fn test_pricing_and_extra_over_present() {
        let extracted = extract(&document(&project())).unwrap();
        let area = &extracted.project.levels[0].areas[0];
        assert!(area.line_items.iter().all(|i| i.pricing.is_some()));
        assert!(area.line_items[1].suppression_pricing.is_some());
        // 1850 per participating item plus the dearer filter rate on length
        let extra = area.uv_extra_over.unwrap();
        assert!(extra.cost > 0.0);
    }

    #[test]
    fn test_no_blocks() {
        assert!(matches!(extract(&Workbook::new()), Err(ExtractionError::NoBlocks)));
    }

    #[test]
    fn test_unlinked_add_on_dropped_with_warning() {
        let mut wb = document(&project());
        let supp = "FIRE SUPP - Ground (1) - 1.02";
        let b12 = CellRef::new(12, 2);
        wb.sheet_mut(supp).unwrap().set(b12, "9.99");
        let extracted = extract(&wb).unwrap();
        let item = &extracted.project.levels[0].areas[0].line_items[1];
        assert!(!item.fire_suppression);
        assert_eq!(extracted.warnings.len(), 1);
        assert!(extracted.warnings[0].contains(supp));
    }

    #[test]
    fn test_all_validation_errors_reported() {
        let mut wb = document(&project());
        wb.sheet_mut("CANOPY - Ground (1) - 1.01")
            .unwrap()
            .set(header::SUBTOTAL_PRICE, "POA");
        wb.sheet_mut("CANOPY - Ground (1) - 1.02")
            .unwrap()
            .set(CellRef::new(14, 5), "wide");
        let err = extract(&wb).unwrap_err();
        assert_eq!(err.errors().len(), 2);
    }

    #[test]
    fn test_uncached_delta_is_recomputed() {
        let mut wb = document(&project());
        let expected = extract(&wb).unwrap().project.levels[0].areas[0].uv_extra_over;
        for cell in wb.sheet_mut(delta::SHEET).unwrap().cells.values_mut() {
            if let crate::workbook::Cell::Formula { cached, .. } = cell {
                *cached = None;
            }
        }
        let again = extract(&wb).unwrap().project.levels[0].areas[0].uv_extra_over;
        assert_eq!(again, expected);
    }
}
