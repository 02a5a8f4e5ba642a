//! Instantiation: one catalog block per (hierarchy node, kind)
//!
//! Walks the project in model order. Each line item takes a CANOPY block and,
//! when flagged, a row-aligned FIRE SUPP add-on. Each enabled subsystem takes
//! one block per area, and a UV comparison request takes a baseline and an
//! alternate block holding the participating line items slot by slot.

use std::collections::HashSet;

use tracing::debug;

use super::error::SynthesisError;
use super::naming::{branch_label, branch_title, BlockName};
use crate::catalog::BlockPool;
use crate::model::{estimator_initials, Area, LineItem, Project};
use crate::schema::{self, header, BlockKind, Field, SchemaVersion, Subtotals};
use crate::workbook::{Cell, Sheet, Workbook, WorkbookError};

/// A block that was taken from the catalog and renamed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub kind: BlockKind,
    pub sheet: String,
    pub level: String,
    pub area_index: usize,
    /// Slots holding line items (0 for subsystem blocks)
    pub slots_used: usize,
    pub subtotals: Subtotals,
}

/// Reject models that cannot produce a meaningful document
pub fn validate(project: &Project) -> Result<(), SynthesisError> {
    if project.levels.is_empty() {
        return Err(SynthesisError::EmptyProject);
    }
    for level in &project.levels {
        if level.areas.is_empty() {
            return Err(SynthesisError::EmptyLevel {
                level: level.name.clone(),
            });
        }
    }
    for (area_index, level, area) in project.indexed_areas() {
        if area.line_items.is_empty() && area.options.enabled().is_empty() {
            return Err(SynthesisError::empty_area(&level.name, &area.name));
        }
        let branch = branch_label(&level.name, area_index);
        for item in &area.line_items {
            if item.reference.trim().is_empty() {
                return Err(SynthesisError::invalid_line_item(
                    &branch,
                    &item.reference,
                    "reference is empty",
                ));
            }
            if item.suppression_tanks.is_some() && !item.fire_suppression {
                return Err(SynthesisError::invalid_line_item(
                    &branch,
                    &item.reference,
                    "suppression tanks given without fire suppression",
                ));
            }
        }
    }
    Ok(())
}

/// Allocate, rename and fill every block the project needs
pub fn instantiate(
    project: &Project,
    pool: &mut BlockPool,
    workbook: &mut Workbook,
) -> Result<Vec<Allocation>, SynthesisError> {
    validate(project)?;
    let mut instantiator = Instantiator {
        version: pool.version(),
        pool,
        workbook,
        project,
        allocations: Vec::new(),
        names: HashSet::new(),
    };
    for (area_index, level, area) in project.indexed_areas() {
        instantiator.area(&level.name, area_index, area)?;
    }
    Ok(instantiator.allocations)
}

struct Instantiator<'a> {
    version: SchemaVersion,
    pool: &'a mut BlockPool,
    workbook: &'a mut Workbook,
    project: &'a Project,
    allocations: Vec<Allocation>,
    names: HashSet<String>,
}

impl<'a> Instantiator<'a> {
    fn area(&mut self, level: &str, area_index: usize, area: &Area) -> Result<(), SynthesisError> {
        let branch = branch_label(level, area_index);
        let title = branch_title(level, &area.name);
        let version = self.version;

        for (i, item) in area.line_items.iter().enumerate() {
            let position = i as u32 + 1;
            let name = BlockName::new(BlockKind::Canopy, level, area_index)
                .with_reference(&item.reference);
            let (sheet, _) = self.claim(name, &branch, &title, 1)?;
            write_line_item(
                self.sheet(&sheet)?,
                BlockKind::Canopy,
                version,
                0,
                position,
                item,
                &item.model,
            );

            if item.fire_suppression {
                let name = BlockName::new(BlockKind::FireSuppression, level, area_index)
                    .with_reference(&item.reference);
                let (sheet, _) = self.claim(name, &branch, &title, 1)?;
                write_line_item(
                    self.sheet(&sheet)?,
                    BlockKind::FireSuppression,
                    version,
                    0,
                    position,
                    item,
                    &item.model,
                );
            }
        }

        for subsystem in area.options.enabled() {
            let name = BlockName::new(BlockKind::from_subsystem(subsystem), level, area_index);
            self.claim(name, &branch, &title, 0)?;
        }

        if area.options.uv_comparison {
            self.uv_pair(level, area_index, area, &branch, &title)?;
        }
        Ok(())
    }

    /// Baseline and alternate blocks for the line items that have a UV mapping
    fn uv_pair(
        &mut self,
        level: &str,
        area_index: usize,
        area: &Area,
        branch: &str,
        title: &str,
    ) -> Result<(), SynthesisError> {
        let participants: Vec<(u32, &LineItem, (&str, &str))> = area
            .line_items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                schema::uv_pair(&item.model).map(|codes| (i as u32 + 1, item, codes))
            })
            .collect();
        if participants.is_empty() {
            debug!(branch, "no UV-mapped line items, skipping comparison");
            return Ok(());
        }

        let version = self.version;
        for kind in [BlockKind::UvBaseline, BlockKind::UvAlternate] {
            let name = BlockName::new(kind, level, area_index);
            let (sheet, slots) = self.claim(name, branch, title, participants.len())?;
            if participants.len() > slots as usize {
                let needed = participants.len();
                return Err(SynthesisError::slots_exhausted(kind, branch, slots, needed));
            }
            let target = self.sheet(&sheet)?;
            for (slot, (position, item, (baseline, alternate))) in participants.iter().enumerate() {
                let model = if kind == BlockKind::UvBaseline { baseline } else { alternate };
                write_line_item(target, kind, version, slot as u32, *position, item, model);
            }
        }
        Ok(())
    }

    /// Allocate a block of `name.kind`, give it a unique canonical name and
    /// write the header. Returns the final sheet name and the block's slot count.
    fn claim(
        &mut self,
        name: BlockName,
        branch: &str,
        title: &str,
        slots_used: usize,
    ) -> Result<(String, u32), SynthesisError> {
        let kind = name.kind;
        let handle = self
            .pool
            .allocate(kind)
            .map_err(|e| SynthesisError::from_allocation(e, branch))?;

        let level = name.level.clone();
        let area_index = name.area_index;
        let mut candidate = name.to_string();
        let mut sequence = 2;
        while self.names.contains(&candidate) || self.workbook.position(&candidate).is_some() {
            candidate = name.clone().with_sequence(sequence).to_string();
            sequence += 1;
        }

        self.workbook.rename_sheet(&handle.sheet, &candidate)?;
        self.names.insert(candidate.clone());
        let project = self.project;
        write_header(self.sheet(&candidate)?, project, title);

        self.allocations.push(Allocation {
            kind,
            sheet: candidate.clone(),
            level,
            area_index,
            slots_used,
            subtotals: handle.subtotals,
        });
        Ok((candidate, handle.slots))
    }

    fn sheet(&mut self, name: &str) -> Result<&mut Sheet, SynthesisError> {
        self.workbook
            .sheet_mut(name)
            .ok_or_else(|| WorkbookError::not_found(name).into())
    }
}

/// Project header cells plus the branch title
pub fn write_header(sheet: &mut Sheet, project: &Project, title: &str) {
    sheet.set(header::TITLE, title);
    sheet.set(header::NUMBER, project.number.as_str());
    sheet.set(header::CUSTOMER, project.customer.as_str());
    sheet.set(header::INITIALS, estimator_initials(&project.estimator));
    sheet.set(header::NAME, project.name.as_str());
    sheet.set(header::LOCATION, project.location.as_str());
    sheet.set(header::DATE, project.date.as_str());
    if project.revision.is_empty() {
        sheet.clear(header::REVISION);
    } else {
        sheet.set(header::REVISION, project.revision.as_str());
    }
}

/// Write one line item into a slot according to the kind's field table
fn write_line_item(
    sheet: &mut Sheet,
    kind: BlockKind,
    version: SchemaVersion,
    slot: u32,
    position: u32,
    item: &LineItem,
    model: &str,
) {
    let anchor = schema::anchor(kind, version, slot);
    for (field, offset) in schema::offsets_for(kind, version) {
        let Some(at) = anchor.offset(offset.rows, offset.cols) else {
            continue;
        };
        let value: Option<Cell> = match field {
            Field::Position => Some(position.into()),
            Field::Reference => Some(item.reference.as_str().into()),
            Field::Configuration => Some(item.configuration.as_str().into()),
            Field::Model => Some(model.into()),
            Field::Width => Some(item.width.into()),
            Field::Length => Some(item.length.into()),
            Field::Height => Some(item.height.into()),
            Field::Sections => Some(item.sections.into()),
            Field::Lighting => item
                .lighting
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(Cell::from),
            Field::SuppressionSystem => item
                .suppression_tanks
                .map(|n| format!("{} TANK SYSTEM", n).into()),
            Field::TankQuantity => item.suppression_tanks.map(Cell::from),
            Field::CladdingKind => item.wall_cladding.as_ref().map(|c| c.kind.as_str().into()),
            Field::CladdingSize => item
                .wall_cladding
                .as_ref()
                .map(|c| format!("{}X{}", c.width, c.height).into()),
            Field::CladdingPositions => item.wall_cladding.as_ref().map(|c| {
                c.positions
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join("/")
                    .into()
            }),
        };
        match value {
            Some(cell) => sheet.set(at, cell),
            None => sheet.clear(at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::model::{AreaOptions, Level};
    use crate::workbook::{CellRef, Value};

    fn at(addr: &str) -> CellRef {
        CellRef::parse(addr).unwrap()
    }

    fn item(reference: &str, model: &str) -> LineItem {
        LineItem {
            reference: reference.to_string(),
            configuration: "WALL".to_string(),
            model: model.to_string(),
            width: 1815,
            length: 3000,
            height: 555,
            sections: 2,
            ..Default::default()
        }
    }

    fn project(areas: Vec<Area>) -> Project {
        Project {
            number: "J1001".into(),
            name: "Harbour Kitchen".into(),
            customer: "Acme".into(),
            estimator: "Joe Salloum".into(),
            location: "Leeds".into(),
            date: "01/02/2025".into(),
            levels: vec![Level {
                name: "Level 1".into(),
                areas,
            }],
            ..Default::default()
        }
    }

    fn run(project: &Project) -> Result<(Workbook, Vec<Allocation>), SynthesisError> {
        let catalog = Catalog::default();
        let mut wb = Workbook::new();
        let mut pool = BlockPool::open(&catalog, SchemaVersion::CURRENT, &mut wb)?;
        let allocations = instantiate(project, &mut pool, &mut wb)?;
        Ok((wb, allocations))
    }

    #[test]
    fn test_line_item_fields_written() {
        let mut canopy = item("1.01", "KVF");
        canopy.fire_suppression = true;
        canopy.suppression_tanks = Some(2);
        let p = project(vec![Area {
            name: "Kitchen".into(),
            line_items: vec![canopy],
            ..Default::default()
        }]);
        let (wb, allocations) = run(&p).unwrap();
        let names: Vec<&str> = allocations.iter().map(|a| a.sheet.as_str()).collect();
        assert_eq!(
            names,
            vec!["CANOPY - Level 1 (1) - 1.01", "FIRE SUPP - Level 1 (1) - 1.01"]
        );

        let sheet = wb.sheet("CANOPY - Level 1 (1) - 1.01").unwrap();
        assert_eq!(sheet.get(at("B1")), Some(&Cell::Text("Level 1 - Kitchen".into())));
        assert_eq!(sheet.get(at("C7")), Some(&Cell::Text("JS".into())));
        assert_eq!(sheet.get(at("B12")), Some(&Cell::Text("1.01".into())));
        assert_eq!(sheet.get(at("D14")), Some(&Cell::Text("KVF".into())));
        assert_eq!(sheet.get(at("E14")), Some(&Cell::Number(1815.0)));
        assert_eq!(sheet.get(at("A12")), Some(&Cell::Number(1.0)));

        let supp = wb.sheet("FIRE SUPP - Level 1 (1) - 1.01").unwrap();
        assert_eq!(supp.get(at("C17")), Some(&Cell::Number(2.0)));
        assert_eq!(supp.get(at("C16")), Some(&Cell::Text("2 TANK SYSTEM".into())));
        assert_eq!(supp.cached_value(at("B12")), Some(Value::Text("1.01".into())));
    }

    #[test]
    fn test_blank_lighting_leaves_cell_empty() {
        let mut blank = item("1.01", "KVF");
        blank.lighting = Some(" ".into());
        let mut lit = item("1.02", "KVF");
        lit.lighting = Some("LED".into());
        let p = project(vec![Area {
            name: "Kitchen".into(),
            line_items: vec![blank, lit],
            ..Default::default()
        }]);
        let (wb, _) = run(&p).unwrap();
        let c15 = at("C15");
        assert_eq!(wb.sheet("CANOPY - Level 1 (1) - 1.01").unwrap().get(c15), None);
        assert_eq!(
            wb.sheet("CANOPY - Level 1 (1) - 1.02").unwrap().get(c15),
            Some(&Cell::Text("LED".into()))
        );
    }

    #[test]
    fn test_colliding_names_get_sequence() {
        let p = project(vec![Area {
            name: "Kitchen".into(),
            line_items: vec![item("A", "KVF"), item("A", "KVI")],
            ..Default::default()
        }]);
        let (_, allocations) = run(&p).unwrap();
        assert_eq!(allocations[1].sheet, "CANOPY - Level 1 (1) - A [2]");
    }

    #[test]
    fn test_uv_pair_only_mapped_items() {
        let p = project(vec![Area {
            name: "Kitchen".into(),
            options: AreaOptions {
                uv_comparison: true,
                ..Default::default()
            },
            line_items: vec![item("1", "KVF"), item("2", "CMWF"), item("3", "KVI")],
            ..Default::default()
        }]);
        let (wb, allocations) = run(&p).unwrap();
        let alt = allocations
            .iter()
            .find(|a| a.kind == BlockKind::UvAlternate)
            .unwrap();
        assert_eq!(alt.slots_used, 2);
        let sheet = wb.sheet(&alt.sheet).unwrap();
        assert_eq!(sheet.get(at("D14")), Some(&Cell::Text("UVF".into())));
        assert_eq!(sheet.get(at("D31")), Some(&Cell::Text("UVI".into())));
        assert_eq!(sheet.get(at("B29")), Some(&Cell::Text("3".into())));
        // Third slot untouched
        assert_eq!(sheet.get(at("D48")), Some(&Cell::Text("CANOPY TYPE".into())));
    }

    #[test]
    fn test_uv_without_mapped_items_allocates_nothing() {
        let p = project(vec![Area {
            name: "Kitchen".into(),
            options: AreaOptions {
                uv_comparison: true,
                ..Default::default()
            },
            line_items: vec![item("1", "CMWI")],
            ..Default::default()
        }]);
        let (_, allocations) = run(&p).unwrap();
        assert!(allocations.iter().all(|a| !a.kind.is_delta()));
    }

    #[test]
    fn test_empty_area_rejected() {
        let p = project(vec![Area {
            name: "Store".into(),
            ..Default::default()
        }]);
        assert!(matches!(run(&p), Err(SynthesisError::EmptyArea { .. })));
    }

    #[test]
    fn test_tanks_without_flag_rejected() {
        let mut bad = item("1", "KVF");
        bad.suppression_tanks = Some(1);
        let p = project(vec![Area {
            name: "Kitchen".into(),
            line_items: vec![bad],
            ..Default::default()
        }]);
        assert!(matches!(run(&p), Err(SynthesisError::InvalidLineItem { .. })));
    }
}
