//! Organizer: canonical sheet order, branch colors, hidden remnants
//!
//! Works on any document, not just freshly synthesized ones, so it classifies
//! sheets by name alone. Running it twice changes nothing the second time.

use std::collections::HashMap;

use tracing::debug;

use super::naming::BlockName;
use super::{aggregate, delta};
use crate::catalog::parse_catalog_sheet_name;
use crate::palette::Palette;
use crate::schema::project_data;
use crate::workbook::{Visibility, Workbook};

/// What one organizer pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub moves: usize,
    pub recolored: usize,
    pub hidden: usize,
}

impl OrganizeReport {
    pub fn is_noop(&self) -> bool {
        self.moves == 0 && self.recolored == 0 && self.hidden == 0
    }
}

const SUMMARY_ORDER: [&str; 4] = [
    aggregate::SUMMARY_SHEET,
    aggregate::CALC_SHEET,
    delta::SHEET,
    project_data::SHEET,
];

#[derive(Debug)]
enum Class {
    Summary(usize),
    Branch(BlockName),
    Other,
    Remnant(usize, usize),
}

fn classify(name: &str) -> Class {
    if let Some(rank) = SUMMARY_ORDER.iter().position(|s| *s == name) {
        return Class::Summary(rank);
    }
    if let Some(block) = BlockName::parse(name) {
        return Class::Branch(block);
    }
    if let Some((kind, ordinal)) = parse_catalog_sheet_name(name) {
        return Class::Remnant(kind.priority(), ordinal);
    }
    Class::Other
}

/// Put the document into canonical order, color branches and hide remnants
pub fn organize(workbook: &mut Workbook, palette: &Palette) -> OrganizeReport {
    let classes: Vec<Class> = workbook.sheets.iter().map(|s| classify(&s.name)).collect();

    // Levels rank by the first area index they own
    let mut level_rank: HashMap<&str, usize> = HashMap::new();
    for class in &classes {
        if let Class::Branch(block) = class {
            let rank = level_rank
                .entry(block.level.as_str())
                .or_insert(block.area_index);
            *rank = (*rank).min(block.area_index);
        }
    }

    let mut keyed: Vec<((usize, usize, usize, usize), usize)> = classes
        .iter()
        .enumerate()
        .map(|(index, class)| {
            let key = match class {
                Class::Summary(rank) => (0, *rank, 0, 0),
                Class::Branch(block) => (
                    1,
                    level_rank
                        .get(block.level.as_str())
                        .copied()
                        .unwrap_or(block.area_index),
                    block.area_index,
                    block.kind.priority(),
                ),
                Class::Other => (2, 0, 0, 0),
                Class::Remnant(priority, ordinal) => (3, *priority, *ordinal, 0),
            };
            (key, index)
        })
        .collect();
    // Stable: ties keep their current relative order
    keyed.sort_by_key(|(key, _)| *key);

    let target: Vec<String> = keyed
        .iter()
        .map(|(_, index)| workbook.sheets[*index].name.clone())
        .collect();

    let mut report = OrganizeReport::default();
    for (want, name) in target.iter().enumerate() {
        if let Some(current) = workbook.position(name) {
            if current != want {
                workbook.move_sheet(current, want);
                report.moves += 1;
            }
        }
    }

    for sheet in &mut workbook.sheets {
        match classify(&sheet.name) {
            Class::Branch(block) => {
                let color = palette.color_for(block.area_index);
                if sheet.tab_color.as_deref() != Some(color) {
                    sheet.tab_color = Some(color.to_string());
                    report.recolored += 1;
                }
            }
            Class::Remnant(..) => {
                if sheet.visibility != Visibility::Hidden {
                    sheet.visibility = Visibility::Hidden;
                    report.hidden += 1;
                }
            }
            _ => {}
        }
    }

    debug!(
        moves = report.moves,
        recolored = report.recolored,
        hidden = report.hidden,
        "organized workbook"
    );
    report
}

/// Delete hidden catalog remnants. Returns how many were removed.
pub fn prune_unused(workbook: &mut Workbook) -> usize {
    let before = workbook.sheets.len();
    workbook
        .sheets
        .retain(|s| !(s.is_hidden() && parse_catalog_sheet_name(&s.name).is_some()));
    before - workbook.sheets.len()
}
