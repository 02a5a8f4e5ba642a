//! Document synthesis
//!
//! Pipeline: open the catalog pool, instantiate blocks for the project, add
//! the project metadata page, build the delta and aggregation layers, then
//! organize. Any failure aborts the whole run before anything is written.

pub mod aggregate;
pub mod config;
pub mod delta;
pub mod error;
pub mod instantiate;
pub mod naming;
pub mod organize;

pub use aggregate::AggregationLayout;
pub use config::SynthesisConfig;
pub use error::SynthesisError;
pub use instantiate::Allocation;
pub use naming::{document_file_name, BlockName};
pub use organize::{organize, prune_unused, OrganizeReport};

use tracing::info;

use crate::catalog::{BlockPool, Catalog};
use crate::formula::recalculate;
use crate::model::Project;
use crate::schema::{project_data, SchemaVersion};
use crate::workbook::{CellRef, Sheet, Visibility, Workbook};

/// A synthesized document and what went into it
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub workbook: Workbook,
    pub allocations: Vec<Allocation>,
    pub layout: AggregationLayout,
    pub organized: OrganizeReport,
    pub pruned: usize,
}

pub fn synthesize(
    project: &Project,
    catalog: &Catalog,
    config: &SynthesisConfig,
) -> Result<Synthesis, SynthesisError> {
    info!(project = %project.number, version = %config.version, "synthesizing document");
    instantiate::validate(project)?;

    let mut workbook = Workbook::new();
    let mut pool = BlockPool::open(catalog, config.version, &mut workbook)?;
    let allocations = instantiate::instantiate(project, &mut pool, &mut workbook)?;

    workbook.add_sheet(project_data_sheet(project, config.version))?;
    let delta_total = delta::build(&mut workbook, &allocations)?;
    let layout = aggregate::build(&mut workbook, project, &allocations, delta_total)?;

    let organized = organize(&mut workbook, &config.palette);
    let pruned = if config.prune_unused {
        prune_unused(&mut workbook)
    } else {
        0
    };
    if config.recalculate {
        recalculate(&mut workbook);
    }

    info!(
        blocks = allocations.len(),
        pruned,
        sheets = workbook.sheets.len(),
        "synthesis complete"
    );
    Ok(Synthesis {
        workbook,
        allocations,
        layout,
        organized,
        pruned,
    })
}

fn project_data_sheet(project: &Project, version: SchemaVersion) -> Sheet {
    let mut sheet = Sheet::new(project_data::SHEET);
    sheet.visibility = Visibility::Hidden;
    let rows = [
        ("Company", project_data::COMPANY, project.company.as_str()),
        ("Estimator_Full_Name", project_data::ESTIMATOR, project.estimator.as_str()),
        ("Schema_Version", project_data::VERSION, version.as_str()),
    ];
    for (label, at, value) in rows {
        sheet.set(CellRef::new(at.row, 1), label);
        sheet.set(at, value);
    }
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Area, Level, LineItem};
    use crate::workbook::Value;

    fn project() -> Project {
        Project {
            number: "J77".into(),
            company: "Halton".into(),
            estimator: "Joe Salloum".into(),
            date: "02/03/2025".into(),
            levels: vec![Level {
                name: "Ground".into(),
                areas: vec![Area {
                    name: "Kitchen".into(),
                    line_items: vec![LineItem {
                        reference: "1.01".into(),
                        model: "KVF".into(),
                        width: 1000,
                        length: 2000,
                        height: 555,
                        sections: 1,
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_output() {
        let out = synthesize(&project(), &Catalog::default(), &SynthesisConfig::default()).unwrap();
        assert_eq!(
            out.workbook.sheet_names(),
            vec!["JOB TOTAL", "JOB_TOTAL_CALC", "ProjectData", "CANOPY - Ground (1) - 1.01"]
        );
        assert!(out.pruned > 0);

        let data = out.workbook.sheet(project_data::SHEET).unwrap();
        assert!(data.is_hidden());
        assert_eq!(data.cached_value(project_data::VERSION), Some(Value::Text("2025.1".into())));

        // 2000*0.42 + 1000*0.18 + 55 = 1075, priced at 1.35
        let total = out.workbook.sheet("JOB TOTAL").unwrap();
        assert_eq!(
            total.cached_value(crate::schema::header::SUBTOTAL_COST),
            Some(Value::Number(1075.0))
        );
        assert_eq!(
            total.cached_value(crate::schema::header::SUBTOTAL_PRICE),
            Some(Value::Number(1451.25))
        );
    }

    #[test]
    fn test_unpruned_keeps_hidden_remnants() {
        let config = SynthesisConfig::new().with_prune_unused(false);
        let out = synthesize(&project(), &Catalog::default(), &config).unwrap();
        let remnant = out.workbook.sheet("CANOPY #2").unwrap();
        assert!(remnant.is_hidden());
    }
}
