//! Costsheet - cost sheet synthesis and round-trip extraction
//!
//! This library turns a hierarchical project model into a spreadsheet-style
//! cost document built from a finite catalog of template blocks, and reads
//! such documents back into the model.
//!
//! # Example
//!
//! ```rust
//! use costsheet::{extract, synthesize, Catalog, SynthesisConfig};
//! use costsheet::model::{Area, Level, LineItem, Project};
//!
//! let project = Project {
//!     number: "J100".into(),
//!     date: "01/02/2025".into(),
//!     levels: vec![Level {
//!         name: "Ground".into(),
//!         areas: vec![Area {
//!             name: "Kitchen".into(),
//!             line_items: vec![LineItem {
//!                 reference: "1.01".into(),
//!                 model: "KVF".into(),
//!                 width: 1500,
//!                 length: 2000,
//!                 height: 555,
//!                 sections: 1,
//!                 ..Default::default()
//!             }],
//!             ..Default::default()
//!         }],
//!     }],
//!     ..Default::default()
//! };
//!
//! let document = synthesize(&project, &Catalog::default(), &SynthesisConfig::default()).unwrap();
//! let extracted = extract(&document.workbook).unwrap();
//! assert_eq!(extracted.project.without_pricing(), project);
//! ```

pub mod catalog;
pub mod error;
pub mod extract;
pub mod formula;
pub mod model;
pub mod palette;
pub mod revision;
pub mod schema;
pub mod synth;
pub mod totals;
pub mod workbook;

use std::path::{Path, PathBuf};

pub use catalog::{Catalog, CatalogError};
pub use error::FormulaError;
pub use extract::{extract, Extraction, ExtractionError, FieldValidationError};
pub use model::Project;
pub use palette::{Palette, PaletteError};
pub use revision::{create_revision, Revision, RevisionError};
pub use schema::{BlockKind, SchemaVersion};
pub use synth::{document_file_name, synthesize, Synthesis, SynthesisConfig, SynthesisError};
pub use totals::{calculate_totals, Totals};
pub use workbook::{Workbook, WorkbookError};

use thiserror::Error;
use tracing::info;

/// Errors from the file-level entry points
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("revision failed: {0}")]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Palette(#[from] PaletteError),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("failed to read project model: {0}")]
    Model(#[from] serde_json::Error),

    #[error("failed to access file: {0}")]
    Io(#[from] std::io::Error),
}

/// Read a JSON project model
pub fn load_project(path: &Path) -> Result<Project, EngineError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Synthesize a document and save it in `dir` under its canonical file name
pub fn synthesize_to_file(
    project: &Project,
    catalog: &Catalog,
    config: &SynthesisConfig,
    dir: &Path,
) -> Result<PathBuf, EngineError> {
    let synthesis = synthesize(project, catalog, config)?;
    let name = document_file_name(&project.number, &project.date, &project.revision);
    let path = dir.join(name);
    synthesis.workbook.save(&path)?;
    info!(path = %path.display(), "wrote document");
    Ok(path)
}

/// Load a document and extract its project model
pub fn extract_file(path: &Path) -> Result<Extraction, EngineError> {
    let workbook = Workbook::load(path)?;
    Ok(extract(&workbook)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Area, Level, LineItem};

    fn project() -> Project {
        Project {
            number: "J300".into(),
            date: "05/06/2025".into(),
            levels: vec![Level {
                name: "Ground".into(),
                areas: vec![Area {
                    name: "Bar".into(),
                    line_items: vec![LineItem {
                        reference: "B1".into(),
                        model: "KSR".into(),
                        width: 900,
                        length: 1200,
                        height: 450,
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
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (catalog, config) = (Catalog::default(), SynthesisConfig::default());
        let path = synthesize_to_file(&project(), &catalog, &config, dir.path()).unwrap();
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("J300 Cost Sheet 05062025.json")
        );
        let extracted = extract_file(&path).unwrap();
        assert_eq!(extracted.project.without_pricing(), project());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = extract_file(Path::new("/nonexistent/doc.json")).unwrap_err();
        assert!(matches!(err, EngineError::Workbook(WorkbookError::Io(_))));
    }
}
