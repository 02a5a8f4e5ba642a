//! Schema version detection

use tracing::warn;

use crate::schema::{project_data, SchemaVersion};
use crate::workbook::{Value, Workbook};

/// How the version was determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Marker,
    /// No readable marker; the legacy layout was assumed
    Fallback,
}

/// Read the version marker from the metadata page. Documents without a
/// recognisable marker are read with the legacy tables.
pub fn detect_version(workbook: &Workbook) -> (SchemaVersion, Detection) {
    let marker = workbook
        .sheet(project_data::SHEET)
        .and_then(|sheet| sheet.cached_value(project_data::VERSION));

    let parsed = match &marker {
        Some(Value::Text(text)) => SchemaVersion::parse(text),
        Some(Value::Number(n)) => SchemaVersion::parse(&n.to_string()),
        _ => None,
    };

    match parsed {
        Some(version) => (version, Detection::Marker),
        None => {
            warn!(
                marker = ?marker,
                assumed = %SchemaVersion::LEGACY,
                "no recognisable schema version marker"
            );
            (SchemaVersion::LEGACY, Detection::Fallback)
        }
    }
}
