//! Document revisions
//!
//! A revision copies an existing document with a new revision letter and
//! date. Only the header revision and date cells change; every other cell,
//! formulas included, is carried over untouched. The source file is never
//! modified.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use thiserror::Error;
use tracing::info;

use crate::schema::header;
use crate::synth::{aggregate, document_file_name, BlockName};
use crate::workbook::{Value, Workbook, WorkbookError};

const DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("invalid revision tag '{tag}': expected a single letter A-Z")]
    InvalidTag { tag: String },

    #[error("revision '{requested}' does not come after current revision '{current}'")]
    NotAscending { current: String, requested: String },

    #[error("revision '{current}' is the last available revision")]
    Exhausted { current: String },

    #[error("invalid date '{date}': expected DD/MM/YYYY")]
    InvalidDate { date: String },

    #[error("document has no cost sheet blocks to revise")]
    NoBlocks,

    #[error("'{}' already exists", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error("failed to write revision: {0}")]
    Io(#[from] std::io::Error),
}

impl RevisionError {
    pub fn invalid_tag(tag: impl Into<String>) -> Self {
        Self::InvalidTag { tag: tag.into() }
    }

    pub fn invalid_date(date: impl Into<String>) -> Self {
        Self::InvalidDate { date: date.into() }
    }
}

/// Revision tag: the initial version, then `A` through `Z`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Revision(Option<char>);

impl Revision {
    pub const INITIAL: Revision = Revision(None);

    pub fn parse(tag: &str) -> Result<Self, RevisionError> {
        let trimmed = tag.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(Revision::INITIAL),
            (Some(c), None) if c.is_ascii_alphabetic() => {
                Ok(Revision(Some(c.to_ascii_uppercase())))
            }
            _ => Err(RevisionError::invalid_tag(tag)),
        }
    }

    pub fn next(&self) -> Result<Revision, RevisionError> {
        match self.0 {
            None => Ok(Revision(Some('A'))),
            Some('Z') => Err(RevisionError::Exhausted {
                current: self.to_string(),
            }),
            Some(c) => Ok(Revision(Some((c as u8 + 1) as char))),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(c) => write!(f, "{}", c),
            None => Ok(()),
        }
    }
}

/// Normalise a `DD/MM/YYYY` date, rejecting anything that is not a real date
pub fn normalize_date(date: &str) -> Result<String, RevisionError> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| RevisionError::invalid_date(date))
}

/// Write a revised copy of `path` next to it and return the new path.
/// Without a tag the next letter is used; without a date, today's.
pub fn create_revision(
    path: &Path,
    tag: Option<&str>,
    date: Option<&str>,
) -> Result<PathBuf, RevisionError> {
    let mut workbook = Workbook::load(path)?;
    let (number, current) = current_header(&workbook)?;

    let revision = match tag {
        Some(tag) => {
            let requested = Revision::parse(tag)?;
            if requested <= current {
                return Err(RevisionError::NotAscending {
                    current: current.to_string(),
                    requested: requested.to_string(),
                });
            }
            requested
        }
        None => current.next()?,
    };
    let date = match date {
        Some(date) => normalize_date(date)?,
        None => Local::now().date_naive().format(DATE_FORMAT).to_string(),
    };

    let patched = apply_revision(&mut workbook, revision, &date);
    let target = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(document_file_name(&number, &date, &revision.to_string()));
    write_new(&workbook, &target)?;

    info!(
        source = %path.display(),
        target = %target.display(),
        revision = %revision,
        sheets = patched,
        "created revision"
    );
    Ok(target)
}

/// Project number and current revision, read from the summary page or
/// the first block
fn current_header(workbook: &Workbook) -> Result<(String, Revision), RevisionError> {
    let source = workbook
        .sheets
        .iter()
        .find(|s| s.name == aggregate::SUMMARY_SHEET)
        .or_else(|| {
            workbook
                .sheets
                .iter()
                .find(|s| BlockName::parse(&s.name).is_some())
        })
        .ok_or(RevisionError::NoBlocks)?;
    let text = |at| match source.cached_value(at) {
        Some(Value::Text(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let revision = Revision::parse(&text(header::REVISION))?;
    Ok((text(header::NUMBER), revision))
}

/// Set revision and date on every block and the summary page. Returns the
/// number of sheets patched.
pub fn apply_revision(workbook: &mut Workbook, revision: Revision, date: &str) -> usize {
    let mut patched = 0;
    for sheet in &mut workbook.sheets {
        if sheet.name != aggregate::SUMMARY_SHEET && BlockName::parse(&sheet.name).is_none() {
            continue;
        }
        if revision.is_initial() {
            sheet.clear(header::REVISION);
        } else {
            sheet.set(header::REVISION, revision.to_string());
        }
        sheet.set(header::DATE, date);
        patched += 1;
    }
    patched
}

/// Persist through a temporary file in the target directory; never replaces
/// an existing file
fn write_new(workbook: &Workbook, target: &Path) -> Result<(), RevisionError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(workbook.to_json()?.as_bytes())?;
    file.persist_noclobber(target).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            RevisionError::AlreadyExists {
                path: target.to_path_buf(),
            }
        } else {
            RevisionError::Io(e.error)
        }
    })?;
    Ok(())
}
