//! In-memory tabular document: named sheets of A1-addressed cells
//!
//! A workbook is the unit that synthesis produces and extraction consumes.
//! It is persisted as JSON; formula cells keep both their text and the last
//! computed result so that a values-only reader sees the same numbers a
//! spreadsheet application would show.

pub mod address;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use address::CellRef;

/// Errors raised while manipulating or persisting a workbook
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error("invalid cell address '{address}'")]
    InvalidAddress { address: String },

    #[error("sheet '{name}' already exists")]
    DuplicateSheet { name: String },

    #[error("sheet '{name}' not found")]
    SheetNotFound { name: String },

    #[error("failed to access workbook file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed workbook JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkbookError {
    pub fn invalid_address(address: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
        }
    }

    pub fn duplicate(name: impl Into<String>) -> Self {
        Self::DuplicateSheet { name: name.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::SheetNotFound { name: name.into() }
    }
}

/// Spreadsheet error values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellError {
    Ref,
    Value,
    Div0,
    Name,
    Cycle,
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellError::Ref => write!(f, "#REF!"),
            CellError::Value => write!(f, "#VALUE!"),
            CellError::Div0 => write!(f, "#DIV/0!"),
            CellError::Name => write!(f, "#NAME?"),
            CellError::Cycle => write!(f, "#CYCLE!"),
        }
    }
}

/// The result of reading or evaluating a cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Blank,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(CellError),
}

impl Value {
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Blank => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Blank => Ok(()),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Stored cell content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Cell {
    Number(f64),
    Text(String),
    Bool(bool),
    Formula {
        /// Formula source including the leading `=`
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cached: Option<Value>,
    },
}

impl Cell {
    /// A formula cell without a cached result
    pub fn formula(text: impl Into<String>) -> Self {
        Cell::Formula {
            text: text.into(),
            cached: None,
        }
    }

    /// The value a values-only reader sees: literals as-is, formulas by their
    /// cached result (`None` when never computed)
    pub fn cached_value(&self) -> Option<Value> {
        match self {
            Cell::Number(n) => Some(Value::Number(*n)),
            Cell::Text(s) => Some(Value::Text(s.clone())),
            Cell::Bool(b) => Some(Value::Bool(*b)),
            Cell::Formula { cached, .. } => cached.clone(),
        }
    }

    pub fn formula_text(&self) -> Option<&str> {
        match self {
            Cell::Formula { text, .. } => Some(text),
            _ => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Cell::Number(f64::from(value))
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// One named page of the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_color: Option<String>,
    #[serde(default)]
    pub cells: BTreeMap<CellRef, Cell>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Visible,
            tab_color: None,
            cells: BTreeMap::new(),
        }
    }

    pub fn get(&self, at: CellRef) -> Option<&Cell> {
        self.cells.get(&at)
    }

    pub fn set(&mut self, at: CellRef, cell: impl Into<Cell>) {
        self.cells.insert(at, cell.into());
    }

    pub fn set_formula(&mut self, at: CellRef, text: impl Into<String>) {
        self.cells.insert(at, Cell::formula(text));
    }

    pub fn clear(&mut self, at: CellRef) {
        self.cells.remove(&at);
    }

    /// Values-only read; missing cells are blank
    pub fn cached_value(&self, at: CellRef) -> Option<Value> {
        match self.cells.get(&at) {
            Some(cell) => cell.cached_value(),
            None => Some(Value::Blank),
        }
    }

    pub fn is_hidden(&self) -> bool {
        self.visibility == Visibility::Hidden
    }
}

/// An ordered collection of uniquely named sheets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name == name)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Append a sheet, returning its index
    pub fn add_sheet(&mut self, sheet: Sheet) -> Result<usize, WorkbookError> {
        if self.position(&sheet.name).is_some() {
            return Err(WorkbookError::duplicate(&sheet.name));
        }
        self.sheets.push(sheet);
        Ok(self.sheets.len() - 1)
    }

    pub fn remove_sheet(&mut self, name: &str) -> Result<Sheet, WorkbookError> {
        let index = self
            .position(name)
            .ok_or_else(|| WorkbookError::not_found(name))?;
        Ok(self.sheets.remove(index))
    }

    pub fn rename_sheet(&mut self, from: &str, to: &str) -> Result<(), WorkbookError> {
        if from == to {
            return Ok(());
        }
        if self.position(to).is_some() {
            return Err(WorkbookError::duplicate(to));
        }
        let sheet = self
            .sheet_mut(from)
            .ok_or_else(|| WorkbookError::not_found(from))?;
        sheet.name = to.to_string();
        Ok(())
    }

    /// Move the sheet at `from` so that it ends up at index `to`
    pub fn move_sheet(&mut self, from: usize, to: usize) {
        if from == to || from >= self.sheets.len() || to >= self.sheets.len() {
            return;
        }
        let sheet = self.sheets.remove(from);
        self.sheets.insert(to, sheet);
    }

    pub fn from_json(content: &str) -> Result<Self, WorkbookError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn to_json(&self) -> Result<String, WorkbookError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, WorkbookError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> Result<(), WorkbookError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
