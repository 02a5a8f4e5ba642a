//! A1-style cell addressing

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::WorkbookError;

/// A cell position, 1-based in both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    // Row first so that ordering walks the grid row by row
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an address such as `N9`, `$AA$120` or `b12`
    pub fn parse(text: &str) -> Result<Self, WorkbookError> {
        let cleaned: String = text.chars().filter(|c| *c != '$').collect();
        let split = cleaned
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| WorkbookError::invalid_address(text))?;
        let (letters, digits) = cleaned.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(WorkbookError::invalid_address(text));
        }
        let row: u32 = digits
            .parse()
            .map_err(|_| WorkbookError::invalid_address(text))?;
        if row == 0 {
            return Err(WorkbookError::invalid_address(text));
        }
        let col = column_index(letters).ok_or_else(|| WorkbookError::invalid_address(text))?;
        Ok(Self { row, col })
    }

    /// Move by a signed row/column offset; `None` when the result leaves the grid
    pub fn offset(self, rows: i32, cols: i32) -> Option<Self> {
        let row = i64::from(self.row) + i64::from(rows);
        let col = i64::from(self.col) + i64::from(cols);
        if row < 1 || col < 1 || row > i64::from(u32::MAX) || col > i64::from(u32::MAX) {
            return None;
        }
        Some(Self::new(row as u32, col as u32))
    }

    /// Column letters, e.g. `AA` for column 27
    pub fn column_name(&self) -> String {
        column_name(self.col)
    }
}

/// Convert column letters to a 1-based index
pub fn column_index(letters: &str) -> Option<u32> {
    let mut index: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let digit = c.to_ascii_uppercase() as u32 - 'A' as u32 + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    (index > 0).then_some(index)
}

/// Convert a 1-based column index to letters
pub fn column_name(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    letters.iter().rev().collect()
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row)
    }
}

impl FromStr for CellRef {
    type Err = WorkbookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CellRef {
    type Error = WorkbookError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CellRef> for String {
    fn from(value: CellRef) -> Self {
        value.to_string()
    }
}
