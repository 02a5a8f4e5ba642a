//! Canonical block names
//!
//! `"{KIND} - {level} ({area index})[ - {reference}][ [n]]"`. The name is the
//! only thing extraction uses to place a block back into the hierarchy.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::BlockKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockName {
    pub kind: BlockKind,
    pub level: String,
    /// Project-wide 1-based area number
    pub area_index: usize,
    pub reference: Option<String>,
    /// Disambiguator for colliding names, starting at 2
    pub sequence: Option<usize>,
}

impl BlockName {
    pub fn new(kind: BlockKind, level: impl Into<String>, area_index: usize) -> Self {
        Self {
            kind,
            level: level.into(),
            area_index,
            reference: None,
            sequence: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.reference = (!reference.trim().is_empty()).then_some(reference);
        self
    }

    pub fn with_sequence(mut self, sequence: usize) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn parse(name: &str) -> Option<BlockName> {
        let caps = BLOCK_NAME.captures(name)?;
        let kind = BlockKind::from_label(&caps["kind"])?;
        Some(BlockName {
            kind,
            level: caps["level"].to_string(),
            area_index: caps["area"].parse().ok()?,
            reference: caps.name("reference").map(|m| m.as_str().to_string()),
            sequence: match caps.name("seq") {
                Some(m) => Some(m.as_str().parse().ok()?),
                None => None,
            },
        })
    }
}

impl fmt::Display for BlockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind.label();
        write!(f, "{} - {} ({})", label, self.level, self.area_index)?;
        if let Some(reference) = &self.reference {
            write!(f, " - {}", reference)?;
        }
        if let Some(seq) = self.sequence {
            write!(f, " [{}]", seq)?;
        }
        Ok(())
    }
}

static BLOCK_NAME: Lazy<Regex> = Lazy::new(|| {
    // Longest labels first so "CANOPY (UV)" is not read as "CANOPY"
    let mut labels: Vec<&str> = BlockKind::ALL.iter().map(|k| k.label()).collect();
    labels.sort_by_key(|l| std::cmp::Reverse(l.len()));
    let alternation = labels
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(
        r"^(?P<kind>{}) - (?P<level>.+?) \((?P<area>[0-9]+)\)(?: - (?P<reference>.+?))?(?: \[(?P<seq>[0-9]+)\])?$",
        alternation
    ))
    .expect("valid block name regex")
});

/// Branch label used in error messages and the delta page
pub fn branch_label(level: &str, area_index: usize) -> String {
    format!("{} ({})", level, area_index)
}

/// Branch title written to every block of an area
pub fn branch_title(level: &str, area: &str) -> String {
    format!("{} - {}", level, area)
}

/// `"{number} Cost Sheet {DDMMYYYY}[ Rev {tag}].json"`
pub fn document_file_name(number: &str, date: &str, revision: &str) -> String {
    let compact: String = date.chars().filter(|c| c.is_ascii_digit()).collect();
    if revision.is_empty() {
        format!("{} Cost Sheet {}.json", number, compact)
    } else {
        format!("{} Cost Sheet {} Rev {}.json", number, compact, revision)
    }
}
