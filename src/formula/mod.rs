//! Formula language: lexer, parser, printer and evaluator

pub mod ast;
pub mod eval;
pub mod grammar;
pub mod lexer;

pub use ast::{BinOp, Expr, Reference};
pub use eval::{recalculate, Evaluator};
pub use grammar::parse;

use crate::error::FormulaError;

/// Sheet-qualified reference text, always quoted: `'JOB TOTAL'!N9`
pub fn sheet_ref(sheet: &str, cell: impl std::fmt::Display) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cell)
}

/// Rewrite a formula with every unqualified reference moved down by `rows`
pub fn shift_rows(formula: &str, rows: i32) -> Result<String, FormulaError> {
    let mut expr = parse(formula)?;
    if !expr.shift_rows(rows) {
        return Err(FormulaError::syntax(
            0..formula.len(),
            format!("shifting by {} rows leaves the sheet", rows),
            Vec::new(),
        ));
    }
    Ok(format!("={}", expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_rows() {
        assert_eq!(
            shift_rows("=ROUND(K12*1.35,2)", 17).unwrap(),
            "=ROUND(K29*1.35,2)"
        );
        assert_eq!(
            shift_rows("=F14*0.42+E14*0.18+H14*55", 34).unwrap(),
            "=F48*0.42+E48*0.18+H48*55"
        );
    }

    #[test]
    fn test_shift_leaves_qualified_refs() {
        assert_eq!(
            shift_rows("='JOB TOTAL'!N9+A1", 2).unwrap(),
            "='JOB TOTAL'!N9+A3"
        );
    }

    #[test]
    fn test_shift_off_sheet_fails() {
        assert!(shift_rows("=A1", -1).is_err());
    }
}
