//! Typed field validation with error accumulation
//!
//! Every field read during extraction goes through [`validate`]. Failures are
//! collected in a [`ValidationReport`] so that one pass reports every problem.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::workbook::Value;

/// The type a field is expected to hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    Text,
    /// Non-negative whole number; `1815.0` is accepted as `1815`
    Integer,
    /// Any number; currency symbols and thousands separators are ignored
    Number,
    /// `2`, `2.0` or `"2 TANK"`
    TankQuantity,
    /// `"1000X2100"`
    Dimensions,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Expected::Text => "text",
            Expected::Integer => "integer",
            Expected::Number => "number",
            Expected::TankQuantity => "tank quantity",
            Expected::Dimensions => "dimensions (WIDTHxHEIGHT)",
        };
        write!(f, "{}", name)
    }
}

/// A successfully converted value
#[derive(Debug, Clone, PartialEq)]
pub enum Converted {
    /// Blank cell or whitespace-only text
    Absent,
    Text(String),
    Integer(u32),
    Number(f64),
    Dimensions(u32, u32),
}

/// One field that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValidationError {
    /// `Sheet!Cell`
    pub location: String,
    pub expected: Expected,
    pub found: String,
    pub context: String,
}

impl fmt::Display for FieldValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, found '{}' ({})",
            self.location, self.expected, self.found, self.context
        )
    }
}

impl std::error::Error for FieldValidationError {}

static TANKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*([0-9]+)(?:\.0+)?\s*(?:tanks?)?\s*$").expect("valid regex"));
static DIMENSIONS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]+)\s*[xX×]\s*([0-9]+)\s*$").expect("valid regex"));

/// Convert a raw cell value to the expected type
pub fn validate(
    location: &str,
    value: &Value,
    expected: Expected,
    context: &str,
) -> Result<Converted, FieldValidationError> {
    let fail = || FieldValidationError {
        location: location.to_string(),
        expected,
        found: value.to_string(),
        context: context.to_string(),
    };

    if value.is_blank() {
        return Ok(Converted::Absent);
    }

    match (expected, value) {
        (_, Value::Error(_)) => Err(fail()),

        (Expected::Text, Value::Text(s)) => Ok(Converted::Text(s.trim().to_string())),
        (Expected::Text, Value::Number(n)) => Ok(Converted::Text(format_number(*n))),
        (Expected::Text, Value::Bool(_)) => Ok(Converted::Text(value.to_string())),

        (Expected::Integer, Value::Number(n)) => whole(*n).map(Converted::Integer).ok_or_else(fail),
        (Expected::Integer, Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(whole)
            .map(Converted::Integer)
            .ok_or_else(fail),

        (Expected::Number, Value::Number(n)) => Ok(Converted::Number(*n)),
        (Expected::Number, Value::Text(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, '£' | '$' | '€' | ',') && !c.is_whitespace())
                .collect();
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(Converted::Number)
                .ok_or_else(fail)
        }

        (Expected::TankQuantity, Value::Number(n)) => {
            whole(*n).map(Converted::Integer).ok_or_else(fail)
        }
        (Expected::TankQuantity, Value::Text(s)) => TANKS
            .captures(s)
            .and_then(|c| c[1].parse().ok())
            .map(Converted::Integer)
            .ok_or_else(fail),

        (Expected::Dimensions, Value::Text(s)) => DIMENSIONS
            .captures(s)
            .and_then(|c| Some(Converted::Dimensions(c[1].parse().ok()?, c[2].parse().ok()?)))
            .ok_or_else(fail),

        _ => Err(fail()),
    }
}

fn whole(n: f64) -> Option<u32> {
    (n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then_some(n as u32)
}

/// Integral numbers print without a fractional part
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Accumulates validation failures across a whole extraction pass
#[derive(Debug, Default)]
pub struct ValidationReport {
    errors: Vec<FieldValidationError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record any failure; failures yield `None`
    pub fn check(
        &mut self,
        location: &str,
        value: &Value,
        expected: Expected,
        context: &str,
    ) -> Option<Converted> {
        match validate(location, value, expected, context) {
            Ok(converted) => Some(converted),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    /// Like [`check`](Self::check), but a blank value is also a failure
    pub fn require(
        &mut self,
        location: &str,
        value: &Value,
        expected: Expected,
        context: &str,
    ) -> Option<Converted> {
        match self.check(location, value, expected, context)? {
            Converted::Absent => {
                self.errors.push(FieldValidationError {
                    location: location.to_string(),
                    expected,
                    found: "<blank>".to_string(),
                    context: context.to_string(),
                });
                None
            }
            converted => Some(converted),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_errors(self) -> Vec<FieldValidationError> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workbook::CellError;

    fn ok(value: Value, expected: Expected) -> Converted {
        validate("S!A1", &value, expected, "test").unwrap()
    }

    #[test]
    fn test_integer_accepts_zero_fraction() {
        assert_eq!(ok(Value::Number(1815.0), Expected::Integer), Converted::Integer(1815));
        assert_eq!(ok(Value::Text("1815.0".into()), Expected::Integer), Converted::Integer(1815));
        assert!(validate("S!E14", &Value::Number(1815.5), Expected::Integer, "width").is_err());
    }

    #[test]
    fn test_blank_is_absent() {
        assert_eq!(ok(Value::Blank, Expected::Integer), Converted::Absent);
        assert_eq!(ok(Value::Text("   ".into()), Expected::Number), Converted::Absent);
    }

    #[test]
    fn test_number_strips_currency() {
        assert_eq!(
            ok(Value::Text("£1,250.50".into()), Expected::Number),
            Converted::Number(1250.5)
        );
    }

    #[test]
    fn test_tank_quantity_forms() {
        assert_eq!(ok(Value::Text("2 TANK".into()), Expected::TankQuantity), Converted::Integer(2));
        assert_eq!(
            ok(Value::Text("3 tanks".into()), Expected::TankQuantity),
            Converted::Integer(3)
        );
        assert_eq!(ok(Value::Number(1.0), Expected::TankQuantity), Converted::Integer(1));
        let two = Value::Text("two".into());
        assert!(validate("S!C17", &two, Expected::TankQuantity, "t").is_err());
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(
            ok(Value::Text("1000X2100".into()), Expected::Dimensions),
            Converted::Dimensions(1000, 2100)
        );
    }

    #[test]
    fn test_text_from_number() {
        assert_eq!(ok(Value::Number(1.0), Expected::Text), Converted::Text("1".into()));
        assert_eq!(ok(Value::Number(1.01), Expected::Text), Converted::Text("1.01".into()));
    }

    #[test]
    fn test_error_carries_details() {
        let poa = Value::Text("POA".into());
        let err = validate("CANOPY - L1 (1) - 1!N9", &poa, Expected::Number, "price").unwrap_err();
        assert_eq!(err.location, "CANOPY - L1 (1) - 1!N9");
        assert_eq!(err.found, "POA");
        assert_eq!(
            err.to_string(),
            "CANOPY - L1 (1) - 1!N9: expected number, found 'POA' (price)"
        );
        assert!(validate("S!A1", &Value::Error(CellError::Ref), Expected::Number, "x").is_err());
    }

    #[test]
    fn test_report_accumulates() {
        let mut report = ValidationReport::new();
        let x = Value::Text("x".into());
        assert_eq!(report.check("a", &x, Expected::Number, "c"), None);
        assert_eq!(report.require("b", &Value::Blank, Expected::Text, "c"), None);
        assert_eq!(
            report.check("c", &Value::Number(2.0), Expected::Integer, "c"),
            Some(Converted::Integer(2))
        );
        assert_eq!(report.len(), 2);
    }
}
