//! Read-through formula evaluation
//!
//! Evaluating a formula cell evaluates every formula it references, ignoring
//! whatever results are cached in the document. Results are memoized per
//! evaluator, so one evaluator should not outlive edits to its workbook.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::formula::ast::{BinOp, Expr, Reference};
use crate::formula::grammar::parse;
use crate::workbook::{Cell, CellError, CellRef, Value, Workbook};

type CellKey = (usize, CellRef);

pub struct Evaluator<'w> {
    workbook: &'w Workbook,
    memo: HashMap<CellKey, Value>,
    in_progress: HashSet<CellKey>,
    parsed: HashMap<String, Option<Expr>>,
}

impl<'w> Evaluator<'w> {
    pub fn new(workbook: &'w Workbook) -> Self {
        Self {
            workbook,
            memo: HashMap::new(),
            in_progress: HashSet::new(),
            parsed: HashMap::new(),
        }
    }

    /// Value of a cell addressed by sheet name; unknown sheets give `#REF!`
    pub fn cell_value(&mut self, sheet: &str, at: CellRef) -> Value {
        match self.workbook.position(sheet) {
            Some(index) => self.value_at(index, at),
            None => Value::Error(CellError::Ref),
        }
    }

    /// Evaluate formula text as if it lived on `sheet`
    pub fn evaluate(&mut self, sheet: &str, formula: &str) -> Value {
        let Some(index) = self.workbook.position(sheet) else {
            return Value::Error(CellError::Ref);
        };
        match parse(formula) {
            Ok(expr) => finish(self.eval(index, &expr)),
            Err(_) => Value::Error(CellError::Name),
        }
    }

    fn value_at(&mut self, sheet: usize, at: CellRef) -> Value {
        let workbook = self.workbook;
        let text = match workbook.sheets[sheet].get(at) {
            None => return Value::Blank,
            Some(Cell::Number(n)) => return Value::Number(*n),
            Some(Cell::Text(s)) => return Value::Text(s.clone()),
            Some(Cell::Bool(b)) => return Value::Bool(*b),
            Some(Cell::Formula { text, .. }) => text,
        };

        let key = (sheet, at);
        if let Some(v) = self.memo.get(&key) {
            return v.clone();
        }
        if !self.in_progress.insert(key) {
            return Value::Error(CellError::Cycle);
        }

        let expr = self
            .parsed
            .entry(text.clone())
            .or_insert_with(|| parse(text).ok())
            .clone();
        let value = match expr {
            Some(expr) => finish(self.eval(sheet, &expr)),
            None => Value::Error(CellError::Name),
        };

        self.in_progress.remove(&key);
        self.memo.insert(key, value.clone());
        value
    }

    fn resolve_sheet(&self, current: usize, reference: &Reference) -> Option<usize> {
        match &reference.sheet {
            Some(name) => self.workbook.position(name),
            None => Some(current),
        }
    }

    /// Values of every populated cell inside a reference, row-major
    fn range_values(
        &mut self,
        current: usize,
        reference: &Reference,
    ) -> Result<Vec<Value>, CellError> {
        let sheet = self
            .resolve_sheet(current, reference)
            .ok_or(CellError::Ref)?;
        let (top_left, bottom_right) = reference.bounds();
        let cells: Vec<CellRef> = self.workbook.sheets[sheet]
            .cells
            .keys()
            .filter(|c| {
                c.row >= top_left.row
                    && c.row <= bottom_right.row
                    && c.col >= top_left.col
                    && c.col <= bottom_right.col
            })
            .copied()
            .collect();
        Ok(cells.into_iter().map(|c| self.value_at(sheet, c)).collect())
    }

    fn eval(&mut self, sheet: usize, expr: &Expr) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Ref(r) => {
                if r.is_range() {
                    return Value::Error(CellError::Value);
                }
                match self.resolve_sheet(sheet, r) {
                    Some(target) => self.value_at(target, r.start),
                    None => Value::Error(CellError::Ref),
                }
            }
            Expr::Neg(inner) => match to_number(&self.eval(sheet, inner)) {
                Ok(n) => Value::Number(-n),
                Err(e) => Value::Error(e),
            },
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(sheet, lhs);
                let r = self.eval(sheet, rhs);
                binary(*op, &l, &r)
            }
            Expr::Call { name, args } => self.call(sheet, name, args),
        }
    }

    /// Numbers contributed by one aggregate argument; text and blanks inside
    /// ranges are skipped, errors propagate
    fn numbers_of(&mut self, sheet: usize, arg: &Expr) -> Result<Vec<f64>, CellError> {
        match arg {
            Expr::Ref(r) => {
                let mut out = Vec::new();
                for v in self.range_values(sheet, r)? {
                    match v {
                        Value::Number(n) => out.push(n),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
                Ok(out)
            }
            other => to_number(&self.eval(sheet, other)).map(|n| vec![n]),
        }
    }

    fn aggregate(
        &mut self,
        sheet: usize,
        args: &[Expr],
        combine: fn(&[f64]) -> f64,
    ) -> Value {
        let mut all = Vec::new();
        for arg in args {
            match self.numbers_of(sheet, arg) {
                Ok(nums) => all.extend(nums),
                Err(e) => return Value::Error(e),
            }
        }
        Value::Number(combine(&all))
    }

    fn call(&mut self, sheet: usize, name: &str, args: &[Expr]) -> Value {
        match (name, args.len()) {
            ("SUM", _) => self.aggregate(sheet, args, |n| n.iter().sum()),
            ("MAX", _) => self.aggregate(sheet, args, |n| {
                n.iter().copied().reduce(f64::max).unwrap_or(0.0)
            }),
            ("MIN", _) => self.aggregate(sheet, args, |n| {
                n.iter().copied().reduce(f64::min).unwrap_or(0.0)
            }),
            ("IF", 2) | ("IF", 3) => {
                let cond = self.eval(sheet, &args[0]);
                match to_bool(&cond) {
                    Ok(true) => self.eval(sheet, &args[1]),
                    Ok(false) => match args.get(2) {
                        Some(otherwise) => self.eval(sheet, otherwise),
                        None => Value::Bool(false),
                    },
                    Err(e) => Value::Error(e),
                }
            }
            ("IFERROR", 2) => match self.eval(sheet, &args[0]) {
                Value::Error(_) => self.eval(sheet, &args[1]),
                other => other,
            },
            ("ROUND", 2) => {
                let value = to_number(&self.eval(sheet, &args[0]));
                let digits = to_number(&self.eval(sheet, &args[1]));
                match (value, digits) {
                    (Ok(v), Ok(d)) => Value::Number(round_half_away(v, d as i32)),
                    (Err(e), _) | (_, Err(e)) => Value::Error(e),
                }
            }
            ("ABS", 1) => match to_number(&self.eval(sheet, &args[0])) {
                Ok(n) => Value::Number(n.abs()),
                Err(e) => Value::Error(e),
            },
            ("N", 1) => match self.eval(sheet, &args[0]) {
                Value::Number(n) => Value::Number(n),
                Value::Bool(b) => Value::Number(if b { 1.0 } else { 0.0 }),
                Value::Error(e) => Value::Error(e),
                Value::Text(_) | Value::Blank => Value::Number(0.0),
            },
            ("SUM" | "MAX" | "MIN" | "IF" | "IFERROR" | "ROUND" | "ABS" | "N", _) => {
                Value::Error(CellError::Value)
            }
            _ => Value::Error(CellError::Name),
        }
    }
}

/// A formula that resolves to a blank reference displays as zero
fn finish(value: Value) -> Value {
    match value {
        Value::Blank => Value::Number(0.0),
        other => other,
    }
}

fn round_half_away(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Arithmetic coercion: blanks are zero, booleans are 0/1, numeric text parses
pub fn to_number(value: &Value) -> Result<f64, CellError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Blank => Ok(0.0),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| CellError::Value),
        Value::Error(e) => Err(*e),
    }
}

fn to_bool(value: &Value) -> Result<bool, CellError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Blank => Ok(false),
        Value::Text(s) => match s.to_ascii_uppercase().as_str() {
            "TRUE" => Ok(true),
            "FALSE" => Ok(false),
            _ => Err(CellError::Value),
        },
        Value::Error(e) => Err(*e),
    }
}

fn binary(op: BinOp, l: &Value, r: &Value) -> Value {
    if let Value::Error(e) = l {
        return Value::Error(*e);
    }
    if let Value::Error(e) = r {
        return Value::Error(*e);
    }
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            let (a, b) = match (to_number(l), to_number(r)) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return Value::Error(e),
            };
            match op {
                BinOp::Add => Value::Number(a + b),
                BinOp::Sub => Value::Number(a - b),
                BinOp::Mul => Value::Number(a * b),
                _ if b == 0.0 => Value::Error(CellError::Div0),
                _ => Value::Number(a / b),
            }
        }
        _ => {
            let ordering = compare(l, r);
            let result = match op {
                BinOp::Eq => ordering == Ordering::Equal,
                BinOp::Ne => ordering != Ordering::Equal,
                BinOp::Lt => ordering == Ordering::Less,
                BinOp::Gt => ordering == Ordering::Greater,
                BinOp::Le => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Value::Bool(result)
        }
    }
}

/// Text sorts after numbers; text compares case-insensitively
fn compare(l: &Value, r: &Value) -> Ordering {
    fn as_text(v: &Value) -> Option<String> {
        match v {
            Value::Text(s) => Some(s.to_lowercase()),
            _ => None,
        }
    }
    match (as_text(l), as_text(r)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(a), None) if matches!(r, Value::Blank) => a.as_str().cmp(""),
        (None, Some(b)) if matches!(l, Value::Blank) => "".cmp(b.as_str()),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => {
            let a = to_number(l).unwrap_or(0.0);
            let b = to_number(r).unwrap_or(0.0);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
    }
}

/// Evaluate every formula and store the results as cached values.
/// Returns the number of formula cells updated.
pub fn recalculate(workbook: &mut Workbook) -> usize {
    let results: Vec<(usize, CellRef, Value)> = {
        let mut evaluator = Evaluator::new(workbook);
        let mut out = Vec::new();
        for (index, sheet) in workbook.sheets.iter().enumerate() {
            for (at, cell) in &sheet.cells {
                if matches!(cell, Cell::Formula { .. }) {
                    out.push((index, *at, evaluator.value_at(index, *at)));
                }
            }
        }
        out
    };

    let count = results.len();
    for (index, at, value) in results {
        if let Some(Cell::Formula { cached, .. }) = workbook.sheets[index].cells.get_mut(&at) {
            *cached = Some(value);
        }
    }
    count
}
