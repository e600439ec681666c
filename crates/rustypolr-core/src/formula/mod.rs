//! Formula front end for ordinal models.
//!
//! Parses formulas like `"rating ~ age + C(region) + age:income"` and
//! resolves them against a [`ModelFrame`] into a design matrix and response.
//!
//! An ordinal model never carries an intercept column (the cutpoints take
//! its place), so `0 +`, `- 1` and a bare `1` are accepted and ignored.

use std::collections::BTreeSet;

use log::debug;
use ndarray::{Array1, Array2};

use crate::design::DesignMatrix;
use crate::error::{PolrError, Result};
use crate::response::{OrderedFactor, Response};

/// One factor inside a term: a variable, possibly wrapped in `C(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Factor {
    pub name: String,
    /// Explicitly marked categorical with `C(...)`.
    pub categorical: bool,
}

/// A right-hand-side term: a main effect has one factor, an interaction
/// several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub factors: Vec<Factor>,
}

impl Term {
    pub fn is_interaction(&self) -> bool {
        self.factors.len() > 1
    }

    pub fn label(&self) -> String {
        self.factors
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Result of parsing a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFormula {
    pub response: String,
    pub terms: Vec<Term>,
}

/// Split the right-hand side on top-level '+' and '-', respecting
/// parentheses. Each term comes back with a flag that is true when it was
/// preceded by '-'.
fn split_terms(rhs: &str) -> Vec<(bool, String)> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut removed = false;
    let mut depth = 0i32;

    for c in rhs.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '+' | '-' if depth == 0 => {
                terms.push((removed, std::mem::take(&mut current)));
                removed = c == '-';
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    terms.push((removed, current));

    terms
        .into_iter()
        .map(|(removed, t)| (removed, t.trim().to_string()))
        .filter(|(_, t)| !t.is_empty())
        .collect()
}

fn parse_factor(raw: &str) -> Result<Factor> {
    let raw = raw.trim();
    if raw.starts_with("bs(") || raw.starts_with("ns(") || raw.starts_with("s(") {
        return Err(PolrError::Formula(format!(
            "spline term '{}' is not supported in ordinal models",
            raw
        )));
    }
    if let Some(inner) = raw.strip_prefix("C(").and_then(|r| r.strip_suffix(')')) {
        let name = inner.trim();
        if name.is_empty() {
            return Err(PolrError::Formula("empty C() term".to_string()));
        }
        return Ok(Factor { name: name.to_string(), categorical: true });
    }
    if raw.is_empty() || raw.contains(|c: char| "()~".contains(c)) {
        return Err(PolrError::Formula(format!("cannot parse term '{}'", raw)));
    }
    Ok(Factor { name: raw.to_string(), categorical: false })
}

/// Parse a formula string.
///
/// Handles main effects, `C(var)`, `a:b` (interaction only) and `a*b`
/// (main effects plus interaction). Repeated terms are kept once. The
/// intercept markers `0`, `1` and `- 1` may appear anywhere and are dropped.
pub fn parse_formula(formula: &str) -> Result<ParsedFormula> {
    let parts: Vec<&str> = formula.split('~').collect();
    if parts.len() != 2 {
        return Err(PolrError::Formula(format!(
            "formula must contain exactly one '~': {}",
            formula
        )));
    }
    let response = parts[0].trim().to_string();
    if response.is_empty() {
        return Err(PolrError::Formula("formula has no response".to_string()));
    }

    let mut terms: Vec<Term> = Vec::new();
    let mut push_term = |term: Term| {
        if !terms.contains(&term) {
            terms.push(term);
        }
    };

    for (removed, raw) in split_terms(parts[1]) {
        if raw == "0" || raw == "1" {
            continue;
        }
        if removed {
            return Err(PolrError::Formula(format!(
                "only the intercept can be removed, got '- {}'",
                raw
            )));
        }
        if raw.contains('*') {
            let factors = raw
                .split('*')
                .map(parse_factor)
                .collect::<Result<Vec<Factor>>>()?;
            for f in &factors {
                push_term(Term { factors: vec![f.clone()] });
            }
            push_term(Term { factors });
        } else {
            let factors = raw
                .split(':')
                .map(parse_factor)
                .collect::<Result<Vec<Factor>>>()?;
            push_term(Term { factors });
        }
    }

    Ok(ParsedFormula { response, terms })
}

// =============================================================================
// Model frame
// =============================================================================

/// A data column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    /// String values with their ordered levels.
    Categorical { values: Vec<String>, levels: Vec<String> },
}

impl Column {
    fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical { values, .. } => values.len(),
        }
    }
}

/// Named columns of equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelFrame {
    columns: Vec<(String, Column)>,
}

impl ModelFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nrows(&self) -> usize {
        self.columns.first().map(|(_, c)| c.len()).unwrap_or(0)
    }

    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    fn insert(mut self, name: &str, column: Column) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.nrows() {
            return Err(PolrError::DimensionMismatch(format!(
                "column '{}' has {} rows but the frame has {}",
                name,
                column.len(),
                self.nrows()
            )));
        }
        if self.get(name).is_some() {
            return Err(PolrError::InvalidValue(format!("duplicate column '{}'", name)));
        }
        self.columns.push((name.to_string(), column));
        Ok(self)
    }

    pub fn with_numeric(self, name: &str, values: Vec<f64>) -> Result<Self> {
        self.insert(name, Column::Numeric(values))
    }

    /// Add a categorical column. Without explicit `levels` the sorted unique
    /// values are used, so pass `levels` for an ordered outcome.
    pub fn with_categorical<S: AsRef<str>>(
        self,
        name: &str,
        values: &[S],
        levels: Option<Vec<String>>,
    ) -> Result<Self> {
        let values: Vec<String> = values.iter().map(|v| v.as_ref().to_string()).collect();
        let levels = match levels {
            Some(l) => l,
            None => values
                .iter()
                .cloned()
                .collect::<BTreeSet<String>>()
                .into_iter()
                .collect(),
        };
        if let Some(bad) = values.iter().find(|v| !levels.contains(v)) {
            return Err(PolrError::InvalidValue(format!(
                "column '{}' has value '{}' which is not among its levels",
                name, bad
            )));
        }
        self.insert(name, Column::Categorical { values, levels })
    }
}

// =============================================================================
// Design construction
// =============================================================================

/// Resolve a formula against a frame: (design matrix, response).
pub fn build_model(formula: &str, frame: &ModelFrame) -> Result<(DesignMatrix, Response)> {
    let parsed = parse_formula(formula)?;
    let n = frame.nrows();
    if n == 0 {
        return Err(PolrError::EmptyInput("the model frame has no rows".to_string()));
    }

    let response = match lookup(frame, &parsed.response)? {
        Column::Categorical { values, levels } => {
            Response::Factor(OrderedFactor::from_labels(values, levels)?)
        }
        Column::Numeric(v) => Response::Numeric(v.clone()),
    };

    let mut columns: Vec<Array1<f64>> = Vec::new();
    let mut names: Vec<String> = Vec::new();
    for term in &parsed.terms {
        let (cols, col_names) = term_columns(term, frame, n)?;
        for (c, name) in cols.into_iter().zip(col_names) {
            if names.contains(&name) {
                continue;
            }
            columns.push(c);
            names.push(name);
        }
    }

    let mut x = Array2::zeros((n, columns.len()));
    for (j, c) in columns.iter().enumerate() {
        x.column_mut(j).assign(c);
    }
    debug!("formula '{}' expanded to {} columns: {:?}", formula, names.len(), names);

    Ok((DesignMatrix::new(x, names)?, response))
}

fn lookup<'a>(frame: &'a ModelFrame, name: &str) -> Result<&'a Column> {
    frame.get(name).ok_or_else(|| {
        PolrError::Formula(format!(
            "variable '{}' not found; available columns are {:?}",
            name,
            frame.column_names()
        ))
    })
}

/// Columns contributed by one factor: a numeric column, or treatment-coded
/// dummies (first level is the reference).
fn factor_columns(factor: &Factor, frame: &ModelFrame) -> Result<(Vec<Array1<f64>>, Vec<String>)> {
    match lookup(frame, &factor.name)? {
        Column::Numeric(values) if !factor.categorical => {
            Ok((vec![Array1::from(values.clone())], vec![factor.name.clone()]))
        }
        Column::Numeric(values) => {
            let labels: Vec<String> = values.iter().map(|v| format!("{}", v)).collect();
            let mut distinct: Vec<f64> = values.clone();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup();
            let levels: Vec<String> = distinct.iter().map(|v| format!("{}", v)).collect();
            Ok(dummy_columns(&factor.name, &labels, &levels))
        }
        Column::Categorical { values, levels } => Ok(dummy_columns(&factor.name, values, levels)),
    }
}

fn dummy_columns(name: &str, values: &[String], levels: &[String]) -> (Vec<Array1<f64>>, Vec<String>) {
    levels
        .iter()
        .skip(1)
        .map(|level| {
            let col = values
                .iter()
                .map(|v| if v == level { 1.0 } else { 0.0 })
                .collect::<Array1<f64>>();
            (col, format!("{}[T.{}]", name, level))
        })
        .unzip()
}

/// Element-wise products across the factors of a term.
fn term_columns(term: &Term, frame: &ModelFrame, n: usize) -> Result<(Vec<Array1<f64>>, Vec<String>)> {
    let mut cols: Vec<Array1<f64>> = vec![Array1::ones(n)];
    let mut names: Vec<String> = vec![String::new()];

    for factor in &term.factors {
        let (fcols, fnames) = factor_columns(factor, frame)?;
        let mut next_cols = Vec::with_capacity(cols.len() * fcols.len());
        let mut next_names = Vec::with_capacity(cols.len() * fcols.len());
        for (c, name) in cols.iter().zip(&names) {
            for (fc, fname) in fcols.iter().zip(&fnames) {
                next_cols.push(c * fc);
                next_names.push(if name.is_empty() {
                    fname.clone()
                } else {
                    format!("{}:{}", name, fname)
                });
            }
        }
        cols = next_cols;
        names = next_names;
    }
    Ok((cols, names))
}
