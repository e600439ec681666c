// =============================================================================
// Ordered Factor Response
// =============================================================================
//
// The outcome of an ordinal regression is an ordered categorical variable.
// Internally each observation is stored as a 0-based index into `levels`;
// the engine receives 1-based codes.
//
// A numeric response is representable (so a formula can point at a numeric
// column) but is rejected when the model is prepared.
// =============================================================================

use std::collections::HashMap;

use crate::error::{PolrError, Result};

/// An ordered categorical variable.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedFactor {
    levels: Vec<String>,
    codes: Vec<usize>,
}

impl OrderedFactor {
    /// Build a factor from string labels and the ordered list of levels.
    ///
    /// Every label must be one of `levels`. Levels that never occur are kept,
    /// which matters because they still receive a cutpoint.
    pub fn from_labels<S: AsRef<str>>(values: &[S], levels: &[String]) -> Result<Self> {
        let lookup = level_lookup(levels)?;
        let codes = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                lookup.get(v.as_ref()).copied().ok_or_else(|| {
                    PolrError::InvalidResponse(format!(
                        "observation {} has value '{}' which is not one of the levels {:?}",
                        i,
                        v.as_ref(),
                        levels
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        Ok(Self {
            levels: levels.to_vec(),
            codes,
        })
    }

    /// Build a factor from 0-based codes.
    pub fn from_codes(codes: Vec<usize>, levels: Vec<String>) -> Result<Self> {
        level_lookup(&levels)?;
        if let Some(&bad) = codes.iter().find(|&&c| c >= levels.len()) {
            return Err(PolrError::InvalidResponse(format!(
                "code {} is out of range for {} levels",
                bad,
                levels.len()
            )));
        }
        Ok(Self { levels, codes })
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    /// 0-based level index of each observation.
    pub fn codes(&self) -> &[usize] {
        &self.codes
    }

    /// Number of outcome categories (J).
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// 1-based codes, as the engine expects them.
    pub fn engine_codes(&self) -> Vec<i32> {
        self.codes.iter().map(|&c| c as i32 + 1).collect()
    }

    /// Observed count for each level.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.levels.len()];
        for &c in &self.codes {
            counts[c] += 1;
        }
        counts
    }
}

/// Validate levels and index them by name.
fn level_lookup(levels: &[String]) -> Result<HashMap<&str, usize>> {
    if levels.len() < 2 {
        return Err(PolrError::InvalidResponse(format!(
            "response must have at least 2 levels, found {}",
            levels.len()
        )));
    }
    let mut lookup = HashMap::with_capacity(levels.len());
    for (i, level) in levels.iter().enumerate() {
        if lookup.insert(level.as_str(), i).is_some() {
            return Err(PolrError::InvalidResponse(format!(
                "duplicated factor level '{}'",
                level
            )));
        }
    }
    Ok(lookup)
}

/// A response variable as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Factor(OrderedFactor),
    Numeric(Vec<f64>),
}

impl Response {
    pub fn len(&self) -> usize {
        match self {
            Response::Factor(f) => f.len(),
            Response::Numeric(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ordered factor, or an error when the response is not categorical.
    pub fn into_factor(self) -> Result<OrderedFactor> {
        match self {
            Response::Factor(f) => Ok(f),
            Response::Numeric(_) => Err(PolrError::InvalidResponse(
                "'y' must be a factor".to_string(),
            )),
        }
    }
}

impl From<OrderedFactor> for Response {
    fn from(f: OrderedFactor) -> Self {
        Response::Factor(f)
    }
}
