// =============================================================================
// Engine Data Record
// =============================================================================
//
// The flat record handed to the sampling engine. Field names on the wire
// follow the engine's data block exactly (`J`, `N`, `K`, `X`, `prior_PD`,
// `offset_`, ...) and the JSON layout is the one CmdStan reads: matrices as
// arrays of rows, integers for flags.
//
// =============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::Serialize;

use crate::error::{PolrError, Result};

/// Data block for the ordinal regression model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolrData {
    /// Number of outcome categories.
    #[serde(rename = "J")]
    pub j: usize,
    /// Number of observations.
    #[serde(rename = "N")]
    pub n: usize,
    /// Number of predictors (after dropping the intercept).
    #[serde(rename = "K")]
    pub k: usize,
    /// Orthonormalized predictors Q, N rows of length K.
    #[serde(rename = "X")]
    pub x: Vec<Vec<f64>>,
    /// Centering vector on the Q scale.
    pub xbar: Vec<f64>,
    /// Outcome codes, 1-based.
    pub y: Vec<i32>,
    /// 1 to sample from the prior only.
    #[serde(rename = "prior_PD")]
    pub prior_pd: i32,
    /// Link code, see `OrdinalLink::code`.
    pub link: i32,
    /// 0 = flat prior on coefficients, 1 = R2 prior.
    pub prior_dist: i32,
    /// Second Beta shape of the R2 prior (0 when `prior_dist = 0`).
    pub regularization: f64,
    /// Dirichlet concentrations, length J.
    pub prior_counts: Vec<f64>,
    pub is_skewed: i32,
    pub shape: f64,
    pub rate: f64,
    pub do_residuals: i32,
    pub has_weights: i32,
    /// Length N when `has_weights = 1`, otherwise empty.
    pub weights: Vec<f64>,
    pub has_offset: i32,
    /// Length N when `has_offset = 1`, otherwise empty.
    #[serde(rename = "offset_")]
    pub offset: Vec<f64>,
    #[serde(rename = "compute_mean_PPD")]
    pub compute_mean_ppd: i32,
}

impl PolrData {
    /// Output blocks to request from the engine, in the order the fit
    /// reports them.
    pub fn pars(&self) -> Vec<&'static str> {
        if self.j > 2 {
            vec!["beta", "zeta", "mean_PPD"]
        } else if self.is_skewed == 1 {
            vec!["zeta", "beta", "alpha", "mean_PPD"]
        } else {
            vec!["zeta", "beta", "mean_PPD"]
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write the record as a CmdStan JSON data file.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }
}

/// Convert an N × K matrix to the nested row layout.
pub(crate) fn matrix_rows(m: &Array2<f64>) -> Vec<Vec<f64>> {
    m.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Validate observation weights. Returns `None` when the weights are absent
/// or all equal to one, since the engine then skips them.
pub fn resolve_weights(weights: Option<&Array1<f64>>, n: usize) -> Result<Option<Vec<f64>>> {
    let w = match weights {
        Some(w) if !w.is_empty() => w,
        _ => return Ok(None),
    };
    if w.len() != n {
        return Err(PolrError::DimensionMismatch(format!(
            "weights has {} elements but y has {}",
            w.len(),
            n
        )));
    }
    if w.iter().any(|&v| !v.is_finite() || v < 0.0) {
        return Err(PolrError::InvalidValue(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    if w.iter().all(|&v| v == 1.0) {
        return Ok(None);
    }
    Ok(Some(w.to_vec()))
}

/// Validate an offset. Returns `None` when absent or identically zero.
pub fn resolve_offset(offset: Option<&Array1<f64>>, n: usize) -> Result<Option<Vec<f64>>> {
    let o = match offset {
        Some(o) if !o.is_empty() => o,
        _ => return Ok(None),
    };
    if o.len() != n {
        return Err(PolrError::DimensionMismatch(format!(
            "offset has {} elements but y has {}",
            o.len(),
            n
        )));
    }
    if o.iter().any(|v| !v.is_finite()) {
        return Err(PolrError::InvalidValue("offset must be finite".to_string()));
    }
    if o.iter().all(|&v| v == 0.0) {
        return Ok(None);
    }
    Ok(Some(o.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_record(j: usize, is_skewed: i32) -> PolrData {
        PolrData {
            j,
            n: 2,
            k: 1,
            x: vec![vec![-0.7071], vec![0.7071]],
            xbar: vec![1.5],
            y: vec![1, 2],
            prior_pd: 0,
            link: 1,
            prior_dist: 0,
            regularization: 0.0,
            prior_counts: vec![1.0; j],
            is_skewed,
            shape: 0.0,
            rate: 0.0,
            do_residuals: 0,
            has_weights: 0,
            weights: Vec::new(),
            has_offset: 0,
            offset: Vec::new(),
            compute_mean_ppd: 1,
        }
    }

    #[test]
    fn test_json_uses_engine_field_names() {
        let json = small_record(2, 0).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["J"], 2);
        assert_eq!(value["X"][1][0], 0.7071);
        assert_eq!(value["prior_PD"], 0);
        assert_eq!(value["compute_mean_PPD"], 1);
        assert!(value["offset_"].as_array().unwrap().is_empty());
        assert!(value.get("offset").is_none());
    }

    #[test]
    fn test_write_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        small_record(3, 0).write_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"prior_counts\":[1.0,1.0,1.0]"));
    }

    #[test]
    fn test_pars_order() {
        assert_eq!(small_record(4, 0).pars(), vec!["beta", "zeta", "mean_PPD"]);
        assert_eq!(small_record(2, 0).pars(), vec!["zeta", "beta", "mean_PPD"]);
        assert_eq!(small_record(2, 1).pars(), vec!["zeta", "beta", "alpha", "mean_PPD"]);
    }

    #[test]
    fn test_matrix_rows() {
        let rows = matrix_rows(&array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn test_unit_weights_dropped() {
        assert_eq!(resolve_weights(Some(&array![1.0, 1.0]), 2).unwrap(), None);
        assert_eq!(resolve_weights(None, 2).unwrap(), None);
        assert_eq!(
            resolve_weights(Some(&array![1.0, 2.0]), 2).unwrap(),
            Some(vec![1.0, 2.0])
        );
    }

    #[test]
    fn test_bad_weights() {
        assert!(matches!(
            resolve_weights(Some(&array![1.0, 2.0]), 3),
            Err(PolrError::DimensionMismatch(_))
        ));
        assert!(matches!(
            resolve_weights(Some(&array![1.0, -2.0]), 2),
            Err(PolrError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_zero_offset_dropped() {
        assert_eq!(resolve_offset(Some(&array![0.0, 0.0]), 2).unwrap(), None);
        assert_eq!(
            resolve_offset(Some(&array![0.0, 0.5]), 2).unwrap(),
            Some(vec![0.0, 0.5])
        );
        assert!(resolve_offset(Some(&array![0.5]), 2).is_err());
    }
}
