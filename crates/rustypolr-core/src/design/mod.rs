// =============================================================================
// Design Matrix and QR Reparameterization
// =============================================================================
//
// The engine never sees the raw predictors. Instead:
//
//   1. Any "(Intercept)" column is dropped. The cutpoints ζ play the role of
//      the intercept in a cumulative model, so a constant column would be
//      unidentified.
//
//   2. Columns are centered:   Xc = X − 1·x̄'
//
//   3. The centered matrix is factored:   Xc = Q R
//      Q has orthonormal columns, which gives the sampler a posterior with
//      much less correlation between coefficients than the raw X.
//
// The engine samples θ on the Q scale (Qθ = Xc β), so coefficients on the
// original scale are recovered afterwards as
//
//     β = R⁻¹ θ
//
// The centering vector is passed through the same map, x̄_Q = x̄' R⁻¹, so the
// engine can report cutpoints for the uncentered predictors.
//
// =============================================================================

use log::debug;
use ndarray::{Array1, Array2, Axis};

use crate::convert::{invert_upper_triangular, thin_qr};
use crate::error::{PolrError, Result};

/// Name of the constant column dropped before fitting.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// Relative tolerance on the diagonal of R below which the design is
/// considered rank deficient.
pub const RANK_TOLERANCE: f64 = 1e-7;

/// Predictor matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    values: Array2<f64>,
    column_names: Vec<String>,
}

impl DesignMatrix {
    pub fn new(values: Array2<f64>, column_names: Vec<String>) -> Result<Self> {
        if values.ncols() != column_names.len() {
            return Err(PolrError::DimensionMismatch(format!(
                "X has {} columns but {} column names were given",
                values.ncols(),
                column_names.len()
            )));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            let (row, col) = (pos / values.ncols().max(1), pos % values.ncols().max(1));
            return Err(PolrError::InvalidValue(format!(
                "X contains a non-finite value in row {}, column '{}'",
                row, column_names[col]
            )));
        }
        Ok(Self {
            values,
            column_names,
        })
    }

    /// Build from an unnamed matrix; columns are called `x1, x2, ...`.
    pub fn from_array(values: Array2<f64>) -> Result<Self> {
        let names = (1..=values.ncols()).map(|j| format!("x{}", j)).collect();
        Self::new(values, names)
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Remove a leading `(Intercept)` column if present.
    pub fn without_intercept(self) -> Self {
        if self.column_names.first().map(String::as_str) != Some(INTERCEPT_NAME) {
            return self;
        }
        debug!("dropping '{}' column from the design matrix", INTERCEPT_NAME);
        let values = self.values.slice(ndarray::s![.., 1..]).to_owned();
        let column_names = self.column_names[1..].to_vec();
        Self {
            values,
            column_names,
        }
    }

    /// Column means x̄.
    pub fn column_means(&self) -> Array1<f64> {
        self.values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.ncols()))
    }

    /// Subtract the column means; returns (centered matrix, x̄).
    pub fn centered(&self) -> (Array2<f64>, Array1<f64>) {
        let xbar = self.column_means();
        let centered = &self.values - &xbar.view().insert_axis(Axis(0));
        (centered, xbar)
    }

    /// Center and QR-decompose. See the module documentation.
    pub fn qr_transform(&self) -> Result<QrTransform> {
        let n = self.nrows();
        let k = self.ncols();
        if n == 0 {
            return Err(PolrError::EmptyInput("X has no rows".to_string()));
        }
        if k == 0 {
            return Ok(QrTransform::empty(n));
        }
        if n <= k {
            return Err(PolrError::DimensionMismatch(format!(
                "need more observations than predictors after centering ({} rows, {} predictors)",
                n, k
            )));
        }

        let (centered, xbar) = self.centered();
        let (q, r) = thin_qr(centered.view())?;
        let r_inv = invert_upper_triangular(&r, RANK_TOLERANCE)?;
        let xbar_q = xbar.dot(&r_inv);

        debug!(
            "QR reparameterization: n = {}, K = {}, |diag(R)| in [{:.3e}, {:.3e}]",
            n,
            k,
            r.diag().iter().fold(f64::INFINITY, |m, &d| m.min(d.abs())),
            r.diag().iter().fold(0.0f64, |m, &d| m.max(d.abs())),
        );

        Ok(QrTransform {
            q,
            r_inv,
            xbar,
            xbar_q,
            column_names: self.column_names.clone(),
        })
    }
}

/// Result of centering and QR-decomposing the predictors.
#[derive(Debug, Clone, PartialEq)]
pub struct QrTransform {
    /// Orthonormal predictors handed to the engine (N × K).
    pub q: Array2<f64>,
    /// R⁻¹ (K × K, upper triangular); maps Q-scale coefficients to β.
    pub r_inv: Array2<f64>,
    /// Column means of the original predictors.
    pub xbar: Array1<f64>,
    /// x̄' R⁻¹, the centering vector on the Q scale.
    pub xbar_q: Array1<f64>,
    /// Names of the original predictors, in column order.
    pub column_names: Vec<String>,
}

impl QrTransform {
    /// Transform for a model with no predictors.
    pub fn empty(n: usize) -> Self {
        Self {
            q: Array2::zeros((n, 0)),
            r_inv: Array2::zeros((0, 0)),
            xbar: Array1::zeros(0),
            xbar_q: Array1::zeros(0),
            column_names: Vec::new(),
        }
    }

    pub fn n_predictors(&self) -> usize {
        self.r_inv.nrows()
    }

    /// Map one Q-scale coefficient vector back to the original scale.
    pub fn untransform(&self, theta: &Array1<f64>) -> Result<Array1<f64>> {
        if theta.len() != self.n_predictors() {
            return Err(PolrError::DimensionMismatch(format!(
                "expected {} coefficients, got {}",
                self.n_predictors(),
                theta.len()
            )));
        }
        Ok(self.r_inv.dot(theta))
    }
}

// =============================================================================
// Tests
// =============================================================================
