// =============================================================================
// Ordinal Regression Results
// =============================================================================
//
// Holds a fitted model: posterior draws on the original scale plus what is
// needed to summarize and predict.
// =============================================================================

use ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray2, PyArray3, PyReadonlyArray2};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use rustypolr_core::design::DesignMatrix;
use rustypolr_core::fit::PolrFit;

/// Results from fitting a Bayesian ordinal regression.
#[pyclass(name = "PolrResults")]
#[derive(Clone)]
pub struct PyPolrResults {
    pub(crate) fit: PolrFit,
}

impl PyPolrResults {
    pub(crate) fn new(fit: PolrFit) -> Self {
        Self { fit }
    }
}

#[pymethods]
impl PyPolrResults {
    /// Draws as an array of shape (iterations, chains, parameters).
    #[getter]
    fn draws<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray3<f64>> {
        self.fit.draws.values().clone().into_pyarray_bound(py)
    }

    /// Parameter names, matching the last axis of `draws`.
    #[getter]
    fn names(&self) -> Vec<String> {
        self.fit.draws.names().to_vec()
    }

    #[getter]
    fn levels(&self) -> Vec<String> {
        self.fit.levels.clone()
    }

    #[getter]
    fn column_names(&self) -> Vec<String> {
        self.fit.column_names.clone()
    }

    #[getter]
    fn link(&self) -> &str {
        self.fit.link.name()
    }

    #[getter]
    fn algorithm(&self) -> &str {
        self.fit.algorithm.name()
    }

    #[getter]
    fn nobs(&self) -> usize {
        self.fit.n_obs
    }

    /// Posterior means of the coefficients, in column order.
    #[getter]
    fn coefficients<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let beta = self.fit.coefficients().map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(beta.into_pyarray_bound(py))
    }

    /// Posterior means of the cutpoints (or the intercept for binary outcomes).
    #[getter]
    fn cutpoints<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        let zeta = self.fit.cutpoints().map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(zeta.into_pyarray_bound(py))
    }

    /// Draws of one parameter as (iterations, chains).
    fn draws_of<'py>(&self, py: Python<'py>, name: &str) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let column = self
            .fit
            .draws
            .column(name)
            .ok_or_else(|| PyValueError::new_err(format!("Unknown parameter '{}'", name)))?;
        Ok(column.to_owned().into_pyarray_bound(py))
    }

    /// Printable summary: priors, then mean / sd / median / MAD_SD /
    /// quantiles / R-hat per parameter.
    fn summary(&self) -> PyResult<String> {
        self.fit
            .summary_table()
            .map_err(|e| PyValueError::new_err(e.to_string()))
    }

    fn prior_summary(&self) -> String {
        self.fit.prior_info.to_string()
    }

    /// Central posterior intervals: (names, array of shape (n_params, 2)).
    #[pyo3(signature = (prob=0.9))]
    fn posterior_interval<'py>(
        &self,
        py: Python<'py>,
        prob: f64,
    ) -> PyResult<(Vec<String>, Bound<'py, PyArray2<f64>>)> {
        let intervals = self
            .fit
            .posterior_interval(prob)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let mut bounds = Array2::zeros((intervals.len(), 2));
        for (i, iv) in intervals.iter().enumerate() {
            bounds[[i, 0]] = iv.lower;
            bounds[[i, 1]] = iv.upper;
        }
        let names = intervals.into_iter().map(|iv| iv.name).collect();
        Ok((names, bounds.into_pyarray_bound(py)))
    }

    /// Category probabilities for new data, shape (n, levels).
    ///
    /// `x` must have the fitted columns in the same order; a leading
    /// "(Intercept)" column may be included and is ignored.
    fn predict_proba<'py>(
        &self,
        py: Python<'py>,
        x: PyReadonlyArray2<f64>,
        column_names: Vec<String>,
    ) -> PyResult<Bound<'py, PyArray2<f64>>> {
        let x = DesignMatrix::new(x.as_array().to_owned(), column_names)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let probs = self
            .fit
            .predict_proba(&x)
            .map_err(|e| PyValueError::new_err(format!("Prediction failed: {}", e)))?;
        Ok(probs.into_pyarray_bound(py))
    }

    fn __repr__(&self) -> String {
        format!(
            "PolrResults(link='{}', algorithm='{}', nobs={}, levels={})",
            self.fit.link,
            self.fit.algorithm,
            self.fit.n_obs,
            self.fit.levels.len()
        )
    }
}
