// =============================================================================
// Ordinal Link Wrapper
// =============================================================================

use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use rustypolr_core::links::OrdinalLink;

/// Look up a link by name, mapping the error for Python.
pub fn link_from_name(name: &str) -> PyResult<OrdinalLink> {
    OrdinalLink::from_name(name).map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Link between the linear predictor and cumulative probabilities.
///
/// One of 'logistic' (alias 'logit'), 'probit', 'loglog', 'cloglog', 'cauchit'.
#[pyclass(name = "OrdinalLink")]
#[derive(Clone)]
pub struct PyOrdinalLink {
    pub(crate) inner: OrdinalLink,
}

#[pymethods]
impl PyOrdinalLink {
    #[new]
    #[pyo3(signature = (name="logistic"))]
    fn new(name: &str) -> PyResult<Self> {
        Ok(Self { inner: link_from_name(name)? })
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    /// Integer code understood by the engine (1-5).
    fn code(&self) -> i32 {
        self.inner.code()
    }

    /// Cumulative distribution function F(x).
    fn cdf<'py>(&self, py: Python<'py>, x: PyReadonlyArray1<f64>) -> Bound<'py, PyArray1<f64>> {
        let x = x.as_array().to_owned();
        self.inner.cdf_array(&x).into_pyarray_bound(py)
    }

    /// Quantile function F⁻¹(p).
    fn quantile<'py>(&self, py: Python<'py>, p: PyReadonlyArray1<f64>) -> Bound<'py, PyArray1<f64>> {
        p.as_array()
            .mapv(|v| self.inner.quantile(v))
            .into_pyarray_bound(py)
    }

    fn __repr__(&self) -> String {
        format!("OrdinalLink('{}')", self.inner.name())
    }
}

/// Names of all supported links.
#[pyfunction]
pub fn available_links() -> Vec<&'static str> {
    OrdinalLink::ALL.iter().map(|l| l.name()).collect()
}
