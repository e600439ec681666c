// =============================================================================
// Ordinal Regression Fitting Functions
// =============================================================================
//
// Three entry points:
//   - prepare_polr_py:     validation + QR, returns the engine data as JSON
//                          so Python can drive any engine itself
//   - recover_draws_py:    raw engine draws → original scale, final names
//   - fit_polr_cmdstan_py: the whole pipeline with a compiled CmdStan model
// =============================================================================

use ndarray::{Array1, Array2};
use numpy::{IntoPyArray, PyArray3, PyReadonlyArray1, PyReadonlyArray2, PyReadonlyArray3};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use rustypolr_core::backend::{Algorithm, CmdStanBackend, SamplingConfig, VariationalConfig};
use rustypolr_core::design::{DesignMatrix, QrTransform};
use rustypolr_core::draws::Draws;
use rustypolr_core::error::PolrError;
use rustypolr_core::fit::{prepare_polr, stan_polr_fit, PolrConfig};
use rustypolr_core::postprocess::recover_draws;
use rustypolr_core::prior::{Dirichlet, R2Prior, R2What};
use rustypolr_core::response::{OrderedFactor, Response};

use crate::links_py::link_from_name;
use crate::results_py::PyPolrResults;

fn py_err(context: &str, e: PolrError) -> PyErr {
    PyValueError::new_err(format!("{}: {}", context, e))
}

/// Build the fit configuration from keyword arguments.
#[allow(clippy::too_many_arguments)]
fn build_config(
    method: &str,
    prior_location: Option<f64>,
    prior_what: &str,
    prior_counts: Option<Vec<f64>>,
    shape: Option<f64>,
    rate: Option<f64>,
    prior_pd: bool,
    algorithm: &str,
) -> PyResult<PolrConfig> {
    let mut config = PolrConfig::default()
        .method(link_from_name(method)?)
        .prior_pd(prior_pd)
        .algorithm(Algorithm::from_name(algorithm).map_err(|e| py_err("Invalid algorithm", e))?);
    if let Some(location) = prior_location {
        let what = R2What::from_name(prior_what).map_err(|e| py_err("Invalid prior", e))?;
        config = config.prior(R2Prior::new(location, what));
    }
    if let Some(counts) = prior_counts {
        config = config.prior_counts(Dirichlet::new(counts));
    }
    config.shape = shape;
    config.rate = rate;
    Ok(config)
}

fn build_inputs(
    y: Vec<String>,
    levels: Vec<String>,
    x: PyReadonlyArray2<f64>,
    column_names: Vec<String>,
) -> PyResult<(DesignMatrix, Response)> {
    let factor = OrderedFactor::from_labels(&y, &levels).map_err(|e| py_err("Invalid response", e))?;
    let design = DesignMatrix::new(x.as_array().to_owned(), column_names)
        .map_err(|e| py_err("Invalid design matrix", e))?;
    Ok((design, factor.into()))
}

/// Validate inputs and build the engine data record.
///
/// Returns a dict with `data_json` (CmdStan JSON), `pars`, `q`, `r_inv`,
/// `xbar`, `column_names` and `levels`.
#[pyfunction]
#[pyo3(signature = (y, levels, x, column_names, weights=None, offset=None, method="logistic", prior_location=None, prior_what="mode", prior_counts=None, shape=None, rate=None, prior_pd=false))]
#[allow(clippy::too_many_arguments)]
pub fn prepare_polr_py<'py>(
    py: Python<'py>,
    y: Vec<String>,
    levels: Vec<String>,
    x: PyReadonlyArray2<f64>,
    column_names: Vec<String>,
    weights: Option<PyReadonlyArray1<f64>>,
    offset: Option<PyReadonlyArray1<f64>>,
    method: &str,
    prior_location: Option<f64>,
    prior_what: &str,
    prior_counts: Option<Vec<f64>>,
    shape: Option<f64>,
    rate: Option<f64>,
    prior_pd: bool,
) -> PyResult<Bound<'py, PyDict>> {
    let config = build_config(
        method, prior_location, prior_what, prior_counts, shape, rate, prior_pd, "sampling",
    )?;
    let (design, response) = build_inputs(y, levels, x, column_names)?;
    let weights: Option<Array1<f64>> = weights.map(|w| w.as_array().to_owned());
    let offset: Option<Array1<f64>> = offset.map(|o| o.as_array().to_owned());

    let prepared = prepare_polr(design, response, weights.as_ref(), offset.as_ref(), &config)
        .map_err(|e| py_err("Preprocessing failed", e))?;
    let data_json = prepared
        .data
        .to_json()
        .map_err(|e| py_err("Serializing engine data failed", e))?;

    let out = PyDict::new_bound(py);
    out.set_item("data_json", data_json)?;
    out.set_item("pars", prepared.pars.clone())?;
    out.set_item("q", prepared.transform.q.clone().into_pyarray_bound(py))?;
    out.set_item("r_inv", prepared.transform.r_inv.clone().into_pyarray_bound(py))?;
    out.set_item("xbar", prepared.transform.xbar.clone().into_pyarray_bound(py))?;
    out.set_item("column_names", prepared.transform.column_names.clone())?;
    out.set_item("levels", prepared.levels.clone())?;
    out.set_item("is_skewed", prepared.is_skewed())?;
    Ok(out)
}

/// Turn raw engine draws into original-scale draws with final names.
///
/// `raw` has shape (iterations, chains, parameters) with engine names
/// (`beta[1]`, `zeta[2]`, `lp__`, ...). Returns (draws, names).
#[pyfunction]
#[pyo3(signature = (raw, raw_names, r_inv, column_names, levels, skewed=false))]
pub fn recover_draws_py<'py>(
    py: Python<'py>,
    raw: PyReadonlyArray3<f64>,
    raw_names: Vec<String>,
    r_inv: PyReadonlyArray2<f64>,
    column_names: Vec<String>,
    levels: Vec<String>,
    skewed: bool,
) -> PyResult<(Bound<'py, PyArray3<f64>>, Vec<String>)> {
    let r_inv: Array2<f64> = r_inv.as_array().to_owned();
    let k = r_inv.nrows();
    if r_inv.ncols() != k || column_names.len() != k {
        return Err(PyValueError::new_err(format!(
            "r_inv must be {k} x {k} to match {} column names",
            column_names.len()
        )));
    }
    let transform = QrTransform {
        q: Array2::zeros((0, k)),
        r_inv,
        xbar: Array1::zeros(k),
        xbar_q: Array1::zeros(k),
        column_names,
    };
    let raw = Draws::new(raw.as_array().to_owned(), raw_names)
        .map_err(|e| py_err("Invalid draws", e))?;
    let draws = recover_draws(raw, &transform, &levels, skewed)
        .map_err(|e| py_err("Recovering draws failed", e))?;
    let names = draws.names().to_vec();
    Ok((draws.values().clone().into_pyarray_bound(py), names))
}

/// Fit a Bayesian ordinal regression with a compiled CmdStan model.
///
/// `algorithm` is 'sampling', 'meanfield' or 'fullrank'.
#[pyfunction]
#[pyo3(signature = (y, levels, x, column_names, executable, output_dir, weights=None, offset=None, method="logistic", prior_location=None, prior_what="mode", prior_counts=None, shape=None, rate=None, prior_pd=false, algorithm="sampling", chains=4, iter=2000, warmup=None, adapt_delta=0.99, max_treedepth=15, vb_iter=10000, tol_rel_obj=0.01, output_samples=1000, seed=None))]
#[allow(clippy::too_many_arguments)]
pub fn fit_polr_cmdstan_py(
    py: Python<'_>,
    y: Vec<String>,
    levels: Vec<String>,
    x: PyReadonlyArray2<f64>,
    column_names: Vec<String>,
    executable: &str,
    output_dir: &str,
    weights: Option<PyReadonlyArray1<f64>>,
    offset: Option<PyReadonlyArray1<f64>>,
    method: &str,
    prior_location: Option<f64>,
    prior_what: &str,
    prior_counts: Option<Vec<f64>>,
    shape: Option<f64>,
    rate: Option<f64>,
    prior_pd: bool,
    algorithm: &str,
    chains: usize,
    iter: usize,
    warmup: Option<usize>,
    adapt_delta: f64,
    max_treedepth: usize,
    vb_iter: usize,
    tol_rel_obj: f64,
    output_samples: usize,
    seed: Option<u64>,
) -> PyResult<PyPolrResults> {
    let config = build_config(
        method, prior_location, prior_what, prior_counts, shape, rate, prior_pd, algorithm,
    )?
    .sampling(SamplingConfig {
        chains,
        iter,
        warmup,
        adapt_delta,
        max_treedepth,
        seed,
        refresh: 0,
    })
    .variational(VariationalConfig {
        iter: vb_iter,
        tol_rel_obj,
        output_samples,
        eta: None,
        seed,
    });

    let (design, response) = build_inputs(y, levels, x, column_names)?;
    let weights: Option<Array1<f64>> = weights.map(|w| w.as_array().to_owned());
    let offset: Option<Array1<f64>> = offset.map(|o| o.as_array().to_owned());
    let backend = CmdStanBackend::new(executable, output_dir);

    // The engine runs in child processes; release the GIL meanwhile
    let fit = py
        .allow_threads(|| {
            stan_polr_fit(design, response, weights.as_ref(), offset.as_ref(), &config, &backend)
        })
        .map_err(|e| py_err("Ordinal regression fitting failed", e))?;
    Ok(PyPolrResults::new(fit))
}
