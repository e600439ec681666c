// =============================================================================
// RustyPolr Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `rustypolr-core` and exposes it as
// a Python module that can be imported with `import rustypolr`.
//
// STRUCTURE:
// ----------
// - links_py:   OrdinalLink class and link lookup
// - polr_py:    preprocessing, draw recovery and the CmdStan pipeline
// - results_py: PolrResults class
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `rustypolr-core` first
// 2. Create a Python wrapper in the matching *_py module
// 3. Register it in the `_rustypolr` function at the bottom
//
// =============================================================================

use pyo3::prelude::*;

mod links_py;
mod polr_py;
mod results_py;

use links_py::{available_links, PyOrdinalLink};
use polr_py::{fit_polr_cmdstan_py, prepare_polr_py, recover_draws_py};
use results_py::PyPolrResults;

/// RustyPolr: Bayesian ordinal regression glue with a Rust backend
///
/// This is the internal Rust module. Users should import from the
/// Python wrapper: `import rustypolr`
#[pymodule]
fn _rustypolr(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyOrdinalLink>()?;
    m.add_function(wrap_pyfunction!(available_links, m)?)?;

    m.add_class::<PyPolrResults>()?;
    m.add_function(wrap_pyfunction!(prepare_polr_py, m)?)?;
    m.add_function(wrap_pyfunction!(recover_draws_py, m)?)?;
    m.add_function(wrap_pyfunction!(fit_polr_cmdstan_py, m)?)?;

    Ok(())
}
