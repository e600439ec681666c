// =============================================================================
// RustyPolr Core Library
// =============================================================================
//
// Pure Rust glue around a Bayesian proportional-odds model. The sampler is an
// external engine; this crate prepares what goes in and cleans up what comes
// out. No Python code involved.
//
// STRUCTURE:
// ----------
//   - links:       Ordinal link functions (logistic, probit, loglog, ...)
//   - response:    Ordered factor outcomes
//   - design:      Predictor matrix, centering and QR reparameterization
//   - prior:       R2 prior on coefficients, Dirichlet on cutpoints, scobit
//   - standata:    The flat data record sent to the engine
//   - backend:     Engine seam (trait), dispatch, CmdStan runner
//   - draws:       Posterior draws container
//   - postprocess: β = R⁻¹ θ and renaming of engine output
//   - fit:         End-to-end fitting and the fitted model
//   - formula:     R-style formula front end
//   - inference:   Posterior summaries and R-hat
//   - predict:     Category probabilities
//   - error:       Error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here
//   4. Update the Python bindings in the `rustypolr` crate
//
// =============================================================================

pub mod backend;
pub mod convert;
pub mod design;
pub mod draws;
pub mod error;
pub mod fit;
pub mod formula;
pub mod inference;
pub mod links;
pub mod postprocess;
pub mod predict;
pub mod prior;
pub mod response;
pub mod standata;

pub use backend::{
    check_draws, dispatch, Algorithm, CmdStanBackend, PosteriorBackend, SamplingConfig,
    VariationalConfig,
};
pub use design::{DesignMatrix, QrTransform};
pub use draws::Draws;
pub use error::{PolrError, Result};
pub use fit::{prepare_polr, stan_polr, stan_polr_fit, PolrConfig, PolrFit, PreparedPolr};
pub use formula::{build_model, parse_formula, ModelFrame};
pub use inference::{posterior_interval, summarize, summary_table, Interval, ParamSummary};
pub use links::OrdinalLink;
pub use postprocess::{recover_draws, relabel, untransform_beta};
pub use prior::{make_eta, Dirichlet, PriorInfo, R2Prior, R2What, SkewPrior};
pub use response::{OrderedFactor, Response};
pub use standata::PolrData;
