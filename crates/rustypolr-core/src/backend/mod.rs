// =============================================================================
// Engine Backends
// =============================================================================
//
// The sampler itself lives outside this crate. A backend takes the data
// record and the list of output blocks and returns draws named the way the
// engine names them (`beta[1]`, `zeta[2]`, `alpha`, `mean_PPD[3]`, `lp__`).
//
// Two inference modes are dispatched:
//
//   - Sampling:             full MCMC, several chains
//   - Meanfield / Fullrank: variational approximation, one set of draws
//                           from the fitted Gaussian (reported as one chain)
//
// =============================================================================

mod cmdstan;

pub use cmdstan::{parse_stan_csv, CmdStanBackend};

use std::fmt;

use log::info;

use crate::draws::Draws;
use crate::error::{PolrError, Result};
use crate::standata::PolrData;

/// Name of the log-density column in engine output.
pub const LOG_DENSITY: &str = "lp__";

/// Inference algorithm requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    Sampling,
    Meanfield,
    Fullrank,
}

impl Algorithm {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "sampling" => Ok(Algorithm::Sampling),
            "meanfield" => Ok(Algorithm::Meanfield),
            "fullrank" => Ok(Algorithm::Fullrank),
            _ => Err(PolrError::InvalidValue(format!(
                "Unknown algorithm '{}'. Use 'sampling', 'meanfield', or 'fullrank'.",
                name
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sampling => "sampling",
            Algorithm::Meanfield => "meanfield",
            Algorithm::Fullrank => "fullrank",
        }
    }

    pub fn is_variational(self) -> bool {
        !matches!(self, Algorithm::Sampling)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Settings for MCMC sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Number of independent chains.
    /// Default: 4
    pub chains: usize,

    /// Total iterations per chain, warmup included.
    /// Default: 2000
    pub iter: usize,

    /// Warmup iterations per chain. `None` means half of `iter`.
    pub warmup: Option<usize>,

    /// Target acceptance rate during adaptation. Ordinal models have
    /// awkward posterior geometry near the cutpoints, so the default is high.
    /// Default: 0.99
    pub adapt_delta: f64,

    /// Maximum tree depth of the NUTS trajectory.
    /// Default: 15
    pub max_treedepth: usize,

    /// Random seed; chain c uses the engine's stream `c`.
    pub seed: Option<u64>,

    /// Progress print interval (0 = silent).
    /// Default: 0
    pub refresh: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            chains: 4,
            iter: 2000,
            warmup: None,
            adapt_delta: 0.99,
            max_treedepth: 15,
            seed: None,
            refresh: 0,
        }
    }
}

impl SamplingConfig {
    pub fn warmup(&self) -> usize {
        self.warmup.unwrap_or(self.iter / 2)
    }

    /// Post-warmup draws kept per chain.
    pub fn draws_per_chain(&self) -> usize {
        self.iter.saturating_sub(self.warmup())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chains == 0 {
            return Err(PolrError::InvalidValue("chains must be at least 1".to_string()));
        }
        if self.warmup() >= self.iter {
            return Err(PolrError::InvalidValue(format!(
                "warmup ({}) must be smaller than iter ({})",
                self.warmup(),
                self.iter
            )));
        }
        if !(self.adapt_delta > 0.0 && self.adapt_delta < 1.0) {
            return Err(PolrError::InvalidValue(format!(
                "adapt_delta must be in (0, 1), got {}",
                self.adapt_delta
            )));
        }
        if self.max_treedepth == 0 {
            return Err(PolrError::InvalidValue(
                "max_treedepth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for the variational approximations.
#[derive(Debug, Clone, PartialEq)]
pub struct VariationalConfig {
    /// Maximum optimizer iterations.
    /// Default: 10000
    pub iter: usize,

    /// Relative ELBO change at which optimization stops.
    /// Default: 0.01
    pub tol_rel_obj: f64,

    /// Draws taken from the fitted approximation.
    /// Default: 1000
    pub output_samples: usize,

    /// Step size. `None` lets the engine adapt it.
    pub eta: Option<f64>,

    pub seed: Option<u64>,
}

impl Default for VariationalConfig {
    fn default() -> Self {
        Self {
            iter: 10000,
            tol_rel_obj: 0.01,
            output_samples: 1000,
            eta: None,
            seed: None,
        }
    }
}

impl VariationalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.iter == 0 || self.output_samples == 0 {
            return Err(PolrError::InvalidValue(
                "variational iter and output_samples must be at least 1".to_string(),
            ));
        }
        if !(self.tol_rel_obj > 0.0) {
            return Err(PolrError::InvalidValue(format!(
                "tol_rel_obj must be positive, got {}",
                self.tol_rel_obj
            )));
        }
        if let Some(eta) = self.eta {
            if !(eta > 0.0) {
                return Err(PolrError::InvalidValue(format!("eta must be positive, got {}", eta)));
            }
        }
        Ok(())
    }
}

/// An external engine able to fit the ordinal model.
///
/// Implementations must return draws for every block in `pars` plus the
/// log density `lp__`, using the engine's own element names.
pub trait PosteriorBackend {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Run MCMC.
    fn sample(&self, data: &PolrData, pars: &[&str], config: &SamplingConfig) -> Result<Draws>;

    /// Fit a variational approximation (`algorithm` is Meanfield or Fullrank)
    /// and draw from it.
    fn variational(
        &self,
        data: &PolrData,
        pars: &[&str],
        algorithm: Algorithm,
        config: &VariationalConfig,
    ) -> Result<Draws>;
}

/// Send the record to the backend using the requested algorithm and check
/// what comes back.
pub fn dispatch(
    backend: &dyn PosteriorBackend,
    data: &PolrData,
    algorithm: Algorithm,
    sampling: &SamplingConfig,
    variational: &VariationalConfig,
) -> Result<Draws> {
    let pars = data.pars();
    let draws = match algorithm {
        Algorithm::Sampling => {
            sampling.validate()?;
            info!(
                "{}: sampling {} chains x {} iterations (N = {}, K = {}, J = {})",
                backend.name(),
                sampling.chains,
                sampling.iter,
                data.n,
                data.k,
                data.j
            );
            backend.sample(data, &pars, sampling)?
        }
        Algorithm::Meanfield | Algorithm::Fullrank => {
            variational.validate()?;
            info!(
                "{}: {} variational approximation (N = {}, K = {}, J = {})",
                backend.name(),
                algorithm,
                data.n,
                data.k,
                data.j
            );
            backend.variational(data, &pars, algorithm, variational)?
        }
    };
    check_draws(&draws, &pars)?;
    Ok(draws)
}

/// Reject engine output that cannot be post-processed: no draws, a missing
/// block, or non-finite values in a requested block.
pub fn check_draws(draws: &Draws, pars: &[&str]) -> Result<()> {
    if draws.n_iterations() == 0 || draws.n_chains() == 0 {
        return Err(PolrError::Backend("the engine returned no draws".to_string()));
    }
    for block in pars.iter().copied().chain(std::iter::once(LOG_DENSITY)) {
        let indices = draws.block_indices(block);
        if indices.is_empty() {
            // β is legitimately empty when there are no predictors
            if block == "beta" {
                continue;
            }
            return Err(PolrError::Backend(format!(
                "the engine output has no '{}' parameter",
                block
            )));
        }
        if block == LOG_DENSITY {
            continue;
        }
        for &i in &indices {
            let name = &draws.names()[i];
            let bad = draws
                .column(name)
                .map(|col| col.iter().any(|v| !v.is_finite()))
                .unwrap_or(false);
            if bad {
                return Err(PolrError::Backend(format!(
                    "the engine returned non-finite draws for '{}'",
                    name
                )));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn draws(names: &[&str]) -> Draws {
        Draws::new(
            Array3::from_elem((2, 1, names.len()), 0.5),
            names.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_algorithm_names() {
        assert_eq!(Algorithm::from_name("FullRank").unwrap(), Algorithm::Fullrank);
        assert!(Algorithm::Meanfield.is_variational());
        assert!(!Algorithm::Sampling.is_variational());
        assert!(Algorithm::from_name("optimizing").is_err());
    }

    #[test]
    fn test_sampling_defaults() {
        let c = SamplingConfig::default();
        assert_eq!(c.warmup(), 1000);
        assert_eq!(c.draws_per_chain(), 1000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_sampling_validation() {
        let c = SamplingConfig { warmup: Some(2000), ..Default::default() };
        assert!(c.validate().is_err());
        let c = SamplingConfig { adapt_delta: 1.0, ..Default::default() };
        assert!(c.validate().is_err());
        let c = SamplingConfig { chains: 0, ..Default::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_variational_validation() {
        assert!(VariationalConfig::default().validate().is_ok());
        let c = VariationalConfig { eta: Some(-1.0), ..Default::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_check_draws_accepts_complete_output() {
        let d = draws(&["lp__", "beta[1]", "zeta[1]", "zeta[2]", "mean_PPD[1]"]);
        assert!(check_draws(&d, &["beta", "zeta", "mean_PPD"]).is_ok());
    }

    #[test]
    fn test_check_draws_missing_block() {
        let d = draws(&["lp__", "beta[1]", "mean_PPD[1]"]);
        let err = check_draws(&d, &["beta", "zeta", "mean_PPD"]).unwrap_err();
        assert!(err.to_string().contains("'zeta'"));
    }

    #[test]
    fn test_check_draws_missing_log_density() {
        let d = draws(&["zeta[1]", "mean_PPD"]);
        assert!(check_draws(&d, &["zeta", "beta", "mean_PPD"]).is_err());
    }

    #[test]
    fn test_check_draws_non_finite() {
        let mut d = draws(&["lp__", "zeta", "mean_PPD"]);
        d.values_mut()[[1, 0, 1]] = f64::NAN;
        assert!(check_draws(&d, &["zeta", "beta", "mean_PPD"]).is_err());
    }

    #[test]
    fn test_check_draws_empty() {
        let d = Draws::new(Array3::zeros((0, 1, 1)), vec!["lp__".to_string()]).unwrap();
        assert!(check_draws(&d, &[]).is_err());
    }
}
