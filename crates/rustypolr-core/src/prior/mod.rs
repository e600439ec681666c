// =============================================================================
// Priors
// =============================================================================
//
// Three priors are translated into scalars/vectors for the engine:
//
// R2 PRIOR ON THE COEFFICIENTS
// ----------------------------
// Instead of a prior on each β_k, the user states a belief about the
// proportion of variance in the latent outcome explained by the predictors,
// R² ~ Beta(K/2, η). The user gives a location for R² and says what that
// location is (mode, mean, median, or expected log); we solve for η, which
// the engine calls `regularization`.
//
//     mode:    η = (K/2 − 1 − ℓ·K/2 + 2ℓ) / ℓ        (needs K > 2, 0 < ℓ ≤ 1)
//     mean:    η = (K/2 − ℓ·K/2) / ℓ                 (0 < ℓ < 1)
//     median:  I_ℓ(K/2, η) = 1/2                     (0 < ℓ < 1, solved)
//     log:     ψ(K/2) − ψ(K/2 + η) = ℓ               (ℓ < 0, solved)
//
// The solved cases search over ln η in [−40, 40]. A location whose η lies
// outside that range is rejected rather than clamped.
//
// DIRICHLET PRIOR ON THE OUTCOME PROPORTIONS
// ------------------------------------------
// The cutpoints are given an induced prior through a Dirichlet on the J
// category probabilities at x = x̄ (`prior_counts`). One concentration may be
// given for all categories.
//
// GAMMA PRIOR ON THE SKEWNESS EXPONENT
// ------------------------------------
// For a binary outcome the logistic link may be skewed (scobit):
// P(y = 2) = 1 − (1 − F(η))^α with α ~ Gamma(shape, rate).
//
// =============================================================================

mod root;

pub use root::{brent_root, RootResult};

use std::fmt;

use log::debug;
use statrs::distribution::{Beta, ContinuousCDF};
use statrs::function::gamma::digamma;

use crate::error::{PolrError, Result};
use crate::links::OrdinalLink;

const ROOT_TOL: f64 = 1e-12;
const LOG_ETA_MIN: f64 = -40.0;
const LOG_ETA_MAX: f64 = 40.0;
const ROOT_MAX_ITER: usize = 1000;

// =============================================================================
// R2 prior
// =============================================================================

/// What the location of an R2 prior refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum R2What {
    #[default]
    Mode,
    Mean,
    Median,
    /// Expected value of ln(R²).
    Log,
}

impl R2What {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "mode" => Ok(R2What::Mode),
            "mean" => Ok(R2What::Mean),
            "median" => Ok(R2What::Median),
            "log" => Ok(R2What::Log),
            _ => Err(PolrError::InvalidPrior(format!(
                "Unknown R2 location type '{}'. Use 'mode', 'mean', 'median', or 'log'.",
                name
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            R2What::Mode => "mode",
            R2What::Mean => "mean",
            R2What::Median => "median",
            R2What::Log => "log",
        }
    }
}

impl fmt::Display for R2What {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prior on the proportion of explained variance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct R2Prior {
    pub location: f64,
    pub what: R2What,
}

impl R2Prior {
    pub fn new(location: f64, what: R2What) -> Self {
        Self { location, what }
    }

    /// The Beta shape η implied by this prior for `k` predictors.
    pub fn eta(&self, k: usize) -> Result<f64> {
        make_eta(self.location, self.what, k)
    }
}

/// Translate an R2 location into the second Beta shape parameter η.
pub fn make_eta(location: f64, what: R2What, k: usize) -> Result<f64> {
    if !location.is_finite() {
        return Err(PolrError::InvalidPrior(format!(
            "R2 location must be finite, got {}",
            location
        )));
    }
    if k == 0 {
        return Err(PolrError::InvalidPrior(
            "R2 has no meaning when K = 0".to_string(),
        ));
    }
    let half_k = k as f64 / 2.0;

    let eta = match what {
        R2What::Mode => {
            if !(location > 0.0 && location <= 1.0) {
                return Err(PolrError::InvalidPrior(format!(
                    "R2 mode must be in (0, 1], got {}",
                    location
                )));
            }
            if k <= 2 {
                return Err(PolrError::InvalidPrior(format!(
                    "R2 has no mode when there are {} predictors",
                    k
                )));
            }
            (half_k - 1.0 - location * half_k + location * 2.0) / location
        }
        R2What::Mean => {
            check_open_unit(location, "mean")?;
            (half_k - location * half_k) / location
        }
        R2What::Median => {
            check_open_unit(location, "median")?;
            // The median of Beta(K/2, η) is ℓ exactly when its CDF at ℓ is
            // one half; that CDF rises from 0 to 1 as ln η runs over ℝ.
            let objective = |u: f64| match Beta::new(half_k, u.exp()) {
                Ok(dist) => dist.cdf(location) - 0.5,
                Err(_) => f64::NAN,
            };
            solve_log_eta(objective, -0.5, 0.5, 1e-10, what, location, k)?
        }
        R2What::Log => {
            if location >= 0.0 {
                return Err(PolrError::InvalidPrior(format!(
                    "the expected log of R2 must be negative, got {}",
                    location
                )));
            }
            let psi = digamma(half_k);
            let objective = |u: f64| psi - digamma(half_k + u.exp()) - location;
            let upper = objective(LOG_ETA_MAX);
            solve_log_eta(objective, -location, upper, 1e-10 * location.abs().max(1.0), what, location, k)?
        }
    };

    if !(eta.is_finite() && eta > 0.0) {
        return Err(PolrError::InvalidPrior(format!(
            "R2 {} of {} with K = {} implies a non-positive Beta shape ({})",
            what, location, k, eta
        )));
    }
    debug!("R2 prior: {} = {} with K = {} gives eta = {}", what, location, k, eta);
    Ok(eta)
}

fn check_open_unit(location: f64, what: &str) -> Result<()> {
    if location > 0.0 && location < 1.0 {
        Ok(())
    } else {
        Err(PolrError::InvalidPrior(format!(
            "R2 {} must be in (0, 1), got {}",
            what, location
        )))
    }
}

/// Solve `objective(ln η) = 0` on [LOG_ETA_MIN, LOG_ETA_MAX] and return η.
///
/// `f_min` and `f_max` are the objective's values (or limits) at the ends of
/// the bracket. A root whose residual exceeds `residual_tol` means the
/// location is out of reach and is reported instead of being clamped.
fn solve_log_eta<F>(
    objective: F,
    f_min: f64,
    f_max: f64,
    residual_tol: f64,
    what: R2What,
    location: f64,
    k: usize,
) -> Result<f64>
where
    F: FnMut(f64) -> f64,
{
    let unreachable = || {
        PolrError::InvalidPrior(format!(
            "R2 {} of {} with K = {} needs a Beta shape outside [{:e}, {:e}]",
            what,
            location,
            k,
            LOG_ETA_MIN.exp(),
            LOG_ETA_MAX.exp()
        ))
    };
    if f_min.signum() == f_max.signum() {
        return Err(unreachable());
    }
    let r = brent_root(objective, LOG_ETA_MIN, LOG_ETA_MAX, f_min, f_max, ROOT_TOL, ROOT_MAX_ITER)?;
    if !(r.f_root.abs() <= residual_tol) {
        return Err(unreachable());
    }
    Ok(r.root.exp())
}

// =============================================================================
// Dirichlet prior on outcome proportions
// =============================================================================

/// Dirichlet concentration for the J outcome categories.
#[derive(Debug, Clone, PartialEq)]
pub struct Dirichlet {
    pub concentration: Vec<f64>,
}

impl Dirichlet {
    pub fn new(concentration: Vec<f64>) -> Self {
        Self { concentration }
    }

    /// Same concentration for every category.
    pub fn symmetric(concentration: f64) -> Self {
        Self::new(vec![concentration])
    }

    /// Expand to exactly `j` concentrations, validating positivity.
    pub fn broadcast(&self, j: usize) -> Result<Vec<f64>> {
        let counts = match self.concentration.len() {
            1 => vec![self.concentration[0]; j],
            n if n == j => self.concentration.clone(),
            n => {
                return Err(PolrError::DimensionMismatch(format!(
                    "prior_counts has {} concentrations but the outcome has {} categories",
                    n, j
                )))
            }
        };
        if counts.iter().any(|&c| !(c.is_finite() && c > 0.0)) {
            return Err(PolrError::InvalidPrior(
                "prior_counts concentrations must be positive".to_string(),
            ));
        }
        Ok(counts)
    }
}

impl Default for Dirichlet {
    fn default() -> Self {
        Self::symmetric(1.0)
    }
}

// =============================================================================
// Skewness prior (scobit)
// =============================================================================

/// Validated gamma prior on the skewness exponent α.
///
/// A value of 0 for `shape` or `rate` means "not given".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SkewPrior {
    pub shape: f64,
    pub rate: f64,
}

impl SkewPrior {
    /// Validate `shape` and `rate` for an outcome with `j` categories and the
    /// chosen link.
    pub fn from_options(
        shape: Option<f64>,
        rate: Option<f64>,
        j: usize,
        link: OrdinalLink,
    ) -> Result<Self> {
        let shape = check_gamma_parameter(shape, "shape", j)?;
        let rate = check_gamma_parameter(rate, "rate", j)?;
        let prior = Self { shape, rate };
        if prior.is_skewed() && link != OrdinalLink::Logistic {
            return Err(PolrError::IncompatibleModel(format!(
                "skewed models are only supported with the logistic link, not '{}'",
                link
            )));
        }
        Ok(prior)
    }

    /// Both hyperparameters given: the engine adds the exponent α.
    pub fn is_skewed(&self) -> bool {
        self.shape > 0.0 && self.rate > 0.0
    }
}

fn check_gamma_parameter(value: Option<f64>, name: &str, j: usize) -> Result<f64> {
    match value {
        None => Ok(0.0),
        Some(_) if j > 2 => Err(PolrError::IncompatibleModel(format!(
            "'{}' must be NULL when there are more than 2 outcome categories",
            name
        ))),
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(_) => Err(PolrError::InvalidPrior(format!("'{}' must be positive", name))),
    }
}

// =============================================================================
// Prior summary
// =============================================================================

/// Record of the priors used, kept with the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorInfo {
    /// None when the coefficients were left with a flat prior.
    pub r2: Option<R2Prior>,
    /// The Beta shape passed to the engine (0 for no prior).
    pub regularization: f64,
    /// Dirichlet concentrations after broadcasting to J.
    pub prior_counts: Vec<f64>,
    pub skew: SkewPrior,
}

impl fmt::Display for PriorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.r2 {
            Some(p) => writeln!(
                f,
                "Coefficients: R2(location = {}, what = '{}')  [eta = {:.4}]",
                p.location, p.what, self.regularization
            )?,
            None => writeln!(f, "Coefficients: flat")?,
        }
        let counts: Vec<String> = self.prior_counts.iter().map(|c| format!("{}", c)).collect();
        write!(f, "Counts: dirichlet(concentration = [{}])", counts.join(", "))?;
        if self.skew.is_skewed() {
            write!(
                f,
                "\nAlpha: gamma(shape = {}, rate = {})",
                self.skew.shape, self.skew.rate
            )?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use statrs::function::beta::checked_beta_reg;

    #[test]
    fn test_eta_mode() {
        // Beta(2, 2) has its mode at 0.5
        assert_abs_diff_eq!(make_eta(0.5, R2What::Mode, 4).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_eta_mode_needs_three_predictors() {
        assert!(matches!(
            make_eta(0.5, R2What::Mode, 2),
            Err(PolrError::InvalidPrior(_))
        ));
    }

    #[test]
    fn test_eta_mean() {
        // Beta(2, η) has mean 2 / (2 + η)
        let eta = make_eta(0.25, R2What::Mean, 4).unwrap();
        assert_abs_diff_eq!(2.0 / (2.0 + eta), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_eta_median_symmetric_case() {
        // The median of Beta(2, 2) is 0.5
        let eta = make_eta(0.5, R2What::Median, 4).unwrap();
        assert_abs_diff_eq!(eta, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_eta_median_matches_incomplete_beta() {
        let eta = make_eta(0.3, R2What::Median, 5).unwrap();
        let cdf = checked_beta_reg(2.5, eta, 0.3).unwrap();
        assert_abs_diff_eq!(cdf, 0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_eta_median_large_shape() {
        // Both need η well above 23, the old ceiling of a search over 1 − e^−η
        let eta = make_eta(0.3, R2What::Median, 50).unwrap();
        assert!(eta > 30.0);
        assert_abs_diff_eq!(checked_beta_reg(25.0, eta, 0.3).unwrap(), 0.5, epsilon = 1e-8);

        let eta = make_eta(0.1, R2What::Median, 10).unwrap();
        assert!(eta > 30.0);
        assert_abs_diff_eq!(checked_beta_reg(5.0, eta, 0.1).unwrap(), 0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_eta_log_large_shape() {
        let eta = make_eta(-20.0, R2What::Log, 2).unwrap();
        assert!(eta > 1e8);
        assert_abs_diff_eq!(digamma(1.0) - digamma(1.0 + eta), -20.0, epsilon = 1e-8);
    }

    #[test]
    fn test_eta_log_unreachable_location() {
        // ψ(1) − ψ(1 + e^40) is about −40.6
        assert!(matches!(
            make_eta(-60.0, R2What::Log, 2),
            Err(PolrError::InvalidPrior(_))
        ));
    }

    #[test]
    fn test_eta_log() {
        // ψ(2) − ψ(4) = −(1/2 + 1/3)
        let eta = make_eta(-5.0 / 6.0, R2What::Log, 4).unwrap();
        assert_abs_diff_eq!(eta, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_eta_log_requires_negative_location() {
        assert!(make_eta(0.2, R2What::Log, 4).is_err());
    }

    #[test]
    fn test_eta_rejects_out_of_range() {
        assert!(make_eta(1.0, R2What::Mean, 4).is_err());
        assert!(make_eta(0.0, R2What::Median, 4).is_err());
        assert!(make_eta(0.5, R2What::Mean, 0).is_err());
    }

    #[test]
    fn test_what_from_name() {
        assert_eq!(R2What::from_name("Median").unwrap(), R2What::Median);
        assert!(R2What::from_name("quantile").is_err());
    }

    #[test]
    fn test_dirichlet_broadcast() {
        assert_eq!(Dirichlet::default().broadcast(3).unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(
            Dirichlet::new(vec![1.0, 2.0, 3.0]).broadcast(3).unwrap(),
            vec![1.0, 2.0, 3.0]
        );
        assert!(matches!(
            Dirichlet::new(vec![1.0, 2.0]).broadcast(3),
            Err(PolrError::DimensionMismatch(_))
        ));
        assert!(Dirichlet::symmetric(0.0).broadcast(2).is_err());
    }

    #[test]
    fn test_skew_prior_binary() {
        let p = SkewPrior::from_options(Some(2.0), Some(1.0), 2, OrdinalLink::Logistic).unwrap();
        assert!(p.is_skewed());
        let half = SkewPrior::from_options(Some(2.0), None, 2, OrdinalLink::Logistic).unwrap();
        assert!(!half.is_skewed());
    }

    #[test]
    fn test_skew_prior_rejected_with_many_categories() {
        let err = SkewPrior::from_options(Some(2.0), None, 3, OrdinalLink::Logistic).unwrap_err();
        assert!(matches!(err, PolrError::IncompatibleModel(_)));
        assert!(err.to_string().contains("'shape' must be NULL"));
    }

    #[test]
    fn test_skew_prior_must_be_positive() {
        let err = SkewPrior::from_options(None, Some(-1.0), 2, OrdinalLink::Logistic).unwrap_err();
        assert!(err.to_string().contains("'rate' must be positive"));
    }

    #[test]
    fn test_skew_prior_needs_logistic_link() {
        let err = SkewPrior::from_options(Some(1.0), Some(1.0), 2, OrdinalLink::Probit).unwrap_err();
        assert!(matches!(err, PolrError::IncompatibleModel(_)));
    }

    #[test]
    fn test_prior_info_display() {
        let info = PriorInfo {
            r2: Some(R2Prior::new(0.3, R2What::Mean)),
            regularization: 4.6667,
            prior_counts: vec![1.0, 1.0],
            skew: SkewPrior::default(),
        };
        let text = info.to_string();
        assert!(text.contains("R2(location = 0.3, what = 'mean')"));
        assert!(text.contains("dirichlet(concentration = [1, 1])"));
        assert!(!text.contains("Alpha"));
    }
}
