// =============================================================================
// Ordinal Link Functions
// =============================================================================
//
// An ordinal model relates a latent linear predictor η to the cumulative
// probability of the outcome through an inverse link F (a CDF):
//
//     P(y ≤ j | x) = F(ζ_j − η)
//
// where ζ_1 < ζ_2 < ... < ζ_{J-1} are the cutpoints.
//
// The engine identifies the link by an integer code, so the order of the
// variants below is part of the data contract:
//
//     1 = logistic, 2 = probit, 3 = loglog, 4 = cloglog, 5 = cauchit
//
// =============================================================================

use std::f64::consts::{FRAC_1_PI, PI, SQRT_2};
use std::fmt;

use ndarray::Array1;
use statrs::function::erf::{erfc, erfc_inv};

use crate::error::{PolrError, Result};

/// Link function of the cumulative model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrdinalLink {
    /// Proportional odds: F(x) = 1 / (1 + e^-x)
    #[default]
    Logistic,
    /// F(x) = Φ(x)
    Probit,
    /// F(x) = exp(-exp(-x))
    Loglog,
    /// F(x) = 1 - exp(-exp(x))
    Cloglog,
    /// F(x) = 1/2 + atan(x)/π
    Cauchit,
}

impl OrdinalLink {
    pub const ALL: [OrdinalLink; 5] = [
        OrdinalLink::Logistic,
        OrdinalLink::Probit,
        OrdinalLink::Loglog,
        OrdinalLink::Cloglog,
        OrdinalLink::Cauchit,
    ];

    /// Integer code understood by the engine (1-based).
    pub fn code(self) -> i32 {
        match self {
            OrdinalLink::Logistic => 1,
            OrdinalLink::Probit => 2,
            OrdinalLink::Loglog => 3,
            OrdinalLink::Cloglog => 4,
            OrdinalLink::Cauchit => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OrdinalLink::Logistic => "logistic",
            OrdinalLink::Probit => "probit",
            OrdinalLink::Loglog => "loglog",
            OrdinalLink::Cloglog => "cloglog",
            OrdinalLink::Cauchit => "cauchit",
        }
    }

    /// Parse a link name. Matching is case-insensitive and accepts `logit`
    /// as an alias for the logistic link.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "logistic" | "logit" => Ok(OrdinalLink::Logistic),
            "probit" => Ok(OrdinalLink::Probit),
            "loglog" => Ok(OrdinalLink::Loglog),
            "cloglog" => Ok(OrdinalLink::Cloglog),
            "cauchit" => Ok(OrdinalLink::Cauchit),
            _ => Err(PolrError::InvalidValue(format!(
                "Unknown method '{}'. Use 'logistic', 'probit', 'loglog', 'cloglog', or 'cauchit'.",
                name
            ))),
        }
    }

    /// Inverse link: maps the real line onto (0, 1).
    pub fn cdf(self, x: f64) -> f64 {
        match self {
            OrdinalLink::Logistic => {
                // Split on sign so that exp() never overflows
                if x >= 0.0 {
                    1.0 / (1.0 + (-x).exp())
                } else {
                    let e = x.exp();
                    e / (1.0 + e)
                }
            }
            OrdinalLink::Probit => 0.5 * erfc(-x / SQRT_2),
            OrdinalLink::Loglog => (-(-x).exp()).exp(),
            OrdinalLink::Cloglog => -(-x.exp()).exp_m1(),
            OrdinalLink::Cauchit => 0.5 + x.atan() * FRAC_1_PI,
        }
    }

    /// Link: the quantile function F⁻¹(p). Returns ±∞ at p = 0 or 1 and NaN
    /// outside [0, 1].
    pub fn quantile(self, p: f64) -> f64 {
        if !(0.0..=1.0).contains(&p) {
            return f64::NAN;
        }
        if p == 0.0 {
            return f64::NEG_INFINITY;
        }
        if p == 1.0 {
            return f64::INFINITY;
        }
        match self {
            OrdinalLink::Logistic => (p / (1.0 - p)).ln(),
            OrdinalLink::Probit => -SQRT_2 * erfc_inv(2.0 * p),
            OrdinalLink::Loglog => -(-p.ln()).ln(),
            OrdinalLink::Cloglog => (-(-p).ln_1p()).ln(),
            OrdinalLink::Cauchit => (PI * (p - 0.5)).tan(),
        }
    }

    /// Element-wise `cdf`.
    pub fn cdf_array(self, x: &Array1<f64>) -> Array1<f64> {
        x.mapv(|v| self.cdf(v))
    }
}

impl fmt::Display for OrdinalLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_codes_follow_engine_order() {
        let codes: Vec<i32> = OrdinalLink::ALL.iter().map(|l| l.code()).collect();
        assert_eq!(codes, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(OrdinalLink::from_name("Logit").unwrap(), OrdinalLink::Logistic);
        assert_eq!(OrdinalLink::from_name("probit").unwrap(), OrdinalLink::Probit);
        assert_eq!(OrdinalLink::from_name(" CLOGLOG ").unwrap(), OrdinalLink::Cloglog);
        assert!(matches!(
            OrdinalLink::from_name("identity"),
            Err(PolrError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_cdf_known_values() {
        assert_abs_diff_eq!(OrdinalLink::Logistic.cdf(0.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(OrdinalLink::Probit.cdf(1.959964), 0.975, epsilon = 1e-6);
        assert_abs_diff_eq!(OrdinalLink::Cauchit.cdf(1.0), 0.75, epsilon = 1e-12);
        assert_abs_diff_eq!(OrdinalLink::Loglog.cdf(0.0), (-1.0f64).exp(), epsilon = 1e-12);
        assert_abs_diff_eq!(
            OrdinalLink::Cloglog.cdf(0.0),
            1.0 - (-1.0f64).exp(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_logistic_cdf_extreme_arguments() {
        assert!(OrdinalLink::Logistic.cdf(-800.0) >= 0.0);
        assert_abs_diff_eq!(OrdinalLink::Logistic.cdf(800.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_inverts_cdf() {
        for link in OrdinalLink::ALL {
            for &p in &[0.05, 0.3, 0.5, 0.8, 0.99] {
                let x = link.quantile(p);
                assert_abs_diff_eq!(link.cdf(x), p, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_quantile_boundaries() {
        assert_eq!(OrdinalLink::Probit.quantile(0.0), f64::NEG_INFINITY);
        assert_eq!(OrdinalLink::Probit.quantile(1.0), f64::INFINITY);
        assert!(OrdinalLink::Logistic.quantile(1.5).is_nan());
    }
}
