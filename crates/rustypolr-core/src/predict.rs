// =============================================================================
// Prediction
// =============================================================================
//
// Category probabilities from point estimates of an ordinal model. With
// linear predictor η = x·β and cutpoints ζ₁ < … < ζ_{J-1}:
//
//     P(y ≤ j) = F(ζ_j − η)
//     P(y = j) = P(y ≤ j) − P(y ≤ j − 1)
//
// A binary model has a single intercept instead, P(y = 2) = F(intercept + η),
// or with the scobit exponent α, 1 − (1 − F(intercept + η))^α.
//
// =============================================================================

use ndarray::{Array1, Array2};

use crate::error::{PolrError, Result};
use crate::links::OrdinalLink;

/// N × J probability matrix for the rows of `x` (predictors only, no
/// intercept column).
///
/// `cutpoints` holds J − 1 values, or the single intercept when J = 2.
pub fn category_probabilities(
    x: &Array2<f64>,
    beta: &Array1<f64>,
    cutpoints: &Array1<f64>,
    link: OrdinalLink,
    alpha: Option<f64>,
) -> Result<Array2<f64>> {
    if x.ncols() != beta.len() {
        return Err(PolrError::DimensionMismatch(format!(
            "x has {} columns but there are {} coefficients",
            x.ncols(),
            beta.len()
        )));
    }
    if cutpoints.is_empty() {
        return Err(PolrError::InvalidValue("no cutpoints given".to_string()));
    }
    if cutpoints.windows(2).into_iter().any(|w| w[1] < w[0]) {
        return Err(PolrError::InvalidValue(
            "cutpoints must be non-decreasing".to_string(),
        ));
    }

    let eta = x.dot(beta);
    let n = eta.len();
    let n_cuts = cutpoints.len();

    if n_cuts == 1 {
        let alpha = alpha.unwrap_or(1.0);
        if !(alpha > 0.0) {
            return Err(PolrError::InvalidValue(format!(
                "alpha must be positive, got {}",
                alpha
            )));
        }
        let mut probs = Array2::zeros((n, 2));
        for (i, &e) in eta.iter().enumerate() {
            let p = link.cdf(cutpoints[0] + e);
            let p = if alpha == 1.0 { p } else { 1.0 - (1.0 - p).powf(alpha) };
            probs[[i, 0]] = 1.0 - p;
            probs[[i, 1]] = p;
        }
        return Ok(probs);
    }

    if alpha.is_some() {
        return Err(PolrError::IncompatibleModel(
            "alpha only applies to binary outcomes".to_string(),
        ));
    }

    let mut probs = Array2::zeros((n, n_cuts + 1));
    for (i, &e) in eta.iter().enumerate() {
        let mut below = 0.0;
        for (j, &zeta) in cutpoints.iter().enumerate() {
            let cum = link.cdf(zeta - e);
            probs[[i, j]] = (cum - below).max(0.0);
            below = cum;
        }
        probs[[i, n_cuts]] = 1.0 - below;
    }
    Ok(probs)
}
