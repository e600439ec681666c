// =============================================================================
// Draw Recovery
// =============================================================================
//
// Engine output is on the reparameterized scale and uses engine names. Two
// steps turn it into something a user can read:
//
//   1. UNTRANSFORM: the engine sampled θ, the coefficients of Q. For every
//      chain and every iteration the original-scale coefficients are
//
//          β = R⁻¹ θ
//
//   2. RELABEL: blocks are reordered and renamed.
//
//        J > 2                          J = 2
//        -----                          -----
//        predictor names   (β)          "(Intercept)"     (ζ)
//        "low|mid", ...    (ζ)          predictor names   (β)
//        "mean_PPD:low",...             "alpha"           (skewed only)
//        "log-posterior"                "mean_PPD"
//                                       "log-posterior"
//
// =============================================================================

use log::debug;
use ndarray::{s, Array2, Axis};
use rayon::prelude::*;

use crate::backend::LOG_DENSITY;
use crate::design::{QrTransform, INTERCEPT_NAME};
use crate::draws::Draws;
use crate::error::{PolrError, Result};

/// Name given to the log density in recovered draws.
pub const LOG_POSTERIOR: &str = "log-posterior";

/// Replace the `beta` block of raw engine draws with R⁻¹ θ, in place.
pub fn untransform_beta(draws: &mut Draws, transform: &QrTransform) -> Result<()> {
    let k = transform.n_predictors();
    let beta_idx = expect_block(draws, "beta", k)?;
    if k == 0 {
        return Ok(());
    }

    let r_inv_t = transform.r_inv.t();
    let updated: Vec<Array2<f64>> = {
        let values = draws.values();
        (0..draws.n_chains())
            .into_par_iter()
            .map(|c| {
                // iteration × K; each row is one θ, so rows of θ R⁻¹ᵀ are (R⁻¹ θ)ᵀ
                let theta = values.index_axis(Axis(1), c).select(Axis(1), &beta_idx);
                theta.dot(&r_inv_t)
            })
            .collect()
    };

    let values = draws.values_mut();
    for (c, beta) in updated.iter().enumerate() {
        for (j, &p) in beta_idx.iter().enumerate() {
            values.slice_mut(s![.., c, p]).assign(&beta.column(j));
        }
    }
    debug!(
        "untransformed {} coefficients over {} chains x {} iterations",
        k,
        updated.len(),
        draws.n_iterations()
    );
    Ok(())
}

/// Reorder and rename untransformed draws to their reported names.
pub fn relabel(
    draws: &Draws,
    column_names: &[String],
    levels: &[String],
    skewed: bool,
) -> Result<Draws> {
    let j = levels.len();
    if j < 2 {
        return Err(PolrError::InvalidResponse(format!(
            "cannot label draws for {} outcome levels",
            j
        )));
    }
    let k = column_names.len();

    let mut indices = Vec::new();
    let mut names = Vec::new();

    let beta = expect_block(draws, "beta", k)?;
    let lp = expect_block(draws, LOG_DENSITY, 1)?;

    if j > 2 {
        let zeta = expect_block(draws, "zeta", j - 1)?;
        let ppd = expect_block(draws, "mean_PPD", j)?;

        indices.extend(&beta);
        names.extend(column_names.iter().cloned());

        indices.extend(&zeta);
        names.extend(cutpoint_names(levels));

        indices.extend(&ppd);
        names.extend(levels.iter().map(|l| format!("mean_PPD:{}", l)));
    } else {
        let zeta = expect_block(draws, "zeta", 1)?;
        let ppd = expect_block(draws, "mean_PPD", 1)?;

        indices.extend(&zeta);
        names.push(INTERCEPT_NAME.to_string());

        indices.extend(&beta);
        names.extend(column_names.iter().cloned());

        if skewed {
            indices.extend(expect_block(draws, "alpha", 1)?);
            names.push("alpha".to_string());
        }

        indices.extend(&ppd);
        names.push("mean_PPD".to_string());
    }

    indices.extend(&lp);
    names.push(LOG_POSTERIOR.to_string());

    draws.select(&indices, names)
}

/// Untransform then relabel.
pub fn recover_draws(
    mut raw: Draws,
    transform: &QrTransform,
    levels: &[String],
    skewed: bool,
) -> Result<Draws> {
    untransform_beta(&mut raw, transform)?;
    relabel(&raw, &transform.column_names, levels, skewed)
}

/// `"a|b"`, `"b|c"`, ... for consecutive levels.
pub fn cutpoint_names(levels: &[String]) -> Vec<String> {
    levels
        .windows(2)
        .map(|w| format!("{}|{}", w[0], w[1]))
        .collect()
}

fn expect_block(draws: &Draws, block: &str, expected: usize) -> Result<Vec<usize>> {
    let indices = draws.block_indices(block);
    if indices.len() != expected {
        return Err(PolrError::Backend(format!(
            "expected {} draws columns for '{}' but the engine returned {}",
            expected,
            block,
            indices.len()
        )));
    }
    Ok(indices)
}

// =============================================================================
// Tests
// =============================================================================
