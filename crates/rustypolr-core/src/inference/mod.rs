// =============================================================================
// Posterior Inference
// =============================================================================
//
// Summaries of posterior draws:
//   - Point summaries: mean, sd, median, MAD_SD
//   - Central posterior intervals
//   - Split R-hat across chains
//
// MAD_SD is the median absolute deviation scaled by 1.4826, so it matches
// the standard deviation for normal draws but is far less sensitive to
// the occasional extreme draw.
//
// R-HAT:
// ------
// Each chain is cut in half and the halves are compared. Values near 1 mean
// the chains agree; anything above 1.1 deserves another look. With a single
// chain (variational fits) there is nothing to compare and R-hat is NaN.
//
// =============================================================================

use log::warn;
use ndarray::ArrayView2;
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::draws::Draws;
use crate::error::{PolrError, Result};

/// Scale factor turning a median absolute deviation into an SD estimate.
pub const MAD_SCALE: f64 = 1.4826;

/// R-hat above this is reported as a warning.
pub const RHAT_WARNING: f64 = 1.1;

/// Summary of one parameter's draws.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
    pub median: f64,
    pub mad_sd: f64,
    /// (probability, quantile) pairs.
    pub quantiles: Vec<(f64, f64)>,
    pub rhat: f64,
}

/// Central posterior interval of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

fn check_prob(p: f64) -> Result<()> {
    if p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(PolrError::InvalidValue(format!(
            "probabilities must be in (0, 1), got {}",
            p
        )))
    }
}

/// Median absolute deviation times [`MAD_SCALE`].
pub fn mad_sd(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let center = Data::new(values.to_vec()).median();
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    MAD_SCALE * Data::new(deviations).median()
}

/// Split R-hat for draws laid out as iteration × chain.
pub fn split_rhat(draws: ArrayView2<'_, f64>) -> f64 {
    let (n_iter, n_chains) = draws.dim();
    let half = n_iter / 2;
    if n_chains < 2 || half < 2 {
        return f64::NAN;
    }

    let mut halves: Vec<Vec<f64>> = Vec::with_capacity(2 * n_chains);
    for chain in draws.columns() {
        let chain = chain.to_vec();
        // An odd draw in the middle is dropped
        halves.push(chain[..half].to_vec());
        halves.push(chain[n_iter - half..].to_vec());
    }

    let m = halves.len() as f64;
    let n = half as f64;
    let means: Vec<f64> = halves.iter().map(|h| Statistics::mean(h.iter())).collect();
    let grand_mean = Statistics::mean(means.iter());

    let b = n / (m - 1.0) * means.iter().map(|&cm| (cm - grand_mean).powi(2)).sum::<f64>();
    let w = halves.iter().map(|h| Statistics::variance(h.iter())).sum::<f64>() / m;
    if !(w > 0.0) {
        return f64::NAN;
    }

    let var_hat = (n - 1.0) / n * w + b / n;
    (var_hat / w).sqrt()
}

/// Summarize every parameter. `probs` are the quantiles to report.
pub fn summarize(draws: &Draws, probs: &[f64]) -> Result<Vec<ParamSummary>> {
    for &p in probs {
        check_prob(p)?;
    }
    if draws.n_iterations() == 0 {
        return Err(PolrError::EmptyInput("no draws to summarize".to_string()));
    }

    let mut out = Vec::with_capacity(draws.n_params());
    for name in draws.names() {
        let column = draws
            .column(name)
            .ok_or_else(|| PolrError::InvalidValue(format!("unknown parameter '{}'", name)))?;
        let pooled: Vec<f64> = column.t().iter().copied().collect();

        let mut data = Data::new(pooled.clone());
        let quantiles = probs.iter().map(|&p| (p, data.quantile(p))).collect();
        let rhat = split_rhat(column);
        if rhat > RHAT_WARNING {
            warn!("R-hat for '{}' is {:.3}; the chains may not have mixed", name, rhat);
        }

        out.push(ParamSummary {
            name: name.clone(),
            mean: Statistics::mean(pooled.iter()),
            sd: Statistics::std_dev(pooled.iter()),
            median: data.median(),
            mad_sd: mad_sd(&pooled),
            quantiles,
            rhat,
        });
    }
    Ok(out)
}

/// Central intervals holding `prob` of the posterior mass.
pub fn posterior_interval(draws: &Draws, prob: f64) -> Result<Vec<Interval>> {
    check_prob(prob)?;
    let tail = (1.0 - prob) / 2.0;
    draws
        .names()
        .iter()
        .map(|name| {
            let pooled = draws
                .pooled(name)
                .ok_or_else(|| PolrError::InvalidValue(format!("unknown parameter '{}'", name)))?;
            if pooled.is_empty() {
                return Err(PolrError::EmptyInput(format!("no draws for '{}'", name)));
            }
            let mut data = Data::new(pooled);
            Ok(Interval {
                name: name.clone(),
                lower: data.quantile(tail),
                upper: data.quantile(1.0 - tail),
            })
        })
        .collect()
}

/// Text table of [`summarize`], one row per parameter.
pub fn summary_table(draws: &Draws, probs: &[f64]) -> Result<String> {
    let rows = summarize(draws, probs)?;
    let width = rows
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("parameter".len());

    let mut out = String::new();
    out.push_str(&format!(
        "{:<width$} {:>9} {:>9} {:>9} {:>9}",
        "parameter", "mean", "sd", "median", "mad_sd"
    ));
    for p in probs {
        out.push_str(&format!(" {:>9}", format!("{}%", (p * 1000.0).round() / 10.0)));
    }
    out.push_str(&format!(" {:>7}\n", "Rhat"));

    for r in &rows {
        out.push_str(&format!(
            "{:<width$} {:>9.3} {:>9.3} {:>9.3} {:>9.3}",
            r.name, r.mean, r.sd, r.median, r.mad_sd
        ));
        for (_, q) in &r.quantiles {
            out.push_str(&format!(" {:>9.3}", q));
        }
        let rhat = if r.rhat.is_finite() { format!("{:.3}", r.rhat) } else { "-".to_string() };
        out.push_str(&format!(" {:>7}\n", rhat));
    }
    out.push_str(&format!(
        "\n{} chains x {} draws",
        draws.n_chains(),
        draws.n_iterations()
    ));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3};

    fn draws_from(values: Array3<f64>, names: &[&str]) -> Draws {
        Draws::new(values, names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_mad_sd() {
        // deviations from the median 3: [2, 1, 0, 1, 2] → median 1
        assert_abs_diff_eq!(mad_sd(&[1.0, 2.0, 3.0, 4.0, 5.0]), MAD_SCALE, epsilon = 1e-12);
        assert!(mad_sd(&[]).is_nan());
    }

    #[test]
    fn test_rhat_identical_chains_near_one() {
        let col = Array2::from_shape_fn((100, 4), |(i, _)| ((i * 37) % 17) as f64);
        let r = split_rhat(col.view());
        assert!(r.is_finite());
        assert!(r < 1.1);
    }

    #[test]
    fn test_rhat_detects_separated_chains() {
        let col = Array2::from_shape_fn((50, 2), |(i, c)| (i % 5) as f64 + 100.0 * c as f64);
        assert!(split_rhat(col.view()) > 2.0);
    }

    #[test]
    fn test_rhat_single_chain_or_constant() {
        let one = Array2::from_shape_fn((50, 1), |(i, _)| i as f64);
        assert!(split_rhat(one.view()).is_nan());
        let flat = Array2::from_elem((50, 3), 2.0);
        assert!(split_rhat(flat.view()).is_nan());
    }

    #[test]
    fn test_summarize() {
        let values = Array3::from_shape_fn((5, 1, 2), |(i, _, p)| (i + 1) as f64 * (p + 1) as f64);
        let d = draws_from(values, &["a", "b"]);
        let s = summarize(&d, &[0.5]).unwrap();
        assert_eq!(s.len(), 2);
        assert_abs_diff_eq!(s[0].mean, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[0].median, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[0].sd, 2.5f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(s[1].mean, 6.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s[1].quantiles[0].1, s[1].median, epsilon = 1e-12);
        assert!(s[0].rhat.is_nan());
        assert!(summarize(&d, &[1.5]).is_err());
    }

    #[test]
    fn test_posterior_interval_brackets_median() {
        let values = Array3::from_shape_fn((200, 2, 1), |(i, c, _)| (i + 200 * c) as f64);
        let d = draws_from(values, &["x"]);
        let iv = posterior_interval(&d, 0.9).unwrap();
        assert_eq!(iv[0].name, "x");
        assert!(iv[0].lower < 199.5 && 199.5 < iv[0].upper);
        assert!(iv[0].lower > 0.0 && iv[0].upper < 399.0);
        assert!(posterior_interval(&d, 0.0).is_err());
    }

    #[test]
    fn test_summary_table_layout() {
        let values = Array3::from_shape_fn((10, 2, 1), |(i, c, _)| (i + c) as f64);
        let d = draws_from(values, &["low|mid"]);
        let table = summary_table(&d, &[0.1, 0.9]).unwrap();
        assert!(table.starts_with("parameter"));
        assert!(table.contains("low|mid"));
        assert!(table.contains("10%"));
        assert!(table.ends_with("2 chains x 10 draws"));
    }
}
