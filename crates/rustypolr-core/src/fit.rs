// =============================================================================
// Ordinal Model Fitting
// =============================================================================
//
// Everything that happens around the engine call:
//
//   prepare_polr     validate y / priors, drop the intercept, center + QR,
//                    compute the R2 shape, assemble the data record
//   dispatch         hand the record to a backend (sampling or variational)
//   recover_draws    β = R⁻¹ θ, then user-facing names
//
// The result is a `PolrFit`, which keeps enough of the preprocessing to
// summarize and predict.
//
// =============================================================================

use log::{debug, info};
use ndarray::Array1;

use crate::backend::{dispatch, Algorithm, PosteriorBackend, SamplingConfig, VariationalConfig};
use crate::design::{DesignMatrix, QrTransform};
use crate::draws::Draws;
use crate::error::{PolrError, Result};
use crate::formula::{build_model, ModelFrame};
use crate::inference::{self, Interval, ParamSummary};
use crate::links::OrdinalLink;
use crate::postprocess::recover_draws;
use crate::predict;
use crate::prior::{Dirichlet, PriorInfo, R2Prior, SkewPrior};
use crate::response::Response;
use crate::standata::{matrix_rows, resolve_offset, resolve_weights, PolrData};

/// Options for an ordinal regression fit.
#[derive(Debug, Clone)]
pub struct PolrConfig {
    /// Link between the linear predictor and cumulative probabilities.
    /// Default: Logistic
    pub method: OrdinalLink,

    /// R2 prior on the coefficients. `None` leaves them flat.
    /// Default: None
    pub prior: Option<R2Prior>,

    /// Dirichlet prior on the outcome proportions. `None` means all ones.
    pub prior_counts: Option<Dirichlet>,

    /// Gamma hyperparameters of the scobit exponent. Both must be given for
    /// a skewed binary model.
    pub shape: Option<f64>,
    pub rate: Option<f64>,

    /// Draw from the prior predictive distribution, ignoring the likelihood.
    /// Default: false
    pub prior_pd: bool,

    /// Default: Sampling
    pub algorithm: Algorithm,

    pub sampling: SamplingConfig,
    pub variational: VariationalConfig,
}

impl Default for PolrConfig {
    fn default() -> Self {
        Self {
            method: OrdinalLink::Logistic,
            prior: None,
            prior_counts: None,
            shape: None,
            rate: None,
            prior_pd: false,
            algorithm: Algorithm::Sampling,
            sampling: SamplingConfig::default(),
            variational: VariationalConfig::default(),
        }
    }
}

impl PolrConfig {
    pub fn method(mut self, link: OrdinalLink) -> Self {
        self.method = link;
        self
    }

    pub fn prior(mut self, prior: R2Prior) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn prior_counts(mut self, counts: Dirichlet) -> Self {
        self.prior_counts = Some(counts);
        self
    }

    pub fn skewness(mut self, shape: f64, rate: f64) -> Self {
        self.shape = Some(shape);
        self.rate = Some(rate);
        self
    }

    pub fn prior_pd(mut self, prior_pd: bool) -> Self {
        self.prior_pd = prior_pd;
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn variational(mut self, variational: VariationalConfig) -> Self {
        self.variational = variational;
        self
    }
}

/// Everything computed before the engine is called.
#[derive(Debug, Clone)]
pub struct PreparedPolr {
    pub data: PolrData,
    pub transform: QrTransform,
    pub levels: Vec<String>,
    pub prior_info: PriorInfo,
    pub pars: Vec<&'static str>,
}

impl PreparedPolr {
    pub fn is_skewed(&self) -> bool {
        self.prior_info.skew.is_skewed()
    }
}

/// Validate the inputs and build the engine data record.
///
/// Fails early on a non-factor response, mismatched lengths, bad prior
/// hyperparameters, a skewed model with a non-logistic link, or a rank
/// deficient design.
pub fn prepare_polr(
    x: DesignMatrix,
    y: Response,
    weights: Option<&Array1<f64>>,
    offset: Option<&Array1<f64>>,
    config: &PolrConfig,
) -> Result<PreparedPolr> {
    let y = y.into_factor()?;
    let n = y.len();
    if n == 0 {
        return Err(PolrError::EmptyInput("y has no observations".to_string()));
    }
    if x.nrows() != n {
        return Err(PolrError::DimensionMismatch(format!(
            "x has {} rows but y has {} observations",
            x.nrows(),
            n
        )));
    }
    let j = y.n_levels();
    let link = config.method;

    let skew = SkewPrior::from_options(config.shape, config.rate, j, link)?;
    let prior_counts = config.prior_counts.clone().unwrap_or_default().broadcast(j)?;
    let weights = resolve_weights(weights, n)?;
    let offset = resolve_offset(offset, n)?;

    let x = x.without_intercept();
    let k = x.ncols();
    let transform = x.qr_transform()?;

    let (prior_dist, regularization) = match &config.prior {
        Some(p) => (1, p.eta(k)?),
        None => (0, 0.0),
    };
    debug!(
        "prior: dist = {}, regularization = {:.6}, counts = {:?}",
        prior_dist, regularization, prior_counts
    );

    let counts = y.counts();
    if let Some(empty) = counts.iter().position(|&c| c == 0) {
        debug!("outcome level '{}' is never observed", y.levels()[empty]);
    }

    let data = PolrData {
        j,
        n,
        k,
        x: matrix_rows(&transform.q),
        xbar: transform.xbar_q.to_vec(),
        y: y.engine_codes(),
        prior_pd: i32::from(config.prior_pd),
        link: link.code(),
        prior_dist,
        regularization,
        prior_counts: prior_counts.clone(),
        is_skewed: i32::from(skew.is_skewed()),
        shape: skew.shape,
        rate: skew.rate,
        do_residuals: i32::from(j > 2 && !config.prior_pd),
        has_weights: i32::from(weights.is_some()),
        weights: weights.unwrap_or_default(),
        has_offset: i32::from(offset.is_some()),
        offset: offset.unwrap_or_default(),
        compute_mean_ppd: 1,
    };
    let pars = data.pars();

    Ok(PreparedPolr {
        data,
        transform,
        levels: y.levels().to_vec(),
        prior_info: PriorInfo {
            r2: config.prior,
            regularization,
            prior_counts,
            skew,
        },
        pars,
    })
}

/// Fit the model with the given backend.
pub fn stan_polr_fit(
    x: DesignMatrix,
    y: Response,
    weights: Option<&Array1<f64>>,
    offset: Option<&Array1<f64>>,
    config: &PolrConfig,
    backend: &dyn PosteriorBackend,
) -> Result<PolrFit> {
    let prepared = prepare_polr(x, y, weights, offset, config)?;
    let raw = dispatch(
        backend,
        &prepared.data,
        config.algorithm,
        &config.sampling,
        &config.variational,
    )?;
    let skewed = prepared.is_skewed();
    let draws = recover_draws(raw, &prepared.transform, &prepared.levels, skewed)?;
    info!(
        "fitted ordinal model: {} draws x {} chains, {} parameters",
        draws.n_iterations(),
        draws.n_chains(),
        draws.n_params()
    );

    Ok(PolrFit {
        draws,
        levels: prepared.levels,
        column_names: prepared.transform.column_names.clone(),
        link: config.method,
        algorithm: config.algorithm,
        prior_info: prepared.prior_info,
        n_obs: prepared.data.n,
        transform: prepared.transform,
    })
}

/// Formula interface: resolve `formula` against `frame`, then fit.
pub fn stan_polr(
    formula: &str,
    frame: &ModelFrame,
    weights: Option<&Array1<f64>>,
    offset: Option<&Array1<f64>>,
    config: &PolrConfig,
    backend: &dyn PosteriorBackend,
) -> Result<PolrFit> {
    let (x, y) = build_model(formula, frame)?;
    stan_polr_fit(x, y, weights, offset, config, backend)
}

/// A fitted Bayesian ordinal regression.
#[derive(Debug, Clone)]
pub struct PolrFit {
    /// Draws on the original scale with reported names.
    pub draws: Draws,
    pub levels: Vec<String>,
    /// Predictor names (no intercept).
    pub column_names: Vec<String>,
    pub link: OrdinalLink,
    pub algorithm: Algorithm,
    pub prior_info: PriorInfo,
    pub n_obs: usize,
    pub transform: QrTransform,
}

impl PolrFit {
    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn is_skewed(&self) -> bool {
        self.prior_info.skew.is_skewed()
    }

    /// Posterior mean of every coefficient, in column order.
    pub fn coefficients(&self) -> Result<Array1<f64>> {
        self.posterior_means(&self.column_names)
    }

    /// Posterior means of the cutpoints (J > 2) or the intercept (J = 2).
    pub fn cutpoints(&self) -> Result<Array1<f64>> {
        let names = if self.n_levels() > 2 {
            crate::postprocess::cutpoint_names(&self.levels)
        } else {
            vec![crate::design::INTERCEPT_NAME.to_string()]
        };
        self.posterior_means(&names)
    }

    fn posterior_means(&self, names: &[String]) -> Result<Array1<f64>> {
        names
            .iter()
            .map(|name| {
                self.draws
                    .pooled(name)
                    .map(|v| v.iter().sum::<f64>() / v.len() as f64)
                    .ok_or_else(|| {
                        PolrError::InvalidValue(format!("no draws for parameter '{}'", name))
                    })
            })
            .collect()
    }

    pub fn summary(&self, probs: &[f64]) -> Result<Vec<ParamSummary>> {
        inference::summarize(&self.draws, probs)
    }

    pub fn summary_table(&self) -> Result<String> {
        let mut out = format!(
            "Ordinal regression ({} link, {})\n observations: {}\n outcome levels: {}\n{}\n\n",
            self.link,
            self.algorithm,
            self.n_obs,
            self.levels.join(" < "),
            self.prior_info
        );
        out.push_str(&inference::summary_table(&self.draws, &[0.1, 0.5, 0.9])?);
        Ok(out)
    }

    pub fn posterior_interval(&self, prob: f64) -> Result<Vec<Interval>> {
        inference::posterior_interval(&self.draws, prob)
    }

    /// Posterior-mean category probabilities for new rows of predictors.
    pub fn predict_proba(&self, x: &DesignMatrix) -> Result<ndarray::Array2<f64>> {
        let x = x.clone().without_intercept();
        if x.column_names() != self.column_names.as_slice() {
            return Err(PolrError::DimensionMismatch(format!(
                "new data has columns {:?} but the model was fit with {:?}",
                x.column_names(),
                self.column_names
            )));
        }
        let alpha = if self.is_skewed() {
            Some(
                self.draws
                    .pooled("alpha")
                    .map(|v| v.iter().sum::<f64>() / v.len() as f64)
                    .ok_or_else(|| PolrError::InvalidValue("no draws for 'alpha'".to_string()))?,
            )
        } else {
            None
        };
        predict::category_probabilities(
            x.values(),
            &self.coefficients()?,
            &self.cutpoints()?,
            self.link,
            alpha,
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prior::R2What;
    use crate::response::OrderedFactor;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2, Array3};
    use std::cell::RefCell;

    /// Engine stand-in: returns constant draws with the requested blocks and
    /// remembers the record it was given.
    struct MockBackend {
        theta: f64,
        seen: RefCell<Option<PolrData>>,
    }

    impl MockBackend {
        fn new(theta: f64) -> Self {
            Self { theta, seen: RefCell::new(None) }
        }

        fn draws(&self, data: &PolrData, pars: &[&str], iterations: usize, chains: usize) -> Draws {
            let mut names = vec!["lp__".to_string()];
            let mut fill = vec![-50.0];
            for &block in pars {
                let (size, value) = match block {
                    "beta" => (data.k, self.theta),
                    "zeta" => (data.j - 1, 0.5),
                    "alpha" => (1, 1.5),
                    _ => (data.j, 0.25),
                };
                let scalar = block == "alpha" || (data.j == 2 && block != "beta");
                if scalar {
                    names.push(block.to_string());
                    fill.push(value);
                    continue;
                }
                for i in 1..=size {
                    names.push(format!("{}[{}]", block, i));
                    fill.push(value + i as f64 - 1.0);
                }
            }
            let values = Array3::from_shape_fn((iterations, chains, names.len()), |(_, _, p)| fill[p]);
            Draws::new(values, names).unwrap()
        }
    }

    impl PosteriorBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        fn sample(&self, data: &PolrData, pars: &[&str], config: &SamplingConfig) -> Result<Draws> {
            *self.seen.borrow_mut() = Some(data.clone());
            Ok(self.draws(data, pars, config.draws_per_chain(), config.chains))
        }

        fn variational(
            &self,
            data: &PolrData,
            pars: &[&str],
            _algorithm: Algorithm,
            config: &VariationalConfig,
        ) -> Result<Draws> {
            *self.seen.borrow_mut() = Some(data.clone());
            Ok(self.draws(data, pars, config.output_samples, 1))
        }
    }

    fn levels(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn design() -> DesignMatrix {
        let x: Array2<f64> = array![
            [1.0, 0.5],
            [1.0, 1.5],
            [1.0, 2.0],
            [1.0, 3.5],
            [1.0, 4.0],
            [1.0, 6.0]
        ];
        DesignMatrix::new(x, levels(&["(Intercept)", "dose"])).unwrap()
    }

    fn ordinal_y() -> Response {
        OrderedFactor::from_labels(
            &["low", "low", "mid", "mid", "high", "high"],
            &levels(&["low", "mid", "high"]),
        )
        .unwrap()
        .into()
    }

    fn binary_y() -> Response {
        OrderedFactor::from_labels(&["n", "n", "y", "n", "y", "y"], &levels(&["n", "y"]))
            .unwrap()
            .into()
    }

    fn small_sampling() -> SamplingConfig {
        SamplingConfig { chains: 2, iter: 20, ..Default::default() }
    }

    #[test]
    fn test_prepare_builds_record() {
        let config = PolrConfig::default().prior(R2Prior::new(0.5, R2What::Mean));
        let p = prepare_polr(design(), ordinal_y(), None, None, &config).unwrap();
        let d = &p.data;
        assert_eq!((d.j, d.n, d.k), (3, 6, 1));
        assert_eq!(d.y, vec![1, 1, 2, 2, 3, 3]);
        assert_eq!(d.link, 1);
        assert_eq!(d.prior_dist, 1);
        // Mean: (K/2 − R2·K/2)/R2 with K = 1
        assert_abs_diff_eq!(d.regularization, 0.5, epsilon = 1e-12);
        assert_eq!(d.prior_counts, vec![1.0; 3]);
        assert_eq!(d.do_residuals, 1);
        assert_eq!(d.has_weights, 0);
        assert!(d.weights.is_empty());
        assert_eq!(d.compute_mean_ppd, 1);
        assert_eq!(p.pars, vec!["beta", "zeta", "mean_PPD"]);
        assert_eq!(p.transform.column_names, levels(&["dose"]));
        // Q is built from centered predictors
        let col_sum: f64 = d.x.iter().map(|r| r[0]).sum();
        assert_abs_diff_eq!(col_sum, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_prepare_rejects_numeric_response() {
        let y = Response::Numeric(vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        let err = prepare_polr(design(), y, None, None, &PolrConfig::default()).unwrap_err();
        assert!(err.to_string().contains("'y' must be a factor"));
    }

    #[test]
    fn test_prepare_rejects_row_mismatch() {
        let y: Response = OrderedFactor::from_labels(&["a", "b"], &levels(&["a", "b"]))
            .unwrap()
            .into();
        assert!(matches!(
            prepare_polr(design(), y, None, None, &PolrConfig::default()),
            Err(PolrError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_prepare_rejects_shape_for_many_levels() {
        let config = PolrConfig::default().skewness(2.0, 2.0);
        let err = prepare_polr(design(), ordinal_y(), None, None, &config).unwrap_err();
        assert!(matches!(err, PolrError::IncompatibleModel(_)));
    }

    #[test]
    fn test_prepare_rejects_invalid_rate() {
        let config = PolrConfig { shape: Some(2.0), rate: Some(-1.0), ..Default::default() };
        let err = prepare_polr(design(), binary_y(), None, None, &config).unwrap_err();
        assert!(err.to_string().contains("'rate' must be positive"));
    }

    #[test]
    fn test_prepare_rejects_skewed_probit() {
        let config = PolrConfig::default()
            .skewness(2.0, 2.0)
            .method(OrdinalLink::Probit);
        assert!(matches!(
            prepare_polr(design(), binary_y(), None, None, &config),
            Err(PolrError::IncompatibleModel(_))
        ));
    }

    #[test]
    fn test_prepare_binary_skewed_with_weights() {
        let config = PolrConfig::default().skewness(2.0, 3.0).prior_pd(true);
        let w = array![1.0, 2.0, 1.0, 1.0, 0.5, 1.0];
        let off = Array1::zeros(6);
        let p = prepare_polr(design(), binary_y(), Some(&w), Some(&off), &config).unwrap();
        assert_eq!(p.data.is_skewed, 1);
        assert_eq!((p.data.shape, p.data.rate), (2.0, 3.0));
        assert_eq!(p.data.do_residuals, 0);
        assert_eq!(p.data.prior_pd, 1);
        assert_eq!(p.data.has_weights, 1);
        assert_eq!(p.data.weights.len(), 6);
        assert_eq!(p.data.has_offset, 0);
        assert_eq!(p.pars, vec!["zeta", "beta", "alpha", "mean_PPD"]);
    }

    #[test]
    fn test_prepare_r2_needs_predictors() {
        let x = DesignMatrix::new(Array2::ones((6, 1)), levels(&["(Intercept)"])).unwrap();
        let config = PolrConfig::default().prior(R2Prior::new(0.3, R2What::Mean));
        assert!(matches!(
            prepare_polr(x.clone(), ordinal_y(), None, None, &config),
            Err(PolrError::InvalidPrior(_))
        ));
        let p = prepare_polr(x, ordinal_y(), None, None, &PolrConfig::default()).unwrap();
        assert_eq!(p.data.k, 0);
        assert!(p.data.x.iter().all(|row| row.is_empty()));
    }

    #[test]
    fn test_fit_end_to_end_sampling() {
        let backend = MockBackend::new(2.0);
        let config = PolrConfig::default().sampling(small_sampling());
        let fit = stan_polr_fit(design(), ordinal_y(), None, None, &config, &backend).unwrap();

        assert_eq!(
            fit.draws.names(),
            &levels(&[
                "dose", "low|mid", "mid|high",
                "mean_PPD:low", "mean_PPD:mid", "mean_PPD:high", "log-posterior",
            ])[..]
        );
        assert_eq!(fit.draws.n_chains(), 2);
        assert_eq!(fit.draws.n_iterations(), 10);

        // β = R⁻¹ θ with a single predictor: θ · r_inv[0, 0]
        let expected = 2.0 * fit.transform.r_inv[[0, 0]];
        assert_abs_diff_eq!(fit.coefficients().unwrap()[0], expected, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.cutpoints().unwrap()[1], 1.5, epsilon = 1e-12);

        let seen = backend.seen.borrow();
        assert_eq!(seen.as_ref().unwrap().n, 6);
    }

    #[test]
    fn test_fit_end_to_end_variational_binary() {
        let backend = MockBackend::new(1.0);
        let config = PolrConfig::default()
            .algorithm(Algorithm::Meanfield)
            .skewness(1.0, 1.0)
            .variational(VariationalConfig { output_samples: 7, ..Default::default() });
        let fit = stan_polr_fit(design(), binary_y(), None, None, &config, &backend).unwrap();
        assert_eq!(
            fit.draws.names(),
            &levels(&["(Intercept)", "dose", "alpha", "mean_PPD", "log-posterior"])[..]
        );
        assert_eq!(fit.draws.n_chains(), 1);
        assert_eq!(fit.draws.n_iterations(), 7);
        assert_eq!(fit.algorithm, Algorithm::Meanfield);
    }

    #[test]
    fn test_formula_front_end() {
        let frame = ModelFrame::new()
            .with_categorical(
                "grade",
                &["a", "b", "c", "a", "b", "c"],
                Some(levels(&["a", "b", "c"])),
            )
            .unwrap()
            .with_numeric("dose", vec![0.5, 1.5, 2.0, 3.5, 4.0, 6.0])
            .unwrap();
        let backend = MockBackend::new(0.0);
        let config = PolrConfig::default().sampling(small_sampling());
        let fit = stan_polr("grade ~ dose", &frame, None, None, &config, &backend).unwrap();
        assert_eq!(fit.column_names, levels(&["dose"]));
        assert_eq!(fit.levels, levels(&["a", "b", "c"]));
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let backend = MockBackend::new(0.3);
        let config = PolrConfig::default().sampling(small_sampling());
        let fit = stan_polr_fit(design(), ordinal_y(), None, None, &config, &backend).unwrap();

        let p = fit.predict_proba(&design()).unwrap();
        assert_eq!(p.dim(), (6, 3));
        for row in p.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }

        let wrong = DesignMatrix::new(Array2::zeros((2, 1)), levels(&["age"])).unwrap();
        assert!(fit.predict_proba(&wrong).is_err());
    }

    #[test]
    fn test_summary_table_mentions_priors() {
        let backend = MockBackend::new(0.3);
        let config = PolrConfig::default()
            .sampling(small_sampling())
            .prior(R2Prior::new(0.5, R2What::Mean));
        let fit = stan_polr_fit(design(), ordinal_y(), None, None, &config, &backend).unwrap();
        let table = fit.summary_table().unwrap();
        assert!(table.contains("logistic link"));
        assert!(table.contains("R2(location = 0.5"));
        assert!(table.contains("low|mid"));
    }
}
