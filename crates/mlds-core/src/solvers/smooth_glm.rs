// =============================================================================
// SMOOTH GLM: Generalized Additive Models with Penalized Splines
// =============================================================================
//
// Fits GLMs whose linear predictor contains penalized smooth terms:
//
//     g(μ) = X_p β_p + Σⱼ X_j β_j,      penalty Σⱼ λⱼ β_j' S_j β_j
//
// THE ALGORITHM
// -------------
// 1. Build X = [parametric | smooth block 1 | smooth block 2 | ...]
// 2. At every IRLS iteration, with the current W and z:
//      - re-select λ by minimizing UBRE/GCV of the working problem
//        (see `smoothness`), warm-started from the previous λ
//      - solve (X'WX + S_λ) β = X'Wz
//      - step-halve if the penalized deviance increased
// 3. Once the deviance has settled, λ is frozen and the remaining steps
//    are plain penalized IRLS.
// 4. Stop when the relative deviance change is below tolerance.
//
// With `fixed_lambdas` the selection step is skipped and the fit is a plain
// penalized IRLS run.
//
// A smooth block does not have to be a basis evaluated at one covariate. Any
// linear functional of the smooth works, e.g. f(S1) − 2 f(S2) + f(S3); the
// solver only sees columns and a penalty.
//
// =============================================================================

use ndarray::{s, Array1, Array2};
use tracing::{debug, warn};

use crate::error::{MldsError, Result};
use crate::families::Family;
use crate::links::Link;
use crate::solvers::irls::{fit_with_penalty, solve_weighted_least_squares_with_penalty_matrix, working_quantities, IrlsConfig};
use crate::solvers::smoothness::{LambdaOptimizer, SmoothnessCriterion};

/// Result from fitting a smooth GLM (GAM).
#[derive(Debug, Clone)]
pub struct SmoothGlmResult {
    /// Fitted coefficients (parametric + smooth blocks)
    pub coefficients: Array1<f64>,

    /// Fitted values μ = g⁻¹(Xβ)
    pub fitted_values: Array1<f64>,

    /// Linear predictor η = Xβ
    pub linear_predictor: Array1<f64>,

    /// Final deviance
    pub deviance: f64,

    /// Deviance of the intercept-only model
    pub null_deviance: f64,

    /// Log-likelihood at the fitted values
    pub log_likelihood: f64,

    pub iterations: usize,
    pub converged: bool,

    /// Selected smoothing parameters (one per smooth term)
    pub lambdas: Vec<f64>,

    /// Effective degrees of freedom (one per smooth term)
    pub smooth_edfs: Vec<f64>,

    /// Trace of the influence matrix (parametric + smooth)
    pub total_edf: f64,

    /// Criterion used and its value at the selected λ
    pub criterion: SmoothnessCriterion,
    pub score: f64,

    /// Unscaled covariance (X'WX + S)⁻¹
    pub covariance_unscaled: Array2<f64>,

    /// Column range of each smooth term in the coefficient vector
    pub term_ranges: Vec<(usize, usize)>,

    pub family_name: String,
}

impl SmoothGlmResult {
    /// Residual degrees of freedom n − EDF.
    pub fn residual_df(&self) -> f64 {
        self.fitted_values.len() as f64 - self.total_edf
    }

    /// AIC = −2ℓ + 2·EDF
    pub fn aic(&self) -> f64 {
        -2.0 * self.log_likelihood + 2.0 * self.total_edf
    }

    /// Proportion of null deviance explained.
    pub fn deviance_explained(&self) -> f64 {
        if self.null_deviance > 0.0 {
            1.0 - self.deviance / self.null_deviance
        } else {
            f64::NAN
        }
    }
}

/// Configuration for smooth GLM fitting.
#[derive(Debug, Clone)]
pub struct SmoothGamConfig {
    /// Base IRLS configuration
    pub irls_config: IrlsConfig,

    /// Search interval for λ
    pub lambda_min: f64,
    pub lambda_max: f64,

    /// Brent tolerance on log λ
    pub lambda_tol: f64,

    /// Coordinate descent sweeps per IRLS iteration
    pub max_lambda_iter: usize,

    /// λ is held fixed once the relative deviance change falls below this
    pub lambda_freeze_tol: f64,

    /// Selection criterion
    pub criterion: SmoothnessCriterion,

    /// Skip selection and use these λ (one per term)
    pub fixed_lambdas: Option<Vec<f64>>,
}

impl Default for SmoothGamConfig {
    fn default() -> Self {
        Self {
            irls_config: IrlsConfig::default(),
            lambda_min: 1e-6,
            lambda_max: 1e8,
            lambda_tol: 1e-4,
            max_lambda_iter: 4,
            lambda_freeze_tol: 1e-5,
            criterion: SmoothnessCriterion::Auto,
            fixed_lambdas: None,
        }
    }
}

/// Design columns and penalty of one smooth term.
#[derive(Debug, Clone)]
pub struct SmoothTermData {
    pub name: String,
    /// Design block for this term (n × k)
    pub basis: Array2<f64>,
    /// Penalty matrix (k × k)
    pub penalty: Array2<f64>,
    /// Starting λ for the first selection round
    pub initial_lambda: f64,
}

impl SmoothTermData {
    pub fn new(name: impl Into<String>, basis: Array2<f64>, penalty: Array2<f64>) -> Self {
        Self {
            name: name.into(),
            basis,
            penalty,
            initial_lambda: 1.0,
        }
    }

    /// Number of coefficients.
    pub fn k(&self) -> usize {
        self.basis.ncols()
    }
}

/// Place every term's penalty, scaled by its λ, on the block diagonal.
fn build_penalty_matrix(total_cols: usize, terms: &[SmoothTermData], ranges: &[(usize, usize)], lambdas: &[f64]) -> Array2<f64> {
    let mut penalty = Array2::zeros((total_cols, total_cols));
    for ((term, &(start, end)), &lambda) in terms.iter().zip(ranges).zip(lambdas) {
        penalty
            .slice_mut(s![start..end, start..end])
            .scaled_add(lambda, &term.penalty);
    }
    penalty
}

/// Fit a GLM with smooth terms using penalized IRLS.
///
/// # Arguments
/// * `y` - Response variable (n)
/// * `x_parametric` - Unpenalized columns (n × p), normally the intercept
/// * `smooth_terms` - Design block + penalty for each smooth
/// * `family` / `link` - Response distribution and link
/// * `config` - Fitting configuration
pub fn fit_smooth_glm(
    y: &Array1<f64>,
    x_parametric: &Array2<f64>,
    smooth_terms: &[SmoothTermData],
    family: &dyn Family,
    link: &dyn Link,
    config: &SmoothGamConfig,
) -> Result<SmoothGlmResult> {
    let n = y.len();
    let p_param = x_parametric.ncols();

    if n == 0 {
        return Err(MldsError::EmptyInput("y is empty".to_string()));
    }
    if x_parametric.nrows() != n {
        return Err(MldsError::DimensionMismatch(format!(
            "x_parametric has {} rows but y has {} elements",
            x_parametric.nrows(),
            n
        )));
    }
    for term in smooth_terms {
        if term.basis.nrows() != n {
            return Err(MldsError::DimensionMismatch(format!(
                "smooth term '{}' has {} rows but y has {} elements",
                term.name,
                term.basis.nrows(),
                n
            )));
        }
        if term.penalty.dim() != (term.k(), term.k()) {
            return Err(MldsError::DimensionMismatch(format!(
                "smooth term '{}' has {} columns but a {:?} penalty",
                term.name,
                term.k(),
                term.penalty.dim()
            )));
        }
    }

    // Combined design matrix: [parametric | smooth1 | smooth2 | ...]
    let total_cols = p_param + smooth_terms.iter().map(SmoothTermData::k).sum::<usize>();
    let mut x = Array2::zeros((n, total_cols));
    x.slice_mut(s![.., ..p_param]).assign(x_parametric);

    let mut ranges = Vec::with_capacity(smooth_terms.len());
    let mut col = p_param;
    for term in smooth_terms {
        let end = col + term.k();
        x.slice_mut(s![.., col..end]).assign(&term.basis);
        ranges.push((col, end));
        col = end;
    }

    let criterion = config.criterion.resolve(family.scale_known());
    let penalties: Vec<Array2<f64>> = smooth_terms.iter().map(|t| t.penalty.clone()).collect();

    let (coefficients, lambdas, iterations, converged) = match &config.fixed_lambdas {
        Some(fixed) => {
            if fixed.len() != smooth_terms.len() {
                return Err(MldsError::DimensionMismatch(format!(
                    "{} fixed lambdas for {} smooth terms",
                    fixed.len(),
                    smooth_terms.len()
                )));
            }
            let penalty = build_penalty_matrix(total_cols, smooth_terms, &ranges, fixed);
            let fit = fit_with_penalty(y, &x, &penalty, family, link, &config.irls_config)?;
            (fit.coefficients, fixed.clone(), fit.iterations, fit.converged)
        }
        None => select_and_fit(y, &x, smooth_terms, &penalties, &ranges, family, link, criterion, config)?,
    };

    if !converged {
        warn!(iterations, "smooth GLM did not converge");
    }

    // Final quantities at the converged coefficients
    let linear_predictor = x.dot(&coefficients);
    let fitted_values = family.clamp_mu(&link.inverse(&linear_predictor));
    let deviance = family.deviance(y, &fitted_values, None);
    let log_likelihood = family.log_likelihood(y, &fitted_values, None);

    let (w, z) = working_quantities(y, &fitted_values, &linear_predictor, family, link, config.irls_config.min_weight);
    let optimizer = LambdaOptimizer::new(&x, &z, &w, &penalties, ranges.clone(), criterion);
    let (smooth_edfs, total_edf) = optimizer.edfs(&lambdas);
    let score = optimizer.evaluate(&lambdas);

    let penalty = build_penalty_matrix(total_cols, smooth_terms, &ranges, &lambdas);
    let (_, covariance_unscaled) = solve_weighted_least_squares_with_penalty_matrix(&x, &z, &w, &penalty)?;

    let y_mean = y.mean().unwrap_or(0.5);
    let null_mu = family.clamp_mu(&Array1::from_elem(n, y_mean));
    let null_deviance = family.deviance(y, &null_mu, None);

    Ok(SmoothGlmResult {
        coefficients,
        fitted_values,
        linear_predictor,
        deviance,
        null_deviance,
        log_likelihood,
        iterations,
        converged,
        lambdas,
        smooth_edfs,
        total_edf,
        criterion,
        score,
        covariance_unscaled,
        term_ranges: ranges,
        family_name: family.name().to_string(),
    })
}

/// IRLS with λ re-selected at every iteration.
/// Returns (coefficients, lambdas, iterations, converged).
#[allow(clippy::too_many_arguments)]
fn select_and_fit(
    y: &Array1<f64>,
    x: &Array2<f64>,
    smooth_terms: &[SmoothTermData],
    penalties: &[Array2<f64>],
    ranges: &[(usize, usize)],
    family: &dyn Family,
    link: &dyn Link,
    criterion: SmoothnessCriterion,
    config: &SmoothGamConfig,
) -> Result<(Array1<f64>, Vec<f64>, usize, bool)> {
    let total_cols = x.ncols();
    let irls = &config.irls_config;
    let log_min = config.lambda_min.ln();
    let log_max = config.lambda_max.ln();

    let mut lambdas: Vec<f64> = smooth_terms.iter().map(|t| t.initial_lambda).collect();
    let mut mu = family.initialize_mu(y);
    let mut eta = link.link(&mu);
    let mut coefficients = Array1::<f64>::zeros(total_cols);
    let mut deviance = family.deviance(y, &mu, None);

    let mut converged = false;
    let mut frozen = false;
    let mut iteration = 0;

    while iteration < irls.max_iterations {
        iteration += 1;
        let deviance_old = deviance;

        let (w, z) = working_quantities(y, &mu, &eta, family, link, irls.min_weight);

        if !frozen && !smooth_terms.is_empty() {
            let optimizer = LambdaOptimizer::new(x, &z, &w, penalties, ranges.to_vec(), criterion);
            lambdas = optimizer.optimize(&lambdas, log_min, log_max, config.lambda_tol, config.max_lambda_iter);
        }

        let penalty = build_penalty_matrix(total_cols, smooth_terms, ranges, &lambdas);
        let (new_coef, _) = solve_weighted_least_squares_with_penalty_matrix(x, &z, &w, &penalty)?;

        // Penalized deviance of the previous coefficients under the new λ
        let pen_old = deviance_old + coefficients.dot(&penalty.dot(&coefficients));

        let mut candidate = new_coef;
        let mut cand_eta = x.dot(&candidate);
        let mut cand_mu = family.clamp_mu(&link.inverse(&cand_eta));
        let mut cand_dev = family.deviance(y, &cand_mu, None);

        let mut halvings = 0;
        while iteration > 1
            && cand_dev + candidate.dot(&penalty.dot(&candidate)) > pen_old * (1.0 + 1e-7)
            && halvings < irls.max_step_halvings
        {
            candidate = (&candidate + &coefficients) * 0.5;
            cand_eta = x.dot(&candidate);
            cand_mu = family.clamp_mu(&link.inverse(&cand_eta));
            cand_dev = family.deviance(y, &cand_mu, None);
            halvings += 1;
        }

        coefficients = candidate;
        eta = cand_eta;
        mu = cand_mu;
        deviance = cand_dev;

        let rel_change = (deviance_old - deviance).abs() / (deviance.abs() + 0.1);
        debug!(iteration, deviance, rel_change, ?lambdas, "smooth pirls step");

        if iteration > 1 && rel_change < irls.tolerance {
            converged = true;
            break;
        }
        if iteration > 1 && rel_change < config.lambda_freeze_tol {
            frozen = true;
        }
    }

    Ok((coefficients, lambdas, iteration, converged))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::BinomialFamily;
    use crate::links::{LogitLink, ProbitLink};
    use crate::splines::BSplineBasis;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Bernoulli responses with P(y=1) = Φ(2 sin(x)) over x in [0, 3].
    fn simulated(n: usize, seed: u64) -> (Array1<f64>, Array1<f64>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let x = Array1::linspace(0.0, 3.0, n);
        let y = x.mapv(|xi: f64| {
            let p = crate::links::norm_cdf(2.0 * xi.sin() - 1.0);
            if rng.gen::<f64>() < p { 1.0 } else { 0.0 }
        });
        (x, y)
    }

    fn single_term(x: &Array1<f64>, k: usize) -> SmoothTermData {
        let basis = BSplineBasis::cubic(0.0, 3.0, k).unwrap();
        SmoothTermData::new("s(x)", basis.design(x), basis.penalty(2))
    }

    #[test]
    fn test_build_penalty_matrix() {
        let terms = vec![
            SmoothTermData::new("a", Array2::zeros((4, 2)), Array2::eye(2)),
            SmoothTermData::new("b", Array2::zeros((4, 3)), Array2::eye(3)),
        ];
        let penalty = build_penalty_matrix(6, &terms, &[(1, 3), (3, 6)], &[0.5, 2.0]);
        assert_eq!(penalty[[0, 0]], 0.0);
        assert_eq!(penalty[[1, 1]], 0.5);
        assert_eq!(penalty[[2, 2]], 0.5);
        assert_eq!(penalty[[3, 3]], 2.0);
        assert_eq!(penalty[[5, 5]], 2.0);
        assert_eq!(penalty[[1, 3]], 0.0);
    }

    #[test]
    fn test_binomial_gam_fits_and_reports() {
        let (x, y) = simulated(400, 7);
        let term = single_term(&x, 8);
        let intercept = Array2::ones((400, 1));
        let fit = fit_smooth_glm(&y, &intercept, &[term], &BinomialFamily, &ProbitLink, &SmoothGamConfig::default()).unwrap();

        assert!(fit.converged);
        assert_eq!(fit.criterion, SmoothnessCriterion::Ubre);
        assert_eq!(fit.lambdas.len(), 1);
        assert!(fit.deviance < fit.null_deviance);
        assert!(fit.smooth_edfs[0] > 0.9 && fit.smooth_edfs[0] <= 7.0 + 1e-6);
        assert!((fit.total_edf - 1.0 - fit.smooth_edfs[0]).abs() < 1e-6);
        assert!(fit.residual_df() > 380.0);
        assert!(fit.aic().is_finite());
    }

    #[test]
    fn test_fixed_lambdas_skip_selection() {
        let (x, y) = simulated(200, 11);
        let term = single_term(&x, 6);
        let intercept = Array2::ones((200, 1));
        let config = SmoothGamConfig {
            fixed_lambdas: Some(vec![3.0]),
            ..Default::default()
        };
        let fit = fit_smooth_glm(&y, &intercept, &[term], &BinomialFamily, &LogitLink, &config).unwrap();
        assert_eq!(fit.lambdas, vec![3.0]);
    }

    #[test]
    fn test_more_smoothing_costs_deviance() {
        let (x, y) = simulated(300, 3);
        let intercept = Array2::ones((300, 1));
        let rough = SmoothGamConfig {
            fixed_lambdas: Some(vec![1e-4]),
            ..Default::default()
        };
        let smooth = SmoothGamConfig {
            fixed_lambdas: Some(vec![1e5]),
            ..Default::default()
        };
        let fit_rough = fit_smooth_glm(&y, &intercept, &[single_term(&x, 8)], &BinomialFamily, &ProbitLink, &rough).unwrap();
        let fit_smooth = fit_smooth_glm(&y, &intercept, &[single_term(&x, 8)], &BinomialFamily, &ProbitLink, &smooth).unwrap();
        assert!(fit_rough.deviance <= fit_smooth.deviance + 1e-8);
        assert!(fit_rough.total_edf > fit_smooth.total_edf);
    }

    #[test]
    fn test_wrong_fixed_lambda_count() {
        let (x, y) = simulated(50, 1);
        let config = SmoothGamConfig {
            fixed_lambdas: Some(vec![1.0, 2.0]),
            ..Default::default()
        };
        let result = fit_smooth_glm(&y, &Array2::ones((50, 1)), &[single_term(&x, 5)], &BinomialFamily, &ProbitLink, &config);
        assert!(matches!(result, Err(MldsError::DimensionMismatch(_))));
    }

    #[test]
    fn test_term_row_mismatch() {
        let (x, y) = simulated(50, 1);
        let term = single_term(&x.slice(s![..40]).to_owned(), 5);
        let result = fit_smooth_glm(&y, &Array2::ones((50, 1)), &[term], &BinomialFamily, &ProbitLink, &SmoothGamConfig::default());
        assert!(matches!(result, Err(MldsError::DimensionMismatch(_))));
    }
}
