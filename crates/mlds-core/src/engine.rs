// =============================================================================
// GAM Engine
// =============================================================================
//
// `GamEngine` is the boundary between orchestration and model fitting. The
// comparer only ever talks to this trait, so a different backend (another
// smoothness criterion, a different basis, a remote service) can be swapped
// in without touching the comparison logic.
//
// `PenalizedGamEngine` is the native backend:
//
//   1. One cubic B-spline basis with k functions on the stimulus range,
//      first function dropped so that f(min) = 0.
//   2. Each term's design block via the summation convention.
//   3. X = [1 | block_1 | ... | block_T], second-order difference penalty
//      on every block.
//   4. Penalized IRLS with λ re-selected by UBRE/GCV at every step.
//
// =============================================================================

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{MldsError, Result};
use crate::inference::DevianceTest;
use crate::model::{summation_design, FittedGam, GamSpec, PredictionData};
use crate::solvers::{fit_smooth_glm, SmoothGamConfig, SmoothTermData};
use crate::splines::BSplineBasis;

/// Fits, predicts from, and compares binomial GAMs.
pub trait GamEngine {
    /// Fit the model described by `spec`.
    fn fit(&self, spec: &GamSpec) -> Result<FittedGam>;

    /// Linear predictor (link scale) for new data.
    fn predict(&self, model: &FittedGam, data: &PredictionData) -> Result<Array1<f64>>;

    /// Chi-square analysis of deviance of `reduced` against `full`.
    fn compare(&self, reduced: &FittedGam, full: &FittedGam) -> Result<DevianceTest> {
        if reduced.nobs != full.nobs {
            return Err(MldsError::DimensionMismatch(format!(
                "models were fitted to {} and {} observations",
                reduced.nobs, full.nobs
            )));
        }
        Ok(DevianceTest::new(reduced.residual_df, reduced.deviance, full.residual_df, full.deviance))
    }
}

/// Penalized regression spline backend.
#[derive(Debug, Clone)]
pub struct PenalizedGamEngine {
    pub config: SmoothGamConfig,
    /// Order of the difference penalty. Default: 2
    pub penalty_order: usize,
}

impl Default for PenalizedGamEngine {
    fn default() -> Self {
        Self {
            config: SmoothGamConfig::default(),
            penalty_order: 2,
        }
    }
}

impl PenalizedGamEngine {
    pub fn new(config: SmoothGamConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn basis_for(&self, spec: &GamSpec) -> Result<BSplineBasis> {
        let lo = spec.stimuli.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = spec.stimuli.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        BSplineBasis::cubic(lo, hi, spec.k)
    }
}

impl GamEngine for PenalizedGamEngine {
    fn fit(&self, spec: &GamSpec) -> Result<FittedGam> {
        spec.validate()?;
        let n = spec.nobs();
        let basis = self.basis_for(spec)?;
        let penalty = basis.penalty(self.penalty_order);

        let terms: Vec<SmoothTermData> = spec
            .terms
            .iter()
            .map(|t| SmoothTermData::new(t.name.clone(), summation_design(&basis, &spec.stimuli, &t.by), penalty.clone()))
            .collect();

        let family = spec.family.build();
        let link = spec.link.build();
        let intercept = Array2::ones((n, 1));
        let fit = fit_smooth_glm(&spec.response, &intercept, &terms, family.as_ref(), link.as_ref(), &self.config)?;

        debug!(
            terms = terms.len(),
            deviance = fit.deviance,
            edf = fit.total_edf,
            iterations = fit.iterations,
            "fitted GAM"
        );

        Ok(FittedGam {
            residual_df: fit.residual_df(),
            aic: fit.aic(),
            coefficients: fit.coefficients,
            linear_predictor: fit.linear_predictor,
            fitted_values: fit.fitted_values,
            deviance: fit.deviance,
            null_deviance: fit.null_deviance,
            term_names: spec.terms.iter().map(|t| t.name.clone()).collect(),
            term_ranges: fit.term_ranges,
            edfs: fit.smooth_edfs,
            lambdas: fit.lambdas,
            total_edf: fit.total_edf,
            criterion: fit.criterion,
            score: fit.score,
            iterations: fit.iterations,
            converged: fit.converged,
            covariance_unscaled: fit.covariance_unscaled,
            basis,
            link: spec.link,
            family_name: fit.family_name,
            nobs: n,
        })
    }

    fn predict(&self, model: &FittedGam, data: &PredictionData) -> Result<Array1<f64>> {
        let m = data.stimuli.nrows();
        if data.stimuli.ncols() != 3 {
            return Err(MldsError::DimensionMismatch(format!(
                "prediction stimuli have {} columns, expected 3",
                data.stimuli.ncols()
            )));
        }
        if data.by.len() != model.term_ranges.len() {
            return Err(MldsError::DimensionMismatch(format!(
                "{} by-matrices for a model with {} terms",
                data.by.len(),
                model.term_ranges.len()
            )));
        }

        let mut eta = Array1::from_elem(m, model.intercept());
        for (by, &(start, end)) in data.by.iter().zip(&model.term_ranges) {
            if by.dim() != (m, 3) {
                return Err(MldsError::DimensionMismatch(format!(
                    "prediction by-matrix is {:?}, expected ({}, 3)",
                    by.dim(),
                    m
                )));
            }
            let block = summation_design(&model.basis, &data.stimuli, by);
            eta += &block.dot(&model.coefficients.slice(ndarray::s![start..end]));
        }
        Ok(eta)
    }
}
