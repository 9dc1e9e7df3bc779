// =============================================================================
// GAM Model Specification and Fitted Models
// =============================================================================
//
// A model is described by data, not by a formula string:
//
//     response ~ 1 + Σ_t s(S, by = L_t)
//
// where S is the n × 3 stimulus matrix and every term t carries its own
// n × 3 "by" matrix L_t. Matrix arguments follow the summation convention:
// row i of term t contributes
//
//     Σ_j L_t[i, j] · f_t(S[i, j])
//
// to the linear predictor. With L = (1, −2, 1) this is the MLDS decision
// variable ψ(s1) − 2ψ(s2) + ψ(s3).
//
// =============================================================================

use std::fmt;

use ndarray::{Array1, Array2};

use crate::error::{MldsError, Result};
use crate::families::FamilyKind;
use crate::links::LinkKind;
use crate::solvers::SmoothnessCriterion;
use crate::splines::BSplineBasis;

/// One smooth term: a name and its by-matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct ByTerm {
    pub name: String,
    /// n × 3 weights applied to f(S[i, j])
    pub by: Array2<f64>,
}

impl ByTerm {
    pub fn new(name: impl Into<String>, by: Array2<f64>) -> Self {
        Self { name: name.into(), by }
    }
}

/// Everything needed to fit one GAM.
#[derive(Debug, Clone)]
pub struct GamSpec {
    /// Binary response (n)
    pub response: Array1<f64>,
    /// Stimulus matrix (n × 3)
    pub stimuli: Array2<f64>,
    /// Smooth terms sharing one basis over the stimulus range
    pub terms: Vec<ByTerm>,
    /// Basis dimension
    pub k: usize,
    pub link: LinkKind,
    pub family: FamilyKind,
}

impl GamSpec {
    pub fn new(response: Array1<f64>, stimuli: Array2<f64>, terms: Vec<ByTerm>) -> Self {
        Self {
            response,
            stimuli,
            terms,
            k: 4,
            link: LinkKind::default(),
            family: FamilyKind::default(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_link(mut self, link: LinkKind) -> Self {
        self.link = link;
        self
    }

    pub fn nobs(&self) -> usize {
        self.response.len()
    }

    /// Shape checks shared by every engine.
    pub fn validate(&self) -> Result<()> {
        let n = self.nobs();
        if n == 0 {
            return Err(MldsError::EmptyInput("model has no observations".to_string()));
        }
        if self.stimuli.dim() != (n, 3) {
            return Err(MldsError::DimensionMismatch(format!(
                "stimulus matrix is {:?}, expected ({}, 3)",
                self.stimuli.dim(),
                n
            )));
        }
        if self.terms.is_empty() {
            return Err(MldsError::InvalidValue("model needs at least one smooth term".to_string()));
        }
        for term in &self.terms {
            if term.by.dim() != (n, 3) {
                return Err(MldsError::DimensionMismatch(format!(
                    "by-matrix of '{}' is {:?}, expected ({}, 3)",
                    term.name,
                    term.by.dim(),
                    n
                )));
            }
        }
        Ok(())
    }
}

/// New data for predicting from a fitted model.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionData {
    /// Stimulus matrix (m × 3)
    pub stimuli: Array2<f64>,
    /// One by-matrix (m × 3) per model term, in term order
    pub by: Vec<Array2<f64>>,
}

impl PredictionData {
    /// Evaluate term `term` alone along `grid`.
    ///
    /// Stimuli are (grid, 0, 0); the selected term's by-matrix is all ones
    /// and every other term's is zero.
    pub fn isolate(grid: &Array1<f64>, n_terms: usize, term: usize) -> Self {
        let m = grid.len();
        let mut stimuli = Array2::zeros((m, 3));
        stimuli.column_mut(0).assign(grid);
        let by = (0..n_terms)
            .map(|t| if t == term { Array2::ones((m, 3)) } else { Array2::zeros((m, 3)) })
            .collect();
        Self { stimuli, by }
    }
}

/// Design block of one smooth term under the summation convention.
pub fn summation_design(basis: &BSplineBasis, stimuli: &Array2<f64>, by: &Array2<f64>) -> Array2<f64> {
    let n = stimuli.nrows();
    let mut block = Array2::zeros((n, basis.ncols()));
    for i in 0..n {
        let mut row = block.row_mut(i);
        for j in 0..3 {
            let weight = by[[i, j]];
            if weight != 0.0 {
                row.scaled_add(weight, &basis.evaluate(stimuli[[i, j]]));
            }
        }
    }
    block
}

/// Fitted GAM with everything needed for prediction and comparison.
#[derive(Debug, Clone)]
pub struct FittedGam {
    /// Intercept followed by each term's spline coefficients
    pub coefficients: Array1<f64>,
    pub linear_predictor: Array1<f64>,
    pub fitted_values: Array1<f64>,
    pub deviance: f64,
    pub null_deviance: f64,
    pub term_names: Vec<String>,
    /// Column range of each term in `coefficients`
    pub term_ranges: Vec<(usize, usize)>,
    pub edfs: Vec<f64>,
    pub lambdas: Vec<f64>,
    pub total_edf: f64,
    /// n − total EDF
    pub residual_df: f64,
    pub criterion: SmoothnessCriterion,
    pub score: f64,
    pub aic: f64,
    pub iterations: usize,
    pub converged: bool,
    /// Unscaled covariance (X'WX + S)⁻¹
    pub covariance_unscaled: Array2<f64>,
    pub basis: BSplineBasis,
    pub link: LinkKind,
    pub family_name: String,
    pub nobs: usize,
}

impl FittedGam {
    pub fn intercept(&self) -> f64 {
        self.coefficients[0]
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

impl fmt::Display for FittedGam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Family: {}", self.family_name)?;
        writeln!(f, "Link function: {}", self.link)?;
        writeln!(f)?;
        writeln!(f, "Parametric coefficients:")?;
        writeln!(f, "             {:>10} {:>10}", "Estimate", "Std. Error")?;
        writeln!(
            f,
            "(Intercept)  {:>10.4} {:>10.4}",
            self.intercept(),
            self.covariance_unscaled[[0, 0]].max(0.0).sqrt()
        )?;
        writeln!(f)?;
        writeln!(f, "Smooth terms (k = {}):", self.basis.ncols() + 1)?;
        writeln!(f, "  {:<16} {:>8} {:>12}", "term", "edf", "lambda")?;
        for ((name, edf), lambda) in self.term_names.iter().zip(&self.edfs).zip(&self.lambdas) {
            writeln!(f, "  {:<16} {:>8.3} {:>12.4e}", name, edf, lambda)?;
        }
        writeln!(f)?;
        writeln!(f, "Deviance explained = {:.1}%", 100.0 * self.deviance_explained())?;
        writeln!(
            f,
            "{} = {:.5}  Scale est. = 1  n = {}",
            self.criterion.name().to_uppercase(),
            self.score,
            self.nobs
        )?;
        write!(
            f,
            "Residual df = {:.3}  Deviance = {:.3}  AIC = {:.3}  ({} iterations{})",
            self.residual_df,
            self.deviance,
            self.aic,
            self.iterations,
            if self.converged { "" } else { ", not converged" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_summation_design_matches_manual_sum() {
        let basis = BSplineBasis::cubic(0.0, 1.0, 4).unwrap();
        let stimuli = array![[0.1, 0.4, 0.9]];
        let by = array![[1.0, -2.0, 1.0]];
        let block = summation_design(&basis, &stimuli, &by);
        let manual = basis.evaluate(0.1) - basis.evaluate(0.4) * 2.0 + basis.evaluate(0.9);
        for j in 0..basis.ncols() {
            assert_abs_diff_eq!(block[[0, j]], manual[j], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_summation_design_zero_by_gives_zero_row() {
        let basis = BSplineBasis::cubic(0.0, 1.0, 5).unwrap();
        let stimuli = array![[0.1, 0.4, 0.9], [0.2, 0.5, 0.7]];
        let by = array![[0.0, 0.0, 0.0], [1.0, -2.0, 1.0]];
        let block = summation_design(&basis, &stimuli, &by);
        assert!(block.row(0).iter().all(|&v| v == 0.0));
        assert!(block.row(1).iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_isolate_prediction_data() {
        let grid = Array1::linspace(0.0, 1.0, 5);
        let data = PredictionData::isolate(&grid, 3, 1);
        assert_eq!(data.by.len(), 3);
        assert_eq!(data.stimuli.column(0).to_owned(), grid);
        assert!(data.stimuli.column(1).iter().all(|&v| v == 0.0));
        assert!(data.by[0].iter().all(|&v| v == 0.0));
        assert!(data.by[1].iter().all(|&v| v == 1.0));
        assert!(data.by[2].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_spec_validation() {
        let spec = GamSpec::new(Array1::zeros(4), Array2::zeros((4, 3)), vec![ByTerm::new("s", Array2::zeros((3, 3)))]);
        assert!(matches!(spec.validate(), Err(MldsError::DimensionMismatch(_))));

        let spec = GamSpec::new(Array1::zeros(4), Array2::zeros((4, 3)), vec![]);
        assert!(matches!(spec.validate(), Err(MldsError::InvalidValue(_))));

        let spec = GamSpec::new(Array1::zeros(4), Array2::zeros((4, 3)), vec![ByTerm::new("s", Array2::zeros((4, 3)))]);
        assert!(spec.validate().is_ok());
        assert_eq!(spec.k, 4);
        assert_eq!(spec.link, LinkKind::Probit);
    }
}
