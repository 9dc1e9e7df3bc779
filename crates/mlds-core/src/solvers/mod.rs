// =============================================================================
// GAM Solvers
// =============================================================================
//
// Fitting a binomial GAM to triad judgments means finding coefficients β and
// smoothing parameters λ for
//
//     g(E[Y]) = Xβ,     penalty Σⱼ λⱼ β'Sⱼβ
//
// where g is the link (probit by default) and each smooth contributes a block
// of columns to X and a penalty Sⱼ.
//
// The work is split three ways:
//   - irls:        penalized IRLS at fixed λ, plus its building blocks
//   - smoothness:  UBRE/GCV scores and Brent search over log λ
//   - smooth_glm:  the outer loop that re-selects λ at every IRLS step
//
// =============================================================================

mod irls;
pub mod smooth_glm;
pub mod smoothness;

pub use irls::{compute_xtwx, fit_with_penalty, solve_weighted_least_squares_with_penalty_matrix, working_quantities};
pub use irls::{IrlsConfig, PirlsFit};
pub use smooth_glm::{fit_smooth_glm, SmoothGamConfig, SmoothGlmResult, SmoothTermData};
pub use smoothness::{brent_minimize, BrentResult, LambdaOptimizer, SmoothnessCriterion};
