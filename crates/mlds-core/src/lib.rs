// =============================================================================
// MLDS-GAM Core Library
// =============================================================================
//
// Pure Rust implementation of difference scale comparison for MLDS triad
// experiments. No Python code involved; the bindings crate and the CLI are
// thin layers over this one.
//
// STRUCTURE:
// ----------
//   - data:        trial tables and the experiment file reader
//   - inversion:   putting decreasing triads back into increasing order
//   - segments:    row partitions and block indicator matrices
//   - links:       probit / logit / cloglog
//   - families:    binomial response distribution
//   - splines:     penalized B-spline bases
//   - solvers:     penalized IRLS and smoothness selection
//   - model:       GAM specifications and fitted models
//   - engine:      the `GamEngine` trait and its native backend
//   - inference:   analysis of deviance
//   - comparer:    `ScaleComparer`, the pooled vs segmented comparison
//   - error:       error types used throughout the library
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
//   1. Add it to the appropriate module (or create a new one)
//   2. Write tests in that module (see existing tests for examples)
//   3. Re-export public items here so users can access them easily
//   4. Update the Python bindings in the `mlds` crate
//
// =============================================================================

pub mod comparer;
pub mod data;
pub mod engine;
pub mod error;
pub mod families;
pub mod inference;
pub mod inversion;
pub mod links;
pub mod model;
pub mod segments;
pub mod solvers;
pub mod splines;

mod convert;

pub use comparer::{ComparerConfig, ComparisonReport, ScaleComparer, ScaleComparison};
pub use data::{load_trial_file, TrialTable};
pub use engine::{GamEngine, PenalizedGamEngine};
pub use error::{MldsError, Result};
pub use families::{BinomialFamily, Family, FamilyKind};
pub use inference::{pvalue_chisq, significance_stars, DevianceTest};
pub use inversion::OrderInversion;
pub use links::{Link, LinkKind};
pub use model::{ByTerm, FittedGam, GamSpec, PredictionData};
pub use segments::{Segment, SegmentPlan, SegmentPolicy};
pub use solvers::{SmoothGamConfig, SmoothnessCriterion};
