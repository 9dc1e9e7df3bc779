// =============================================================================
// Penalized B-Spline Bases
// =============================================================================
//
// The perceptual scale ψ(s) is represented as a cubic regression spline
//
//     ψ(s) = Σⱼ βⱼ Bⱼ(s)
//
// with a difference penalty λ β'D'Dβ on neighbouring coefficients
// (Eilers & Marx P-splines). The penalty null space of a second-order
// difference penalty is the straight lines, so heavy smoothing shrinks
// the scale towards a linear one rather than towards a constant.
//
// KNOTS
// -----
// Boundary knots are the stimulus range, repeated degree+1 times (clamped
// basis). With k basis functions and degree d there are k − d − 1 equally
// spaced interior knots. For the MLDS default k = 4, d = 3 there are none
// and the basis is the cubic Bernstein polynomials on the stimulus range.
//
// IDENTIFIABILITY
// ---------------
// B-splines sum to one, so with include_intercept = false the first basis
// function is dropped. For a clamped basis B₁ is the only function that is
// non-zero at the lower boundary, hence dropping it fixes ψ(min) = 0.
//
// EXTRAPOLATION
// -------------
// Points outside the boundary knots are evaluated at the nearest boundary
// (constant extrapolation).
//
// =============================================================================

use ndarray::{Array1, Array2};

use crate::error::{MldsError, Result};

/// A clamped B-spline basis on a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BSplineBasis {
    knots: Vec<f64>,
    degree: usize,
    n_basis: usize,
    include_intercept: bool,
    lower: f64,
    upper: f64,
}

impl BSplineBasis {
    /// Build a basis with `df` functions of the given degree on [lower, upper].
    pub fn new(lower: f64, upper: f64, df: usize, degree: usize, include_intercept: bool) -> Result<Self> {
        if !(lower.is_finite() && upper.is_finite()) || upper <= lower {
            return Err(MldsError::InvalidValue(format!(
                "spline boundary knots must satisfy lower < upper, got [{}, {}]",
                lower, upper
            )));
        }
        if degree == 0 {
            return Err(MldsError::InvalidValue("spline degree must be >= 1".to_string()));
        }
        if df < degree + 1 {
            return Err(MldsError::InvalidValue(format!(
                "basis dimension k = {} is too small for degree {} (need k >= {})",
                df,
                degree,
                degree + 1
            )));
        }

        let n_interior = df - degree - 1;
        let mut knots = Vec::with_capacity(df + degree + 1);
        knots.extend(std::iter::repeat(lower).take(degree + 1));
        let step = (upper - lower) / (n_interior + 1) as f64;
        for i in 1..=n_interior {
            knots.push(lower + step * i as f64);
        }
        knots.extend(std::iter::repeat(upper).take(degree + 1));

        Ok(Self {
            knots,
            degree,
            n_basis: df,
            include_intercept,
            lower,
            upper,
        })
    }

    /// Cubic basis with `k` functions, first function dropped.
    pub fn cubic(lower: f64, upper: f64, k: usize) -> Result<Self> {
        Self::new(lower, upper, k, 3, false)
    }

    /// Number of columns produced by `design`.
    pub fn ncols(&self) -> usize {
        if self.include_intercept {
            self.n_basis
        } else {
            self.n_basis - 1
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Index of the knot span containing x (already clamped to the range).
    fn find_span(&self, x: f64) -> usize {
        let p = self.degree;
        let last = self.n_basis - 1;
        if x >= self.knots[self.n_basis] {
            return last;
        }
        let mut span = p;
        while span < last && x >= self.knots[span + 1] {
            span += 1;
        }
        span
    }

    /// All `n_basis` basis function values at a single point.
    pub fn evaluate_full(&self, x: f64) -> Array1<f64> {
        let x = x.max(self.lower).min(self.upper);
        let p = self.degree;
        let t = &self.knots;
        let span = self.find_span(x);

        // Cox–de Boor triangle for the p+1 non-zero functions
        let mut n = vec![0.0; p + 1];
        let mut left = vec![0.0; p + 1];
        let mut right = vec![0.0; p + 1];
        n[0] = 1.0;
        for j in 1..=p {
            left[j] = x - t[span + 1 - j];
            right[j] = t[span + j] - x;
            let mut saved = 0.0;
            for r in 0..j {
                let denom = right[r + 1] + left[j - r];
                let temp = if denom != 0.0 { n[r] / denom } else { 0.0 };
                n[r] = saved + right[r + 1] * temp;
                saved = left[j - r] * temp;
            }
            n[j] = saved;
        }

        let mut out = Array1::zeros(self.n_basis);
        for (r, value) in n.into_iter().enumerate() {
            out[span - p + r] = value;
        }
        out
    }

    /// Basis values at one point, restricted to the kept columns.
    pub fn evaluate(&self, x: f64) -> Array1<f64> {
        let full = self.evaluate_full(x);
        if self.include_intercept {
            full
        } else {
            full.slice(ndarray::s![1..]).to_owned()
        }
    }

    /// Basis matrix (n × ncols) for a vector of points.
    pub fn design(&self, x: &Array1<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.len(), self.ncols()));
        for (i, &xi) in x.iter().enumerate() {
            out.row_mut(i).assign(&self.evaluate(xi));
        }
        out
    }

    /// Difference penalty for the kept columns.
    pub fn penalty(&self, order: usize) -> Array2<f64> {
        let full = penalty_matrix(self.n_basis, order);
        if self.include_intercept {
            full
        } else {
            full.slice(ndarray::s![1.., 1..]).to_owned()
        }
    }
}

/// Difference penalty S = D'D of the given order on k coefficients.
pub fn penalty_matrix(k: usize, order: usize) -> Array2<f64> {
    if order == 0 || order >= k {
        return Array2::eye(k);
    }
    // Build D by repeatedly differencing the identity
    let mut d = Array2::<f64>::eye(k);
    for _ in 0..order {
        let rows = d.nrows() - 1;
        let mut next = Array2::zeros((rows, k));
        for r in 0..rows {
            for c in 0..k {
                next[[r, c]] = d[[r + 1, c]] - d[[r, c]];
            }
        }
        d = next;
    }
    d.t().dot(&d)
}

// =============================================================================
// Tests
// =============================================================================
