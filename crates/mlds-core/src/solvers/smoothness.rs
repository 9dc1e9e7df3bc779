// =============================================================================
// SMOOTHNESS SELECTION: Brent Search on log λ
// =============================================================================
//
// Smoothing parameters are chosen inside the IRLS loop ("performance
// iteration"): once the working weights W and working response z of the
// current iteration are known, the penalized least squares problem
//
//     β(λ) = (X'WX + Σ λⱼSⱼ)⁻¹ X'Wz
//     A(λ) = X (X'WX + Σ λⱼSⱼ)⁻¹ X'W          (influence matrix)
//
// is cheap to re-solve for any λ from cached X'WX and X'Wz.
//
// CRITERIA
// --------
//   GCV(λ)  = n ‖√W(z − Xβ)‖² / (n − tr A)²
//   UBRE(λ) = ‖√W(z − Xβ)‖² / n − φ + 2 φ tr A / n        (φ = 1)
//
// UBRE (Mallows' Cp) is the right choice when the scale is known, which
// is the case for binomial responses; GCV is kept for unknown scale.
//
// Each λⱼ is optimized by Brent's method on log λ while the others are held
// fixed (coordinate descent).
//
// =============================================================================

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::convert::{cholesky_with_ridge, to_dmatrix, to_dvector, trace_of_product};

/// Result from Brent's optimization
#[derive(Debug, Clone)]
pub struct BrentResult {
    pub x_min: f64,
    pub f_min: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Brent's method for 1D minimization of f on [a, b].
///
/// Golden-section steps with parabolic interpolation when it is safe.
pub fn brent_minimize<F>(f: F, a: f64, b: f64, tol: f64, max_iter: usize) -> BrentResult
where
    F: Fn(f64) -> f64,
{
    let golden = 0.381966011250105; // (3 - sqrt(5)) / 2

    let mut a = a;
    let mut b = b;
    let mut x = a + golden * (b - a);
    let mut w = x;
    let mut v = x;
    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    let mut d: f64 = 0.0;
    let mut e: f64 = 0.0;

    for iter in 0..max_iter {
        let mid = 0.5 * (a + b);
        let tol1 = tol * x.abs() + 1e-10;
        let tol2 = 2.0 * tol1;

        if (x - mid).abs() <= tol2 - 0.5 * (b - a) {
            return BrentResult {
                x_min: x,
                f_min: fx,
                iterations: iter + 1,
                converged: true,
            };
        }

        let mut use_golden = true;

        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let q = (x - v) * (fx - fw);
            let p = (x - v) * q - (x - w) * r;
            let q = 2.0 * (q - r);
            let (p, q) = if q > 0.0 { (-p, q) } else { (p, -q) };

            let e_old = e;
            e = d;

            if p.abs() < (0.5 * q * e_old).abs() && p > q * (a - x) && p < q * (b - x) {
                d = p / q;
                let u = x + d;
                if u - a < tol2 || b - u < tol2 {
                    d = if x < mid { tol1 } else { -tol1 };
                }
                use_golden = false;
            }
        }

        if use_golden {
            e = if x < mid { b - x } else { a - x };
            d = golden * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u < x {
                b = x;
            } else {
                a = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                b = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    BrentResult {
        x_min: x,
        f_min: fx,
        iterations: max_iter,
        converged: false,
    }
}

// =============================================================================
// Criterion
// =============================================================================

/// Which score the smoothing parameters minimize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothnessCriterion {
    /// UBRE for known-scale families, GCV otherwise.
    #[default]
    Auto,
    Gcv,
    Ubre,
}

impl SmoothnessCriterion {
    /// Concrete criterion for a family with or without known scale.
    pub fn resolve(self, scale_known: bool) -> Self {
        match self {
            SmoothnessCriterion::Auto if scale_known => SmoothnessCriterion::Ubre,
            SmoothnessCriterion::Auto => SmoothnessCriterion::Gcv,
            other => other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SmoothnessCriterion::Auto => "auto",
            SmoothnessCriterion::Gcv => "GCV",
            SmoothnessCriterion::Ubre => "UBRE",
        }
    }

    /// Score from weighted RSS, trace of the influence matrix and n.
    pub fn score(self, rss: f64, trace: f64, n: usize) -> f64 {
        let n = n as f64;
        match self {
            SmoothnessCriterion::Gcv | SmoothnessCriterion::Auto => {
                let denom = n - trace;
                if denom <= 1.0 {
                    return f64::INFINITY;
                }
                n * rss / (denom * denom)
            }
            SmoothnessCriterion::Ubre => rss / n - 1.0 + 2.0 * trace / n,
        }
    }
}

// =============================================================================
// Multi-term optimizer
// =============================================================================

/// Cached X'WX / X'Wz for one IRLS iteration.
///
/// Column ranges are half-open (start, end) into the full design matrix.
#[derive(Debug)]
pub struct LambdaOptimizer {
    xtwx: DMatrix<f64>,
    xtwz: DVector<f64>,
    ztwz: f64,
    penalties: Vec<DMatrix<f64>>,
    col_ranges: Vec<(usize, usize)>,
    n: usize,
    criterion: SmoothnessCriterion,
}

impl LambdaOptimizer {
    pub fn new(
        x: &Array2<f64>,
        z: &Array1<f64>,
        w: &Array1<f64>,
        penalties: &[Array2<f64>],
        col_ranges: Vec<(usize, usize)>,
        criterion: SmoothnessCriterion,
    ) -> Self {
        let x_nalg = to_dmatrix(x);
        let z_nalg = to_dvector(z);
        let w_nalg = to_dvector(w);

        let mut xw = x_nalg.clone();
        for (i, mut row) in xw.row_iter_mut().enumerate() {
            row *= w_nalg[i];
        }
        let xtwx = x_nalg.transpose() * &xw;
        let xtwz = xw.transpose() * &z_nalg;
        let ztwz = z_nalg.iter().zip(w_nalg.iter()).map(|(&zi, &wi)| wi * zi * zi).sum();

        Self {
            xtwx,
            xtwz,
            ztwz,
            penalties: penalties.iter().map(to_dmatrix).collect(),
            col_ranges,
            n: x.nrows(),
            criterion,
        }
    }

    /// X'WX + Σ λⱼSⱼ
    fn penalized_xtwx(&self, lambdas: &[f64]) -> DMatrix<f64> {
        let mut m = self.xtwx.clone();
        for (((start, end), penalty), &lambda) in self.col_ranges.iter().zip(&self.penalties).zip(lambdas) {
            let k = end - start;
            for r in 0..k {
                for c in 0..k {
                    m[(start + r, start + c)] += lambda * penalty[(r, c)];
                }
            }
        }
        m
    }

    /// Criterion score at the given λ values.
    pub fn evaluate(&self, lambdas: &[f64]) -> f64 {
        let p = self.xtwx.nrows();
        let chol = match cholesky_with_ridge(&self.penalized_xtwx(lambdas)) {
            Some(c) => c,
            None => return f64::INFINITY,
        };
        let beta = chol.solve(&self.xtwz);
        // ‖√W(z − Xβ)‖² = z'Wz − 2β'X'Wz + β'X'WXβ
        let rss = (self.ztwz - 2.0 * beta.dot(&self.xtwz) + beta.dot(&(&self.xtwx * &beta))).max(0.0);
        let inv = chol.solve(&DMatrix::identity(p, p));
        let trace = trace_of_product(&inv, &self.xtwx);
        self.criterion.score(rss, trace, self.n)
    }

    /// Coordinate descent over log λ, starting from `start`.
    pub fn optimize(&self, start: &[f64], log_lambda_min: f64, log_lambda_max: f64, tol: f64, max_outer_iter: usize) -> Vec<f64> {
        let mut lambdas = start.to_vec();

        for _ in 0..max_outer_iter {
            let old = lambdas.clone();
            for term in 0..lambdas.len() {
                let result = brent_minimize(
                    |log_lam| {
                        let mut trial = lambdas.clone();
                        trial[term] = log_lam.exp();
                        self.evaluate(&trial)
                    },
                    log_lambda_min,
                    log_lambda_max,
                    tol,
                    40,
                );
                lambdas[term] = result.x_min.exp();
            }

            let max_change = lambdas
                .iter()
                .zip(&old)
                .map(|(&new, &prev)| (new.ln() - prev.max(1e-300).ln()).abs())
                .fold(0.0, f64::max);
            if max_change < 1e-2 {
                break;
            }
        }
        lambdas
    }

    /// Per-term EDF and total EDF (trace of the influence matrix).
    pub fn edfs(&self, lambdas: &[f64]) -> (Vec<f64>, f64) {
        let p = self.xtwx.nrows();
        let inv = match cholesky_with_ridge(&self.penalized_xtwx(lambdas)) {
            Some(chol) => chol.solve(&DMatrix::identity(p, p)),
            None => return (vec![f64::NAN; lambdas.len()], f64::NAN),
        };
        let f = &inv * &self.xtwx;
        let per_term = self
            .col_ranges
            .iter()
            .map(|&(start, end)| (start..end).map(|i| f[(i, i)]).sum())
            .collect();
        (per_term, f.trace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splines::{penalty_matrix, BSplineBasis};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_brent_minimize_quadratic() {
        let result = brent_minimize(|x| (x - 2.0).powi(2), 0.0, 5.0, 1e-6, 100);
        assert!(result.converged);
        assert!((result.x_min - 2.0).abs() < 1e-5);
        assert!(result.f_min < 1e-10);
    }

    #[test]
    fn test_brent_minimize_cosine() {
        let result = brent_minimize(|x| x.cos(), 2.0, 5.0, 1e-6, 100);
        assert!(result.converged);
        assert!((result.x_min - std::f64::consts::PI).abs() < 1e-5);
    }

    #[test]
    fn test_brent_minimize_at_boundary() {
        let result = brent_minimize(|x| -x, 0.0, 5.0, 1e-6, 100);
        assert!((result.x_min - 5.0).abs() < 0.01);
    }

    #[test]
    fn test_criterion_resolution() {
        assert_eq!(SmoothnessCriterion::Auto.resolve(true), SmoothnessCriterion::Ubre);
        assert_eq!(SmoothnessCriterion::Auto.resolve(false), SmoothnessCriterion::Gcv);
        assert_eq!(SmoothnessCriterion::Gcv.resolve(true), SmoothnessCriterion::Gcv);
    }

    #[test]
    fn test_ubre_score_formula() {
        let score = SmoothnessCriterion::Ubre.score(90.0, 5.0, 100);
        assert_abs_diff_eq!(score, 0.9 - 1.0 + 0.1, epsilon = 1e-12);
    }

    /// Intercept plus one smooth of a noisy sine.
    fn smooth_problem(n: usize, k: usize) -> (Array2<f64>, Array1<f64>, Array1<f64>, Array2<f64>, (usize, usize)) {
        let xs = Array1::linspace(0.0, 10.0, n);
        let basis = BSplineBasis::new(0.0, 10.0, k, 3, false).unwrap().design(&xs);
        let kb = basis.ncols();
        let mut x = Array2::zeros((n, 1 + kb));
        x.column_mut(0).fill(1.0);
        x.slice_mut(ndarray::s![.., 1..]).assign(&basis);
        let z: Array1<f64> = xs.iter().enumerate().map(|(i, &v)| 2.0 + v.sin() + 0.3 * ((i * 7919 % 13) as f64 / 13.0 - 0.5)).collect();
        let w = Array1::ones(n);
        (x, z, w, penalty_matrix(kb, 2), (1, 1 + kb))
    }

    #[test]
    fn test_edf_decreases_with_lambda() {
        let (x, z, w, s, range) = smooth_problem(200, 10);
        let opt = LambdaOptimizer::new(&x, &z, &w, &[s], vec![range], SmoothnessCriterion::Gcv);
        let (low, total_low) = opt.edfs(&[1e-3]);
        let (high, total_high) = opt.edfs(&[1e4]);
        assert!(low[0] > high[0]);
        assert!(total_low > total_high);
        // Heavy smoothing leaves the straight-line null space (intercept + slope)
        assert!(total_high > 1.5 && total_high < 3.5);
    }

    #[test]
    fn test_optimize_single_term() {
        let (x, z, w, s, range) = smooth_problem(200, 10);
        for criterion in [SmoothnessCriterion::Gcv, SmoothnessCriterion::Ubre] {
            let opt = LambdaOptimizer::new(&x, &z, &w, &[s.clone()], vec![range], criterion);
            let lambdas = opt.optimize(&[1.0], (1e-6f64).ln(), (1e8f64).ln(), 1e-4, 5);
            assert_eq!(lambdas.len(), 1);
            assert!(lambdas[0] > 0.0);
            let (edfs, _) = opt.edfs(&lambdas);
            assert!(edfs[0] > 1.0 && edfs[0] < 9.5);
            // The optimum is no worse than the starting point
            assert!(opt.evaluate(&lambdas) <= opt.evaluate(&[1.0]) + 1e-6);
        }
    }

    #[test]
    fn test_optimize_two_terms() {
        let n = 200;
        let a = Array1::linspace(0.0, 10.0, n);
        let b: Array1<f64> = (0..n).map(|i| ((i * 37) % n) as f64 / 40.0).collect();
        let ba = BSplineBasis::new(0.0, 10.0, 8, 3, false).unwrap().design(&a);
        let bb = BSplineBasis::new(0.0, 5.0, 6, 3, false).unwrap().design(&b);
        let (ka, kb) = (ba.ncols(), bb.ncols());
        let mut x = Array2::zeros((n, 1 + ka + kb));
        x.column_mut(0).fill(1.0);
        x.slice_mut(ndarray::s![.., 1..1 + ka]).assign(&ba);
        x.slice_mut(ndarray::s![.., 1 + ka..]).assign(&bb);
        let z: Array1<f64> = a.iter().zip(b.iter()).map(|(&u, &v)| 1.0 + u.sin() + 0.5 * v.cos()).collect();
        let w = Array1::ones(n);

        let opt = LambdaOptimizer::new(
            &x,
            &z,
            &w,
            &[penalty_matrix(ka, 2), penalty_matrix(kb, 2)],
            vec![(1, 1 + ka), (1 + ka, 1 + ka + kb)],
            SmoothnessCriterion::Gcv,
        );
        let lambdas = opt.optimize(&[1.0, 1.0], -8.0, 12.0, 1e-4, 10);
        assert_eq!(lambdas.len(), 2);
        assert!(lambdas.iter().all(|&l| l > 0.0));
        let (edfs, total) = opt.edfs(&lambdas);
        assert!(edfs.iter().all(|&e| e > 0.5));
        // The unpenalized intercept contributes exactly one degree of freedom
        assert_abs_diff_eq!(total, edfs.iter().sum::<f64>() + 1.0, epsilon = 1e-6);
    }
}
