// =============================================================================
// Distribution Families
// =============================================================================
//
// A family describes the distribution of the response given its mean μ:
//
//   - variance(μ):  Var(Y) = φ × V(μ)
//   - deviance:     2 × (saturated log-likelihood − model log-likelihood)
//
// Triad judgments are Bernoulli trials ("was the second pair more
// different?"), so the binomial family is the one that matters here. The
// trait stays open so the solvers do not hard-code binomial algebra.
//
// =============================================================================

use ndarray::Array1;

/// Smallest admissible fitted probability.
pub const MU_MIN_PROBABILITY: f64 = 1e-10;
/// Largest admissible fitted probability.
pub const MU_MAX_PROBABILITY: f64 = 1.0 - 1e-10;

/// Interface shared by all response distributions.
pub trait Family: Send + Sync {
    /// Family name, e.g. "Binomial".
    fn name(&self) -> &'static str;

    /// Variance function V(μ).
    fn variance(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// Per-observation deviance contributions (unweighted).
    fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64>;

    /// Total deviance Σ wᵢ dᵢ.
    fn deviance(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        let unit = self.unit_deviance(y, mu);
        match weights {
            Some(w) => unit.iter().zip(w.iter()).map(|(&d, &wi)| d * wi).sum(),
            None => unit.sum(),
        }
    }

    /// Log-likelihood of the fitted means.
    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64;

    /// Starting values for IRLS.
    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64>;

    /// Force μ into the family's valid range.
    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// True when the dispersion φ is fixed at 1 (selects UBRE over GCV).
    fn scale_known(&self) -> bool;
}

/// y·log(y/μ) with the 0·log(0) = 0 convention.
#[inline]
fn ylogy(y: f64, mu: f64) -> f64 {
    if y > 0.0 {
        y * (y / mu).ln()
    } else {
        0.0
    }
}

/// Binomial family for proportions / binary outcomes, V(μ) = μ(1 − μ).
#[derive(Debug, Clone, Copy, Default)]
pub struct BinomialFamily;

impl Family for BinomialFamily {
    fn name(&self) -> &'static str {
        "Binomial"
    }

    fn variance(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m * (1.0 - m))
    }

    fn unit_deviance(&self, y: &Array1<f64>, mu: &Array1<f64>) -> Array1<f64> {
        y.iter()
            .zip(mu.iter())
            .map(|(&yi, &mi)| {
                let mi = mi.max(MU_MIN_PROBABILITY).min(MU_MAX_PROBABILITY);
                2.0 * (ylogy(yi, mi) + ylogy(1.0 - yi, 1.0 - mi))
            })
            .collect()
    }

    fn log_likelihood(&self, y: &Array1<f64>, mu: &Array1<f64>, weights: Option<&Array1<f64>>) -> f64 {
        y.iter()
            .zip(mu.iter())
            .enumerate()
            .map(|(i, (&yi, &mi))| {
                let mi = mi.max(MU_MIN_PROBABILITY).min(MU_MAX_PROBABILITY);
                let w = weights.map_or(1.0, |w| w[i]);
                w * (yi * mi.ln() + (1.0 - yi) * (1.0 - mi).ln())
            })
            .sum()
    }

    fn initialize_mu(&self, y: &Array1<f64>) -> Array1<f64> {
        // Same start as R's binomial()$initialize with unit weights
        y.mapv(|yi| (yi + 0.5) / 2.0)
    }

    fn clamp_mu(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| m.max(MU_MIN_PROBABILITY).min(MU_MAX_PROBABILITY))
    }

    fn scale_known(&self) -> bool {
        true
    }
}

/// Family choice carried in model specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FamilyKind {
    #[default]
    Binomial,
}

impl FamilyKind {
    pub fn build(self) -> Box<dyn Family> {
        match self {
            FamilyKind::Binomial => Box::new(BinomialFamily),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
