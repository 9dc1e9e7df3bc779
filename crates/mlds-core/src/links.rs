// =============================================================================
// Link Functions
// =============================================================================
//
// A link function g connects the mean response μ to the linear predictor η:
//
//     η = g(μ)        μ = g⁻¹(η)
//
// For triad judgments the response is binary, so every link here maps the
// probability interval (0, 1) onto the real line.
//
//   - Probit:  η = Φ⁻¹(μ)          (default; the classic MLDS observer model
//                                   with Gaussian decision noise)
//   - Logit:   η = log(μ/(1-μ))
//   - Cloglog: η = log(-log(1-μ))
//
// Each link provides link(), inverse() and derivative() = dη/dμ, which is
// all IRLS needs.
//
// =============================================================================

use std::f64::consts::{PI, SQRT_2};
use std::fmt;
use std::str::FromStr;

use ndarray::Array1;
use statrs::function::erf::{erfc, erfc_inv};

use crate::error::{MldsError, Result};

/// Smallest probability the inverse links return.
const PROB_EPS: f64 = 1e-12;

/// Interface shared by all link functions.
pub trait Link: Send + Sync {
    /// Short name, e.g. "probit".
    fn name(&self) -> &'static str;

    /// η = g(μ)
    fn link(&self, mu: &Array1<f64>) -> Array1<f64>;

    /// μ = g⁻¹(η)
    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64>;

    /// dη/dμ evaluated at μ
    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64>;
}

// -----------------------------------------------------------------------------
// Standard normal helpers
// -----------------------------------------------------------------------------

/// Standard normal CDF Φ(x).
#[inline]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal density φ(x).
#[inline]
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Standard normal quantile Φ⁻¹(p).
#[inline]
pub fn norm_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

#[inline]
fn clamp_prob(p: f64) -> f64 {
    p.max(PROB_EPS).min(1.0 - PROB_EPS)
}

// -----------------------------------------------------------------------------
// Probit
// -----------------------------------------------------------------------------

/// Probit link: η = Φ⁻¹(μ).
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbitLink;

impl Link for ProbitLink {
    fn name(&self) -> &'static str {
        "probit"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| norm_quantile(clamp_prob(m)))
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.mapv(|e| clamp_prob(norm_cdf(e)))
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        // dη/dμ = 1 / φ(Φ⁻¹(μ))
        mu.mapv(|m| {
            let density = norm_pdf(norm_quantile(clamp_prob(m)));
            1.0 / density.max(f64::MIN_POSITIVE)
        })
    }
}

// -----------------------------------------------------------------------------
// Logit
// -----------------------------------------------------------------------------

/// Logit link: η = log(μ / (1 - μ)).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogitLink;

impl Link for LogitLink {
    fn name(&self) -> &'static str {
        "logit"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| {
            let m = clamp_prob(m);
            (m / (1.0 - m)).ln()
        })
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.mapv(|e| clamp_prob(1.0 / (1.0 + (-e).exp())))
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| {
            let m = clamp_prob(m);
            1.0 / (m * (1.0 - m))
        })
    }
}

// -----------------------------------------------------------------------------
// Complementary log-log
// -----------------------------------------------------------------------------

/// Complementary log-log link: η = log(-log(1 - μ)).
#[derive(Debug, Clone, Copy, Default)]
pub struct CloglogLink;

impl Link for CloglogLink {
    fn name(&self) -> &'static str {
        "cloglog"
    }

    fn link(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| (-(1.0 - clamp_prob(m)).ln()).ln())
    }

    fn inverse(&self, eta: &Array1<f64>) -> Array1<f64> {
        eta.mapv(|e| clamp_prob(1.0 - (-e.exp()).exp()))
    }

    fn derivative(&self, mu: &Array1<f64>) -> Array1<f64> {
        mu.mapv(|m| {
            let m = clamp_prob(m);
            1.0 / ((1.0 - m) * -(1.0 - m).ln())
        })
    }
}

// -----------------------------------------------------------------------------
// Selection by name
// -----------------------------------------------------------------------------

/// Link choice carried in configuration and model specifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkKind {
    #[default]
    Probit,
    Logit,
    Cloglog,
}

impl LinkKind {
    /// Boxed link implementation for this choice.
    pub fn build(self) -> Box<dyn Link> {
        match self {
            LinkKind::Probit => Box::new(ProbitLink),
            LinkKind::Logit => Box::new(LogitLink),
            LinkKind::Cloglog => Box::new(CloglogLink),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkKind::Probit => "probit",
            LinkKind::Logit => "logit",
            LinkKind::Cloglog => "cloglog",
        }
    }
}

impl FromStr for LinkKind {
    type Err = MldsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "probit" => Ok(LinkKind::Probit),
            "logit" => Ok(LinkKind::Logit),
            "cloglog" => Ok(LinkKind::Cloglog),
            _ => Err(MldsError::InvalidValue(format!(
                "Unknown link '{}'. Use 'probit', 'logit', or 'cloglog'.",
                s
            ))),
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================
