// =============================================================================
// Statistical Inference
// =============================================================================
//
// Analysis of deviance between two nested GAMs:
//
//     reduced:  one smooth shared by every trial (pooled scale)
//     full:     one smooth per segment
//
// If the segments share the same perceptual scale, the deviance gained by
// the full model is approximately χ² with (resid_df_reduced − resid_df_full)
// degrees of freedom. For penalized fits the residual df are n − EDF, so the
// df difference is generally not an integer; the chi-square distribution
// handles that directly.
//
// =============================================================================

use std::fmt;

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

// =============================================================================
// P-Value Calculation
// =============================================================================

/// Upper-tail p-value P(χ²_df > statistic).
///
/// NaN when df is not positive. A non-positive statistic gives 1.
pub fn pvalue_chisq(statistic: f64, df: f64) -> f64 {
    if !statistic.is_finite() || !df.is_finite() || df <= 0.0 {
        return f64::NAN;
    }
    if statistic <= 0.0 {
        return 1.0;
    }
    match ChiSquared::new(df) {
        Ok(dist) => (1.0 - dist.cdf(statistic)).max(0.0),
        Err(_) => f64::NAN,
    }
}

/// Significance code for a p-value, as printed by R.
///
/// - "***" : p < 0.001
/// - "**"  : p < 0.01
/// - "*"   : p < 0.05
/// - "."   : p < 0.1
/// - ""    : p >= 0.1 (or NaN)
pub fn significance_stars(pvalue: f64) -> &'static str {
    if pvalue < 0.001 {
        "***"
    } else if pvalue < 0.01 {
        "**"
    } else if pvalue < 0.05 {
        "*"
    } else if pvalue < 0.1 {
        "."
    } else {
        ""
    }
}

// =============================================================================
// Deviance Test
// =============================================================================

/// Chi-square analysis of deviance between a reduced and a full model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevianceTest {
    /// Residual degrees of freedom, [reduced, full]
    pub resid_df: [f64; 2],
    /// Residual deviance, [reduced, full]
    pub resid_dev: [f64; 2],
    /// resid_df[0] − resid_df[1]
    pub df: f64,
    /// resid_dev[0] − resid_dev[1]
    pub deviance: f64,
    /// P(χ²_df > deviance); NaN when df <= 0
    pub p_value: f64,
}

impl DevianceTest {
    /// Build the test from each model's residual df and deviance.
    pub fn new(reduced_df: f64, reduced_dev: f64, full_df: f64, full_dev: f64) -> Self {
        let df = reduced_df - full_df;
        let deviance = reduced_dev - full_dev;
        Self {
            resid_df: [reduced_df, full_df],
            resid_dev: [reduced_dev, full_dev],
            df,
            deviance,
            p_value: pvalue_chisq(deviance, df),
        }
    }

    /// True when the full model fits significantly better at level `alpha`.
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

impl fmt::Display for DevianceTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analysis of Deviance Table")?;
        writeln!(f)?;
        writeln!(f, "Model 1: pooled scale")?;
        writeln!(f, "Model 2: one scale per segment")?;
        writeln!(f, "  {:>12} {:>12} {:>10} {:>10} {:>12}", "Resid. Df", "Resid. Dev", "Df", "Deviance", "Pr(>Chi)")?;
        writeln!(f, "1 {:>12.3} {:>12.3}", self.resid_df[0], self.resid_dev[0])?;
        writeln!(
            f,
            "2 {:>12.3} {:>12.3} {:>10.3} {:>10.3} {:>12.4e} {}",
            self.resid_df[1],
            self.resid_dev[1],
            self.df,
            self.deviance,
            self.p_value,
            significance_stars(self.p_value)
        )?;
        writeln!(f, "---")?;
        write!(f, "Signif. codes:  0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_pvalue_chisq_known_value() {
        // 95th percentile of χ²₁ is 3.841
        assert_abs_diff_eq!(pvalue_chisq(3.841459, 1.0), 0.05, epsilon = 1e-5);
        // 95th percentile of χ²₄ is 9.488
        assert_abs_diff_eq!(pvalue_chisq(9.487729, 4.0), 0.05, epsilon = 1e-5);
    }

    #[test]
    fn test_pvalue_chisq_fractional_df() {
        let p = pvalue_chisq(5.0, 2.7);
        assert!(p > pvalue_chisq(5.0, 2.0));
        assert!(p < pvalue_chisq(5.0, 3.0));
    }

    #[test]
    fn test_pvalue_chisq_edge_cases() {
        assert!(pvalue_chisq(3.0, 0.0).is_nan());
        assert!(pvalue_chisq(3.0, -1.5).is_nan());
        assert_eq!(pvalue_chisq(0.0, 2.0), 1.0);
        assert_eq!(pvalue_chisq(-0.2, 2.0), 1.0);
    }

    #[test]
    fn test_deviance_test_differences() {
        let test = DevianceTest::new(197.0, 250.0, 193.5, 230.0);
        assert_abs_diff_eq!(test.df, 3.5, epsilon = 1e-12);
        assert_abs_diff_eq!(test.deviance, 20.0, epsilon = 1e-12);
        assert!(test.p_value < 0.001);
        assert!(test.is_significant(0.05));
    }

    #[test]
    fn test_deviance_test_no_df_difference() {
        let test = DevianceTest::new(100.0, 120.0, 100.0, 119.0);
        assert!(test.p_value.is_nan());
        assert!(!test.is_significant(0.05));
    }

    #[test]
    fn test_display_has_table_rows() {
        let text = DevianceTest::new(197.0, 250.0, 193.5, 230.0).to_string();
        assert!(text.starts_with("Analysis of Deviance Table"));
        assert!(text.contains("Pr(>Chi)"));
        assert!(text.contains("***"));
    }

    #[test]
    fn test_significance_stars() {
        assert_eq!(significance_stars(0.0001), "***");
        assert_eq!(significance_stars(0.005), "**");
        assert_eq!(significance_stars(0.03), "*");
        assert_eq!(significance_stars(0.08), ".");
        assert_eq!(significance_stars(0.5), "");
        assert_eq!(significance_stars(f64::NAN), "");
    }
}
