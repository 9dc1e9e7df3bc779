// =============================================================================
// Segment Partitions
// =============================================================================
//
// The combined trial table is split into contiguous, non-overlapping row
// ranges ("segments"). Each segment gets its own smooth in the full model,
// switched on by a block indicator matrix: rows inside the segment carry the
// MLDS weights (1, −2, 1), rows outside carry zeros.
//
// Boundaries are 1-based and inclusive, matching how experiment logs number
// their trials.
//
// =============================================================================

use ndarray::Array2;
use serde::Serialize;

use crate::error::{MldsError, Result};

/// Weights of ψ(s1), ψ(s2), ψ(s3) in the MLDS decision variable.
pub const TRIAD_WEIGHTS: [f64; 3] = [1.0, -2.0, 1.0];

/// Partition counts the legacy policy knows how to fit.
const LEGACY_PARTS: [usize; 4] = [2, 3, 4, 6];
/// Largest file count the legacy policy accepts.
const LEGACY_MAX_FILES: usize = 4;

/// Rows start..=end of the combined table (1-based, inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// 0-based half-open range.
    pub fn range(&self) -> std::ops::Range<usize> {
        (self.start - 1)..self.end
    }
}

/// Which segment counts are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SegmentPolicy {
    /// Any number of segments >= 2.
    #[default]
    Unbounded,
    /// At most 4 files, and only 2, 3, 4 or 6 segments.
    Legacy,
}

impl SegmentPolicy {
    /// Reject file counts before anything is loaded.
    pub fn check_files(self, n_files: usize) -> Result<()> {
        if self == SegmentPolicy::Legacy && n_files > LEGACY_MAX_FILES {
            return Err(MldsError::NotImplemented(format!(
                "comparison of more than {} files ({} given)",
                LEGACY_MAX_FILES, n_files
            )));
        }
        Ok(())
    }

    /// Reject segment counts before any model is fitted.
    pub fn check_parts(self, parts: usize) -> Result<()> {
        match self {
            SegmentPolicy::Unbounded if parts < 2 => Err(MldsError::Unsupported(format!(
                "at least 2 segments are needed, got {}",
                parts
            ))),
            SegmentPolicy::Legacy if !LEGACY_PARTS.contains(&parts) => Err(MldsError::Unsupported(format!(
                "{} segments; only 2, 3, 4 or 6 are supported",
                parts
            ))),
            _ => Ok(()),
        }
    }
}

/// Ordered segments covering a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentPlan {
    segments: Vec<Segment>,
}

impl SegmentPlan {
    /// One segment per file, in file order.
    pub fn from_file_rows(rows: &[usize]) -> Result<Self> {
        let mut segments = Vec::with_capacity(rows.len());
        let mut start = 1;
        for (i, &count) in rows.iter().enumerate() {
            if count == 0 {
                return Err(MldsError::EmptyInput(format!("file {} has no trials", i + 1)));
            }
            segments.push(Segment {
                start,
                end: start + count - 1,
            });
            start += count;
        }
        Ok(Self { segments })
    }

    /// `parts` chunks of ceil(n / parts) rows; the last is truncated at n.
    pub fn chunked(n: usize, parts: usize) -> Result<Self> {
        if parts == 0 {
            return Err(MldsError::Config("number of parts must be positive".to_string()));
        }
        let chunk = n.div_ceil(parts);
        let mut segments = Vec::with_capacity(parts);
        for i in 0..parts {
            let start = i * chunk + 1;
            if start > n {
                return Err(MldsError::Config(format!(
                    "cannot split {} rows into {} parts of {}: part {} would be empty",
                    n,
                    parts,
                    chunk,
                    i + 1
                )));
            }
            segments.push(Segment {
                start,
                end: ((i + 1) * chunk).min(n),
            });
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn starts(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.start).collect()
    }

    pub fn ends(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.end).collect()
    }

    /// Segments are contiguous, non-overlapping and cover rows 1..=n.
    pub fn validate(&self, n: usize) -> Result<()> {
        let mut expected = 1;
        for seg in &self.segments {
            if seg.start != expected || seg.is_empty() {
                return Err(MldsError::InvalidValue(format!(
                    "segment {}..={} does not continue at row {}",
                    seg.start, seg.end, expected
                )));
            }
            expected = seg.end + 1;
        }
        if expected != n + 1 {
            return Err(MldsError::DimensionMismatch(format!(
                "segments cover {} rows but the table has {}",
                expected - 1,
                n
            )));
        }
        Ok(())
    }

    /// One block indicator per segment.
    pub fn indicators(&self, n: usize) -> Vec<Array2<f64>> {
        self.segments.iter().map(|&seg| block_indicator(seg, n)).collect()
    }
}

/// n × 3 matrix with (1, −2, 1) on the segment's rows, zero elsewhere.
pub fn block_indicator(segment: Segment, n: usize) -> Array2<f64> {
    let mut by = Array2::zeros((n, 3));
    for i in segment.range().filter(|&i| i < n) {
        for (j, &w) in TRIAD_WEIGHTS.iter().enumerate() {
            by[[i, j]] = w;
        }
    }
    by
}

/// n × 3 matrix with (1, −2, 1) on every row.
pub fn pooled_indicator(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 3), |(_, j)| TRIAD_WEIGHTS[j])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_files_of_fifty() {
        let plan = SegmentPlan::from_file_rows(&[50, 50]).unwrap();
        assert_eq!(plan.segments(), &[Segment { start: 1, end: 50 }, Segment { start: 51, end: 100 }]);
        plan.validate(100).unwrap();
    }

    #[test]
    fn test_chunked_even() {
        let plan = SegmentPlan::chunked(100, 4).unwrap();
        assert!(plan.segments().iter().all(|s| s.len() == 25));
        assert_eq!(plan.starts(), vec![1, 26, 51, 76]);
        assert_eq!(plan.ends(), vec![25, 50, 75, 100]);
    }

    #[test]
    fn test_chunked_truncates_last() {
        let plan = SegmentPlan::chunked(101, 4).unwrap();
        let sizes: Vec<usize> = plan.segments().iter().map(Segment::len).collect();
        assert_eq!(sizes, vec![26, 26, 26, 23]);
        plan.validate(101).unwrap();
    }

    #[test]
    fn test_chunked_too_many_parts() {
        // ceil(10/6) = 2, so part 6 would start at row 11
        let err = SegmentPlan::chunked(10, 6).unwrap_err();
        assert!(matches!(err, MldsError::Config(_)));
        assert!(matches!(SegmentPlan::chunked(10, 0), Err(MldsError::Config(_))));
    }

    #[test]
    fn test_validate_detects_gap() {
        let plan = SegmentPlan::from_file_rows(&[10, 10]).unwrap();
        assert!(plan.validate(25).is_err());
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(SegmentPlan::from_file_rows(&[5, 0]), Err(MldsError::EmptyInput(_))));
    }

    #[test]
    fn test_block_indicator_rows() {
        let by = block_indicator(Segment { start: 2, end: 3 }, 4);
        assert_eq!(by.row(0).to_vec(), vec![0.0, 0.0, 0.0]);
        assert_eq!(by.row(1).to_vec(), vec![1.0, -2.0, 1.0]);
        assert_eq!(by.row(2).to_vec(), vec![1.0, -2.0, 1.0]);
        assert_eq!(by.row(3).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_indicators_sum_to_pooled() {
        let plan = SegmentPlan::chunked(7, 3).unwrap();
        let total = plan.indicators(7).into_iter().fold(Array2::<f64>::zeros((7, 3)), |acc, m| acc + m);
        assert_eq!(total, pooled_indicator(7));
    }

    #[test]
    fn test_legacy_policy() {
        assert!(matches!(SegmentPolicy::Legacy.check_files(5), Err(MldsError::NotImplemented(_))));
        assert!(SegmentPolicy::Legacy.check_files(4).is_ok());
        assert!(matches!(SegmentPolicy::Legacy.check_parts(5), Err(MldsError::Unsupported(_))));
        assert!(SegmentPolicy::Legacy.check_parts(6).is_ok());
    }

    #[test]
    fn test_unbounded_policy() {
        assert!(SegmentPolicy::Unbounded.check_files(12).is_ok());
        assert!(SegmentPolicy::Unbounded.check_parts(5).is_ok());
        assert!(SegmentPolicy::Unbounded.check_parts(1).is_err());
    }
}
