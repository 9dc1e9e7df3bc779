//! Property-based tests using proptest.
//!
//! Invariants of the row partition and of the block indicator matrices,
//! checked over arbitrary table sizes, part counts and file sizes.

use ndarray::Array2;
use proptest::prelude::*;

use mlds_core::segments::{block_indicator, pooled_indicator, TRIAD_WEIGHTS};
use mlds_core::{OrderInversion, SegmentPlan, TrialTable};

// ---------------------------------------------------------------------------
// 1. Chunked plans cover the table with ceil(n/parts) sized chunks
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_chunked_partition_covers_rows(n in 1usize..2000, parts in 1usize..12) {
        let chunk = n.div_ceil(parts);
        match SegmentPlan::chunked(n, parts) {
            Ok(plan) => {
                prop_assert_eq!(plan.len(), parts);
                prop_assert!(plan.validate(n).is_ok());
                let sizes: Vec<usize> = plan.segments().iter().map(|s| s.len()).collect();
                prop_assert_eq!(sizes.iter().sum::<usize>(), n);
                for &size in &sizes[..parts - 1] {
                    prop_assert_eq!(size, chunk);
                }
                prop_assert!(sizes[parts - 1] >= 1 && sizes[parts - 1] <= chunk);
            }
            Err(_) => {
                // Only rejected when the last chunk would start past the end
                prop_assert!((parts - 1) * chunk + 1 > n);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 2. File plans are contiguous and follow file order
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_file_partition_follows_file_sizes(rows in prop::collection::vec(1usize..500, 1..10)) {
        let total: usize = rows.iter().sum();
        let plan = SegmentPlan::from_file_rows(&rows).unwrap();
        prop_assert!(plan.validate(total).is_ok());
        prop_assert_eq!(plan.segments()[0].start, 1);
        for (segment, &count) in plan.segments().iter().zip(&rows) {
            prop_assert_eq!(segment.len(), count);
        }
        for pair in plan.segments().windows(2) {
            prop_assert_eq!(pair[1].start, pair[0].end + 1);
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Block indicators are disjoint and add up to the pooled indicator
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_indicators_partition_pooled(n in 2usize..300, parts in 2usize..7) {
        if let Ok(plan) = SegmentPlan::chunked(n, parts) {
            let indicators = plan.indicators(n);
            let total = indicators.iter().fold(Array2::<f64>::zeros((n, 3)), |acc, m| acc + m);
            prop_assert_eq!(total, pooled_indicator(n));

            for (segment, by) in plan.segments().iter().zip(&indicators) {
                prop_assert_eq!(by, &block_indicator(*segment, n));
                for i in 0..n {
                    let inside = segment.range().contains(&i);
                    let expected = if inside { TRIAD_WEIGHTS } else { [0.0; 3] };
                    prop_assert_eq!(by.row(i).to_vec(), expected.to_vec());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Order inversion is an involution
// ---------------------------------------------------------------------------
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_inversion_twice_is_identity(
        rows in prop::collection::vec((0u8..2, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0), 1..60),
    ) {
        let rows: Vec<(f64, f64, f64, f64)> =
            rows.into_iter().map(|(r, a, b, c)| (r as f64, a, b, c)).collect();
        let original = TrialTable::from_rows(&rows).unwrap();
        let inversion = OrderInversion::descending(&original);

        let mut table = original.clone();
        inversion.apply(&mut table).unwrap();
        prop_assert!(OrderInversion::descending(&table).is_empty());
        inversion.apply(&mut table).unwrap();
        prop_assert_eq!(table, original);
    }
}
