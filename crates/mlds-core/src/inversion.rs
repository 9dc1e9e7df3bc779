// =============================================================================
// Triad Order Inversion
// =============================================================================
//
// A triad shown in decreasing order (s1 > s3) asks the same question as the
// increasing one with the answer reversed. Before fitting, such rows are
// put back into increasing order: s1 and s3 swap and the response flips.
//
// =============================================================================

use std::collections::BTreeSet;

use tracing::debug;

use crate::data::TrialTable;
use crate::error::{MldsError, Result};

/// A set of row indices (0-based) whose triad order is inverted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderInversion {
    rows: BTreeSet<usize>,
}

impl OrderInversion {
    /// Invert nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// Invert exactly these rows.
    pub fn rows(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            rows: indices.into_iter().collect(),
        }
    }

    /// Rows presented in decreasing order (s1 > s3).
    pub fn descending(table: &TrialTable) -> Self {
        let rows = table
            .stimuli
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(_, r)| r[0] > r[2])
            .map(|(i, _)| i)
            .collect();
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.iter().copied()
    }

    /// Apply to a table in place.
    pub fn apply(&self, table: &mut TrialTable) -> Result<()> {
        let n = table.nrows();
        if let Some(&last) = self.rows.iter().next_back() {
            if last >= n {
                return Err(MldsError::InvalidValue(format!(
                    "inversion row {} is out of range for a table of {} rows",
                    last, n
                )));
            }
        }
        for &i in &self.rows {
            table.stimuli.swap([i, 0], [i, 2]);
            table.response[i] = 1.0 - table.response[i];
        }
        debug!(inverted = self.rows.len(), rows = n, "applied order inversion");
        Ok(())
    }
}
