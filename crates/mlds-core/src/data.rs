// =============================================================================
// Trial Data
// =============================================================================
//
// A triad experiment file is a whitespace-delimited table with a header row:
//
//     Trial  Response  s1   s2   s3
//     1      1         0.1  0.4  0.9
//     2      0         0.9  0.5  0.2
//     ...
//
// Columns are located by header name (case-insensitive); the response column
// may be called `Response` or `resp`. Other columns are ignored.
//
// =============================================================================

use std::fs;
use std::path::Path;

use ndarray::{concatenate, Array1, Array2, Axis};
use tracing::debug;

use crate::error::{MldsError, Result};

/// Triad trials: one binary response and three stimulus values per row.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialTable {
    /// Response per trial (0 or 1)
    pub response: Array1<f64>,
    /// Stimulus values (n × 3): columns s1, s2, s3
    pub stimuli: Array2<f64>,
}

impl TrialTable {
    pub fn new(response: Array1<f64>, stimuli: Array2<f64>) -> Result<Self> {
        if stimuli.ncols() != 3 {
            return Err(MldsError::DimensionMismatch(format!(
                "stimulus matrix must have 3 columns, got {}",
                stimuli.ncols()
            )));
        }
        if stimuli.nrows() != response.len() {
            return Err(MldsError::DimensionMismatch(format!(
                "{} responses but {} stimulus rows",
                response.len(),
                stimuli.nrows()
            )));
        }
        if let Some(bad) = response.iter().find(|&&r| r != 0.0 && r != 1.0) {
            return Err(MldsError::InvalidValue(format!("response must be 0 or 1, got {}", bad)));
        }
        Ok(Self { response, stimuli })
    }

    /// Build a table from (response, s1, s2, s3) tuples.
    pub fn from_rows(rows: &[(f64, f64, f64, f64)]) -> Result<Self> {
        let response = rows.iter().map(|r| r.0).collect();
        let stimuli = Array2::from_shape_fn((rows.len(), 3), |(i, j)| match j {
            0 => rows[i].1,
            1 => rows[i].2,
            _ => rows[i].3,
        });
        Self::new(response, stimuli)
    }

    pub fn nrows(&self) -> usize {
        self.response.len()
    }

    pub fn is_empty(&self) -> bool {
        self.response.is_empty()
    }

    /// Stack tables in order.
    pub fn concat(tables: &[TrialTable]) -> Result<Self> {
        if tables.is_empty() {
            return Err(MldsError::EmptyInput("no trial tables to concatenate".to_string()));
        }
        let responses: Vec<_> = tables.iter().map(|t| t.response.view()).collect();
        let stimuli: Vec<_> = tables.iter().map(|t| t.stimuli.view()).collect();
        let response = concatenate(Axis(0), &responses).map_err(|e| MldsError::DimensionMismatch(e.to_string()))?;
        let stimuli = concatenate(Axis(0), &stimuli).map_err(|e| MldsError::DimensionMismatch(e.to_string()))?;
        Ok(Self { response, stimuli })
    }

    /// Sorted unique stimulus values across all three columns.
    pub fn stimulus_levels(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = self.stimuli.iter().copied().collect();
        levels.sort_by(f64::total_cmp);
        levels.dedup();
        levels
    }

    /// (min, max) over all stimulus values.
    pub fn stimulus_range(&self) -> Result<(f64, f64)> {
        let levels = self.stimulus_levels();
        match (levels.first(), levels.last()) {
            (Some(&lo), Some(&hi)) => Ok((lo, hi)),
            _ => Err(MldsError::EmptyInput("trial table has no stimuli".to_string())),
        }
    }

    /// `len` equally spaced points from the smallest to the largest level.
    pub fn stimulus_grid(&self, len: usize) -> Result<Array1<f64>> {
        if len < 2 {
            return Err(MldsError::InvalidValue(format!("grid length must be >= 2, got {}", len)));
        }
        let (lo, hi) = self.stimulus_range()?;
        Ok(Array1::linspace(lo, hi, len))
    }
}

/// Position of each required column in the header.
struct ColumnMap {
    response: usize,
    stimuli: [usize; 3],
    width: usize,
}

fn locate_columns(header: &str, path: &Path) -> Result<ColumnMap> {
    let names: Vec<String> = header
        .split_whitespace()
        .map(|h| h.trim_matches('"').to_ascii_lowercase())
        .collect();
    let find = |candidates: &[&str]| names.iter().position(|n| candidates.contains(&n.as_str()));
    let missing = |what: &str| MldsError::Parse {
        path: path.to_path_buf(),
        line: 1,
        message: format!("header has no {} column", what),
    };

    Ok(ColumnMap {
        response: find(&["response", "resp"]).ok_or_else(|| missing("Response"))?,
        stimuli: [
            find(&["s1"]).ok_or_else(|| missing("s1"))?,
            find(&["s2"]).ok_or_else(|| missing("s2"))?,
            find(&["s3"]).ok_or_else(|| missing("s3"))?,
        ],
        width: names.len(),
    })
}

/// Parse the text of a trial file. `path` is only used in error messages.
pub fn parse_trials(text: &str, path: &Path) -> Result<TrialTable> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| MldsError::Parse {
        path: path.to_path_buf(),
        line: 1,
        message: "file is empty".to_string(),
    })?;
    let columns = locate_columns(header, path)?;

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        let err = |message: String| MldsError::Parse {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < columns.width {
            return Err(err(format!("expected {} fields, found {}", columns.width, fields.len())));
        }
        let number = |col: usize| -> Result<f64> {
            fields[col]
                .trim_matches('"')
                .parse::<f64>()
                .map_err(|_| err(format!("not a number: '{}'", fields[col])))
        };

        let response = number(columns.response)?;
        if response != 0.0 && response != 1.0 {
            return Err(err(format!("response must be 0 or 1, got {}", fields[columns.response])));
        }
        rows.push((
            response,
            number(columns.stimuli[0])?,
            number(columns.stimuli[1])?,
            number(columns.stimuli[2])?,
        ));
    }

    TrialTable::from_rows(&rows)
}

/// Read one trial file.
pub fn load_trial_file(path: impl AsRef<Path>) -> Result<TrialTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| MldsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_trials(&text, path)?;
    debug!(path = %path.display(), rows = table.nrows(), "loaded trial file");
    Ok(table)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = "Trial\tResponse\ts1\ts2\ts3\n\
                          1\t1\t0.1\t0.4\t0.9\n\
                          \n\
                          2\t0\t0.9\t0.5\t0.2\n";

    #[test]
    fn test_parse_by_header_name() {
        let table = parse_trials(SAMPLE, Path::new("a.txt")).unwrap();
        assert_eq!(table.nrows(), 2);
        assert_eq!(table.response.to_vec(), vec![1.0, 0.0]);
        assert_eq!(table.stimuli.row(1).to_vec(), vec![0.9, 0.5, 0.2]);
    }

    #[test]
    fn test_parse_reordered_columns_and_resp_alias() {
        let text = "S3 S2 S1 resp\n0.9 0.4 0.1 1\n";
        let table = parse_trials(text, Path::new("b.txt")).unwrap();
        assert_eq!(table.stimuli.row(0).to_vec(), vec![0.1, 0.4, 0.9]);
        assert_eq!(table.response[0], 1.0);
    }

    #[test]
    fn test_parse_rejects_bad_response() {
        let text = "Response s1 s2 s3\n1 0 1 2\n2 0 1 2\n";
        match parse_trials(text, Path::new("obs.txt")) {
            Err(MldsError::Parse { line, message, .. }) => {
                assert_eq!(line, 3);
                assert!(message.contains("0 or 1"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_missing_column() {
        let text = "Response s1 s2\n1 0 1\n";
        assert!(matches!(parse_trials(text, Path::new("x")), Err(MldsError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let text = "Response s1 s2 s3\n1 0 abc 2\n";
        assert!(matches!(parse_trials(text, Path::new("x")), Err(MldsError::Parse { line: 2, .. })));
    }

    #[test]
    fn test_load_trial_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let table = load_trial_file(file.path()).unwrap();
        assert_eq!(table.nrows(), 2);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let result = load_trial_file(PathBuf::from("/nonexistent/trials.txt"));
        assert!(matches!(result, Err(MldsError::Io { .. })));
    }

    #[test]
    fn test_concat_preserves_order_and_count() {
        let a = TrialTable::from_rows(&[(1.0, 0.0, 0.5, 1.0)]).unwrap();
        let b = TrialTable::from_rows(&[(0.0, 0.2, 0.4, 0.6), (1.0, 0.1, 0.3, 0.8)]).unwrap();
        let all = TrialTable::concat(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(all.nrows(), a.nrows() + b.nrows());
        assert_eq!(all.response, array![1.0, 0.0, 1.0]);
        assert_eq!(all.stimuli.row(2).to_vec(), vec![0.1, 0.3, 0.8]);
    }

    #[test]
    fn test_stimulus_levels_and_grid() {
        let table = TrialTable::from_rows(&[(1.0, 0.3, 0.1, 0.3), (0.0, 1.0, 0.1, 0.5)]).unwrap();
        assert_eq!(table.stimulus_levels(), vec![0.1, 0.3, 0.5, 1.0]);
        let grid = table.stimulus_grid(100).unwrap();
        assert_eq!(grid.len(), 100);
        assert_abs_diff_eq!(grid[0], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(grid[99], 1.0, epsilon = 1e-12);
    }
}
