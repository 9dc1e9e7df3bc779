// =============================================================================
// MLDS-GAM Python Bindings
// =============================================================================
//
// This module creates the bridge between Rust and Python using PyO3.
// It wraps the pure Rust code from `mlds-core` and exposes it as a Python
// module that can be imported with `import mlds`.
//
//     import mlds
//     cmp = mlds.ScaleComparer(["obs1.txt", "obs2.txt"], standardscale=True)
//     cmp.run()
//     cmp.scales, cmp.anova.p_value
//
// STRUCTURE:
// ----------
// - `ScaleComparer` holds the configuration and, after `run()`, the results
//   as attributes (numpy arrays for curves, a `DevianceTest` for the test)
// - `DevianceTest` is a read-only view of the analysis of deviance
//
// FOR MAINTAINERS:
// ----------------
// When adding new functionality:
// 1. Implement the logic in `mlds-core` first
// 2. Create a Python wrapper here that calls the Rust code
// 3. Add it to the module in the `_mlds` function at the bottom
//
// =============================================================================

use std::path::PathBuf;

use ndarray::{Array1, Array2};
use numpy::{IntoPyArray, PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2};
use pyo3::exceptions::{PyIOError, PyNotImplementedError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use mlds_core::{
    ComparerConfig, DevianceTest, LinkKind, MldsError, PenalizedGamEngine, ScaleComparer, ScaleComparison,
    SegmentPolicy, TrialTable,
};

// =============================================================================
// Error conversion
// =============================================================================

fn to_py_err(err: MldsError) -> PyErr {
    let message = err.to_string();
    match err {
        MldsError::NotImplemented(_) => PyNotImplementedError::new_err(message),
        MldsError::Io { .. } => PyIOError::new_err(message),
        MldsError::LinearAlgebra(_) => PyRuntimeError::new_err(message),
        _ => PyValueError::new_err(message),
    }
}

// =============================================================================
// Deviance test
// =============================================================================

/// Analysis of deviance: pooled model (1) against one scale per segment (2).
#[pyclass(name = "DevianceTest")]
#[derive(Clone)]
pub struct PyDevianceTest {
    inner: DevianceTest,
}

#[pymethods]
impl PyDevianceTest {
    /// Residual degrees of freedom [pooled, segmented]
    #[getter]
    fn resid_df(&self) -> Vec<f64> {
        self.inner.resid_df.to_vec()
    }

    /// Residual deviance [pooled, segmented]
    #[getter]
    fn resid_dev(&self) -> Vec<f64> {
        self.inner.resid_dev.to_vec()
    }

    #[getter]
    fn df(&self) -> f64 {
        self.inner.df
    }

    #[getter]
    fn deviance(&self) -> f64 {
        self.inner.deviance
    }

    /// P(>Chi); NaN when the segmented model has no extra degrees of freedom
    #[getter]
    fn p_value(&self) -> f64 {
        self.inner.p_value
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!(
            "DevianceTest(df={:.3}, deviance={:.3}, p_value={:.4e})",
            self.inner.df, self.inner.deviance, self.inner.p_value
        )
    }
}

// =============================================================================
// Scale comparer
// =============================================================================

/// Reads triad experiment files, estimates difference scales with binomial
/// GAMs and tests whether the files (or chunks of one file) differ.
///
/// Parameters
/// ----------
/// files : list of str
///     Experiment files with a header naming Response, s1, s2, s3.
/// dividedby : int, optional
///     Required (> 1) when a single file is given: number of chunks.
/// standardscale : bool
///     Scale every curve to 1 at the largest stimulus.
/// k : int
///     Basis dimension of each smooth.
/// link : str
///     "probit", "logit" or "cloglog".
/// legacy_segments : bool
///     Only accept up to 4 files and 2, 3, 4 or 6 segments.
#[pyclass(name = "ScaleComparer")]
pub struct PyScaleComparer {
    inner: ScaleComparer,
    engine: PenalizedGamEngine,
    result: Option<ScaleComparison>,
}

impl PyScaleComparer {
    fn result(&self) -> PyResult<&ScaleComparison> {
        self.result
            .as_ref()
            .ok_or_else(|| PyRuntimeError::new_err("no results yet: call run() first"))
    }
}

#[pymethods]
impl PyScaleComparer {
    #[new]
    #[pyo3(signature = (files, dividedby=None, standardscale=false, k=4, link="probit", legacy_segments=false))]
    fn new(
        files: Vec<PathBuf>,
        dividedby: Option<usize>,
        standardscale: bool,
        k: usize,
        link: &str,
        legacy_segments: bool,
    ) -> PyResult<Self> {
        let config = ComparerConfig {
            k,
            link: link.parse::<LinkKind>().map_err(to_py_err)?,
            policy: if legacy_segments {
                SegmentPolicy::Legacy
            } else {
                SegmentPolicy::Unbounded
            },
            ..Default::default()
        };
        let inner = ScaleComparer::with_config(files, dividedby, standardscale, config).map_err(to_py_err)?;
        Ok(Self {
            inner,
            engine: PenalizedGamEngine::default(),
            result: None,
        })
    }

    /// Load the files, fit both models and run the analysis of deviance.
    fn run(&mut self, py: Python<'_>) -> PyResult<()> {
        let result = py.allow_threads(|| self.inner.run(&self.engine)).map_err(to_py_err)?;
        self.result = Some(result);
        Ok(())
    }

    /// Same as `run()`, on arrays instead of files: one response vector and
    /// one (n × 3) stimulus matrix per input.
    fn run_arrays(
        &mut self,
        responses: Vec<PyReadonlyArray1<f64>>,
        stimuli: Vec<PyReadonlyArray2<f64>>,
    ) -> PyResult<()> {
        if responses.len() != stimuli.len() {
            return Err(PyValueError::new_err(format!(
                "{} response arrays but {} stimulus arrays",
                responses.len(),
                stimuli.len()
            )));
        }
        let tables = responses
            .iter()
            .zip(&stimuli)
            .map(|(r, s)| {
                let response: Array1<f64> = r.as_array().to_owned();
                let stimuli: Array2<f64> = s.as_array().to_owned();
                TrialTable::new(response, stimuli)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(to_py_err)?;
        let result = self.inner.run_tables(&self.engine, tables).map_err(to_py_err)?;
        self.result = Some(result);
        Ok(())
    }

    /// Stimulus grid the scales are evaluated at
    #[getter]
    fn stim<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.result()?.stim.clone().into_pyarray_bound(py))
    }

    /// Scale of the pooled model
    #[getter]
    fn scale_all<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray1<f64>>> {
        Ok(self.result()?.scale_all.clone().into_pyarray_bound(py))
    }

    /// One column per segment
    #[getter]
    fn scales<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyArray2<f64>>> {
        Ok(self.result()?.scales.clone().into_pyarray_bound(py))
    }

    #[getter]
    fn anova(&self) -> PyResult<PyDevianceTest> {
        Ok(PyDevianceTest {
            inner: self.result()?.anova.clone(),
        })
    }

    #[getter]
    fn nparts(&self) -> PyResult<usize> {
        Ok(self.result()?.nparts)
    }

    /// First row of each segment (1-based)
    #[getter]
    fn indices_start(&self) -> PyResult<Vec<usize>> {
        Ok(self.result()?.indices_start())
    }

    /// Last row of each segment (1-based, inclusive)
    #[getter]
    fn indices_end(&self) -> PyResult<Vec<usize>> {
        Ok(self.result()?.indices_end())
    }

    /// Rows per input file
    #[getter]
    fn nrows(&self) -> PyResult<Vec<usize>> {
        Ok(self.result()?.nrows.clone())
    }

    #[getter]
    fn nrowall(&self) -> PyResult<usize> {
        Ok(self.result()?.nrowall)
    }

    /// Text summaries of the pooled and segmented models
    fn summary(&self) -> PyResult<(String, String)> {
        let result = self.result()?;
        Ok((result.pooled.to_string(), result.segmented.to_string()))
    }

    fn __repr__(&self) -> String {
        format!(
            "ScaleComparer(files={}, nparts={}, fitted={})",
            self.inner.files().len(),
            self.inner.nparts(),
            self.result.is_some()
        )
    }
}

// =============================================================================
// Module
// =============================================================================

#[pymodule]
fn _mlds(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyScaleComparer>()?;
    m.add_class::<PyDevianceTest>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
