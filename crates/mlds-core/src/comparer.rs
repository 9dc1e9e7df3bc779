// =============================================================================
// Scale Comparison
// =============================================================================
//
// Do several blocks of a triad experiment share one perceptual scale?
//
//   1. Load every file and stack the trials in file order.
//   2. Put decreasing triads back into increasing order.
//   3. Fit the pooled model: one smooth ψ for all trials.
//   4. Split the rows into segments (one per file, or `dividedby` chunks of
//      a single file) and fit one smooth per segment.
//   5. Analysis of deviance: pooled vs segmented.
//   6. Evaluate every segment's ψ on a stimulus grid, anchored at 0 for the
//      smallest stimulus and optionally scaled to 1 at the largest.
//
// =============================================================================

use std::path::PathBuf;

use ndarray::{Array1, Array2, ArrayViewMut1};
use serde::Serialize;
use tracing::{info, warn};

use crate::data::{load_trial_file, TrialTable};
use crate::engine::GamEngine;
use crate::error::{MldsError, Result};
use crate::inference::DevianceTest;
use crate::inversion::OrderInversion;
use crate::links::LinkKind;
use crate::model::{ByTerm, FittedGam, GamSpec, PredictionData};
use crate::segments::{pooled_indicator, Segment, SegmentPlan, SegmentPolicy};

/// Settings beyond the file list.
#[derive(Debug, Clone)]
pub struct ComparerConfig {
    /// Basis dimension of every smooth. Default: 4
    pub k: usize,
    /// Default: probit
    pub link: LinkKind,
    /// Number of grid points the scales are evaluated at. Default: 100
    pub grid_len: usize,
    pub policy: SegmentPolicy,
}

impl Default for ComparerConfig {
    fn default() -> Self {
        Self {
            k: 4,
            link: LinkKind::Probit,
            grid_len: 100,
            policy: SegmentPolicy::Unbounded,
        }
    }
}

/// Compares difference scales across files or blocks of one file.
#[derive(Debug, Clone)]
pub struct ScaleComparer {
    files: Vec<PathBuf>,
    dividedby: Option<usize>,
    standardscale: bool,
    config: ComparerConfig,
    inversion: Option<OrderInversion>,
}

/// Everything a comparison produces.
#[derive(Debug, Clone)]
pub struct ScaleComparison {
    /// Stimulus grid (grid_len)
    pub stim: Array1<f64>,
    /// Scale of the pooled model on the grid
    pub scale_all: Array1<f64>,
    /// One column per segment (grid_len × nparts)
    pub scales: Array2<f64>,
    pub anova: DevianceTest,
    pub nparts: usize,
    pub segments: Vec<Segment>,
    /// Rows per input file
    pub nrows: Vec<usize>,
    pub nrowall: usize,
    pub pooled: FittedGam,
    pub segmented: FittedGam,
}

/// Plain-data form of a comparison for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub stim: Vec<f64>,
    pub scale_all: Vec<f64>,
    /// scales[i] is segment i's curve
    pub scales: Vec<Vec<f64>>,
    pub anova: DevianceTest,
    pub nparts: usize,
    pub segments: Vec<Segment>,
    pub nrows: Vec<usize>,
    pub nrowall: usize,
    pub pooled_edf: f64,
    pub segmented_edf: Vec<f64>,
}

impl ScaleComparison {
    pub fn indices_start(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.start).collect()
    }

    pub fn indices_end(&self) -> Vec<usize> {
        self.segments.iter().map(|s| s.end).collect()
    }

    pub fn report(&self) -> ComparisonReport {
        ComparisonReport {
            stim: self.stim.to_vec(),
            scale_all: self.scale_all.to_vec(),
            scales: self.scales.columns().into_iter().map(|c| c.to_vec()).collect(),
            anova: self.anova.clone(),
            nparts: self.nparts,
            segments: self.segments.clone(),
            nrows: self.nrows.clone(),
            nrowall: self.nrowall,
            pooled_edf: self.pooled.edfs.iter().sum(),
            segmented_edf: self.segmented.edfs.clone(),
        }
    }
}

impl ScaleComparer {
    /// Comparer with default settings.
    ///
    /// With a single file, `dividedby` (> 1) is required and the file is
    /// split into that many chunks. With several files each file is one
    /// segment and `dividedby` is ignored.
    pub fn new(files: Vec<PathBuf>, dividedby: Option<usize>, standardscale: bool) -> Result<Self> {
        Self::with_config(files, dividedby, standardscale, ComparerConfig::default())
    }

    pub fn with_config(
        files: Vec<PathBuf>,
        dividedby: Option<usize>,
        standardscale: bool,
        config: ComparerConfig,
    ) -> Result<Self> {
        if files.is_empty() {
            return Err(MldsError::Config("at least one input file is required".to_string()));
        }
        if files.len() == 1 {
            match dividedby {
                None => {
                    return Err(MldsError::Config(
                        "for one file argument, dividedby > 1 must be provided".to_string(),
                    ))
                }
                Some(d) if d <= 1 => {
                    return Err(MldsError::Config(format!("dividedby must be > 1, got {}", d)));
                }
                Some(_) => {}
            }
        } else if dividedby.is_some() {
            warn!(files = files.len(), "dividedby is ignored when several files are given");
        }
        if config.grid_len < 2 {
            return Err(MldsError::Config(format!("grid length must be >= 2, got {}", config.grid_len)));
        }

        config.policy.check_files(files.len())?;
        let parts = if files.len() == 1 { dividedby.unwrap_or(0) } else { files.len() };
        config.policy.check_parts(parts)?;

        Ok(Self {
            files,
            dividedby,
            standardscale,
            config,
            inversion: None,
        })
    }

    /// Replace the default inversion (rows with s1 > s3).
    pub fn with_inversion(mut self, inversion: OrderInversion) -> Self {
        self.inversion = Some(inversion);
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn config(&self) -> &ComparerConfig {
        &self.config
    }

    /// Number of segments the comparison will fit.
    pub fn nparts(&self) -> usize {
        if self.files.len() == 1 {
            self.dividedby.unwrap_or(1)
        } else {
            self.files.len()
        }
    }

    /// Load the files and run the comparison.
    pub fn run(&self, engine: &dyn GamEngine) -> Result<ScaleComparison> {
        let tables = self
            .files
            .iter()
            .map(|path| load_trial_file(path))
            .collect::<Result<Vec<_>>>()?;
        self.run_tables(engine, tables)
    }

    /// Run the comparison on tables already in memory; `tables[i]` takes the
    /// place of `files[i]`.
    pub fn run_tables(&self, engine: &dyn GamEngine, tables: Vec<TrialTable>) -> Result<ScaleComparison> {
        if tables.len() != self.files.len() {
            return Err(MldsError::DimensionMismatch(format!(
                "{} tables for {} inputs",
                tables.len(),
                self.files.len()
            )));
        }

        let nrows: Vec<usize> = tables.iter().map(TrialTable::nrows).collect();
        let mut combined = TrialTable::concat(&tables)?;
        let nrowall = combined.nrows();
        if nrowall != nrows.iter().sum::<usize>() {
            return Err(MldsError::DimensionMismatch(format!(
                "combined table has {} rows but the inputs have {}",
                nrowall,
                nrows.iter().sum::<usize>()
            )));
        }

        let inversion = match &self.inversion {
            Some(inv) => inv.clone(),
            None => OrderInversion::descending(&combined),
        };
        inversion.apply(&mut combined)?;

        let stim = combined.stimulus_grid(self.config.grid_len)?;

        // Pooled model
        let pooled_spec = self.spec(&combined, vec![ByTerm::new("s(S.mat):by.mat", pooled_indicator(nrowall))]);
        let pooled = engine.fit(&pooled_spec)?;
        info!("pooled model\n{}", pooled);

        // Segmented model
        let plan = if tables.len() > 1 {
            SegmentPlan::from_file_rows(&nrows)?
        } else {
            SegmentPlan::chunked(nrowall, self.nparts())?
        };
        plan.validate(nrowall)?;
        self.config.policy.check_parts(plan.len())?;
        let nparts = plan.len();

        let terms = plan
            .indicators(nrowall)
            .into_iter()
            .enumerate()
            .map(|(i, by)| ByTerm::new(format!("s(S.mat):sec{}", i), by))
            .collect();
        let segmented = engine.fit(&self.spec(&combined, terms))?;
        info!("segmented model\n{}", segmented);

        let anova = engine.compare(&pooled, &segmented)?;
        info!("\n{}", anova);

        // Scales on the grid
        let mut scale_all = anchored(engine.predict(&pooled, &PredictionData::isolate(&stim, 1, 0))?);
        let mut scales = Array2::zeros((stim.len(), nparts));
        for part in 0..nparts {
            let curve = anchored(engine.predict(&segmented, &PredictionData::isolate(&stim, nparts, part))?);
            scales.column_mut(part).assign(&curve);
        }

        if self.standardscale {
            standardize(scale_all.view_mut());
            for column in scales.columns_mut() {
                standardize(column);
            }
        }

        Ok(ScaleComparison {
            stim,
            scale_all,
            scales,
            anova,
            nparts,
            segments: plan.segments().to_vec(),
            nrows,
            nrowall,
            pooled,
            segmented,
        })
    }

    fn spec(&self, table: &TrialTable, terms: Vec<ByTerm>) -> GamSpec {
        GamSpec::new(table.response.clone(), table.stimuli.clone(), terms)
            .with_k(self.config.k)
            .with_link(self.config.link)
    }
}

/// Center a link-scale curve, then shift it so its first value is 0.
fn anchored(curve: Array1<f64>) -> Array1<f64> {
    let mean = curve.mean().unwrap_or(0.0);
    let centered = curve - mean;
    let first = centered[0];
    centered - first
}

/// Divide a curve by its last value.
fn standardize(mut curve: ArrayViewMut1<f64>) {
    let last = curve[curve.len() - 1];
    curve.mapv_inplace(|v| v / last);
}
