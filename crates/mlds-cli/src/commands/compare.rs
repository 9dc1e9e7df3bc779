//! Compare difference scales across files or chunks of one file.
//!
//! mlds-gam compare obs1.txt obs2.txt --standardscale

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use mlds_core::{ComparerConfig, ComparisonReport, LinkKind, PenalizedGamEngine, ScaleComparer, SegmentPolicy};

#[derive(Args)]
pub struct CompareArgs {
    /// Triad experiment files (header with Response, s1, s2, s3)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Split a single file into this many chunks
    #[arg(long)]
    dividedby: Option<usize>,

    /// Scale every curve to 1 at the largest stimulus
    #[arg(long)]
    standardscale: bool,

    /// Basis dimension of each smooth
    #[arg(long, default_value = "4")]
    k: usize,

    /// Link function: probit, logit or cloglog
    #[arg(long, default_value = "probit")]
    link: LinkKind,

    /// Number of stimulus grid points
    #[arg(long, default_value = "100")]
    grid_len: usize,

    /// Only accept up to 4 files and 2, 3, 4 or 6 segments
    #[arg(long)]
    legacy_segments: bool,

    /// Print the whole comparison as JSON
    #[arg(long)]
    json: bool,

    /// Write the scale table here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

pub fn run(args: CompareArgs) -> Result<()> {
    let config = ComparerConfig {
        k: args.k,
        link: args.link,
        grid_len: args.grid_len,
        policy: if args.legacy_segments {
            SegmentPolicy::Legacy
        } else {
            SegmentPolicy::Unbounded
        },
    };

    let comparer = ScaleComparer::with_config(args.files.clone(), args.dividedby, args.standardscale, config)?;
    let engine = PenalizedGamEngine::default();

    tracing::info!(files = args.files.len(), parts = comparer.nparts(), "running comparison");
    let result = comparer.run(&engine).context("scale comparison failed")?;

    let report = result.report();
    if !args.json && args.output.is_some() {
        println!("{}", report.anova);
    }
    let mut out = open_output(args.output.as_deref())?;
    write_results(&mut out, &report, args.json, args.output.is_none())?;
    out.flush()?;

    Ok(())
}

/// Buffered writer on `path`, or on stdout when no path is given.
fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

/// JSON report, or the scale table preceded by the deviance table when
/// `with_anova` is set.
fn write_results(out: &mut dyn Write, report: &ComparisonReport, json: bool, with_anova: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, report)?;
        writeln!(out)?;
        return Ok(());
    }
    if with_anova {
        writeln!(out, "{}", report.anova)?;
        writeln!(out)?;
    }
    write_scale_table(out, report)
}

/// Tab-separated table: stimulus, pooled scale, then one column per segment.
fn write_scale_table(out: &mut dyn Write, report: &ComparisonReport) -> Result<()> {
    write!(out, "stim\tall")?;
    for (i, segment) in report.segments.iter().enumerate() {
        write!(out, "\tsec{}[{}-{}]", i, segment.start, segment.end)?;
    }
    writeln!(out)?;

    for (row, &s) in report.stim.iter().enumerate() {
        write!(out, "{:.6}\t{:.6}", s, report.scale_all[row])?;
        for curve in &report.scales {
            write!(out, "\t{:.6}", curve[row])?;
        }
        writeln!(out)?;
    }
    Ok(())
}
