//! Simulated MLDS observers shared by the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use mlds_core::links::norm_cdf;
use mlds_core::TrialTable;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Ten equally spaced stimulus levels on [0, 1].
pub fn levels() -> Vec<f64> {
    (0..10).map(|i| i as f64 / 9.0).collect()
}

/// Triad judgments from an observer with perceptual scale `psi`.
///
/// Half of the triads are presented in decreasing order, with the answer
/// reversed accordingly.
pub fn simulate_observer(psi: impl Fn(f64) -> f64, n: usize, seed: u64) -> TrialTable {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let levels = levels();
    let mut rows = Vec::with_capacity(n);
    while rows.len() < n {
        let mut idx = [rng.gen_range(0..10), rng.gen_range(0..10), rng.gen_range(0..10)];
        idx.sort_unstable();
        if !(idx[0] < idx[1] && idx[1] < idx[2]) {
            continue;
        }
        let s = idx.map(|j| levels[j]);
        let dv = psi(s[0]) - 2.0 * psi(s[1]) + psi(s[2]);
        let r = if rng.gen::<f64>() < norm_cdf(dv) { 1.0 } else { 0.0 };
        if rng.gen::<bool>() {
            rows.push((1.0 - r, s[2], s[1], s[0]));
        } else {
            rows.push((r, s[0], s[1], s[2]));
        }
    }
    TrialTable::from_rows(&rows).unwrap()
}

/// Linear scale ψ(s) = 4s.
pub fn linear(s: f64) -> f64 {
    4.0 * s
}

/// Strongly compressive scale ψ(s) = 4s³.
pub fn cubic(s: f64) -> f64 {
    4.0 * s.powi(3)
}

/// Write a table in the experiment file format.
pub fn write_trial_file(dir: &tempfile::TempDir, name: &str, table: &TrialTable) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Trial\tResponse\ts1\ts2\ts3").unwrap();
    for i in 0..table.nrows() {
        let s = table.stimuli.row(i);
        writeln!(file, "{}\t{}\t{}\t{}\t{}", i + 1, table.response[i], s[0], s[1], s[2]).unwrap();
    }
    path
}

pub fn dummy_paths(n: usize) -> Vec<PathBuf> {
    (0..n).map(|i| PathBuf::from(format!("block{}.txt", i))).collect()
}
