//! Synthetic sample datasets.
//!
//! Generates a noisy thickness-change series: a slow linear drift plus a
//! seasonal cycle, Gaussian noise, and rare jumps (the outliers the two-stage
//! method is meant to catch). The same config always yields the same file.

use std::path::{Path, PathBuf};

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use tracing::info;

use crate::domain::{DataTable, Payload};
use crate::error::PipelineError;
use crate::io::{DatasetResolver, SavePayload};

/// Default file name written by `alps sample`.
pub const DEFAULT_SAMPLE_NAME: &str = "sample.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct SampleConfig {
    pub rows: usize,
    pub seed: u64,
    /// Length of the time axis (years).
    pub span: f64,
    /// Standard deviation of the Gaussian noise (m).
    pub noise_sd: f64,
    /// Probability that a point receives a jump.
    pub jump_prob: f64,
    /// Jump size in noise standard deviations.
    pub jump_k: f64,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            rows: 50,
            seed: 7,
            span: 20.0,
            noise_sd: 0.05,
            jump_prob: 0.04,
            jump_k: 8.0,
        }
    }
}

/// Build the sample table (`time`, `thickness_change`), sorted by time.
pub fn generate_sample(config: &SampleConfig) -> Result<Payload, PipelineError> {
    let invalid = PipelineError::InvalidInput;
    if config.rows < 2 {
        return Err(invalid("sample needs at least 2 rows".to_string()));
    }
    if !(config.span.is_finite() && config.span > 0.0) {
        return Err(invalid(format!("invalid sample span: {}", config.span)));
    }
    if !(0.0..1.0).contains(&config.jump_prob) {
        return Err(invalid(format!("jump probability must be in [0, 1), got {}", config.jump_prob)));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, config.noise_sd.max(0.0))
        .map_err(|e| invalid(format!("noise distribution error: {e}")))?;

    let mut time: Vec<f64> = (0..config.rows).map(|_| rng.gen_range(0.0..=config.span)).collect();
    time.sort_by(f64::total_cmp);

    let thickness: Vec<f64> = time
        .iter()
        .map(|&t| {
            let roll: f64 = rng.r#gen();
            let jump = if roll < config.jump_prob {
                let sign = if rng.r#gen::<bool>() { 1.0 } else { -1.0 };
                sign * config.jump_k * config.noise_sd
            } else {
                0.0
            };
            trend(t) + normal.sample(&mut rng) + jump
        })
        .collect();

    let table = DataTable::new(
        vec!["time".to_string(), "thickness_change".to_string()],
        vec![time, thickness],
    )
    .map_err(invalid)?;
    Ok(Payload::Table(table))
}

/// Generate a sample and store it as `<dir>/<name>` through the resolver.
pub fn write_sample(
    dir: &Path,
    name: &str,
    config: &SampleConfig,
    resolver: &DatasetResolver,
) -> Result<PathBuf, PipelineError> {
    let path = dir.join(name);
    // Reject unsupported names before generating or creating anything.
    resolver.format_for(&path)?;

    let payload = generate_sample(config)?;
    std::fs::create_dir_all(dir)
        .map_err(|e| PipelineError::io(format!("Failed to create '{}'", dir.display()), e))?;
    resolver.save(&path, SavePayload::Decoded(&payload))?;

    info!(path = %path.display(), rows = config.rows, seed = config.seed, "sample written");
    Ok(path)
}

/// Noise-free signal: slow thinning plus a yearly cycle.
fn trend(t: f64) -> f64 {
    -0.02 * t + 0.15 * (std::f64::consts::TAU * t / 5.0).sin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn same_seed_same_sample() {
        let cfg = SampleConfig::default();
        assert_eq!(generate_sample(&cfg).unwrap(), generate_sample(&cfg).unwrap());

        let other = SampleConfig { seed: 8, ..cfg.clone() };
        assert_ne!(generate_sample(&cfg).unwrap(), generate_sample(&other).unwrap());
    }

    #[test]
    fn sample_is_sorted_by_time() {
        let payload = generate_sample(&SampleConfig { rows: 200, ..SampleConfig::default() }).unwrap();
        let Payload::Table(t) = payload else {
            panic!("expected a table");
        };
        assert_eq!(t.n_rows(), 200);
        let time = t.column("time").unwrap();
        assert!(time.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn written_sample_loads_back() {
        let tmp = tempdir().unwrap();
        let resolver = DatasetResolver::default();
        let path = write_sample(tmp.path(), DEFAULT_SAMPLE_NAME, &SampleConfig::default(), &resolver).unwrap();
        let handle = resolver.load(&path).unwrap();
        assert_eq!(handle.payload.n_rows(), 50);
        assert_eq!(handle.payload.n_cols(), 2);
    }

    #[test]
    fn unsupported_name_writes_nothing() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("sample");
        let err = write_sample(&dir, "sample.json", &SampleConfig::default(), &DatasetResolver::default()).unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
        assert!(!dir.exists());
    }
}
