//! Train / validation / test partitioning.
//!
//! Time series are split purely by position (no shuffling) so a model never
//! sees data that comes after its validation or test rows. Classification
//! data is split with a seeded, per-class shuffle that preserves class ratios.

use crate::domain::errors::PipelineError;
use crate::domain::ml::{Dataset, DatasetSplit};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

fn validate_fraction(name: &str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() && (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(
            name,
            format!("{} is outside [0, 1)", value),
        ))
    }
}

/// Positional split: `test_start = floor(n * (1 - test))`,
/// `val_start = floor(test_start * (1 - validation))`.
///
/// Small inputs may produce empty partitions; detecting that is the trainer's job.
pub fn chronological_split(
    dataset: &Dataset,
    test_fraction: f64,
    validation_fraction: f64,
) -> Result<DatasetSplit, PipelineError> {
    validate_fraction("test_fraction", test_fraction)?;
    validate_fraction("validation_fraction", validation_fraction)?;

    let n = dataset.len();
    let test_start = (n as f64 * (1.0 - test_fraction)).floor() as usize;
    let val_start = (test_start as f64 * (1.0 - validation_fraction)).floor() as usize;

    debug!(
        "Chronological split of {} rows: train [0, {}), validation [{}, {}), test [{}, {})",
        n, val_start, val_start, test_start, test_start, n
    );

    Ok(DatasetSplit {
        train: dataset.slice(0, val_start),
        validation: dataset.slice(val_start, test_start),
        test: dataset.slice(test_start, n),
    })
}

/// Stratified random split with a fixed seed.
///
/// Each class contributes `round(count * test_fraction)` rows to test, then
/// `round(remaining * validation_fraction)` rows to validation.
pub fn stratified_split(
    dataset: &Dataset,
    test_fraction: f64,
    validation_fraction: f64,
    seed: u64,
) -> Result<DatasetSplit, PipelineError> {
    validate_fraction("test_fraction", test_fraction)?;
    validate_fraction("validation_fraction", validation_fraction)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::new();
    let mut val_idx = Vec::new();
    let mut test_idx = Vec::new();

    for positive in [false, true] {
        let mut members: Vec<usize> = dataset
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| (**t >= 0.5) == positive)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);

        let n_test = (members.len() as f64 * test_fraction).round() as usize;
        let remaining = members.len() - n_test;
        let n_val = (remaining as f64 * validation_fraction).round() as usize;

        test_idx.extend_from_slice(&members[..n_test]);
        val_idx.extend_from_slice(&members[n_test..n_test + n_val]);
        train_idx.extend_from_slice(&members[n_test + n_val..]);
    }

    train_idx.sort_unstable();
    val_idx.sort_unstable();
    test_idx.sort_unstable();

    debug!(
        "Stratified split: {} train, {} validation, {} test rows",
        train_idx.len(),
        val_idx.len(),
        test_idx.len()
    );

    Ok(DatasetSplit {
        train: dataset.select_rows(&train_idx),
        validation: dataset.select_rows(&val_idx),
        test: dataset.select_rows(&test_idx),
    })
}

/// Two-way stratified split; returns (train, test).
pub fn train_test_split(
    dataset: &Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(Dataset, Dataset), PipelineError> {
    let split = stratified_split(dataset, test_fraction, 0.0, seed)?;
    Ok((split.train, split.test))
}
