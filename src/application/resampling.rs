//! Minority oversampling for imbalanced binary targets (SMOTE).
//!
//! Only ever applied to a training partition; validation and test data keep
//! their true class distribution.

use crate::domain::errors::PipelineError;
use crate::domain::ml::Dataset;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

pub const SMOTE_NEIGHBOURS: usize = 5;

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Indices (into `members`) of the `k` nearest other members of each member.
fn nearest_neighbours(dataset: &Dataset, members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .iter()
        .enumerate()
        .map(|(pos, &row)| {
            let mut distances: Vec<(usize, f64)> = members
                .iter()
                .enumerate()
                .filter(|(other_pos, _)| *other_pos != pos)
                .map(|(other_pos, &other)| {
                    (
                        other_pos,
                        squared_distance(&dataset.features[row], &dataset.features[other]),
                    )
                })
                .collect();
            distances.sort_by(|a, b| a.1.total_cmp(&b.1));
            distances.into_iter().take(k).map(|(p, _)| p).collect()
        })
        .collect()
}

/// Oversamples the minority class until both classes have equal counts.
///
/// Synthetic rows interpolate between a minority row and one of its `k`
/// nearest minority neighbours; with a single minority row it is duplicated.
/// Synthetic rows carry the row id of the sample they were generated from.
pub fn smote(dataset: &Dataset, k: usize, seed: u64) -> Result<Dataset, PipelineError> {
    let (negatives, positives) = dataset.class_counts();
    if negatives == 0 || positives == 0 {
        return Err(PipelineError::InvalidData {
            column: "target".to_string(),
            reason: format!(
                "cannot balance a single-class training set ({} negatives, {} positives)",
                negatives, positives
            ),
        });
    }

    let minority_positive = positives < negatives;
    let deficit = negatives.abs_diff(positives);
    if deficit == 0 {
        return Ok(dataset.clone());
    }

    let minority_label = if minority_positive { 1.0 } else { 0.0 };
    let members: Vec<usize> = (0..dataset.len())
        .filter(|&i| (dataset.targets[i] >= 0.5) == minority_positive)
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let mut balanced = dataset.clone();
    balanced.features.reserve(deficit);
    balanced.targets.reserve(deficit);
    balanced.row_ids.reserve(deficit);

    let neighbours = if members.len() >= 2 {
        nearest_neighbours(dataset, &members, k.max(1).min(members.len() - 1))
    } else {
        debug!("SMOTE: single minority row, falling back to duplication");
        vec![Vec::new(); members.len()]
    };

    for _ in 0..deficit {
        let pos = rng.random_range(0..members.len());
        let source = &dataset.features[members[pos]];
        let synthetic = if neighbours[pos].is_empty() {
            source.clone()
        } else {
            let neighbour_pos = neighbours[pos][rng.random_range(0..neighbours[pos].len())];
            let neighbour = &dataset.features[members[neighbour_pos]];
            let gap: f64 = rng.random();
            source
                .iter()
                .zip(neighbour)
                .map(|(s, n)| s + gap * (n - s))
                .collect()
        };
        balanced.features.push(synthetic);
        balanced.targets.push(minority_label);
        balanced.row_ids.push(dataset.row_ids[members[pos]]);
    }

    info!(
        "SMOTE balanced training set: {} -> {} rows ({} synthetic)",
        dataset.len(),
        balanced.len(),
        deficit
    );
    Ok(balanced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imbalanced(n_neg: usize, n_pos: usize) -> Dataset {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for i in 0..n_neg {
            features.push(vec![i as f64, 0.0]);
            targets.push(0.0);
        }
        for i in 0..n_pos {
            features.push(vec![100.0 + i as f64, 1.0]);
            targets.push(1.0);
        }
        Dataset::new(features, targets, vec!["a".to_string(), "b".to_string()]).unwrap()
    }

    #[test]
    fn test_smote_balances_classes() {
        let balanced = smote(&imbalanced(95, 5), SMOTE_NEIGHBOURS, 42).unwrap();
        assert_eq!(balanced.class_counts(), (95, 95));
    }

    #[test]
    fn test_synthetic_rows_stay_inside_minority_hull() {
        let balanced = smote(&imbalanced(20, 4), SMOTE_NEIGHBOURS, 1).unwrap();
        for (row, target) in balanced.features.iter().zip(&balanced.targets).skip(24) {
            assert_eq!(*target, 1.0);
            assert!(row[0] >= 100.0 && row[0] <= 103.0);
            assert_eq!(row[1], 1.0);
        }
    }

    #[test]
    fn test_single_minority_row_is_duplicated() {
        let balanced = smote(&imbalanced(6, 1), SMOTE_NEIGHBOURS, 3).unwrap();
        assert_eq!(balanced.class_counts(), (6, 6));
        assert!(balanced.features[7..].iter().all(|r| r == &vec![100.0, 1.0]));
    }

    #[test]
    fn test_single_class_rejected() {
        assert!(matches!(
            smote(&imbalanced(5, 0), SMOTE_NEIGHBOURS, 0),
            Err(PipelineError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_already_balanced_is_unchanged() {
        let ds = imbalanced(3, 3);
        assert_eq!(smote(&ds, SMOTE_NEIGHBOURS, 0).unwrap(), ds);
    }
}
