//! Feature selection against a binary target.
//!
//! Univariate k-best by ANOVA F or mutual information, random-forest
//! permutation importance, and recursive elimination driven by that importance.

use crate::application::ml::importance::permutation_importance;
use crate::application::ml::models::RandomForestFamily;
use crate::application::ml::models::forest::N_TREES;
use crate::domain::errors::PipelineError;
use crate::domain::ml::{Dataset, FitContext, ModelFamily, Task};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::function::gamma::digamma;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Neighbours used by the mutual-information estimate
pub const MI_NEIGHBOURS: usize = 3;
/// Trees per forest refit during recursive elimination
pub const RFE_TREES: usize = 50;

const STAGE: &str = "feature selection";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionMethod {
    /// Recursive elimination, one column per round
    Rfe,
    /// ANOVA F-score
    #[default]
    KBestF,
    /// Nearest-neighbour mutual information
    KBestMutualInfo,
    /// Random-forest permutation importance
    Importance,
}

impl fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionMethod::Rfe => "rfe",
            SelectionMethod::KBestF => "kbest_f",
            SelectionMethod::KBestMutualInfo => "kbest_mi",
            SelectionMethod::Importance => "importance",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SelectionMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rfe" => Ok(SelectionMethod::Rfe),
            "kbest_f" | "f" | "anova" => Ok(SelectionMethod::KBestF),
            "kbest_mi" | "mi" => Ok(SelectionMethod::KBestMutualInfo),
            "importance" => Ok(SelectionMethod::Importance),
            _ => Err(anyhow!(
                "Invalid selection method: {}. Must be one of rfe, kbest_f, kbest_mi, importance",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScore {
    pub name: String,
    /// F-score, mutual information (nats) or normalized importance, per method
    pub score: f64,
    /// Only the F test yields a p-value
    pub p_value: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FeatureSelection {
    pub method: SelectionMethod,
    /// Scores of the selected columns, best first.
    pub scores: Vec<FeatureScore>,
    /// `dataset` reduced to the selected columns, original column order kept.
    pub dataset: Dataset,
}

/// One-way ANOVA F statistic of `values` grouped by the 0/1 `labels`.
/// Constant columns score 0.
fn anova_f(values: &[f64], labels: &[f64]) -> f64 {
    let n = values.len() as f64;
    let (mut sum0, mut n0, mut sum1, mut n1) = (0.0, 0.0, 0.0, 0.0);
    for (v, y) in values.iter().zip(labels) {
        if *y >= 0.5 {
            sum1 += v;
            n1 += 1.0;
        } else {
            sum0 += v;
            n0 += 1.0;
        }
    }
    if n0 == 0.0 || n1 == 0.0 || n <= 2.0 {
        return 0.0;
    }
    let grand = (sum0 + sum1) / n;
    let (mean0, mean1) = (sum0 / n0, sum1 / n1);
    let between = n0 * (mean0 - grand).powi(2) + n1 * (mean1 - grand).powi(2);
    let within: f64 = values
        .iter()
        .zip(labels)
        .map(|(v, y)| {
            let mean = if *y >= 0.5 { mean1 } else { mean0 };
            (v - mean).powi(2)
        })
        .sum();
    if within <= f64::EPSILON {
        return if between > 0.0 { f64::MAX } else { 0.0 };
    }
    between / (within / (n - 2.0))
}

/// Mutual information between a continuous column and the 0/1 labels, from
/// the `neighbours`-nearest-neighbour estimator for mixed variables. Points
/// whose class has a single member are ignored. Never negative.
fn mutual_information(values: &[f64], labels: &[f64], neighbours: usize) -> f64 {
    let mut groups: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
    for (v, y) in values.iter().zip(labels) {
        groups[usize::from(*y >= 0.5)].push(*v);
    }
    for group in groups.iter_mut() {
        group.sort_by(f64::total_cmp);
    }
    let mut pooled: Vec<f64> = groups
        .iter()
        .filter(|g| g.len() > 1)
        .flatten()
        .copied()
        .collect();
    pooled.sort_by(f64::total_cmp);
    let n = pooled.len();
    if n == 0 {
        return 0.0;
    }

    let (mut psi_k, mut psi_class, mut psi_m) = (0.0, 0.0, 0.0);
    for group in groups.iter().filter(|g| g.len() > 1) {
        let k = neighbours.clamp(1, group.len() - 1);
        for (i, &x) in group.iter().enumerate() {
            // the k nearest same-class values sit within k sorted positions
            let lo = i.saturating_sub(k);
            let hi = (i + k + 1).min(group.len());
            let mut distances: Vec<f64> = (lo..hi)
                .filter(|&j| j != i)
                .map(|j| (group[j] - x).abs())
                .collect();
            distances.sort_by(f64::total_cmp);
            let radius = distances[k - 1];
            let m = if radius > 0.0 {
                pooled.partition_point(|v| *v < x + radius) - pooled.partition_point(|v| *v <= x - radius)
            } else {
                pooled.partition_point(|v| *v <= x) - pooled.partition_point(|v| *v < x)
            };
            psi_k += digamma(k as f64);
            psi_class += digamma(group.len() as f64);
            psi_m += digamma(m as f64);
        }
    }
    let n = n as f64;
    (digamma(n) + (psi_k - psi_class - psi_m) / n).max(0.0)
}

fn anova_scores(dataset: &Dataset) -> Result<Vec<(usize, FeatureScore)>, PipelineError> {
    let d2 = (dataset.len() - 2) as f64;
    let distribution = FisherSnedecor::new(1.0, d2)
        .map_err(|e| PipelineError::invalid_config(STAGE, e.to_string()))?;
    Ok((0..dataset.n_features())
        .map(|j| {
            let f_score = anova_f(&dataset.column(j), &dataset.targets);
            (
                j,
                FeatureScore {
                    name: dataset.feature_names[j].clone(),
                    score: f_score,
                    p_value: Some(distribution.sf(f_score)),
                },
            )
        })
        .collect())
}

fn mutual_information_scores(dataset: &Dataset) -> Vec<(usize, FeatureScore)> {
    (0..dataset.n_features())
        .map(|j| {
            (
                j,
                FeatureScore {
                    name: dataset.feature_names[j].clone(),
                    score: mutual_information(&dataset.column(j), &dataset.targets, MI_NEIGHBOURS),
                    p_value: None,
                },
            )
        })
        .collect()
}

/// Normalized permutation importance of a classification forest fitted on `dataset`.
fn forest_importance(dataset: &Dataset, trees: usize, seed: u64) -> Result<Vec<(String, f64)>, PipelineError> {
    let family = RandomForestFamily::with_trees(Task::Classification, trees);
    let ctx = FitContext {
        seed,
        ..FitContext::default()
    };
    let selection_error = |source| PipelineError::Selection {
        model: family.name().to_string(),
        source,
    };
    let model = family.fit(dataset, &ctx).map_err(selection_error)?;
    permutation_importance(model.as_ref(), dataset, seed).map_err(selection_error)
}

fn importance_of(scores: &[(String, f64)], name: &str) -> f64 {
    scores
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, s)| *s)
        .unwrap_or(0.0)
}

fn importance_scores(dataset: &Dataset, trees: usize, seed: u64) -> Result<Vec<(usize, FeatureScore)>, PipelineError> {
    let importance = forest_importance(dataset, trees, seed)?;
    Ok(dataset
        .feature_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            (
                j,
                FeatureScore {
                    name: name.clone(),
                    score: importance_of(&importance, name),
                    p_value: None,
                },
            )
        })
        .collect())
}

/// Refits the forest and drops the least important column until `k` remain.
/// Scores are the importances of the final round.
fn recursive_elimination(dataset: &Dataset, k: usize, seed: u64) -> Result<Vec<(usize, FeatureScore)>, PipelineError> {
    let mut remaining: Vec<usize> = (0..dataset.n_features()).collect();
    loop {
        let names: Vec<String> = remaining.iter().map(|j| dataset.feature_names[*j].clone()).collect();
        let importance = forest_importance(&dataset.select_columns(&names)?, RFE_TREES, seed)?;
        if remaining.len() <= k {
            return Ok(remaining
                .iter()
                .zip(names)
                .map(|(j, name)| {
                    let score = importance_of(&importance, &name);
                    (
                        *j,
                        FeatureScore {
                            name,
                            score,
                            p_value: None,
                        },
                    )
                })
                .collect());
        }
        // ties drop the later column
        let weakest = names
            .iter()
            .enumerate()
            .min_by(|(a_pos, a), (b_pos, b)| {
                importance_of(&importance, a)
                    .total_cmp(&importance_of(&importance, b))
                    .then(b_pos.cmp(a_pos))
            })
            .map(|(pos, _)| pos);
        if let Some(pos) = weakest {
            debug!("{}: eliminating {}", STAGE, names[pos]);
            remaining.remove(pos);
        }
    }
}

fn keep_best(
    dataset: &Dataset,
    method: SelectionMethod,
    mut ranked: Vec<(usize, FeatureScore)>,
    k: usize,
) -> Result<FeatureSelection, PipelineError> {
    ranked.sort_by(|a, b| b.1.score.total_cmp(&a.1.score).then(a.0.cmp(&b.0)));
    ranked.truncate(k);

    let mut kept: Vec<usize> = ranked.iter().map(|(j, _)| *j).collect();
    kept.sort_unstable();
    let names: Vec<String> = kept.iter().map(|j| dataset.feature_names[*j].clone()).collect();
    Ok(FeatureSelection {
        method,
        scores: ranked.into_iter().map(|(_, s)| s).collect(),
        dataset: dataset.select_columns(&names)?,
    })
}

/// Keeps the `k` best columns by `method`. `k` larger than the number of
/// columns keeps them all. `seed` drives the forest-based methods.
pub fn select_features(
    dataset: &Dataset,
    method: SelectionMethod,
    k: usize,
    seed: u64,
) -> Result<FeatureSelection, PipelineError> {
    if k == 0 {
        return Err(PipelineError::invalid_config("k", "must select at least one feature"));
    }
    if dataset.len() < 3 {
        return Err(PipelineError::insufficient(STAGE, dataset.len(), 3));
    }
    let ranked = match method {
        SelectionMethod::KBestF => anova_scores(dataset)?,
        SelectionMethod::KBestMutualInfo => mutual_information_scores(dataset),
        SelectionMethod::Importance => importance_scores(dataset, N_TREES, seed)?,
        SelectionMethod::Rfe => recursive_elimination(dataset, k, seed)?,
    };
    keep_best(dataset, method, ranked, k)
}

/// ANOVA F k-best.
pub fn select_k_best(dataset: &Dataset, k: usize) -> Result<FeatureSelection, PipelineError> {
    select_features(dataset, SelectionMethod::KBestF, k, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Alternating labels; `signal` separates them, `noise` cycles independently.
    fn labelled(n: usize) -> Dataset {
        let targets: Vec<f64> = (0..n).map(|i| (i % 2) as f64).collect();
        let features: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                vec![
                    ((i / 2) % 5) as f64,
                    targets[i] * 3.0 + (i as f64).sqrt() * 0.01,
                    1.0,
                    ((i / 2 * 7) % 11) as f64,
                ]
            })
            .collect();
        Dataset::new(
            features,
            targets,
            vec![
                "noise".to_string(),
                "signal".to_string(),
                "constant".to_string(),
                "cycle".to_string(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_informative_column_ranks_first() {
        let selection = select_k_best(&labelled(40), 2).unwrap();
        assert_eq!(selection.method, SelectionMethod::KBestF);
        assert_eq!(selection.scores[0].name, "signal");
        assert!(selection.scores[0].p_value.unwrap() < 1e-6);
        assert_eq!(selection.dataset.n_features(), 2);
        assert!(!selection.dataset.feature_names.contains(&"constant".to_string()));
    }

    #[test]
    fn test_mutual_information_selection() {
        let ds = labelled(60);
        let selection = select_features(&ds, SelectionMethod::KBestMutualInfo, 1, 0).unwrap();
        assert_eq!(selection.scores[0].name, "signal");
        assert!(selection.scores[0].score > 0.5);
        assert_eq!(selection.scores[0].p_value, None);
        assert_eq!(selection.dataset.feature_names, vec!["signal".to_string()]);

        let constant = mutual_information(&ds.column(2), &ds.targets, MI_NEIGHBOURS);
        assert_eq!(constant, 0.0);
    }

    #[test]
    fn test_mutual_information_of_separated_classes_approaches_ln_two() {
        let labels: Vec<f64> = (0..100).map(|i| (i % 2) as f64).collect();
        let values: Vec<f64> = (0..100).map(|i| labels[i] * 100.0 + (i as f64).sqrt()).collect();
        let mi = mutual_information(&values, &labels, MI_NEIGHBOURS);
        assert!((mi - 2.0_f64.ln()).abs() < 0.1, "mi = {}", mi);
    }

    #[test]
    fn test_importance_selection() {
        let selection = select_features(&labelled(80), SelectionMethod::Importance, 1, 42).unwrap();
        assert_eq!(selection.method, SelectionMethod::Importance);
        assert_eq!(selection.scores[0].name, "signal");
        assert!(selection.scores[0].score > 0.0);
        assert_eq!(selection.dataset.n_features(), 1);
    }

    #[test]
    fn test_recursive_elimination_keeps_signal() {
        let ds = labelled(80);
        let selection = select_features(&ds, SelectionMethod::Rfe, 2, 42).unwrap();
        assert_eq!(selection.scores.len(), 2);
        assert!(selection.dataset.feature_names.contains(&"signal".to_string()));
        assert!(!selection.dataset.feature_names.contains(&"constant".to_string()));
        assert_eq!(selection.dataset.len(), ds.len());
    }

    #[test]
    fn test_method_names_round_trip() {
        for method in [
            SelectionMethod::Rfe,
            SelectionMethod::KBestF,
            SelectionMethod::KBestMutualInfo,
            SelectionMethod::Importance,
        ] {
            assert_eq!(SelectionMethod::from_str(&method.to_string()).unwrap(), method);
        }
        assert!(SelectionMethod::from_str("lasso").is_err());
    }

    #[test]
    fn test_zero_k_is_rejected() {
        let ds = Dataset::new(vec![vec![1.0]; 5], vec![0.0, 1.0, 0.0, 1.0, 0.0], vec!["a".to_string()]).unwrap();
        assert!(select_k_best(&ds, 0).is_err());
    }
}
