//! Metric computation shared by every model family.
//!
//! Regression: MAE, RMSE, R². Classification: ROC AUC, average precision,
//! confusion matrix and a per-class precision/recall/F1 report.
//! Cross-validation fold generators live here too.

use crate::domain::ml::{
    ClassScores, ClassificationMetrics, ClassificationReport, ConfusionMatrix,
    CrossValidationSummary, MetricValue, RegressionMetrics,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use statrs::statistics::Statistics;
use std::ops::Range;

/// Decision cutoff applied to probabilities for the report and confusion matrix
pub const DECISION_CUTOFF: f64 = 0.5;

/// Right-aligns both vectors to their common length.
fn align_tail<'a>(a: &'a [f64], b: &'a [f64]) -> (&'a [f64], &'a [f64]) {
    let n = a.len().min(b.len());
    (&a[a.len() - n..], &b[b.len() - n..])
}

/// MAE, RMSE and R² over the right-aligned overlap of `actual` and `predicted`.
///
/// R² is undefined when the actual values have zero variance; every metric is
/// undefined on empty input.
pub fn regression_metrics(actual: &[f64], predicted: &[f64]) -> RegressionMetrics {
    let (actual, predicted) = align_tail(actual, predicted);
    let n = actual.len();
    if n == 0 {
        return RegressionMetrics {
            mae: MetricValue::Undefined,
            rmse: MetricValue::Undefined,
            r2: MetricValue::Undefined,
            n: 0,
        };
    }

    let nf = n as f64;
    let abs_err: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).abs())
        .sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    let mean_y = actual.iter().sum::<f64>() / nf;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean_y).powi(2)).sum();

    let r2 = if ss_tot > 0.0 {
        MetricValue::from_f64(1.0 - ss_res / ss_tot)
    } else {
        MetricValue::Undefined
    };

    RegressionMetrics {
        mae: MetricValue::from_f64(abs_err / nf),
        rmse: MetricValue::from_f64((ss_res / nf).sqrt()),
        r2,
        n,
    }
}

fn is_positive(label: f64) -> bool {
    label >= 0.5
}

/// Area under the ROC curve via the rank-sum statistic, averaging tied ranks.
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> MetricValue {
    let (labels, scores) = align_tail(labels, scores);
    let positives = labels.iter().filter(|&&l| is_positive(l)).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return MetricValue::Undefined;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block shares the average rank
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(l, _)| is_positive(**l))
        .map(|(_, r)| r)
        .sum();
    let p = positives as f64;
    let auc = (rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64);
    MetricValue::from_f64(auc)
}

/// Average precision: sum over distinct thresholds of (ΔRecall × Precision).
pub fn average_precision(labels: &[f64], scores: &[f64]) -> MetricValue {
    let (labels, scores) = align_tail(labels, scores);
    let total_pos = labels.iter().filter(|&&l| is_positive(l)).count();
    if total_pos == 0 || total_pos == labels.len() {
        return MetricValue::Undefined;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    let mut i = 0;
    while i < order.len() {
        let threshold = scores[order[i]];
        while i < order.len() && scores[order[i]] == threshold {
            if is_positive(labels[order[i]]) {
                tp += 1;
            } else {
                fp += 1;
            }
            i += 1;
        }
        let recall = tp as f64 / total_pos as f64;
        let precision = tp as f64 / (tp + fp) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    MetricValue::from_f64(ap)
}

pub fn confusion_matrix(labels: &[f64], scores: &[f64]) -> ConfusionMatrix {
    let (labels, scores) = align_tail(labels, scores);
    let mut cm = ConfusionMatrix::default();
    for (&label, &score) in labels.iter().zip(scores) {
        match (is_positive(label), score >= DECISION_CUTOFF) {
            (false, false) => cm.true_negatives += 1,
            (false, true) => cm.false_positives += 1,
            (true, false) => cm.false_negatives += 1,
            (true, true) => cm.true_positives += 1,
        }
    }
    cm
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn class_scores(label: &str, tp: usize, fp: usize, fn_: usize) -> ClassScores {
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    ClassScores {
        label: label.to_string(),
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

/// Per-class precision/recall/F1 with macro and weighted averages.
/// Zero divisions report 0.
pub fn classification_report(labels: &[f64], scores: &[f64]) -> ClassificationReport {
    let cm = confusion_matrix(labels, scores);
    let negative = class_scores("0", cm.true_negatives, cm.false_negatives, cm.false_positives);
    let positive = class_scores("1", cm.true_positives, cm.false_positives, cm.false_negatives);
    let total = negative.support + positive.support;

    let macro_avg = ClassScores {
        label: "macro avg".to_string(),
        precision: (negative.precision + positive.precision) / 2.0,
        recall: (negative.recall + positive.recall) / 2.0,
        f1: (negative.f1 + positive.f1) / 2.0,
        support: total,
    };
    let weight = |neg: f64, pos: f64| {
        if total == 0 {
            0.0
        } else {
            (neg * negative.support as f64 + pos * positive.support as f64) / total as f64
        }
    };
    let weighted_avg = ClassScores {
        label: "weighted avg".to_string(),
        precision: weight(negative.precision, positive.precision),
        recall: weight(negative.recall, positive.recall),
        f1: weight(negative.f1, positive.f1),
        support: total,
    };
    let accuracy = if total == 0 {
        MetricValue::Undefined
    } else {
        MetricValue::Defined(ratio(cm.true_negatives + cm.true_positives, total))
    };

    ClassificationReport {
        classes: vec![negative, positive],
        accuracy,
        macro_avg,
        weighted_avg,
    }
}

pub fn classification_metrics(labels: &[f64], scores: &[f64]) -> ClassificationMetrics {
    let report = classification_report(labels, scores);
    ClassificationMetrics {
        roc_auc: roc_auc(labels, scores),
        average_precision: average_precision(labels, scores),
        accuracy: report.accuracy,
        confusion: confusion_matrix(labels, scores),
        report,
    }
}

/// Held-out indices for each of `k` stratified, shuffled folds.
///
/// Each class is shuffled with the seeded RNG and dealt round-robin, so fold
/// class ratios match the whole set as closely as possible.
pub fn stratified_folds(targets: &[f64], k: usize, seed: u64) -> Vec<Vec<usize>> {
    if k < 2 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut next_fold = 0;
    for class_positive in [false, true] {
        let mut members: Vec<usize> = targets
            .iter()
            .enumerate()
            .filter(|(_, t)| is_positive(**t) == class_positive)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        for idx in members {
            folds[next_fold].push(idx);
            next_fold = (next_fold + 1) % k;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds.retain(|f| !f.is_empty());
    folds
}

/// Expanding-window folds for time series: (train range, test range).
///
/// Test regions tile the 20%..80% span of the series; each train window ends
/// a 5% gap before its test region. Folds with fewer than 10 train rows are dropped.
pub fn time_series_folds(n: usize, k: usize) -> Vec<(Range<usize>, Range<usize>)> {
    let gap_pct = 0.05;
    let gap = (n as f64 * gap_pct).floor() as usize;
    let mut folds = Vec::with_capacity(k);
    for fold in 0..k {
        let test_start = (n as f64 * (0.2 + (fold as f64 / k as f64) * 0.6)).floor() as usize;
        let test_end =
            ((n as f64 * (0.2 + ((fold + 1) as f64 / k as f64) * 0.6)).floor() as usize).min(n);
        let train_end = test_start.saturating_sub(gap).min(n);
        if train_end < 10 || test_end <= test_start {
            continue;
        }
        folds.push((0..train_end, test_start..test_end));
    }
    folds
}

/// Mean and population standard deviation of per-fold scores.
pub fn summarize_folds(metric: &str, scores: Vec<f64>) -> CrossValidationSummary {
    let defined: Vec<f64> = scores.into_iter().filter(|s| s.is_finite()).collect();
    let (mean, std) = if defined.is_empty() {
        (MetricValue::Undefined, MetricValue::Undefined)
    } else {
        (
            MetricValue::from_f64(defined.iter().mean()),
            MetricValue::from_f64(defined.iter().population_std_dev()),
        )
    };
    CrossValidationSummary {
        metric: metric.to_string(),
        mean,
        std,
        folds: defined,
    }
}
