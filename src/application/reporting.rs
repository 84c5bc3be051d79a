use crate::application::ml::registry::{ComparisonRow, ModelRegistry};
use crate::domain::ml::{
    ApprovalCurve, ClassificationReport, EnsemblePrediction, MetricsRecord, ModelStatus, Task,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Everything one pipeline run produced, as written to `--report`
#[derive(Debug, Serialize)]
pub struct PipelineReport {
    pub timestamp: DateTime<Utc>,
    pub task: Task,
    pub rows: usize,
    pub features: Vec<String>,
    pub statuses: Vec<StatusEntry>,
    pub models: Vec<MetricsRecord>,
    pub test_metrics: Vec<TestEntry>,
    pub ensemble: Option<EnsemblePrediction>,
    pub approval_curves: Vec<ApprovalCurve>,
}

#[derive(Debug, Serialize)]
pub struct StatusEntry {
    pub model: String,
    pub status: String,
}

/// Headline metric of one model on the held-out test partition
#[derive(Debug, Serialize)]
pub struct TestEntry {
    pub model: String,
    pub metric: String,
    pub value: Option<f64>,
}

impl PipelineReport {
    pub fn new(task: Task, rows: usize, features: Vec<String>, registry: &ModelRegistry) -> Self {
        Self {
            timestamp: Utc::now(),
            task,
            rows,
            features,
            statuses: registry
                .statuses()
                .into_iter()
                .map(|(model, status)| StatusEntry {
                    model,
                    status: status.to_string(),
                })
                .collect(),
            models: registry.trained().map(|m| m.metrics.clone()).collect(),
            test_metrics: Vec::new(),
            ensemble: None,
            approval_curves: Vec::new(),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("📝 Report saved to: {}", path.display());
        Ok(())
    }
}

pub fn print_statuses(registry: &ModelRegistry) {
    for (name, status) in registry.statuses() {
        let marker = match status {
            ModelStatus::Trained => "✅",
            ModelStatus::Skipped(_) => "⏭️",
            ModelStatus::Failed(_) => "❌",
            ModelStatus::Untrained | ModelStatus::Training => "…",
        };
        println!("{} {:<22} {}", marker, name, status);
    }
}

pub fn print_comparison(task: Task, rows: &[ComparisonRow]) {
    if rows.is_empty() {
        println!("⚠️ No trained models to compare.");
        return;
    }
    let metric = match task {
        Task::Regression => "R2",
        Task::Classification => "AUC",
    };
    let cv_metric = match task {
        Task::Regression => "CV RMSE",
        Task::Classification => "CV AUC",
    };

    println!("\n{}", "=".repeat(80));
    println!("📊 MODEL COMPARISON ({})", task);
    println!("{}", "=".repeat(80));
    println!(
        "{:<22} | {:>10} | {:>10} | {:>20} | {:>8}",
        "Model",
        format!("Train {}", metric),
        format!("Val {}", metric),
        cv_metric,
        "ms"
    );
    println!("{}", "-".repeat(80));
    for row in rows {
        let cv = match (row.cv_mean.value(), row.cv_std.value()) {
            (Some(mean), Some(std)) => format!("{:.4} ± {:.4}", mean, std),
            _ => "-".to_string(),
        };
        println!(
            "{:<22} | {:>10} | {:>10} | {:>20} | {:>8}",
            row.model, row.train, row.validation, cv, row.elapsed_ms
        );
    }
    println!("{}", "=".repeat(80));
}

pub fn print_classification_report(model: &str, report: &ClassificationReport) {
    println!("\n📋 Classification report: {}", model);
    println!(
        "{:<14} {:>10} {:>10} {:>10} {:>10}",
        "", "precision", "recall", "f1-score", "support"
    );
    for scores in report
        .classes
        .iter()
        .chain([&report.macro_avg, &report.weighted_avg])
    {
        println!(
            "{:<14} {:>10.4} {:>10.4} {:>10.4} {:>10}",
            scores.label, scores.precision, scores.recall, scores.f1, scores.support
        );
    }
    println!("{:<14} {:>10}", "accuracy", report.accuracy);
}

pub fn print_approval_curve(curve: &ApprovalCurve) {
    let optimal = curve.optimal().map(|p| p.threshold);
    println!("\n{}", "=".repeat(80));
    println!("💳 APPROVAL ANALYSIS: {}", curve.model);
    println!("{}", "=".repeat(80));
    println!(
        "{:>9} | {:>9} | {:>9} | {:>8} | {:>14} | {:>9}",
        "Threshold", "Approved%", "Default%", "Count", "Net value", "ROI%"
    );
    println!("{}", "-".repeat(80));
    for point in &curve.points {
        let marker = if Some(point.threshold) == optimal { " ⭐" } else { "" };
        println!(
            "{:>9.2} | {:>9.1} | {:>9.1} | {:>8} | {:>14} | {:>9.1}{}",
            point.threshold,
            point.approval_rate * 100.0,
            point.realized_default_rate * 100.0,
            point.approved_count,
            point.expected_net_value.round_dp(2),
            point.roi,
            marker
        );
    }
    println!("{}", "=".repeat(80));
}

pub fn print_feature_importance(model: &str, scores: &[(String, f64)], top: usize) {
    println!("\n🌲 Top features: {}", model);
    for (name, score) in scores.iter().take(top) {
        println!("  {:<32} {:>7.4}", name, score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_without_models() {
        let registry = ModelRegistry::new(Task::Classification);
        let report = PipelineReport::new(Task::Classification, 0, Vec::new(), &registry);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["task"], "Classification");
        assert!(json["ensemble"].is_null());
    }
}
