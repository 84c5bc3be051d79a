use serde::{Deserialize, Serialize};
use std::fmt;

/// A metric that may be mathematically undefined (e.g. R² on a constant target).
///
/// Undefined is carried to display as "undefined" and serialized as `null`;
/// it is never coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum MetricValue {
    Defined(f64),
    Undefined,
}

impl MetricValue {
    /// Non-finite inputs map to `Undefined`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            MetricValue::Defined(value)
        } else {
            MetricValue::Undefined
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MetricValue::Defined(v) => Some(*v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, MetricValue::Defined(_))
    }
}

impl From<Option<f64>> for MetricValue {
    fn from(value: Option<f64>) -> Self {
        value.map(MetricValue::from_f64).unwrap_or(MetricValue::Undefined)
    }
}

impl From<MetricValue> for Option<f64> {
    fn from(value: MetricValue) -> Self {
        value.value()
    }
}

/// Honours width and alignment only; precision has already been applied to `text`.
fn pad_cell(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let width = f.width().unwrap_or(0);
    match f.align() {
        Some(fmt::Alignment::Left) => write!(f, "{:<width$}", text),
        Some(fmt::Alignment::Center) => write!(f, "{:^width$}", text),
        _ => write!(f, "{:>width$}", text),
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Defined(v) => {
                let precision = f.precision().unwrap_or(4);
                pad_cell(f, &format!("{:.*}", precision, v))
            }
            MetricValue::Undefined => pad_cell(f, "undefined"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: MetricValue,
    pub rmse: MetricValue,
    pub r2: MetricValue,
    pub n: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class precision/recall/F1 plus macro and support-weighted averages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassScores>,
    pub accuracy: MetricValue,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub roc_auc: MetricValue,
    pub average_precision: MetricValue,
    pub accuracy: MetricValue,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorMetrics {
    Regression(RegressionMetrics),
    Classification(ClassificationMetrics),
}

impl ErrorMetrics {
    /// Score used for ranking and ensemble weighting: R² or ROC AUC.
    pub fn headline(&self) -> MetricValue {
        match self {
            ErrorMetrics::Regression(m) => m.r2,
            ErrorMetrics::Classification(m) => m.roc_auc,
        }
    }

    pub fn headline_name(&self) -> &'static str {
        match self {
            ErrorMetrics::Regression(_) => "R2",
            ErrorMetrics::Classification(_) => "AUC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationSummary {
    pub metric: String,
    pub mean: MetricValue,
    pub std: MetricValue,
    pub folds: Vec<f64>,
}

/// Fixed-shape result of one model's training run. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub model: String,
    pub train: ErrorMetrics,
    pub validation: ErrorMetrics,
    pub cross_validation: Option<CrossValidationSummary>,
    pub training_rows: usize,
    pub elapsed_ms: u128,
}

impl MetricsRecord {
    pub fn classification_report(&self) -> Option<&ClassificationReport> {
        match &self.validation {
            ErrorMetrics::Classification(m) => Some(&m.report),
            ErrorMetrics::Regression(_) => None,
        }
    }

    pub fn cross_validation_mean(&self) -> MetricValue {
        self.cross_validation
            .as_ref()
            .map(|cv| cv.mean)
            .unwrap_or(MetricValue::Undefined)
    }

    pub fn cross_validation_std(&self) -> MetricValue {
        self.cross_validation
            .as_ref()
            .map(|cv| cv.std)
            .unwrap_or(MetricValue::Undefined)
    }
}
