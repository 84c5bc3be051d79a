//! Loan-application features: label-encoded categoricals, median imputation
//! and derived payment and risk aggregates.
//!
//! Encoders, medians and the column layout are fitted once by
//! [`TabularFeatureBuilder::fit_transform`] and reused by every transform.

use crate::domain::errors::PipelineError;
use crate::domain::ml::Dataset;
use crate::domain::table::RawTable;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

const STAGE: &str = "tabular features";
pub const MISSING_CATEGORY: &str = "Unknown";
pub const AGE_BINS: [f64; 6] = [0.0, 25.0, 35.0, 45.0, 55.0, 100.0];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%d.%m.%Y", "%m/%d/%Y"];

/// Which input columns play which role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularSchema {
    pub categorical: Vec<String>,
    /// Numeric columns whose missing values take the fitted median.
    pub imputed: Vec<String>,
    /// Numeric columns used as-is; missing values become 0.
    pub passthrough: Vec<String>,
    /// Summed into `total_payments` and counted into `payment_diversity`.
    pub payment_columns: Vec<String>,
    /// Summed into `risk_score`.
    pub risk_columns: Vec<String>,
    /// Binned into `age_group`.
    pub age_column: Option<String>,
    /// (later, earlier) dates whose difference in days is `loan_duration_days`.
    pub duration_dates: Option<(String, String)>,
    pub target: String,
}

impl TabularSchema {
    pub fn loan_default() -> Self {
        let payment_columns: Vec<String> = (0..6).map(|i| format!("payment_type_{}", i)).collect();
        let mut passthrough = vec!["TraderKey".to_string()];
        passthrough.extend(payment_columns.iter().cloned());
        Self {
            categorical: vec!["federal_district_nm".to_string(), "gender".to_string()],
            imputed: [
                "dpd_5_cnt",
                "dpd_15_cnt",
                "dpd_30_cnt",
                "close_loans_cnt",
                "past_billings_cnt",
                "score_1",
                "score_2",
                "age",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            passthrough,
            payment_columns,
            risk_columns: vec![
                "dpd_5_cnt".to_string(),
                "dpd_15_cnt".to_string(),
                "dpd_30_cnt".to_string(),
            ],
            age_column: Some("age".to_string()),
            duration_dates: Some(("rep_loan_date".to_string(), "first_loan".to_string())),
            target: "bad_flag".to_string(),
        }
    }
}

/// Display bucket for a default probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// State fitted on the training table
#[derive(Debug, Clone)]
struct Fitted {
    /// Sorted categories per categorical column; the code is the index.
    encoders: BTreeMap<String, Vec<String>>,
    medians: BTreeMap<String, f64>,
    duration_median: Option<f64>,
    layout: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TabularFeatureBuilder {
    schema: TabularSchema,
    min_rows: usize,
    fitted: Option<Fitted>,
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let present: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if present.is_empty() {
        None
    } else {
        Some(Data::new(present).median())
    }
}

/// Bin index of `age` over right-inclusive [`AGE_BINS`]; 0 outside the bins.
fn age_group(age: f64) -> f64 {
    AGE_BINS
        .windows(2)
        .position(|w| age > w[0] && age <= w[1])
        .map(|i| i as f64)
        .unwrap_or(0.0)
}

impl TabularFeatureBuilder {
    pub fn new(schema: TabularSchema, min_rows: usize) -> Self {
        Self {
            schema,
            min_rows,
            fitted: None,
        }
    }

    pub fn schema(&self) -> &TabularSchema {
        &self.schema
    }

    pub fn layout(&self) -> Option<&[String]> {
        self.fitted.as_ref().map(|f| f.layout.as_slice())
    }

    pub fn risk_level(probability: f64) -> RiskLevel {
        if probability > 0.7 {
            RiskLevel::High
        } else if probability > 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    fn durations(&self, table: &RawTable) -> Result<Option<Vec<Option<f64>>>, PipelineError> {
        let Some((later, earlier)) = &self.schema.duration_dates else {
            return Ok(None);
        };
        if !table.has_column(later) || !table.has_column(earlier) {
            return Ok(None);
        }
        let later = table.text_column(later)?;
        let earlier = table.text_column(earlier)?;
        Ok(Some(
            later
                .iter()
                .zip(&earlier)
                .map(|(l, e)| match (l.and_then(parse_date), e.and_then(parse_date)) {
                    (Some(l), Some(e)) => Some((l - e).num_days() as f64),
                    _ => None,
                })
                .collect(),
        ))
    }

    /// Labels of `table`. Missing labels are `None`; anything other than 0/1 is an error.
    fn labels(&self, table: &RawTable) -> Result<Vec<Option<f64>>, PipelineError> {
        let labels = table.numeric_column(&self.schema.target)?;
        if let Some(bad) = labels.iter().flatten().find(|v| **v != 0.0 && **v != 1.0) {
            return Err(PipelineError::InvalidData {
                column: self.schema.target.clone(),
                reason: format!("target must be 0 or 1, found {}", bad),
            });
        }
        Ok(labels)
    }

    fn fit(&self, table: &RawTable) -> Result<Fitted, PipelineError> {
        let mut encoders = BTreeMap::new();
        for column in self.schema.categorical.iter().filter(|c| table.has_column(c)) {
            let mut categories: Vec<String> = table
                .text_column(column)?
                .into_iter()
                .map(|v| v.unwrap_or(MISSING_CATEGORY).to_string())
                .collect();
            categories.sort();
            categories.dedup();
            encoders.insert(column.clone(), categories);
        }

        let mut medians = BTreeMap::new();
        for column in self.schema.imputed.iter().filter(|c| table.has_column(c)) {
            let values = table.numeric_column(column)?;
            // An all-missing column imputes to 0.
            medians.insert(column.clone(), median(values.into_iter().flatten()).unwrap_or(0.0));
        }

        let durations = self.durations(table)?;
        let duration_median = durations
            .as_ref()
            .map(|d| median(d.iter().flatten().copied()).unwrap_or(0.0));

        let mut layout: Vec<String> = Vec::new();
        for column in &self.schema.imputed {
            if medians.contains_key(column) {
                layout.push(column.clone());
            }
        }
        for column in &self.schema.passthrough {
            if table.has_column(column) && !layout.contains(column) {
                layout.push(column.clone());
            }
        }
        if self.schema.payment_columns.iter().any(|c| table.has_column(c)) {
            layout.push("total_payments".to_string());
            layout.push("payment_diversity".to_string());
        }
        if self.schema.risk_columns.iter().any(|c| table.has_column(c)) {
            layout.push("risk_score".to_string());
        }
        if let Some(age) = &self.schema.age_column
            && table.has_column(age)
        {
            layout.push("age_group".to_string());
        }
        for column in encoders.keys() {
            layout.push(format!("{}_encoded", column));
        }
        if duration_median.is_some() {
            layout.push("loan_duration_days".to_string());
        }

        Ok(Fitted {
            encoders,
            medians,
            duration_median,
            layout,
        })
    }

    fn feature_rows(&self, fitted: &Fitted, table: &RawTable) -> Result<Vec<Vec<f64>>, PipelineError> {
        let n = table.len();
        let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for (column, median) in &fitted.medians {
            let values = table.numeric_column(column)?;
            columns.insert(
                column.clone(),
                values.into_iter().map(|v| v.unwrap_or(*median)).collect(),
            );
        }
        for column in &self.schema.passthrough {
            if fitted.layout.contains(column) && !columns.contains_key(column) {
                let values = table.numeric_column(column)?;
                columns.insert(column.clone(), values.into_iter().map(|v| v.unwrap_or(0.0)).collect());
            }
        }

        let numeric_or_zero = |column: &String| -> Result<Vec<f64>, PipelineError> {
            if let Some(values) = columns.get(column) {
                return Ok(values.clone());
            }
            if table.has_column(column) {
                Ok(table
                    .numeric_column(column)?
                    .into_iter()
                    .map(|v| v.unwrap_or(0.0))
                    .collect())
            } else {
                Ok(vec![0.0; n])
            }
        };

        let mut derived: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        if fitted.layout.iter().any(|c| c == "total_payments") {
            let payments = self
                .schema
                .payment_columns
                .iter()
                .map(numeric_or_zero)
                .collect::<Result<Vec<_>, _>>()?;
            derived.insert(
                "total_payments".to_string(),
                (0..n).map(|i| payments.iter().map(|p| p[i]).sum()).collect(),
            );
            derived.insert(
                "payment_diversity".to_string(),
                (0..n)
                    .map(|i| payments.iter().filter(|p| p[i] > 0.0).count() as f64)
                    .collect(),
            );
        }
        if fitted.layout.iter().any(|c| c == "risk_score") {
            let risk = self
                .schema
                .risk_columns
                .iter()
                .map(numeric_or_zero)
                .collect::<Result<Vec<_>, _>>()?;
            derived.insert(
                "risk_score".to_string(),
                (0..n).map(|i| risk.iter().map(|r| r[i]).sum()).collect(),
            );
        }
        if let Some(age) = &self.schema.age_column
            && fitted.layout.iter().any(|c| c == "age_group")
        {
            let ages = numeric_or_zero(age)?;
            derived.insert("age_group".to_string(), ages.into_iter().map(age_group).collect());
        }
        for (column, categories) in &fitted.encoders {
            let values = table.text_column(column)?;
            let codes = values
                .into_iter()
                .map(|v| {
                    let v = v.unwrap_or(MISSING_CATEGORY);
                    categories
                        .iter()
                        .position(|c| c == v)
                        .map(|code| code as f64)
                        .ok_or_else(|| PipelineError::UnseenCategory {
                            column: column.clone(),
                            value: v.to_string(),
                        })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            derived.insert(format!("{}_encoded", column), codes);
        }
        if let Some(duration_median) = fitted.duration_median {
            let durations = self.durations(table)?.ok_or_else(|| PipelineError::MissingColumn {
                column: self
                    .schema
                    .duration_dates
                    .as_ref()
                    .map(|(later, _)| later.clone())
                    .unwrap_or_default(),
            })?;
            derived.insert(
                "loan_duration_days".to_string(),
                durations.into_iter().map(|d| d.unwrap_or(duration_median)).collect(),
            );
        }
        columns.extend(derived);

        let ordered = fitted
            .layout
            .iter()
            .map(|name| {
                columns.get(name).ok_or_else(|| PipelineError::MissingColumn {
                    column: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..n).map(|i| ordered.iter().map(|c| c[i]).collect()).collect())
    }

    fn labelled(&self, fitted: &Fitted, table: &RawTable) -> Result<Dataset, PipelineError> {
        let labels = self.labels(table)?;
        let rows = self.feature_rows(fitted, table)?;
        let mut features = Vec::with_capacity(rows.len());
        let mut targets = Vec::with_capacity(rows.len());
        let mut row_ids = Vec::with_capacity(rows.len());
        for (i, (row, label)) in rows.into_iter().zip(labels).enumerate() {
            if let Some(label) = label {
                features.push(row);
                targets.push(label);
                row_ids.push(i);
            }
        }
        let dropped = table.len() - features.len();
        if dropped > 0 {
            debug!("{}: dropped {} rows without a {} label", STAGE, dropped, self.schema.target);
        }
        Dataset::with_row_ids(features, targets, fitted.layout.clone(), row_ids)
    }

    /// Fits encoders, medians and the layout on `table`, then transforms it.
    /// Rows without a label are dropped.
    pub fn fit_transform(&mut self, table: &RawTable) -> Result<Dataset, PipelineError> {
        self.labels(table)?;
        let fitted = self.fit(table)?;
        let dataset = self.labelled(&fitted, table)?;
        if dataset.len() < self.min_rows {
            return Err(PipelineError::insufficient(STAGE, dataset.len(), self.min_rows));
        }
        info!(
            "{}: {} rows, {} features, default rate {:.1}%",
            STAGE,
            dataset.len(),
            dataset.n_features(),
            dataset.positive_rate() * 100.0
        );
        self.fitted = Some(fitted);
        Ok(dataset)
    }

    /// Labelled transform with the fitted state (e.g. a held-out file).
    pub fn transform(&self, table: &RawTable) -> Result<Dataset, PipelineError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| PipelineError::NotTrained {
            name: STAGE.to_string(),
        })?;
        self.labelled(fitted, table)
    }

    /// Feature rows for unlabelled applications, one per table row.
    pub fn transform_features(&self, table: &RawTable) -> Result<Vec<Vec<f64>>, PipelineError> {
        let fitted = self.fitted.as_ref().ok_or_else(|| PipelineError::NotTrained {
            name: STAGE.to_string(),
        })?;
        self.feature_rows(fitted, table)
    }
}
