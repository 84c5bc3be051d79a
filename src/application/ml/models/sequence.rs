use super::check_width;
use super::network::{Mlp, MlpSettings, OutputActivation, TargetScale, to_array};
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use ndarray::Array1;

/// Windowed network: each prediction sees the last `sequence_length` rows,
/// flattened into one input vector. Needs that many consecutive rows before
/// it can predict, so it returns `n - sequence_length + 1` values for `n` rows.
pub struct SequenceNetworkFamily;

struct SequenceNetworkFit {
    network: Mlp,
    target_scale: TargetScale,
    sequence_length: usize,
    width: usize,
}

/// Flattened windows ending at each row from `sequence_length - 1` onwards.
fn windows(rows: &[Vec<f64>], sequence_length: usize) -> Vec<Vec<f64>> {
    if rows.len() < sequence_length {
        return Vec::new();
    }
    (sequence_length - 1..rows.len())
        .map(|end| {
            rows[end + 1 - sequence_length..=end]
                .iter()
                .flatten()
                .copied()
                .collect()
        })
        .collect()
}

impl ModelFamily for SequenceNetworkFamily {
    fn name(&self) -> &'static str {
        "Sequence Network"
    }

    fn task(&self) -> Task {
        Task::Regression
    }

    fn needs_scaling(&self) -> bool {
        true
    }

    fn context_rows(&self, ctx: &FitContext) -> usize {
        ctx.sequence_length.saturating_sub(1)
    }

    fn skip_reason(&self, train: &Dataset, validation: &Dataset, ctx: &FitContext) -> Option<String> {
        let needed = ctx.sequence_length;
        if train.len() <= needed {
            Some(format!(
                "needs more than {} consecutive training rows, got {}",
                needed,
                train.len()
            ))
        } else if !validation.is_empty() && validation.len() < needed {
            Some(format!(
                "needs at least {} consecutive validation rows, got {}",
                needed,
                validation.len()
            ))
        } else {
            None
        }
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        let sequence_length = ctx.sequence_length.max(1);
        let width = train.n_features();
        let inputs = windows(&train.features, sequence_length);
        if inputs.is_empty() {
            return Err(ModelError::fit(
                self.name(),
                format!("fewer than {} rows", sequence_length),
            ));
        }
        let targets = &train.targets[sequence_length - 1..];
        let target_scale = TargetScale::fit(targets);
        let y: Array1<f64> = targets.iter().map(|&t| target_scale.forward(t)).collect();
        let x = to_array(&inputs, width * sequence_length)
            .map_err(|e| ModelError::fit(self.name(), e))?;

        let settings = MlpSettings::standard(OutputActivation::Linear, ctx.seed);
        let network = Mlp::train(&x, &y, &settings).map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(SequenceNetworkFit {
            network,
            target_scale,
            sequence_length,
            width,
        }))
    }
}

impl FittedModel for SequenceNetworkFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        check_width("Sequence Network", self.width, rows)?;
        let inputs = windows(rows, self.sequence_length);
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let x = to_array(&inputs, self.width * self.sequence_length)
            .map_err(|e| ModelError::predict("Sequence Network", e))?;
        Ok(self
            .network
            .predict(&x)
            .iter()
            .map(|&v| self.target_scale.inverse(v))
            .collect())
    }
}
