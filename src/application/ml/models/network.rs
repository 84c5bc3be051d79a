//! Feed-forward network (ReLU hidden layers, Adam) on ndarray.
//!
//! Regression targets are standardized during training and mapped back on
//! prediction. Classification uses a sigmoid output with cross-entropy loss.

use super::check_width;
use crate::domain::errors::ModelError;
use crate::domain::ml::{Dataset, FitContext, FittedModel, ModelFamily, Task};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const HIDDEN_LAYERS: [usize; 2] = [100, 50];
pub const LEARNING_RATE: f64 = 0.001;
pub const MAX_EPOCHS: usize = 300;
pub const BATCH_SIZE: usize = 200;
const L2_PENALTY: f64 = 1e-4;
const TOLERANCE: f64 = 1e-4;
const PATIENCE: usize = 10;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputActivation {
    Linear,
    Sigmoid,
}

impl OutputActivation {
    fn apply(&self, z: f64) -> f64 {
        match self {
            OutputActivation::Linear => z,
            OutputActivation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }

    fn loss(&self, output: f64, target: f64) -> f64 {
        match self {
            OutputActivation::Linear => 0.5 * (output - target).powi(2),
            OutputActivation::Sigmoid => {
                let p = output.clamp(1e-12, 1.0 - 1e-12);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlpSettings {
    pub hidden: Vec<usize>,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub output: OutputActivation,
    pub seed: u64,
}

impl MlpSettings {
    pub fn standard(output: OutputActivation, seed: u64) -> Self {
        Self {
            hidden: HIDDEN_LAYERS.to_vec(),
            learning_rate: LEARNING_RATE,
            max_epochs: MAX_EPOCHS,
            batch_size: BATCH_SIZE,
            output,
            seed,
        }
    }
}

#[derive(Debug, Clone)]
struct DenseLayer {
    weights: Array2<f64>,
    biases: Array1<f64>,
}

impl DenseLayer {
    /// Xavier uniform initialization
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        let weights =
            Array2::from_shape_fn((inputs, outputs), |_| rng.random_range(-limit..limit));
        Self {
            weights,
            biases: Array1::zeros(outputs),
        }
    }
}

struct AdamState {
    m_w: Array2<f64>,
    v_w: Array2<f64>,
    m_b: Array1<f64>,
    v_b: Array1<f64>,
}

impl AdamState {
    fn for_layer(layer: &DenseLayer) -> Self {
        Self {
            m_w: Array2::zeros(layer.weights.raw_dim()),
            v_w: Array2::zeros(layer.weights.raw_dim()),
            m_b: Array1::zeros(layer.biases.raw_dim()),
            v_b: Array1::zeros(layer.biases.raw_dim()),
        }
    }

    fn step(
        &mut self,
        layer: &mut DenseLayer,
        grad_w: &Array2<f64>,
        grad_b: &Array1<f64>,
        lr: f64,
        t: i32,
    ) {
        let correction1 = 1.0 - BETA1.powi(t);
        let correction2 = 1.0 - BETA2.powi(t);

        self.m_w = &self.m_w * BETA1 + grad_w * (1.0 - BETA1);
        self.v_w = &self.v_w * BETA2 + &grad_w.mapv(|g| g * g) * (1.0 - BETA2);
        self.m_b = &self.m_b * BETA1 + grad_b * (1.0 - BETA1);
        self.v_b = &self.v_b * BETA2 + &grad_b.mapv(|g| g * g) * (1.0 - BETA2);

        ndarray::Zip::from(&mut layer.weights)
            .and(&self.m_w)
            .and(&self.v_w)
            .for_each(|w, m, v| {
                *w -= lr * (m / correction1) / ((v / correction2).sqrt() + EPSILON);
            });
        ndarray::Zip::from(&mut layer.biases)
            .and(&self.m_b)
            .and(&self.v_b)
            .for_each(|b, m, v| {
                *b -= lr * (m / correction1) / ((v / correction2).sqrt() + EPSILON);
            });
    }
}

/// Multi-layer perceptron with a single output unit
#[derive(Debug, Clone)]
pub struct Mlp {
    layers: Vec<DenseLayer>,
    output: OutputActivation,
}

pub fn to_array(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>, String> {
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|e| e.to_string())
}

impl Mlp {
    pub fn train(x: &Array2<f64>, y: &Array1<f64>, settings: &MlpSettings) -> Result<Self, String> {
        let n = x.nrows();
        if n == 0 {
            return Err("empty training set".to_string());
        }
        if y.len() != n {
            return Err(format!("{} rows but {} targets", n, y.len()));
        }

        let mut rng = StdRng::seed_from_u64(settings.seed);
        let mut sizes = vec![x.ncols()];
        sizes.extend_from_slice(&settings.hidden);
        sizes.push(1);
        let mut layers: Vec<DenseLayer> = sizes
            .windows(2)
            .map(|w| DenseLayer::new(w[0], w[1], &mut rng))
            .collect();
        let mut adam: Vec<AdamState> = layers.iter().map(AdamState::for_layer).collect();

        let mut order: Vec<usize> = (0..n).collect();
        let batch_size = settings.batch_size.clamp(1, n);
        let mut step = 0i32;
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0;

        for _epoch in 0..settings.max_epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;

            for batch in order.chunks(batch_size) {
                step += 1;
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch).insert_axis(Axis(1));
                let batch_len = batch.len() as f64;

                let mut activations = vec![xb];
                let mut pre_activations = Vec::with_capacity(layers.len());
                for (l, layer) in layers.iter().enumerate() {
                    let z = activations[l].dot(&layer.weights) + &layer.biases;
                    let a = if l + 1 == layers.len() {
                        z.mapv(|v| settings.output.apply(v))
                    } else {
                        z.mapv(|v| v.max(0.0))
                    };
                    pre_activations.push(z);
                    activations.push(a);
                }

                let output = &activations[layers.len()];
                epoch_loss += output
                    .iter()
                    .zip(yb.iter())
                    .map(|(o, t)| settings.output.loss(*o, *t))
                    .sum::<f64>();

                // Linear+MSE and sigmoid+cross-entropy share this output gradient
                let mut delta = (output - &yb) / batch_len;
                for l in (0..layers.len()).rev() {
                    let grad_w = activations[l].t().dot(&delta)
                        + &layers[l].weights * (L2_PENALTY / batch_len);
                    let grad_b = delta.sum_axis(Axis(0));
                    if l > 0 {
                        let back = delta.dot(&layers[l].weights.t());
                        delta = back * pre_activations[l - 1].mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
                    }
                    adam[l].step(&mut layers[l], &grad_w, &grad_b, settings.learning_rate, step);
                }
            }

            let mean_loss = epoch_loss / n as f64;
            if !mean_loss.is_finite() {
                return Err("training diverged (non-finite loss)".to_string());
            }
            if mean_loss < best_loss - TOLERANCE {
                best_loss = mean_loss;
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if stale_epochs >= PATIENCE {
                    break;
                }
            }
        }

        Ok(Self {
            layers,
            output: settings.output,
        })
    }

    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut current = x.clone();
        for (l, layer) in self.layers.iter().enumerate() {
            let z = current.dot(&layer.weights) + &layer.biases;
            current = if l + 1 == self.layers.len() {
                z.mapv(|v| self.output.apply(v))
            } else {
                z.mapv(|v| v.max(0.0))
            };
        }
        current.column(0).to_owned()
    }
}

/// Standardization of a regression target
#[derive(Debug, Clone, Copy)]
pub struct TargetScale {
    pub mean: f64,
    pub std: f64,
}

impl TargetScale {
    pub fn fit(values: &[f64]) -> Self {
        let n = values.len().max(1) as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        Self {
            mean,
            std: if std > f64::EPSILON { std } else { 1.0 },
        }
    }

    pub fn forward(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }

    pub fn inverse(&self, v: f64) -> f64 {
        v * self.std + self.mean
    }
}

/// MLP (100, 50) on standardized features.
pub struct NeuralNetworkFamily {
    task: Task,
}

impl NeuralNetworkFamily {
    pub fn new(task: Task) -> Self {
        Self { task }
    }
}

struct NeuralNetworkFit {
    network: Mlp,
    target_scale: Option<TargetScale>,
    width: usize,
}

impl ModelFamily for NeuralNetworkFamily {
    fn name(&self) -> &'static str {
        "Neural Network"
    }

    fn task(&self) -> Task {
        self.task
    }

    fn needs_scaling(&self) -> bool {
        true
    }

    fn needs_balanced_classes(&self) -> bool {
        self.task == Task::Classification
    }

    fn fit(&self, train: &Dataset, ctx: &FitContext) -> Result<Box<dyn FittedModel>, ModelError> {
        let width = train.n_features();
        let x = to_array(&train.features, width).map_err(|e| ModelError::fit(self.name(), e))?;
        let (y, target_scale, output) = match self.task {
            Task::Regression => {
                let scale = TargetScale::fit(&train.targets);
                let y: Array1<f64> = train.targets.iter().map(|&t| scale.forward(t)).collect();
                (y, Some(scale), OutputActivation::Linear)
            }
            Task::Classification => (
                Array1::from_vec(train.targets.clone()),
                None,
                OutputActivation::Sigmoid,
            ),
        };
        let settings = MlpSettings::standard(output, ctx.seed);
        let network = Mlp::train(&x, &y, &settings).map_err(|e| ModelError::fit(self.name(), e))?;
        Ok(Box::new(NeuralNetworkFit {
            network,
            target_scale,
            width,
        }))
    }
}

impl FittedModel for NeuralNetworkFit {
    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        check_width("Neural Network", self.width, rows)?;
        let x = to_array(rows, self.width).map_err(|e| ModelError::predict("Neural Network", e))?;
        let raw = self.network.predict(&x);
        Ok(match self.target_scale {
            Some(scale) => raw.iter().map(|&v| scale.inverse(v)).collect(),
            None => raw.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_learns_linear_relation() {
        let features: Vec<Vec<f64>> = (0..400).map(|i| vec![(i as f64 - 200.0) / 115.0]).collect();
        let targets: Vec<f64> = features.iter().map(|r| 4.0 * r[0] + 10.0).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = NeuralNetworkFamily::new(Task::Regression)
            .fit(&ds, &FitContext::default())
            .unwrap();
        let pred = model.predict(&[vec![-1.0], vec![1.0]]).unwrap();
        assert!(pred[0] < pred[1]);
        assert!((pred[1] - 14.0).abs() < 3.0);
    }

    #[test]
    fn test_classifier_outputs_probabilities() {
        let features: Vec<Vec<f64>> = (0..60).map(|i| vec![(i as f64 - 30.0) / 17.0]).collect();
        let targets: Vec<f64> = (0..60).map(|i| if i >= 30 { 1.0 } else { 0.0 }).collect();
        let ds = Dataset::new(features, targets, vec!["x".to_string()]).unwrap();
        let model = NeuralNetworkFamily::new(Task::Classification)
            .fit(&ds, &FitContext::default())
            .unwrap();
        let probs = model.predict(&[vec![-1.5], vec![1.5]]).unwrap();
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(probs[0] < probs[1]);
    }

    #[test]
    fn test_target_scale_round_trip() {
        let scale = TargetScale::fit(&[1.0, 3.0]);
        assert!((scale.inverse(scale.forward(7.0)) - 7.0).abs() < 1e-12);
        assert_eq!(TargetScale::fit(&[5.0, 5.0]).std, 1.0);
    }
}
