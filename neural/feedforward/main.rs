//! Multi-layer feedforward predictor trained one small step at a time.

/// Batch normalization layer.
pub mod batch_norm;

use ndarray::{Array1, Array2, Axis};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::NeuralError,
    optimizer::{AdamOptimizer, AdamSnapshot, LrSchedule, SgdOptimizer},
    tensor,
};

use batch_norm::{BatchNorm, BatchNormSnapshot, BnCache};

/// Activation applied to the output layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputActivation {
    /// Sigmoid squashing into (0, 1); used by intensity/probability heads.
    Sigmoid,
    /// Identity; used by value estimators whose outputs are unbounded.
    Linear,
}

/// Architecture and training hyperparameters of a feedforward predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardConfig {
    /// Input dimension.
    pub input: usize,
    /// Hidden layer widths, in order.
    pub hidden: Vec<usize>,
    /// Output dimension.
    pub output: usize,
    /// Base learning rate.
    pub learning_rate: f32,
    /// Dropout probability for hidden activations (0 disables).
    #[serde(default)]
    pub dropout: f32,
    /// Whether hidden pre-activations are batch normalized.
    #[serde(default)]
    pub batch_norm: bool,
    /// Whether equal-width consecutive hidden layers get a skip connection.
    #[serde(default)]
    pub residual: bool,
    /// Maximum global gradient norm before the optimizer step.
    pub clip_norm: f32,
    /// Output activation.
    pub output_activation: OutputActivation,
    /// Optional learning-rate decay schedule.
    #[serde(default)]
    pub schedule: Option<LrSchedule>,
}

impl FeedForwardConfig {
    /// Plain sigmoid-output network with the online-learning defaults.
    #[must_use]
    pub fn sigmoid(input: usize, hidden: Vec<usize>, output: usize, learning_rate: f32) -> Self {
        Self {
            input,
            hidden,
            output,
            learning_rate,
            dropout: 0.0,
            batch_norm: false,
            residual: false,
            clip_norm: 5.0,
            output_activation: OutputActivation::Sigmoid,
            schedule: None,
        }
    }

    /// Linear-output network (value estimation).
    #[must_use]
    pub fn linear(input: usize, hidden: Vec<usize>, output: usize, learning_rate: f32) -> Self {
        Self {
            output_activation: OutputActivation::Linear,
            ..Self::sigmoid(input, hidden, output, learning_rate)
        }
    }

    /// Full layer width list, input through output.
    #[must_use]
    pub fn widths(&self) -> Vec<usize> {
        let mut widths = Vec::with_capacity(self.hidden.len() + 2);
        widths.push(self.input);
        widths.extend_from_slice(&self.hidden);
        widths.push(self.output);
        widths
    }

    fn validate(&self) -> Result<(), NeuralError> {
        if self.widths().iter().any(|&w| w == 0) {
            return Err(NeuralError::InvalidArchitecture(
                "layer widths must be non-zero".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NeuralError::InvalidArchitecture(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(NeuralError::InvalidArchitecture(
                "learning rate must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct DenseLayer {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

struct ForwardPass {
    /// Final activation of each layer, index 0 holding the input batch.
    activations: Vec<Array2<f32>>,
    /// Post-batch-norm pre-activation per layer (ReLU/sigmoid input).
    relu_inputs: Vec<Array2<f32>>,
    dropout_masks: Vec<Option<Array2<f32>>>,
    bn_caches: Vec<Option<BnCache>>,
    residual_applied: Vec<bool>,
}

/// Feedforward network with optional dropout, batch normalization, and
/// residual links, updated through a gradient-clipped Adam step.
#[derive(Debug)]
pub struct FeedForwardNetwork {
    config: FeedForwardConfig,
    layers: Vec<DenseLayer>,
    batch_norms: Vec<BatchNorm>,
    optimizer: AdamOptimizer,
    bn_optimizer: SgdOptimizer,
    schedule: Option<LrSchedule>,
    rng: SmallRng,
}

impl FeedForwardNetwork {
    /// Builds a freshly initialized network. Invalid dimensions are fatal.
    pub fn new(config: FeedForwardConfig) -> Result<Self, NeuralError> {
        config.validate()?;
        let mut rng = SmallRng::from_entropy();
        let widths = config.widths();
        let layers = widths
            .windows(2)
            .map(|pair| DenseLayer {
                weight: tensor::he_init(&mut rng, pair[0], pair[1]),
                bias: Array1::zeros(pair[1]),
            })
            .collect();
        let batch_norms = if config.batch_norm {
            config.hidden.iter().map(|&w| BatchNorm::new(w)).collect()
        } else {
            Vec::new()
        };
        let schedule = config.schedule.clone();
        Ok(Self {
            optimizer: AdamOptimizer::new(config.learning_rate),
            bn_optimizer: SgdOptimizer::new(config.learning_rate),
            layers,
            batch_norms,
            schedule,
            rng,
            config,
        })
    }

    /// The configuration this network was built with.
    #[must_use]
    pub const fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    fn check_input(&self, x: &Array2<f32>, context: &'static str) -> Result<(), NeuralError> {
        if x.ncols() == self.config.input {
            Ok(())
        } else {
            Err(NeuralError::shape(context, self.config.input, x.ncols()))
        }
    }

    /// Deterministic inference pass over a batch (row per sample).
    pub fn forward(&self, x: &Array2<f32>) -> Result<Array2<f32>, NeuralError> {
        self.check_input(x, "feedforward.forward")?;
        let last = self.layers.len() - 1;
        let mut activation = x.clone();
        for (index, layer) in self.layers.iter().enumerate() {
            let mut z = activation.dot(&layer.weight) + &layer.bias;
            if index < last {
                if self.config.batch_norm {
                    z = self.batch_norms[index].forward_infer(&z);
                }
                let mut a = z.mapv(tensor::relu);
                if self.config.residual && index > 0 && a.dim() == activation.dim() {
                    a += &activation;
                }
                activation = a;
            } else {
                activation = match self.config.output_activation {
                    OutputActivation::Sigmoid => z.mapv(tensor::sigmoid),
                    OutputActivation::Linear => z,
                };
            }
        }
        Ok(activation)
    }

    /// Single-sample inference convenience.
    pub fn predict(&self, x: &Array1<f32>) -> Result<Array1<f32>, NeuralError> {
        let batch = x
            .view()
            .insert_axis(Axis(0))
            .to_owned();
        let out = self.forward(&batch)?;
        Ok(out.index_axis(Axis(0), 0).to_owned())
    }

    fn forward_training(&mut self, x: &Array2<f32>) -> ForwardPass {
        let last = self.layers.len() - 1;
        let mut pass = ForwardPass {
            activations: vec![x.clone()],
            relu_inputs: Vec::with_capacity(self.layers.len()),
            dropout_masks: Vec::with_capacity(self.layers.len()),
            bn_caches: Vec::with_capacity(self.layers.len()),
            residual_applied: Vec::with_capacity(self.layers.len()),
        };
        for index in 0..self.layers.len() {
            let prev = &pass.activations[index];
            let layer = &self.layers[index];
            let mut z = prev.dot(&layer.weight) + &layer.bias;
            let mut bn_cache = None;
            if index < last && self.config.batch_norm {
                let (normalized, cache) = self.batch_norms[index].forward_train(&z);
                z = normalized;
                bn_cache = Some(cache);
            }
            pass.bn_caches.push(bn_cache);
            let (activation, mask, residual) = if index < last {
                let mut a = z.mapv(tensor::relu);
                // Dropout mask is regenerated per call and never persisted.
                let mask = if self.config.dropout > 0.0 {
                    let keep = 1.0 - self.config.dropout;
                    let mask = Array2::from_shape_fn(a.dim(), |_| {
                        if self.rng.gen::<f32>() < keep {
                            1.0 / keep
                        } else {
                            0.0
                        }
                    });
                    a *= &mask;
                    Some(mask)
                } else {
                    None
                };
                let residual =
                    self.config.residual && index > 0 && a.dim() == pass.activations[index].dim();
                if residual {
                    a += &pass.activations[index];
                }
                (a, mask, residual)
            } else {
                let a = match self.config.output_activation {
                    OutputActivation::Sigmoid => z.mapv(tensor::sigmoid),
                    OutputActivation::Linear => z.clone(),
                };
                (a, None, false)
            };
            pass.relu_inputs.push(z);
            pass.dropout_masks.push(mask);
            pass.residual_applied.push(residual);
            pass.activations.push(activation);
        }
        pass
    }

    /// One training step: forward in training mode, backprop, finite check,
    /// global-norm clip, learning-rate schedule, Adam update.
    ///
    /// Returns the mean squared error of the pre-update prediction. On
    /// `NumericInstability` the weights are left untouched.
    pub fn train_step(
        &mut self,
        x: &Array2<f32>,
        target: &Array2<f32>,
    ) -> Result<f32, NeuralError> {
        self.check_input(x, "feedforward.train_step")?;
        if target.ncols() != self.config.output {
            return Err(NeuralError::shape(
                "feedforward.train_step targets",
                self.config.output,
                target.ncols(),
            ));
        }
        let pass = self.forward_training(x);
        let output = &pass.activations[self.layers.len()];
        let diff = output - target;
        let loss = diff.mapv(|d| d * d).mean().unwrap_or(f32::INFINITY);
        if !loss.is_finite() {
            return Err(NeuralError::NumericInstability { quantity: "loss" });
        }

        let batch = x.nrows().max(1) as f32;
        let last = self.layers.len() - 1;
        // Delta with respect to each layer's pre-batch-norm affine output.
        let mut deltas: Vec<Array2<f32>> = vec![Array2::zeros((0, 0)); self.layers.len()];
        let mut bn_grads: Vec<Option<(Array1<f32>, Array1<f32>)>> =
            vec![None; self.batch_norms.len()];

        deltas[last] = match self.config.output_activation {
            OutputActivation::Sigmoid => &diff * &output.mapv(tensor::sigmoid_derivative),
            OutputActivation::Linear => diff,
        };

        // Gradient with respect to each hidden layer's final activation,
        // including any skip-path contribution from the layer above it.
        let mut grad_acts: Vec<Array2<f32>> = vec![Array2::zeros((0, 0)); self.layers.len()];
        for index in (0..last).rev() {
            let mut grad_activation = deltas[index + 1].dot(&self.layers[index + 1].weight.t());
            if index + 1 < last && pass.residual_applied[index + 1] {
                // The skip connection forwards this activation unchanged.
                grad_activation += &grad_acts[index + 1];
            }
            grad_acts[index] = grad_activation.clone();
            if let Some(mask) = &pass.dropout_masks[index] {
                grad_activation *= mask;
            }
            let mut delta = grad_activation * pass.relu_inputs[index].mapv(tensor::relu_derivative);
            if self.config.batch_norm {
                if let Some(cache) = &pass.bn_caches[index] {
                    let (dx, dgamma, dbeta) = self.batch_norms[index].backward(&delta, cache);
                    delta = dx;
                    bn_grads[index] = Some((dgamma, dbeta));
                }
            }
            deltas[index] = delta;
        }

        let mut names = Vec::with_capacity(self.layers.len() * 2);
        let mut grads = Vec::with_capacity(self.layers.len() * 2);
        for (index, delta) in deltas.iter().enumerate() {
            let weight_grad = pass.activations[index].t().dot(delta) / batch;
            let bias_grad = delta.sum_axis(Axis(0)) / batch;
            names.push(format!("layer{index}.weight"));
            grads.push(weight_grad.into_dyn());
            names.push(format!("layer{index}.bias"));
            grads.push(bias_grad.into_dyn());
        }
        if !tensor::all_finite(&grads) {
            return Err(NeuralError::NumericInstability {
                quantity: "gradient",
            });
        }
        tensor::clip_gradients(&mut grads, self.config.clip_norm);

        if let Some(schedule) = &mut self.schedule {
            self.optimizer.set_learning_rate(schedule.current());
            schedule.advance();
        }
        self.optimizer.begin_step();
        for (name, grad) in names.iter().zip(&grads) {
            let layer_index: usize = name
                .trim_start_matches("layer")
                .split('.')
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            let layer = &mut self.layers[layer_index];
            if name.ends_with("weight") {
                self.optimizer
                    .update(name, layer.weight.view_mut().into_dyn(), grad.view());
            } else {
                self.optimizer
                    .update(name, layer.bias.view_mut().into_dyn(), grad.view());
            }
        }
        for (index, pair) in bn_grads.into_iter().enumerate() {
            if let Some((dgamma, dbeta)) = pair {
                let bn = &mut self.batch_norms[index];
                self.bn_optimizer
                    .update(bn.gamma_mut().view_mut().into_dyn(), dgamma.view().into_dyn());
                self.bn_optimizer
                    .update(bn.beta_mut().view_mut().into_dyn(), dbeta.view().into_dyn());
            }
        }
        Ok(loss)
    }

    /// Copies the learned parameters from another network with the same
    /// architecture (target-network sync).
    pub fn copy_parameters_from(&mut self, source: &Self) -> Result<(), NeuralError> {
        if source.config.widths() != self.config.widths() {
            return Err(NeuralError::SnapshotMismatch(
                "cannot copy parameters between different architectures".into(),
            ));
        }
        for (dst, src) in self.layers.iter_mut().zip(&source.layers) {
            dst.weight.assign(&src.weight);
            dst.bias.assign(&src.bias);
        }
        Ok(())
    }

    /// Serializable view of weights, batch-norm state, and optimizer moments.
    #[must_use]
    pub fn snapshot(&self) -> FeedForwardSnapshot {
        FeedForwardSnapshot {
            config: self.config.clone(),
            weights: self.layers.iter().map(|l| l.weight.clone()).collect(),
            biases: self.layers.iter().map(|l| l.bias.clone()).collect(),
            batch_norms: self.batch_norms.iter().map(BatchNorm::snapshot).collect(),
            optimizer: self.optimizer.snapshot(),
            schedule: self.schedule.clone(),
        }
    }

    /// Rebuilds a network from a snapshot, re-validating every shape.
    pub fn restore(snapshot: FeedForwardSnapshot) -> Result<Self, NeuralError> {
        snapshot.config.validate()?;
        let widths = snapshot.config.widths();
        if snapshot.weights.len() != widths.len() - 1 || snapshot.biases.len() != widths.len() - 1 {
            return Err(NeuralError::SnapshotMismatch(format!(
                "expected {} layers, snapshot has {}",
                widths.len() - 1,
                snapshot.weights.len()
            )));
        }
        for (index, pair) in widths.windows(2).enumerate() {
            if snapshot.weights[index].dim() != (pair[0], pair[1]) {
                return Err(NeuralError::SnapshotMismatch(format!(
                    "layer {index} weight shape {:?} does not match ({}, {})",
                    snapshot.weights[index].dim(),
                    pair[0],
                    pair[1]
                )));
            }
        }
        let layers = snapshot
            .weights
            .into_iter()
            .zip(snapshot.biases)
            .map(|(weight, bias)| DenseLayer { weight, bias })
            .collect();
        let batch_norms = snapshot
            .batch_norms
            .into_iter()
            .map(BatchNorm::restore)
            .collect();
        Ok(Self {
            layers,
            batch_norms,
            optimizer: AdamOptimizer::restore(snapshot.optimizer),
            bn_optimizer: SgdOptimizer::new(snapshot.config.learning_rate),
            schedule: snapshot.schedule.clone(),
            rng: SmallRng::from_entropy(),
            config: snapshot.config,
        })
    }
}

/// Persisted feedforward predictor: architecture, weights, batch-norm and
/// optimizer state. Dropout masks are deliberately absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedForwardSnapshot {
    /// Architecture and hyperparameters.
    pub config: FeedForwardConfig,
    /// Layer weight matrices, input to output order.
    pub weights: Vec<Array2<f32>>,
    /// Layer bias vectors.
    pub biases: Vec<Array1<f32>>,
    /// Batch-norm state per normalized hidden layer.
    #[serde(default)]
    pub batch_norms: Vec<BatchNormSnapshot>,
    /// Optimizer moments and step counter.
    pub optimizer: AdamSnapshot,
    /// Learning-rate schedule position.
    #[serde(default)]
    pub schedule: Option<LrSchedule>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn config() -> FeedForwardConfig {
        FeedForwardConfig::sigmoid(3, vec![8, 8], 2, 0.05)
    }

    #[test]
    fn rejects_zero_width_layer() {
        let bad = FeedForwardConfig::sigmoid(3, vec![0], 2, 0.01);
        assert!(matches!(
            FeedForwardNetwork::new(bad),
            Err(NeuralError::InvalidArchitecture(_))
        ));
    }

    #[test]
    fn rejects_wrong_input_width() {
        let net = FeedForwardNetwork::new(config()).unwrap();
        let err = net.predict(&array![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, NeuralError::ShapeMismatch { expected: 3, got: 2, .. }));
    }

    #[test]
    fn training_reduces_loss_on_fixed_pair() {
        let mut net = FeedForwardNetwork::new(config()).unwrap();
        let x = array![[0.2, 0.9, 0.1]];
        let y = array![[1.0, 0.0]];
        let first = net.train_step(&x, &y).unwrap();
        let mut last = first;
        for _ in 0..300 {
            last = net.train_step(&x, &y).unwrap();
        }
        assert!(last < first);
    }

    #[test]
    fn inference_is_deterministic_with_dropout_configured() {
        let mut cfg = config();
        cfg.dropout = 0.5;
        let net = FeedForwardNetwork::new(cfg).unwrap();
        let x = array![0.1, 0.2, 0.3];
        let a = net.predict(&x).unwrap();
        let b = net.predict(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_round_trip_preserves_outputs_and_moments() {
        let mut net = FeedForwardNetwork::new(config()).unwrap();
        let x = array![[0.4, 0.1, 0.8]];
        let y = array![[0.0, 1.0]];
        for _ in 0..5 {
            let _ = net.train_step(&x, &y).unwrap();
        }
        let snapshot = net.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: FeedForwardSnapshot = serde_json::from_str(&json).unwrap();
        let restored = FeedForwardNetwork::restore(parsed).unwrap();
        let probe = array![0.3, 0.3, 0.3];
        assert_eq!(net.predict(&probe).unwrap(), restored.predict(&probe).unwrap());
        assert_eq!(restored.optimizer.steps(), 5);
    }

    #[test]
    fn non_finite_target_leaves_weights_untouched() {
        let mut net = FeedForwardNetwork::new(config()).unwrap();
        let probe = array![0.5, 0.5, 0.5];
        let before = net.predict(&probe).unwrap();
        let err = net
            .train_step(&array![[0.2, 0.9, 0.1]], &array![[f32::NAN, 0.0]])
            .unwrap_err();
        assert!(matches!(err, NeuralError::NumericInstability { .. }));
        assert_eq!(net.predict(&probe).unwrap(), before);
    }

    #[test]
    fn restore_rejects_mismatched_snapshot() {
        let net = FeedForwardNetwork::new(config()).unwrap();
        let mut snapshot = net.snapshot();
        snapshot.weights.pop();
        assert!(matches!(
            FeedForwardNetwork::restore(snapshot),
            Err(NeuralError::SnapshotMismatch(_))
        ));
    }
}
