//! Bounded-window gated sequence memory.
//!
//! The network streams one observation per step, keeping hidden and cell
//! state between calls, and separately accumulates `(input, target)` pairs
//! in a bounded window. Training replays the window from a zero state with
//! backpropagation through time, averages the gradients over the window,
//! and applies one clipped optimizer step.

/// Gated recurrent cell and its gradient bundle.
pub mod cell;

use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayD, Axis};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::NeuralError;
use crate::optimizer::{AdamOptimizer, AdamSnapshot};
use crate::tensor;
use cell::{CellCache, CellGrads, CellSnapshot, GatedCell};

/// Lower bound on the training window length.
pub const MIN_WINDOW: usize = 30;
/// Upper bound on the training window length.
pub const MAX_WINDOW: usize = 50;

/// Architecture and training parameters for a [`SequenceNetwork`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequenceConfig {
    /// Width of each step input.
    pub input: usize,
    /// Hidden/cell state width per layer.
    pub hidden: usize,
    /// Output width.
    pub output: usize,
    /// Number of stacked recurrent layers.
    pub layers: usize,
    /// Training window length, held within `MIN_WINDOW..=MAX_WINDOW`.
    pub window: usize,
    /// Adam learning rate.
    pub learning_rate: f32,
}

impl SequenceConfig {
    /// Two-layer configuration with the stock hidden width and window.
    #[must_use]
    pub const fn new(input: usize, output: usize) -> Self {
        Self {
            input,
            hidden: 32,
            output,
            layers: 2,
            window: 40,
            learning_rate: 0.01,
        }
    }

    /// Overrides the hidden width.
    #[must_use]
    pub const fn with_hidden(mut self, hidden: usize) -> Self {
        self.hidden = hidden;
        self
    }

    /// Overrides the layer count.
    #[must_use]
    pub const fn with_layers(mut self, layers: usize) -> Self {
        self.layers = layers;
        self
    }

    /// Overrides the window length, clamped to the supported bounds.
    #[must_use]
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.clamp(MIN_WINDOW, MAX_WINDOW);
        self
    }

    fn validate(&self) -> Result<(), NeuralError> {
        if self.input == 0 || self.hidden == 0 || self.output == 0 {
            return Err(NeuralError::InvalidArchitecture(format!(
                "sequence dims must be nonzero: input {}, hidden {}, output {}",
                self.input, self.hidden, self.output
            )));
        }
        if self.layers == 0 {
            return Err(NeuralError::InvalidArchitecture(
                "sequence network needs at least one layer".to_string(),
            ));
        }
        if !(MIN_WINDOW..=MAX_WINDOW).contains(&self.window) {
            return Err(NeuralError::InvalidArchitecture(format!(
                "window {} outside {MIN_WINDOW}..={MAX_WINDOW}",
                self.window
            )));
        }
        Ok(())
    }
}

/// One stored training observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowPair {
    /// Step input.
    pub input: Array1<f32>,
    /// Expected output for that step.
    pub target: Array1<f32>,
}

/// Stacked gated recurrent network with a sigmoid output head.
#[derive(Debug)]
pub struct SequenceNetwork {
    config: SequenceConfig,
    cells: Vec<GatedCell>,
    output_weight: Array2<f32>,
    output_bias: Array1<f32>,
    optimizer: AdamOptimizer,
    hidden_state: Vec<Array1<f32>>,
    cell_state: Vec<Array1<f32>>,
    window: VecDeque<WindowPair>,
}

impl SequenceNetwork {
    /// Builds a network with fresh weights and zeroed state.
    pub fn new(config: SequenceConfig) -> Result<Self, NeuralError> {
        config.validate()?;
        let mut rng = SmallRng::from_entropy();
        let mut cells = Vec::with_capacity(config.layers);
        for layer in 0..config.layers {
            let input = if layer == 0 { config.input } else { config.hidden };
            cells.push(GatedCell::new(&mut rng, input, config.hidden));
        }
        let output_weight = tensor::he_init(&mut rng, config.hidden, config.output);
        let output_bias = Array1::zeros(config.output);
        let hidden_state = vec![Array1::zeros(config.hidden); config.layers];
        let cell_state = vec![Array1::zeros(config.hidden); config.layers];
        let optimizer = AdamOptimizer::new(config.learning_rate);
        Ok(Self {
            config,
            cells,
            output_weight,
            output_bias,
            optimizer,
            hidden_state,
            cell_state,
            window: VecDeque::new(),
        })
    }

    /// The configuration this network was built from.
    #[must_use]
    pub const fn config(&self) -> &SequenceConfig {
        &self.config
    }

    /// Number of observations currently held in the training window.
    #[must_use]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Streams one input through the network, advancing the persistent
    /// hidden and cell state, and returns the sigmoid output.
    pub fn step(&mut self, x: &Array1<f32>) -> Result<Array1<f32>, NeuralError> {
        if x.len() != self.config.input {
            return Err(NeuralError::shape("sequence step", self.config.input, x.len()));
        }
        let mut layer_input = x.clone();
        for (layer, cell) in self.cells.iter().enumerate() {
            let (h, c, _) =
                cell.forward(&layer_input, &self.hidden_state[layer], &self.cell_state[layer]);
            self.hidden_state[layer] = h.clone();
            self.cell_state[layer] = c;
            layer_input = h;
        }
        Ok(self.output_from(&layer_input))
    }

    /// Zeroes the streaming hidden and cell state.
    pub fn reset(&mut self) {
        for h in &mut self.hidden_state {
            h.fill(0.0);
        }
        for c in &mut self.cell_state {
            c.fill(0.0);
        }
    }

    /// Appends one `(input, target)` pair to the training window, evicting
    /// the oldest pair once the window is full.
    pub fn observe(&mut self, input: Array1<f32>, target: Array1<f32>) -> Result<(), NeuralError> {
        if input.len() != self.config.input {
            return Err(NeuralError::shape("sequence observe input", self.config.input, input.len()));
        }
        if target.len() != self.config.output {
            return Err(NeuralError::shape(
                "sequence observe target",
                self.config.output,
                target.len(),
            ));
        }
        self.window.push_back(WindowPair { input, target });
        while self.window.len() > self.config.window {
            self.window.pop_front();
        }
        Ok(())
    }

    /// Replays the stored window from a zero state, backpropagates through
    /// time, and applies one clipped, window-averaged optimizer step.
    ///
    /// Returns the mean squared error over the window, or zero when the
    /// window is empty. The streaming state is left untouched.
    pub fn train_on_window(&mut self) -> Result<f32, NeuralError> {
        let steps = self.window.len();
        if steps == 0 {
            return Ok(0.0);
        }
        let layers = self.config.layers;

        let mut h = vec![Array1::zeros(self.config.hidden); layers];
        let mut c = vec![Array1::zeros(self.config.hidden); layers];
        let mut caches: Vec<Vec<CellCache>> = Vec::with_capacity(steps);
        let mut top_hidden: Vec<Array1<f32>> = Vec::with_capacity(steps);
        let mut output_deltas: Vec<Array1<f32>> = Vec::with_capacity(steps);
        let mut loss = 0.0_f32;

        for pair in &self.window {
            let mut layer_input = pair.input.clone();
            let mut step_caches = Vec::with_capacity(layers);
            for (layer, layer_cell) in self.cells.iter().enumerate() {
                let (nh, nc, cache) = layer_cell.forward(&layer_input, &h[layer], &c[layer]);
                h[layer] = nh.clone();
                c[layer] = nc;
                layer_input = nh;
                step_caches.push(cache);
            }
            let y = self.output_from(&layer_input);
            let diff = &y - &pair.target;
            loss += diff.mapv(|d| d * d).mean().unwrap_or(0.0);
            let scale = 2.0 / self.config.output as f32;
            let delta = diff.mapv(|d| d * scale) * y.mapv(tensor::sigmoid_derivative);
            output_deltas.push(delta);
            top_hidden.push(layer_input);
            caches.push(step_caches);
        }
        loss /= steps as f32;
        if !loss.is_finite() {
            return Err(NeuralError::NumericInstability { quantity: "loss" });
        }

        let mut cell_grads: Vec<CellGrads> = self
            .cells
            .iter()
            .map(|layer_cell| {
                CellGrads::zeros(
                    layer_cell.input_size() + layer_cell.hidden_size(),
                    layer_cell.hidden_size(),
                )
            })
            .collect();
        let mut output_weight_grad = Array2::zeros(self.output_weight.dim());
        let mut output_bias_grad = Array1::zeros(self.config.output);
        let mut dh_next = vec![Array1::zeros(self.config.hidden); layers];
        let mut dc_next = vec![Array1::zeros(self.config.hidden); layers];

        for step in (0..steps).rev() {
            let delta = &output_deltas[step];
            let hidden_col = top_hidden[step].view().insert_axis(Axis(1));
            let delta_row = delta.view().insert_axis(Axis(0));
            output_weight_grad += &hidden_col.dot(&delta_row);
            output_bias_grad += delta;

            let mut dh_from_above = self.output_weight.dot(delta);
            for layer in (0..layers).rev() {
                let dh = &dh_from_above + &dh_next[layer];
                let (grads, dx, dh_prev, dc_prev) =
                    self.cells[layer].backward(&dh, &dc_next[layer], &caches[step][layer]);
                cell_grads[layer].accumulate(&grads);
                dh_next[layer] = dh_prev;
                dc_next[layer] = dc_prev;
                dh_from_above = dx;
            }
        }

        let average = 1.0 / steps as f32;
        let mut flat: Vec<ArrayD<f32>> = Vec::with_capacity(layers * 8 + 2);
        for grads in cell_grads {
            for mut tensor in grads.into_tensors() {
                tensor.mapv_inplace(|v| v * average);
                flat.push(tensor);
            }
        }
        output_weight_grad.mapv_inplace(|v| v * average);
        output_bias_grad.mapv_inplace(|v| v * average);
        flat.push(output_weight_grad.into_dyn());
        flat.push(output_bias_grad.into_dyn());

        if !tensor::all_finite(&flat) {
            return Err(NeuralError::NumericInstability { quantity: "gradient" });
        }
        let _ = tensor::clip_gradients(&mut flat, 5.0);

        self.optimizer.begin_step();
        for layer in 0..layers {
            let slice = &flat[layer * 8..layer * 8 + 8];
            let prefix = format!("layer{layer}");
            self.cells[layer].apply_gradients(&mut self.optimizer, &prefix, slice);
        }
        self.optimizer.update(
            "output.weight",
            self.output_weight.view_mut().into_dyn(),
            flat[layers * 8].view(),
        );
        self.optimizer.update(
            "output.bias",
            self.output_bias.view_mut().into_dyn(),
            flat[layers * 8 + 1].view(),
        );
        Ok(loss)
    }

    fn output_from(&self, hidden: &Array1<f32>) -> Array1<f32> {
        (hidden.dot(&self.output_weight) + &self.output_bias).mapv(tensor::sigmoid)
    }

    /// Serializable view of the full network: weights, optimizer, streaming
    /// state, and window contents.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            config: self.config.clone(),
            cells: self.cells.iter().map(GatedCell::snapshot).collect(),
            output_weight: self.output_weight.clone(),
            output_bias: self.output_bias.clone(),
            optimizer: self.optimizer.snapshot(),
            hidden_state: self.hidden_state.clone(),
            cell_state: self.cell_state.clone(),
            window: self.window.iter().cloned().collect(),
        }
    }

    /// Rebuilds a network from its snapshot.
    pub fn restore(snapshot: SequenceSnapshot) -> Result<Self, NeuralError> {
        snapshot.config.validate()?;
        let config = snapshot.config;
        if snapshot.cells.len() != config.layers {
            return Err(NeuralError::SnapshotMismatch(format!(
                "expected {} cells, snapshot has {}",
                config.layers,
                snapshot.cells.len()
            )));
        }
        let mut cells = Vec::with_capacity(config.layers);
        for (layer, cell_snapshot) in snapshot.cells.into_iter().enumerate() {
            let input = if layer == 0 { config.input } else { config.hidden };
            if cell_snapshot.w_forget.dim() != (input + config.hidden, config.hidden) {
                return Err(NeuralError::SnapshotMismatch(format!(
                    "cell {layer} gate weights do not fit the configured dimensions"
                )));
            }
            cells.push(GatedCell::restore(cell_snapshot, input));
        }
        if snapshot.output_weight.dim() != (config.hidden, config.output) {
            return Err(NeuralError::SnapshotMismatch(
                "output head does not fit the configured dimensions".to_string(),
            ));
        }
        let hidden_state = if snapshot.hidden_state.len() == config.layers {
            snapshot.hidden_state
        } else {
            vec![Array1::zeros(config.hidden); config.layers]
        };
        let cell_state = if snapshot.cell_state.len() == config.layers {
            snapshot.cell_state
        } else {
            vec![Array1::zeros(config.hidden); config.layers]
        };
        let mut window: VecDeque<WindowPair> = snapshot.window.into();
        while window.len() > config.window {
            window.pop_front();
        }
        Ok(Self {
            cells,
            output_weight: snapshot.output_weight,
            output_bias: snapshot.output_bias,
            optimizer: AdamOptimizer::restore(snapshot.optimizer),
            hidden_state,
            cell_state,
            window,
            config,
        })
    }
}

/// Persisted sequence-network state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    /// Architecture the weights belong to.
    pub config: SequenceConfig,
    /// Per-layer gate parameters.
    pub cells: Vec<CellSnapshot>,
    /// Output head weights.
    pub output_weight: Array2<f32>,
    /// Output head bias.
    pub output_bias: Array1<f32>,
    /// Optimizer moments and step count.
    pub optimizer: AdamSnapshot,
    /// Streaming hidden state per layer.
    #[serde(default)]
    pub hidden_state: Vec<Array1<f32>>,
    /// Streaming cell state per layer.
    #[serde(default)]
    pub cell_state: Vec<Array1<f32>>,
    /// Stored training window.
    #[serde(default)]
    pub window: Vec<WindowPair>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SequenceConfig {
        SequenceConfig::new(4, 2).with_hidden(8).with_window(30)
    }

    #[test]
    fn step_emits_bounded_output() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        let out = network.step(&Array1::from_elem(4, 0.5)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn step_rejects_wrong_width() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        let err = network.step(&Array1::zeros(3)).unwrap_err();
        assert!(matches!(err, NeuralError::ShapeMismatch { .. }));
    }

    #[test]
    fn window_is_bounded() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        for index in 0..60 {
            let value = index as f32 / 60.0;
            network
                .observe(Array1::from_elem(4, value), Array1::from_elem(2, value))
                .unwrap();
        }
        assert_eq!(network.window_len(), 30);
    }

    #[test]
    fn empty_window_trains_to_zero_loss() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        assert_eq!(network.train_on_window().unwrap(), 0.0);
    }

    #[test]
    fn training_reduces_loss_on_constant_target() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        for _ in 0..30 {
            network
                .observe(Array1::from_elem(4, 0.3), Array1::from_elem(2, 0.9))
                .unwrap();
        }
        let first = network.train_on_window().unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = network.train_on_window().unwrap();
        }
        assert!(last < first, "loss {last} did not improve on {first}");
    }

    #[test]
    fn training_leaves_streaming_state_alone() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        let _ = network.step(&Array1::from_elem(4, 0.7)).unwrap();
        let before = network.hidden_state.clone();
        for _ in 0..30 {
            network
                .observe(Array1::from_elem(4, 0.1), Array1::from_elem(2, 0.5))
                .unwrap();
        }
        let _ = network.train_on_window().unwrap();
        // Weights changed but the streaming state is only advanced by step().
        assert_eq!(network.hidden_state, before);
    }

    #[test]
    fn snapshot_round_trips_window_and_state() {
        let mut network = SequenceNetwork::new(small_config()).unwrap();
        let _ = network.step(&Array1::from_elem(4, 0.2)).unwrap();
        for _ in 0..5 {
            network
                .observe(Array1::from_elem(4, 0.2), Array1::from_elem(2, 0.8))
                .unwrap();
        }
        let json = serde_json::to_string(&network.snapshot()).unwrap();
        let parsed: SequenceSnapshot = serde_json::from_str(&json).unwrap();
        let mut restored = SequenceNetwork::restore(parsed).unwrap();
        assert_eq!(restored.window_len(), 5);
        let a = network.step(&Array1::from_elem(4, 0.4)).unwrap();
        let b = restored.step(&Array1::from_elem(4, 0.4)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn restore_rejects_layer_mismatch() {
        let network = SequenceNetwork::new(small_config()).unwrap();
        let mut snapshot = network.snapshot();
        snapshot.cells.pop();
        assert!(matches!(
            SequenceNetwork::restore(snapshot),
            Err(NeuralError::SnapshotMismatch(_))
        ));
    }
}
