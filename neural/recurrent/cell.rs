use ndarray::{concatenate, Array1, Array2, ArrayD, Axis};
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::tensor;

/// Values cached by one forward step, required for backprop through time.
#[derive(Debug, Clone)]
pub struct CellCache {
    /// Concatenated `[input, previous hidden]` vector.
    z: Array1<f32>,
    forget: Array1<f32>,
    input_gate: Array1<f32>,
    candidate: Array1<f32>,
    output_gate: Array1<f32>,
    cell_prev: Array1<f32>,
    tanh_cell: Array1<f32>,
}

/// Parameter gradients for one cell, accumulated across a window.
#[derive(Debug, Clone)]
pub struct CellGrads {
    /// Forget-gate weight gradient.
    pub w_forget: Array2<f32>,
    /// Input-gate weight gradient.
    pub w_input: Array2<f32>,
    /// Candidate weight gradient.
    pub w_cell: Array2<f32>,
    /// Output-gate weight gradient.
    pub w_output: Array2<f32>,
    /// Forget-gate bias gradient.
    pub b_forget: Array1<f32>,
    /// Input-gate bias gradient.
    pub b_input: Array1<f32>,
    /// Candidate bias gradient.
    pub b_cell: Array1<f32>,
    /// Output-gate bias gradient.
    pub b_output: Array1<f32>,
}

impl CellGrads {
    /// Zero gradients for a cell with the given concatenated width.
    #[must_use]
    pub fn zeros(z_len: usize, hidden: usize) -> Self {
        Self {
            w_forget: Array2::zeros((z_len, hidden)),
            w_input: Array2::zeros((z_len, hidden)),
            w_cell: Array2::zeros((z_len, hidden)),
            w_output: Array2::zeros((z_len, hidden)),
            b_forget: Array1::zeros(hidden),
            b_input: Array1::zeros(hidden),
            b_cell: Array1::zeros(hidden),
            b_output: Array1::zeros(hidden),
        }
    }

    /// Adds another step's gradients into this accumulator.
    pub fn accumulate(&mut self, other: &Self) {
        self.w_forget += &other.w_forget;
        self.w_input += &other.w_input;
        self.w_cell += &other.w_cell;
        self.w_output += &other.w_output;
        self.b_forget += &other.b_forget;
        self.b_input += &other.b_input;
        self.b_cell += &other.b_cell;
        self.b_output += &other.b_output;
    }

    /// Converts into dynamic tensors, fixed order:
    /// `w_forget, w_input, w_cell, w_output, b_forget, b_input, b_cell, b_output`.
    #[must_use]
    pub fn into_tensors(self) -> Vec<ArrayD<f32>> {
        vec![
            self.w_forget.into_dyn(),
            self.w_input.into_dyn(),
            self.w_cell.into_dyn(),
            self.w_output.into_dyn(),
            self.b_forget.into_dyn(),
            self.b_input.into_dyn(),
            self.b_cell.into_dyn(),
            self.b_output.into_dyn(),
        ]
    }
}

/// One gated recurrent cell: forget/input/output gates over a candidate
/// memory, operating on the concatenation of the step input and the
/// previous hidden state.
#[derive(Debug, Clone)]
pub struct GatedCell {
    input: usize,
    hidden: usize,
    w_forget: Array2<f32>,
    w_input: Array2<f32>,
    w_cell: Array2<f32>,
    w_output: Array2<f32>,
    b_forget: Array1<f32>,
    b_input: Array1<f32>,
    b_cell: Array1<f32>,
    b_output: Array1<f32>,
}

impl GatedCell {
    /// Creates a cell with small-scale gate weights. The forget-gate bias
    /// starts at one so early training does not wipe the cell memory.
    #[must_use]
    pub fn new(rng: &mut SmallRng, input: usize, hidden: usize) -> Self {
        let z_len = input + hidden;
        Self {
            input,
            hidden,
            w_forget: tensor::gate_init(rng, z_len, hidden),
            w_input: tensor::gate_init(rng, z_len, hidden),
            w_cell: tensor::gate_init(rng, z_len, hidden),
            w_output: tensor::gate_init(rng, z_len, hidden),
            b_forget: Array1::ones(hidden),
            b_input: Array1::zeros(hidden),
            b_cell: Array1::zeros(hidden),
            b_output: Array1::zeros(hidden),
        }
    }

    /// Step input width.
    #[must_use]
    pub const fn input_size(&self) -> usize {
        self.input
    }

    /// Hidden/cell state width.
    #[must_use]
    pub const fn hidden_size(&self) -> usize {
        self.hidden
    }

    /// One forward step: returns the new hidden state, new cell state,
    /// and the cache needed to backpropagate through this step.
    #[must_use]
    pub fn forward(
        &self,
        x: &Array1<f32>,
        h: &Array1<f32>,
        c: &Array1<f32>,
    ) -> (Array1<f32>, Array1<f32>, CellCache) {
        let z = concatenate![Axis(0), x.view(), h.view()];
        let forget = (z.dot(&self.w_forget) + &self.b_forget).mapv(tensor::sigmoid);
        let input_gate = (z.dot(&self.w_input) + &self.b_input).mapv(tensor::sigmoid);
        let candidate = (z.dot(&self.w_cell) + &self.b_cell).mapv(tensor::tanh);
        let output_gate = (z.dot(&self.w_output) + &self.b_output).mapv(tensor::sigmoid);

        let c_new = &forget * c + &input_gate * &candidate;
        let tanh_cell = c_new.mapv(tensor::tanh);
        let h_new = &output_gate * &tanh_cell;

        let cache = CellCache {
            z,
            forget,
            input_gate,
            candidate,
            output_gate,
            cell_prev: c.clone(),
            tanh_cell,
        };
        (h_new, c_new, cache)
    }

    /// Backward step. Takes the loss gradients flowing into this step's
    /// hidden and cell state and returns the parameter gradients plus the
    /// gradients for the step input, previous hidden, and previous cell.
    #[must_use]
    pub fn backward(
        &self,
        dh: &Array1<f32>,
        dc: &Array1<f32>,
        cache: &CellCache,
    ) -> (CellGrads, Array1<f32>, Array1<f32>, Array1<f32>) {
        let d_output_gate = dh * &cache.tanh_cell;
        let dc_total =
            dc + &(dh * &cache.output_gate * &cache.tanh_cell.mapv(tensor::tanh_derivative));

        let d_forget = &dc_total * &cache.cell_prev;
        let d_input_gate = &dc_total * &cache.candidate;
        let d_candidate = &dc_total * &cache.input_gate;
        let dc_prev = &dc_total * &cache.forget;

        let df_pre = d_forget * cache.forget.mapv(tensor::sigmoid_derivative);
        let di_pre = d_input_gate * cache.input_gate.mapv(tensor::sigmoid_derivative);
        let dg_pre = d_candidate * cache.candidate.mapv(tensor::tanh_derivative);
        let do_pre = d_output_gate * cache.output_gate.mapv(tensor::sigmoid_derivative);

        let grads = CellGrads {
            w_forget: outer(&cache.z, &df_pre),
            w_input: outer(&cache.z, &di_pre),
            w_cell: outer(&cache.z, &dg_pre),
            w_output: outer(&cache.z, &do_pre),
            b_forget: df_pre.clone(),
            b_input: di_pre.clone(),
            b_cell: dg_pre.clone(),
            b_output: do_pre.clone(),
        };

        let dz = self.w_forget.dot(&df_pre)
            + self.w_input.dot(&di_pre)
            + self.w_cell.dot(&dg_pre)
            + self.w_output.dot(&do_pre);
        let dx = dz.slice(ndarray::s![..self.input]).to_owned();
        let dh_prev = dz.slice(ndarray::s![self.input..]).to_owned();
        (grads, dx, dh_prev, dc_prev)
    }

    /// Applies one optimizer step from an averaged gradient slice laid out
    /// in the `CellGrads::into_tensors` order.
    pub fn apply_gradients(
        &mut self,
        optimizer: &mut crate::optimizer::AdamOptimizer,
        prefix: &str,
        grads: &[ArrayD<f32>],
    ) {
        optimizer.update(
            &format!("{prefix}.w_forget"),
            self.w_forget.view_mut().into_dyn(),
            grads[0].view(),
        );
        optimizer.update(
            &format!("{prefix}.w_input"),
            self.w_input.view_mut().into_dyn(),
            grads[1].view(),
        );
        optimizer.update(
            &format!("{prefix}.w_cell"),
            self.w_cell.view_mut().into_dyn(),
            grads[2].view(),
        );
        optimizer.update(
            &format!("{prefix}.w_output"),
            self.w_output.view_mut().into_dyn(),
            grads[3].view(),
        );
        optimizer.update(
            &format!("{prefix}.b_forget"),
            self.b_forget.view_mut().into_dyn(),
            grads[4].view(),
        );
        optimizer.update(
            &format!("{prefix}.b_input"),
            self.b_input.view_mut().into_dyn(),
            grads[5].view(),
        );
        optimizer.update(
            &format!("{prefix}.b_cell"),
            self.b_cell.view_mut().into_dyn(),
            grads[6].view(),
        );
        optimizer.update(
            &format!("{prefix}.b_output"),
            self.b_output.view_mut().into_dyn(),
            grads[7].view(),
        );
    }

    /// Serializable view of all gate parameters.
    #[must_use]
    pub fn snapshot(&self) -> CellSnapshot {
        CellSnapshot {
            w_forget: self.w_forget.clone(),
            w_input: self.w_input.clone(),
            w_cell: self.w_cell.clone(),
            w_output: self.w_output.clone(),
            b_forget: self.b_forget.clone(),
            b_input: self.b_input.clone(),
            b_cell: self.b_cell.clone(),
            b_output: self.b_output.clone(),
        }
    }

    /// Rebuilds a cell from its snapshot, re-deriving the dimensions from
    /// the stored weight shapes.
    #[must_use]
    pub fn restore(snapshot: CellSnapshot, input: usize) -> Self {
        let hidden = snapshot.b_forget.len();
        Self {
            input,
            hidden,
            w_forget: snapshot.w_forget,
            w_input: snapshot.w_input,
            w_cell: snapshot.w_cell,
            w_output: snapshot.w_output,
            b_forget: snapshot.b_forget,
            b_input: snapshot.b_input,
            b_cell: snapshot.b_cell,
            b_output: snapshot.b_output,
        }
    }
}

/// Persisted gate parameters for one cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Forget-gate weights.
    pub w_forget: Array2<f32>,
    /// Input-gate weights.
    pub w_input: Array2<f32>,
    /// Candidate weights.
    pub w_cell: Array2<f32>,
    /// Output-gate weights.
    pub w_output: Array2<f32>,
    /// Forget-gate bias.
    pub b_forget: Array1<f32>,
    /// Input-gate bias.
    pub b_input: Array1<f32>,
    /// Candidate bias.
    pub b_cell: Array1<f32>,
    /// Output-gate bias.
    pub b_output: Array1<f32>,
}

fn outer(column: &Array1<f32>, row: &Array1<f32>) -> Array2<f32> {
    let col = column.view().insert_axis(Axis(1));
    let row = row.view().insert_axis(Axis(0));
    col.dot(&row)
}
