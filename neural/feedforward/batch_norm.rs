use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Values cached by a training-mode forward pass, needed for backprop.
#[derive(Debug, Clone)]
pub struct BnCache {
    centered: Array2<f32>,
    normalized: Array2<f32>,
    inv_std: Array1<f32>,
}

/// Batch normalization with learnable scale/shift and running statistics.
///
/// Running statistics are updated only in training mode and frozen during
/// inference, so `forward_infer` stays deterministic.
#[derive(Debug, Clone)]
pub struct BatchNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
    momentum: f32,
    epsilon: f32,
}

impl BatchNorm {
    /// Creates a unit-scale, zero-shift layer over `size` features.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            gamma: Array1::ones(size),
            beta: Array1::zeros(size),
            running_mean: Array1::zeros(size),
            running_var: Array1::ones(size),
            momentum: 0.9,
            epsilon: 1e-5,
        }
    }

    /// Training-mode forward pass: normalizes by batch statistics and
    /// updates the running estimates.
    pub fn forward_train(&mut self, x: &Array2<f32>) -> (Array2<f32>, BnCache) {
        let size = self.gamma.len();
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(size));
        let var = x.var_axis(Axis(0), 0.0);

        let momentum = self.momentum;
        self.running_mean
            .zip_mut_with(&mean, |r, &m| *r = momentum * *r + (1.0 - momentum) * m);
        self.running_var
            .zip_mut_with(&var, |r, &v| *r = momentum * *r + (1.0 - momentum) * v);

        let inv_std = var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        let centered = x - &mean;
        let normalized = &centered * &inv_std;
        let out = &normalized * &self.gamma + &self.beta;
        (
            out,
            BnCache {
                centered,
                normalized,
                inv_std,
            },
        )
    }

    /// Inference-mode forward pass using frozen running statistics.
    #[must_use]
    pub fn forward_infer(&self, x: &Array2<f32>) -> Array2<f32> {
        let inv_std = self.running_var.mapv(|v| 1.0 / (v + self.epsilon).sqrt());
        let normalized = (x - &self.running_mean) * &inv_std;
        &normalized * &self.gamma + &self.beta
    }

    /// Backward pass. Returns the gradient with respect to the layer input
    /// plus the gamma/beta gradients.
    #[must_use]
    pub fn backward(
        &self,
        dout: &Array2<f32>,
        cache: &BnCache,
    ) -> (Array2<f32>, Array1<f32>, Array1<f32>) {
        let m = dout.nrows().max(1) as f32;
        let dgamma = (dout * &cache.normalized).sum_axis(Axis(0));
        let dbeta = dout.sum_axis(Axis(0));

        let dnorm = dout * &self.gamma;
        let dvar = (&dnorm * &cache.centered)
            .sum_axis(Axis(0))
            * &cache.inv_std.mapv(|s| -0.5 * s * s * s);
        let dmean = -(&dnorm * &cache.inv_std).sum_axis(Axis(0))
            - &(&dvar * &(cache.centered.sum_axis(Axis(0)).mapv(|c| 2.0 * c / m)));

        let dx = &dnorm * &cache.inv_std
            + &cache.centered.mapv(|c| 2.0 * c / m) * &dvar
            + dmean.mapv(|d| d / m);
        (dx, dgamma, dbeta)
    }

    /// Mutable access to the scale parameter (optimizer step).
    pub fn gamma_mut(&mut self) -> &mut Array1<f32> {
        &mut self.gamma
    }

    /// Mutable access to the shift parameter (optimizer step).
    pub fn beta_mut(&mut self) -> &mut Array1<f32> {
        &mut self.beta
    }

    /// Serializable view of all learned and running state.
    #[must_use]
    pub fn snapshot(&self) -> BatchNormSnapshot {
        BatchNormSnapshot {
            gamma: self.gamma.clone(),
            beta: self.beta.clone(),
            running_mean: self.running_mean.clone(),
            running_var: self.running_var.clone(),
        }
    }

    /// Restores a layer from its snapshot.
    #[must_use]
    pub fn restore(snapshot: BatchNormSnapshot) -> Self {
        Self {
            gamma: snapshot.gamma,
            beta: snapshot.beta,
            running_mean: snapshot.running_mean,
            running_var: snapshot.running_var,
            momentum: 0.9,
            epsilon: 1e-5,
        }
    }
}

/// Persisted batch-norm state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNormSnapshot {
    /// Learned scale.
    pub gamma: Array1<f32>,
    /// Learned shift.
    pub beta: Array1<f32>,
    /// Running mean used at inference time.
    pub running_mean: Array1<f32>,
    /// Running variance used at inference time.
    pub running_var: Array1<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn training_pass_normalizes_batch() {
        let mut bn = BatchNorm::new(2);
        let x = array![[1.0, 10.0], [3.0, 30.0], [5.0, 50.0]];
        let (out, _) = bn.forward_train(&x);
        let mean = out.mean_axis(Axis(0)).unwrap();
        assert!(mean.iter().all(|m| m.abs() < 1e-4));
    }

    #[test]
    fn inference_uses_running_stats() {
        let mut bn = BatchNorm::new(1);
        let x = array![[4.0], [6.0]];
        for _ in 0..200 {
            let _ = bn.forward_train(&x);
        }
        // Running mean has converged near 5, so inputs at the mean map near beta.
        let out = bn.forward_infer(&array![[5.0]]);
        assert!(out[[0, 0]].abs() < 0.2);
    }

    #[test]
    fn snapshot_round_trips() {
        let mut bn = BatchNorm::new(3);
        let _ = bn.forward_train(&array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let restored = BatchNorm::restore(bn.snapshot());
        let x = array![[0.5, 0.5, 0.5]];
        assert_eq!(bn.forward_infer(&x), restored.forward_infer(&x));
    }
}
