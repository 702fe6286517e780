use ndarray::{Array2, ArrayD};
use rand::{rngs::SmallRng, Rng};

/// Clamp applied before `exp` so saturated units cannot overflow.
const EXP_CLAMP: f32 = 30.0;

/// Logistic sigmoid with overflow protection.
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x.clamp(-EXP_CLAMP, EXP_CLAMP)).exp())
}

/// Derivative of the sigmoid expressed in terms of its output.
#[must_use]
pub fn sigmoid_derivative(y: f32) -> f32 {
    y * (1.0 - y)
}

/// Rectified linear unit.
#[must_use]
pub fn relu(x: f32) -> f32 {
    x.max(0.0)
}

/// Derivative of ReLU expressed in terms of its pre-activation sign.
#[must_use]
pub fn relu_derivative(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Hyperbolic tangent with overflow protection.
#[must_use]
pub fn tanh(x: f32) -> f32 {
    x.clamp(-EXP_CLAMP, EXP_CLAMP).tanh()
}

/// Derivative of tanh expressed in terms of its output.
#[must_use]
pub fn tanh_derivative(y: f32) -> f32 {
    1.0 - y * y
}

/// He initialization, scaled for ReLU fan-in.
#[must_use]
pub fn he_init(rng: &mut SmallRng, rows: usize, cols: usize) -> Array2<f32> {
    let scale = (2.0 / rows as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| standard_normal(rng) * scale)
}

/// Small-scale Gaussian initialization used for recurrent gate weights.
#[must_use]
pub fn gate_init(rng: &mut SmallRng, rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| standard_normal(rng) * 0.01)
}

/// Standard normal sample via Box-Muller; keeps `rand` to its small feature set.
fn standard_normal(rng: &mut SmallRng) -> f32 {
    let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
    let u2: f32 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (std::f32::consts::TAU * u2).cos()
}

/// Returns true when every element of every gradient is finite.
#[must_use]
pub fn all_finite(gradients: &[ArrayD<f32>]) -> bool {
    gradients
        .iter()
        .all(|grad| grad.iter().all(|value| value.is_finite()))
}

/// Clips a gradient set to a maximum global L2 norm, preserving direction.
///
/// Returns the scale factor that was applied (1.0 when no clipping occurred).
pub fn clip_gradients(gradients: &mut [ArrayD<f32>], max_norm: f32) -> f32 {
    if max_norm <= 0.0 {
        return 1.0;
    }
    let total: f32 = gradients
        .iter()
        .map(|grad| grad.iter().map(|value| value * value).sum::<f32>())
        .sum();
    let norm = total.sqrt();
    if norm <= max_norm {
        return 1.0;
    }
    let scale = max_norm / (norm + 1e-6);
    for grad in gradients.iter_mut() {
        grad.mapv_inplace(|value| value * scale);
    }
    scale
}
