use indexmap::IndexMap;
use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, Zip};
use serde::{Deserialize, Serialize};

/// First/second moment accumulators for one named parameter tensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Moments {
    first: ArrayD<f32>,
    second: ArrayD<f32>,
}

/// Adam optimizer with per-parameter moment estimates.
///
/// Parameters are addressed by name so dense layers and recurrent gates can
/// share one optimizer instance; moments live exactly as long as the
/// parameter set they track and are reset only when the architecture
/// changes (fresh construction).
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    step: u64,
    moments: IndexMap<String, Moments>,
}

impl AdamOptimizer {
    /// Creates an optimizer with the given learning rate and default
    /// momentum coefficients (0.9 / 0.999).
    #[must_use]
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            moments: IndexMap::new(),
        }
    }

    /// Overrides the momentum coefficients.
    #[must_use]
    pub const fn with_betas(mut self, beta1: f32, beta2: f32) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Advances the shared step counter. Call once per training step,
    /// before the per-parameter updates of that step.
    pub fn begin_step(&mut self) {
        self.step += 1;
    }

    /// Sets the effective learning rate (driven by a schedule).
    pub fn set_learning_rate(&mut self, learning_rate: f32) {
        self.learning_rate = learning_rate;
    }

    /// Number of completed steps.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.step
    }

    /// Applies one bias-corrected Adam update to a named parameter.
    ///
    /// Moments are lazily initialized to zeros of the gradient's shape on
    /// first sight of a name.
    pub fn update(&mut self, name: &str, param: ArrayViewMutD<'_, f32>, grad: ArrayViewD<'_, f32>) {
        let (beta1, beta2) = (self.beta1, self.beta2);
        let entry = self
            .moments
            .entry(name.to_string())
            .or_insert_with(|| Moments {
                first: ArrayD::zeros(grad.raw_dim()),
                second: ArrayD::zeros(grad.raw_dim()),
            });
        entry
            .first
            .zip_mut_with(&grad, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        entry
            .second
            .zip_mut_with(&grad, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        let correction1 = 1.0 - beta1.powi(self.step.min(i32::MAX as u64) as i32);
        let correction2 = 1.0 - beta2.powi(self.step.min(i32::MAX as u64) as i32);
        let (lr, eps) = (self.learning_rate, self.epsilon);
        let mut param = param;
        Zip::from(&mut param)
            .and(&entry.first)
            .and(&entry.second)
            .for_each(|p, &m, &v| {
                let m_hat = m / correction1;
                let v_hat = v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + eps);
            });
    }

    /// Serializable view of the optimizer state.
    #[must_use]
    pub fn snapshot(&self) -> AdamSnapshot {
        AdamSnapshot {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            step: self.step,
            moments: self
                .moments
                .iter()
                .map(|(name, m)| {
                    (
                        name.clone(),
                        MomentsSnapshot {
                            first: m.first.clone(),
                            second: m.second.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Rebuilds an optimizer from a snapshot.
    #[must_use]
    pub fn restore(snapshot: AdamSnapshot) -> Self {
        Self {
            learning_rate: snapshot.learning_rate,
            beta1: snapshot.beta1,
            beta2: snapshot.beta2,
            epsilon: snapshot.epsilon,
            step: snapshot.step,
            moments: snapshot
                .moments
                .into_iter()
                .map(|(name, m)| {
                    (
                        name,
                        Moments {
                            first: m.first,
                            second: m.second,
                        },
                    )
                })
                .collect(),
        }
    }
}

/// Persisted moment pair for one parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MomentsSnapshot {
    /// First moment (momentum) accumulator.
    pub first: ArrayD<f32>,
    /// Second moment (adaptive rate) accumulator.
    pub second: ArrayD<f32>,
}

/// Persisted Adam state: hyperparameters, step counter, and moments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdamSnapshot {
    /// Current effective learning rate.
    pub learning_rate: f32,
    /// First-moment decay coefficient.
    pub beta1: f32,
    /// Second-moment decay coefficient.
    pub beta2: f32,
    /// Numerical stability constant.
    pub epsilon: f32,
    /// Completed optimizer steps.
    pub step: u64,
    /// Moment accumulators keyed by parameter name.
    #[serde(default)]
    pub moments: IndexMap<String, MomentsSnapshot>,
}

/// Plain stochastic gradient descent, used where adaptive moments are
/// unnecessary (batch-norm scale/shift parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SgdOptimizer {
    /// Step size.
    pub learning_rate: f32,
}

impl SgdOptimizer {
    /// Creates an SGD optimizer.
    #[must_use]
    pub const fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    /// Applies one descent step.
    pub fn update(&self, param: ArrayViewMutD<'_, f32>, grad: ArrayViewD<'_, f32>) {
        let lr = self.learning_rate;
        let mut param = param;
        param.zip_mut_with(&grad, |p, &g| *p -= lr * g);
    }
}

/// Learning-rate decay policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Multiply by `decay_rate` every `decay_steps` steps.
    Step,
    /// `initial * exp(-decay_rate * step)`.
    Exponential,
    /// Cosine annealing over `decay_steps`.
    Cosine,
}

/// Learning-rate schedule advanced once per completed training step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LrSchedule {
    /// Decay policy.
    pub kind: ScheduleKind,
    /// Starting learning rate.
    pub initial: f32,
    /// Decay coefficient (meaning depends on `kind`).
    pub decay_rate: f32,
    /// Period for step/cosine schedules.
    pub decay_steps: u64,
    /// Completed steps.
    #[serde(default)]
    pub step: u64,
}

impl LrSchedule {
    /// Exponential schedule matching the online-learning defaults.
    #[must_use]
    pub const fn exponential(initial: f32, decay_rate: f32) -> Self {
        Self {
            kind: ScheduleKind::Exponential,
            initial,
            decay_rate,
            decay_steps: 1000,
            step: 0,
        }
    }

    /// Current learning rate for this step.
    #[must_use]
    pub fn current(&self) -> f32 {
        match self.kind {
            ScheduleKind::Step => {
                let periods = (self.step / self.decay_steps.max(1)) as i32;
                self.initial * self.decay_rate.powi(periods)
            }
            ScheduleKind::Exponential => self.initial * (-self.decay_rate * self.step as f32).exp(),
            ScheduleKind::Cosine => {
                let phase = self.step as f32 / self.decay_steps.max(1) as f32;
                self.initial * 0.5 * (1.0 + (std::f32::consts::PI * phase).cos())
            }
        }
    }

    /// Advances the step counter.
    pub fn advance(&mut self) {
        self.step += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    fn tensor(values: &[f32]) -> ArrayD<f32> {
        ArrayD::from_shape_vec(vec![values.len()], values.to_vec()).unwrap()
    }

    #[test]
    fn adam_moves_against_gradient() {
        let mut optimizer = AdamOptimizer::new(0.1);
        let mut param = tensor(&[1.0, -1.0]);
        let grad = tensor(&[1.0, -1.0]);
        optimizer.begin_step();
        optimizer.update("w", param.view_mut(), grad.view());
        assert!(param[[0]] < 1.0);
        assert!(param[[1]] > -1.0);
    }

    #[test]
    fn adam_snapshot_round_trips_moments() {
        let mut optimizer = AdamOptimizer::new(0.01);
        let mut param = tensor(&[0.5; 4]);
        optimizer.begin_step();
        optimizer.update("w", param.view_mut(), tensor(&[0.1; 4]).view());
        let snapshot = optimizer.snapshot();
        let restored = AdamOptimizer::restore(snapshot.clone());
        assert_eq!(restored.steps(), 1);
        let again = restored.snapshot();
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            serde_json::to_string(&again).unwrap()
        );
    }

    #[test]
    fn exponential_schedule_decays_monotonically() {
        let mut schedule = LrSchedule::exponential(0.01, 1e-4);
        let start = schedule.current();
        for _ in 0..500 {
            schedule.advance();
        }
        assert!(schedule.current() < start);
    }

    #[test]
    fn sgd_applies_plain_step() {
        let sgd = SgdOptimizer::new(0.5);
        let mut param = tensor(&[2.0]);
        sgd.update(param.view_mut(), tensor(&[1.0]).view());
        assert!((param[[0]] - 1.5).abs() < 1e-6);
    }
}
