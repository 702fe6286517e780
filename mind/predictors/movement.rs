use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};

use critter_neural::{FeedForwardConfig, FeedForwardNetwork, FeedForwardSnapshot, NeuralError};
use critter_senses::{EnvironmentSnapshot, Vec2};

use crate::personality::TRAIT_DIMS;

const INPUT_DIMS: usize = 2 + 2 + 1 + 1 + 4 + TRAIT_DIMS;
/// Peak speed in pixels per tick before the emotion modifier applies.
const BASE_SPEED: f32 = 5.0;
/// Distance normalization ceiling, pixels.
const TARGET_RANGE: f32 = 500.0;

/// One movement decision for this tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementDecision {
    /// Velocity to apply, pixels per tick.
    pub velocity: Vec2,
    /// Whether to move at all; the velocity is ignored when false.
    pub moving: bool,
}

impl MovementDecision {
    /// The hold-still decision.
    #[must_use]
    pub const fn hold() -> Self {
        Self {
            velocity: Vec2::new(0.0, 0.0),
            moving: false,
        }
    }
}

/// Feedforward model producing a velocity and a move/hold flag from the
/// position, the goal target, energy, edges, and personality.
#[derive(Debug)]
pub struct MovementPredictor {
    network: FeedForwardNetwork,
}

impl MovementPredictor {
    /// Fresh predictor with dropout 0.2 during training.
    pub fn new(learning_rate: f32) -> Result<Self, NeuralError> {
        let config = FeedForwardConfig {
            dropout: 0.2,
            ..FeedForwardConfig::sigmoid(INPUT_DIMS, vec![32, 16, 8], 3, learning_rate)
        };
        Ok(Self {
            network: FeedForwardNetwork::new(config)?,
        })
    }

    fn encode(
        snapshot: &EnvironmentSnapshot,
        target: Vec2,
        energy: f32,
        traits: &[f32; TRAIT_DIMS],
    ) -> Array1<f32> {
        let field = snapshot.field;
        let position = snapshot.position;
        let mut input = Vec::with_capacity(INPUT_DIMS);
        input.push(position.x / field.width);
        input.push(position.y / field.height);
        input.push(target.x / field.width);
        input.push(target.y / field.height);
        input.push(energy / 100.0);
        input.push((position.distance_to(target) / TARGET_RANGE).min(1.0));
        input.push(position.y / field.height);
        input.push((field.height - position.y) / field.height);
        input.push(position.x / field.width);
        input.push((field.width - position.x) / field.width);
        input.extend_from_slice(traits);
        Array1::from_vec(input)
    }

    /// Decides how to move toward `target`. `speed_modifier` comes from
    /// the emotion modifiers and scales the decoded velocity.
    pub fn predict(
        &self,
        snapshot: &EnvironmentSnapshot,
        target: Vec2,
        energy: f32,
        traits: &[f32; TRAIT_DIMS],
        speed_modifier: f32,
    ) -> Result<MovementDecision, NeuralError> {
        let input = Self::encode(snapshot, target, energy, traits);
        let output = self.network.predict(&input)?;
        let speed = BASE_SPEED * 2.0 * speed_modifier.max(0.0);
        Ok(MovementDecision {
            velocity: Vec2::new((output[0] - 0.5) * speed, (output[1] - 0.5) * speed),
            moving: output[2] > 0.5,
        })
    }

    /// One training step reinforcing the executed decision in proportion
    /// to the clamped reward.
    pub fn learn(
        &mut self,
        snapshot: &EnvironmentSnapshot,
        target: Vec2,
        energy: f32,
        traits: &[f32; TRAIT_DIMS],
        decision: &MovementDecision,
        reward: f32,
    ) -> Result<f32, NeuralError> {
        let input = Self::encode(snapshot, target, energy, traits);
        let reward = reward.clamp(0.0, 1.0);
        let desired = Array1::from_vec(vec![
            ((decision.velocity.x / (BASE_SPEED * 2.0)) + 0.5).clamp(0.0, 1.0) * reward
                + 0.5 * (1.0 - reward),
            ((decision.velocity.y / (BASE_SPEED * 2.0)) + 0.5).clamp(0.0, 1.0) * reward
                + 0.5 * (1.0 - reward),
            f32::from(decision.moving && reward > 0.5),
        ]);
        let x = input.insert_axis(Axis(0));
        let target_batch = desired.insert_axis(Axis(0));
        self.network.train_step(&x, &target_batch)
    }

    /// Serializable view.
    #[must_use]
    pub fn snapshot(&self) -> FeedForwardSnapshot {
        self.network.snapshot()
    }

    /// Rebuilds a predictor from its snapshot.
    pub fn restore(snapshot: FeedForwardSnapshot) -> Result<Self, NeuralError> {
        Ok(Self {
            network: FeedForwardNetwork::restore(snapshot)?,
        })
    }
}
