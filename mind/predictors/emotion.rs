use ndarray::Array1;
use serde::{Deserialize, Serialize};

use critter_neural::{FeedForwardConfig, FeedForwardNetwork, FeedForwardSnapshot, NeuralError};

use crate::personality::TRAIT_DIMS;
use crate::stats::StatSnapshot;

/// Number of modeled emotions: joy, excitement, contentment, anxiety,
/// loneliness, in that output order.
pub const EMOTION_COUNT: usize = 5;

const INPUT_DIMS: usize = 3 + 10 + TRAIT_DIMS;

/// Behavioral modifiers derived from the current emotional state,
/// consumed by Movement and by the activity-switch probability.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionModifiers {
    /// Multiplier on movement speed.
    pub movement_speed: f32,
    /// Drive toward the player.
    pub interaction_desire: f32,
    /// Preference for play activities.
    pub playfulness: f32,
    /// Tendency to hide.
    pub fearfulness: f32,
    /// Multiplier on energy drain.
    pub energy_drain: f32,
}

/// Feedforward emotion model over vitals, recent interaction quality,
/// and personality.
#[derive(Debug)]
pub struct EmotionPredictor {
    network: FeedForwardNetwork,
    current: Array1<f32>,
}

impl EmotionPredictor {
    /// Fresh predictor with a neutral starting mood.
    pub fn new(learning_rate: f32) -> Result<Self, NeuralError> {
        let config = FeedForwardConfig::sigmoid(INPUT_DIMS, vec![32, 16], EMOTION_COUNT, learning_rate);
        Ok(Self {
            network: FeedForwardNetwork::new(config)?,
            current: Self::neutral(),
        })
    }

    /// The resting emotional state used before any prediction.
    #[must_use]
    pub fn neutral() -> Array1<f32> {
        Array1::from_vec(vec![0.5, 0.5, 0.5, 0.3, 0.3])
    }

    /// Latest predicted emotion intensities, each in `[0, 1]`.
    #[must_use]
    pub const fn current(&self) -> &Array1<f32> {
        &self.current
    }

    fn encode(
        stats: &StatSnapshot,
        interaction_quality: &[f32; 10],
        traits: &[f32; TRAIT_DIMS],
    ) -> Array1<f32> {
        let mut input = Vec::with_capacity(INPUT_DIMS);
        input.push(stats.hunger / 100.0);
        input.push(stats.energy / 100.0);
        input.push(stats.happiness / 100.0);
        input.extend_from_slice(interaction_quality);
        input.extend_from_slice(traits);
        Array1::from_vec(input)
    }

    /// Updates the emotional state from the current context.
    pub fn predict(
        &mut self,
        stats: &StatSnapshot,
        interaction_quality: &[f32; 10],
        traits: &[f32; TRAIT_DIMS],
    ) -> Result<&Array1<f32>, NeuralError> {
        let input = Self::encode(stats, interaction_quality, traits);
        self.current = self.network.predict(&input)?;
        Ok(&self.current)
    }

    /// One training step toward the expected emotional response.
    pub fn learn(
        &mut self,
        stats: &StatSnapshot,
        interaction_quality: &[f32; 10],
        traits: &[f32; TRAIT_DIMS],
        expected: &Array1<f32>,
    ) -> Result<f32, NeuralError> {
        if expected.len() != EMOTION_COUNT {
            return Err(NeuralError::shape(
                "emotion targets",
                EMOTION_COUNT,
                expected.len(),
            ));
        }
        let input = Self::encode(stats, interaction_quality, traits);
        let x = input.insert_axis(ndarray::Axis(0));
        let target = expected.view().insert_axis(ndarray::Axis(0)).to_owned();
        self.network.train_step(&x, &target)
    }

    /// Modifiers for downstream behavior, derived from the current state.
    #[must_use]
    pub fn modifiers(&self) -> EmotionModifiers {
        let joy = self.current[0];
        let excitement = self.current[1];
        let contentment = self.current[2];
        let anxiety = self.current[3];
        let loneliness = self.current[4];
        EmotionModifiers {
            movement_speed: 0.5 + excitement * 0.8 - contentment * 0.3,
            interaction_desire: joy * 0.5 + loneliness * 0.8,
            playfulness: excitement * 0.7 + joy * 0.5,
            fearfulness: anxiety * 0.9,
            energy_drain: 0.8 + excitement * 0.4 - contentment * 0.2,
        }
    }

    /// Serializable view of the network. The latest emotional state is
    /// persisted separately in the creature record.
    #[must_use]
    pub fn snapshot(&self) -> FeedForwardSnapshot {
        self.network.snapshot()
    }

    /// Rebuilds a predictor from its snapshot, resuming from `current`
    /// when it has the right width.
    pub fn restore(
        snapshot: FeedForwardSnapshot,
        current: Option<Array1<f32>>,
    ) -> Result<Self, NeuralError> {
        let current = current
            .filter(|state| state.len() == EMOTION_COUNT)
            .unwrap_or_else(Self::neutral);
        Ok(Self {
            network: FeedForwardNetwork::restore(snapshot)?,
            current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> StatSnapshot {
        StatSnapshot {
            hunger: 30.0,
            happiness: 70.0,
            energy: 80.0,
            age_days: 2.0,
            minutes_since_fed: 30.0,
            minutes_since_interaction: 10.0,
            alive: true,
        }
    }

    #[test]
    fn prediction_stays_in_unit_range() {
        let mut predictor = EmotionPredictor::new(0.001).unwrap();
        let traits = [0.0; TRAIT_DIMS];
        let emotions = predictor
            .predict(&stats(), &[0.5; 10], &traits)
            .unwrap()
            .clone();
        assert_eq!(emotions.len(), EMOTION_COUNT);
        assert!(emotions.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn wrong_target_width_fails_fast() {
        let mut predictor = EmotionPredictor::new(0.001).unwrap();
        let err = predictor
            .learn(&stats(), &[0.5; 10], &[0.0; TRAIT_DIMS], &Array1::zeros(3))
            .unwrap_err();
        assert!(matches!(err, NeuralError::ShapeMismatch { .. }));
    }

    #[test]
    fn modifiers_follow_the_current_state() {
        let mut predictor = EmotionPredictor::new(0.001).unwrap();
        predictor.current = Array1::from_vec(vec![0.0, 1.0, 0.0, 1.0, 0.0]);
        let modifiers = predictor.modifiers();
        assert!((modifiers.movement_speed - 1.3).abs() < 1e-6);
        assert!((modifiers.fearfulness - 0.9).abs() < 1e-6);
    }

    #[test]
    fn restore_resumes_provided_emotions() {
        let mut predictor = EmotionPredictor::new(0.001).unwrap();
        let _ = predictor
            .predict(&stats(), &[0.8; 10], &[0.0; TRAIT_DIMS])
            .unwrap();
        let restored =
            EmotionPredictor::restore(predictor.snapshot(), Some(predictor.current().clone()))
                .unwrap();
        assert_eq!(restored.current(), predictor.current());
        // A wrong-width resume falls back to the neutral state.
        let neutral =
            EmotionPredictor::restore(predictor.snapshot(), Some(Array1::zeros(2))).unwrap();
        assert_eq!(neutral.current(), &EmotionPredictor::neutral());
    }
}
