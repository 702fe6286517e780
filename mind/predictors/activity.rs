use ndarray::Array1;
use serde::{Deserialize, Serialize};

use critter_neural::{NeuralError, SequenceConfig, SequenceNetwork, SequenceSnapshot};
use critter_senses::SensoryVector;

use super::emotion::EMOTION_COUNT;

/// Number of selectable activities.
pub const ACTIVITY_COUNT: usize = 6;

const INPUT_DIMS: usize = 28 + EMOTION_COUNT + 1;

/// The activities the predictor scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Play with a toy.
    Play,
    /// Chase the pointer.
    Chase,
    /// Hide behind an obstacle.
    Hide,
    /// Roam the field.
    Explore,
    /// Sleep.
    Sleep,
    /// Eat available food.
    Eat,
}

impl ActivityKind {
    /// Every activity, in score order.
    pub const ALL: [Self; ACTIVITY_COUNT] = [
        Self::Play,
        Self::Chase,
        Self::Hide,
        Self::Explore,
        Self::Sleep,
        Self::Eat,
    ];

    /// Score-vector index.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Sequence model choosing an activity from the sensory vector, the
/// emotional state, and the social forecast.
#[derive(Debug)]
pub struct ActivityPredictor {
    network: SequenceNetwork,
}

impl ActivityPredictor {
    /// Fresh predictor: two recurrent layers, hidden width 32, window 30.
    pub fn new(learning_rate: f32) -> Result<Self, NeuralError> {
        let config = SequenceConfig {
            learning_rate,
            ..SequenceConfig::new(INPUT_DIMS, ACTIVITY_COUNT).with_window(30)
        };
        Ok(Self {
            network: SequenceNetwork::new(config)?,
        })
    }

    fn encode(
        sensory: &SensoryVector,
        emotions: &Array1<f32>,
        social_probability: f32,
    ) -> Result<Array1<f32>, NeuralError> {
        if sensory.len() != 28 {
            return Err(NeuralError::shape("activity sensory input", 28, sensory.len()));
        }
        if emotions.len() != EMOTION_COUNT {
            return Err(NeuralError::shape(
                "activity emotion input",
                EMOTION_COUNT,
                emotions.len(),
            ));
        }
        let mut input = Vec::with_capacity(INPUT_DIMS);
        input.extend(sensory.iter().copied());
        input.extend(emotions.iter().copied());
        input.push(social_probability);
        Ok(Array1::from_vec(input))
    }

    /// Scores every activity and returns the best one with its scores.
    pub fn predict(
        &mut self,
        sensory: &SensoryVector,
        emotions: &Array1<f32>,
        social_probability: f32,
    ) -> Result<(ActivityKind, Array1<f32>), NeuralError> {
        let input = Self::encode(sensory, emotions, social_probability)?;
        let scores = self.network.step(&input)?;
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(index, _)| index);
        Ok((ActivityKind::ALL[best], scores))
    }

    /// Adds one outcome to the training window: the chosen activity's
    /// target is the clamped reward, every other activity's is zero.
    pub fn observe(
        &mut self,
        sensory: &SensoryVector,
        emotions: &Array1<f32>,
        social_probability: f32,
        chosen: ActivityKind,
        reward: f32,
    ) -> Result<(), NeuralError> {
        let input = Self::encode(sensory, emotions, social_probability)?;
        let mut target = Array1::zeros(ACTIVITY_COUNT);
        target[chosen.index()] = reward.clamp(0.0, 1.0);
        self.network.observe(input, target)
    }

    /// One backprop-through-time pass over the stored window.
    pub fn train(&mut self) -> Result<f32, NeuralError> {
        self.network.train_on_window()
    }

    /// Serializable view.
    #[must_use]
    pub fn snapshot(&self) -> SequenceSnapshot {
        self.network.snapshot()
    }

    /// Rebuilds a predictor from its snapshot.
    pub fn restore(snapshot: SequenceSnapshot) -> Result<Self, NeuralError> {
        Ok(Self {
            network: SequenceNetwork::restore(snapshot)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensory() -> SensoryVector {
        Array1::from_elem(28, 0.3)
    }

    #[test]
    fn predicts_one_of_the_fixed_activities() {
        let mut predictor = ActivityPredictor::new(0.001).unwrap();
        let emotions = Array1::from_elem(EMOTION_COUNT, 0.5);
        let (kind, scores) = predictor.predict(&sensory(), &emotions, 0.4).unwrap();
        assert!(ActivityKind::ALL.contains(&kind));
        assert_eq!(scores.len(), ACTIVITY_COUNT);
    }

    #[test]
    fn wrong_sensory_width_fails_fast() {
        let mut predictor = ActivityPredictor::new(0.001).unwrap();
        let emotions = Array1::from_elem(EMOTION_COUNT, 0.5);
        let err = predictor
            .predict(&Array1::zeros(20), &emotions, 0.4)
            .unwrap_err();
        assert!(matches!(err, NeuralError::ShapeMismatch { .. }));
    }

    #[test]
    fn observes_and_trains_on_rewarded_outcomes() {
        let mut predictor = ActivityPredictor::new(0.01).unwrap();
        let emotions = Array1::from_elem(EMOTION_COUNT, 0.5);
        for _ in 0..30 {
            predictor
                .observe(&sensory(), &emotions, 0.4, ActivityKind::Explore, 0.8)
                .unwrap();
        }
        assert!(predictor.train().unwrap().is_finite());
    }
}
