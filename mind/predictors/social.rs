use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use critter_neural::{NeuralError, SequenceConfig, SequenceNetwork, SequenceSnapshot};

use super::{InteractionKind, InteractionLog};

const INPUT_DIMS: usize = 12;
const OUTPUT_DIMS: usize = 6;

/// What the social predictor expects from the player.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SocialForecast {
    /// Probability of an imminent interaction, in `[0, 1]`.
    pub probability: f32,
    /// Score per interaction kind, in [`InteractionKind::ALL`] order.
    pub kind_scores: [f32; 5],
}

impl Default for SocialForecast {
    fn default() -> Self {
        Self {
            probability: 0.5,
            kind_scores: [0.2; 5],
        }
    }
}

/// Sequence model over time-of-day and interaction-history features,
/// learning when the player tends to show up and what they do.
#[derive(Debug)]
pub struct SocialPredictor {
    network: SequenceNetwork,
}

impl SocialPredictor {
    /// Fresh predictor: one recurrent layer, hidden width 24, window 50.
    pub fn new(learning_rate: f32) -> Result<Self, NeuralError> {
        let config = SequenceConfig {
            learning_rate,
            ..SequenceConfig::new(INPUT_DIMS, OUTPUT_DIMS)
                .with_hidden(24)
                .with_layers(1)
                .with_window(50)
        };
        Ok(Self {
            network: SequenceNetwork::new(config)?,
        })
    }

    fn encode(
        clock: DateTime<Utc>,
        minutes_since_interaction: f32,
        log: &InteractionLog,
    ) -> Array1<f32> {
        let hour_phase = std::f32::consts::TAU * clock.hour() as f32 / 24.0;
        let day = clock.weekday().num_days_from_monday();
        let day_phase = std::f32::consts::TAU * day as f32 / 7.0;
        let mut input = Vec::with_capacity(INPUT_DIMS);
        input.push(hour_phase.sin());
        input.push(hour_phase.cos());
        input.push(day_phase.sin());
        input.push(day_phase.cos());
        input.push(f32::from(day >= 5));
        input.push((minutes_since_interaction / 60.0).min(1.0));
        input.push(log.mood_estimate());
        input.extend_from_slice(&log.kind_profile());
        Array1::from_vec(input)
    }

    /// Advances the sequence state by one step and reads the forecast.
    pub fn predict(
        &mut self,
        clock: DateTime<Utc>,
        minutes_since_interaction: f32,
        log: &InteractionLog,
    ) -> Result<SocialForecast, NeuralError> {
        let input = Self::encode(clock, minutes_since_interaction, log);
        let output = self.network.step(&input)?;
        let mut kind_scores = [0.0; 5];
        for (slot, value) in kind_scores.iter_mut().zip(output.iter().skip(1)) {
            *slot = *value;
        }
        Ok(SocialForecast {
            probability: output[0],
            kind_scores,
        })
    }

    /// Adds one observation to the training window. `outcome` is the
    /// interaction that happened this step, or `None` when the player
    /// stayed away; positive interactions get a full-strength kind target,
    /// negative ones a damped 0.2.
    pub fn observe(
        &mut self,
        clock: DateTime<Utc>,
        minutes_since_interaction: f32,
        log: &InteractionLog,
        outcome: Option<(InteractionKind, bool)>,
    ) -> Result<(), NeuralError> {
        let input = Self::encode(clock, minutes_since_interaction, log);
        let mut target = Array1::zeros(OUTPUT_DIMS);
        if let Some((kind, positive)) = outcome {
            target[0] = 1.0;
            target[kind.index() + 1] = if positive { 1.0 } else { 0.2 };
        }
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
