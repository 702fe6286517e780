//! The four specialized predictors.
//!
//! Only the coordinator invokes these, in the fixed order Emotion →
//! Social → Activity → Movement: each later predictor consumes outputs of
//! earlier ones. Wrong-sized inputs are construction-order bugs and fail
//! fast as [`critter_neural::NeuralError::ShapeMismatch`].

/// Emotional state from vitals, interaction history, and personality.
pub mod emotion;

/// Player interaction forecasting.
pub mod social;

/// Activity selection over recent context.
pub mod activity;

/// Velocity and move/hold decisions.
pub mod movement;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Kinds of player interaction the social predictor distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Player placed food.
    Feed,
    /// Player played with the creature.
    Play,
    /// Player petted it.
    Pet,
    /// Player talked to it.
    Talk,
    /// Player dismissed or ignored it.
    Ignore,
}

impl InteractionKind {
    /// Every kind, in score-vector order.
    pub const ALL: [Self; 5] = [
        Self::Feed,
        Self::Play,
        Self::Pet,
        Self::Talk,
        Self::Ignore,
    ];

    /// Index into the kind-score vector.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Number of recent interactions retained for predictor features.
const LOG_CAPACITY: usize = 10;

/// Rolling log of recent player interactions, feeding the Emotion and
/// Social predictors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionLog {
    entries: VecDeque<(InteractionKind, f32)>,
}

impl InteractionLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one interaction with a quality in `[0, 1]`.
    pub fn record(&mut self, kind: InteractionKind, quality: f32) {
        if self.entries.len() == LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back((kind, quality.clamp(0.0, 1.0)));
    }

    /// Last ten interaction qualities, oldest first, padded with the
    /// neutral 0.5 when fewer have happened.
    #[must_use]
    pub fn quality_features(&self) -> [f32; LOG_CAPACITY] {
        let mut features = [0.5; LOG_CAPACITY];
        let offset = LOG_CAPACITY - self.entries.len();
        for (slot, (_, quality)) in features[offset..].iter_mut().zip(&self.entries) {
            *slot = *quality;
        }
        features
    }

    /// Relative frequency of each interaction kind in the window.
    #[must_use]
    pub fn kind_profile(&self) -> [f32; 5] {
        let mut profile = [0.0; 5];
        if self.entries.is_empty() {
            return profile;
        }
        for (kind, _) in &self.entries {
            profile[kind.index()] += 1.0;
        }
        let total = self.entries.len() as f32;
        for slot in &mut profile {
            *slot /= total;
        }
        profile
    }

    /// Mean quality of the window, 0.5 when empty.
    #[must_use]
    pub fn mood_estimate(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.5;
        }
        let total: f32 = self.entries.iter().map(|(_, quality)| quality).sum();
        total / self.entries.len() as f32
    }

    /// Number of logged interactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no interaction has been logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bounded_and_padded() {
        let mut log = InteractionLog::new();
        log.record(InteractionKind::Pet, 1.0);
        let features = log.quality_features();
        assert!((features[9] - 1.0).abs() < f32::EPSILON);
        assert!((features[0] - 0.5).abs() < f32::EPSILON);
        for _ in 0..20 {
            log.record(InteractionKind::Feed, 0.8);
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn kind_profile_sums_to_one() {
        let mut log = InteractionLog::new();
        log.record(InteractionKind::Feed, 0.9);
        log.record(InteractionKind::Feed, 0.9);
        log.record(InteractionKind::Ignore, 0.1);
        let profile = log.kind_profile();
        assert!((profile.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((profile[InteractionKind::Feed.index()] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn mood_tracks_quality() {
        let mut log = InteractionLog::new();
        assert!((log.mood_estimate() - 0.5).abs() < f32::EPSILON);
        log.record(InteractionKind::Ignore, 0.0);
        assert!(log.mood_estimate() < 0.5);
    }
}
