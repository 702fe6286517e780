use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Vec2;

/// Number of past pointer positions retained for velocity estimation.
const HISTORY_LEN: usize = 10;

/// Pointer position and estimated velocity at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointerState {
    /// Pointer position, pixels.
    pub position: Vec2,
    /// Estimated velocity, pixels per second.
    pub velocity: Vec2,
}

impl PointerState {
    /// Velocity magnitude in pixels per second.
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Whether the pointer is closing on `target`: it must be moving
    /// toward it and already within `threshold` pixels.
    #[must_use]
    pub fn approaching(&self, target: Vec2, threshold: f32) -> bool {
        let toward = target - self.position;
        toward.dot(self.velocity) > 0.0 && self.position.distance_to(target) < threshold
    }
}

/// Tracks raw pointer positions and derives per-second velocity from the
/// two most recent samples.
#[derive(Debug, Clone, Default)]
pub struct PointerTracker {
    history: VecDeque<(Vec2, DateTime<Utc>)>,
    state: PointerState,
}

impl PointerTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pointer sample taken at `at`.
    pub fn update(&mut self, position: Vec2, at: DateTime<Utc>) {
        self.history.push_back((position, at));
        while self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }
        self.state.position = position;
        if self.history.len() >= 2 {
            let (prev, prev_at) = self.history[self.history.len() - 2];
            let elapsed = (at - prev_at).num_milliseconds() as f32 / 1000.0;
            // Coincident timestamps would blow the estimate up.
            let elapsed = elapsed.max(0.001);
            self.state.velocity = Vec2::new(
                (position.x - prev.x) / elapsed,
                (position.y - prev.y) / elapsed,
            );
        }
    }

    /// Current pointer state.
    #[must_use]
    pub const fn state(&self) -> PointerState {
        self.state
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn velocity_comes_from_last_two_samples() {
        let mut tracker = PointerTracker::new();
        tracker.update(Vec2::new(0.0, 0.0), at(0));
        tracker.update(Vec2::new(100.0, 0.0), at(1000));
        let state = tracker.state();
        assert!((state.velocity.x - 100.0).abs() < 1e-3);
        assert!((state.velocity.y).abs() < 1e-6);
    }

    #[test]
    fn history_is_bounded() {
        let mut tracker = PointerTracker::new();
        for index in 0..25 {
            tracker.update(Vec2::new(index as f32, 0.0), at(index * 16));
        }
        assert_eq!(tracker.history_len(), 10);
    }

    #[test]
    fn approaching_requires_closing_velocity_and_range() {
        let closing = PointerState {
            position: Vec2::new(0.0, 0.0),
            velocity: Vec2::new(50.0, 0.0),
        };
        let target = Vec2::new(100.0, 0.0);
        assert!(closing.approaching(target, 200.0));
        // Moving away.
        let receding = PointerState {
            position: Vec2::new(0.0, 0.0),
            velocity: Vec2::new(-50.0, 0.0),
        };
        assert!(!receding.approaching(target, 200.0));
        // Closing but out of range.
        assert!(!closing.approaching(Vec2::new(500.0, 0.0), 200.0));
    }
}
