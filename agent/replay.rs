use std::collections::VecDeque;

use ndarray::Array1;
use rand::rngs::SmallRng;
use rand::seq::index::sample;
use serde::{Deserialize, Serialize};

use crate::actions::Action;

/// Maximum number of experiences written to a save file.
pub const PERSISTED_EXPERIENCES: usize = 100;

/// One immutable transition: what the world looked like, what was done,
/// what it paid, and where it led.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    /// Encoded state before the action.
    pub state: Array1<f32>,
    /// Action taken.
    pub action: Action,
    /// Shaped reward received.
    pub reward: f32,
    /// Encoded state after the action.
    pub next_state: Array1<f32>,
    /// Whether the creature died on this transition.
    pub terminal: bool,
}

/// Bounded ring of past experiences, sampled uniformly for training so
/// updates decorrelate from the latest transition.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Appends one experience, evicting the oldest when full.
    pub fn push(&mut self, experience: Experience) {
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(experience);
    }

    /// Number of stored experiences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Uniformly samples `batch` distinct experiences. Returns fewer when
    /// the buffer holds fewer.
    #[must_use]
    pub fn sample(&self, rng: &mut SmallRng, batch: usize) -> Vec<&Experience> {
        let take = batch.min(self.buffer.len());
        sample(rng, self.buffer.len(), take)
            .into_iter()
            .map(|index| &self.buffer[index])
            .collect()
    }

    /// Most recent experiences, truncated for persistence.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Experience> {
        let skip = self.buffer.len().saturating_sub(PERSISTED_EXPERIENCES);
        self.buffer.iter().skip(skip).cloned().collect()
    }

    /// Rebuilds a buffer from persisted experiences.
    #[must_use]
    pub fn restore(capacity: usize, experiences: Vec<Experience>) -> Self {
        let mut buffer = Self::new(capacity);
        for experience in experiences {
            buffer.push(experience);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn experience(tag: f32) -> Experience {
        Experience {
            state: Array1::from_elem(4, tag),
            action: Action::Explore,
            reward: tag,
            next_state: Array1::from_elem(4, tag + 1.0),
            terminal: false,
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let mut buffer = ReplayBuffer::new(3);
        for tag in 0..5 {
            buffer.push(experience(tag as f32));
        }
        assert_eq!(buffer.len(), 3);
        let rewards: Vec<f32> = buffer.buffer.iter().map(|e| e.reward).collect();
        assert_eq!(rewards, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sampling_is_without_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        for tag in 0..10 {
            buffer.push(experience(tag as f32));
        }
        let mut rng = SmallRng::seed_from_u64(1);
        let batch = buffer.sample(&mut rng, 10);
        let mut rewards: Vec<i32> = batch.iter().map(|e| e.reward as i32).collect();
        rewards.sort_unstable();
        assert_eq!(rewards, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn sample_caps_at_buffer_len() {
        let mut buffer = ReplayBuffer::new(100);
        buffer.push(experience(0.0));
        let mut rng = SmallRng::seed_from_u64(2);
        assert_eq!(buffer.sample(&mut rng, 32).len(), 1);
    }

    #[test]
    fn snapshot_truncates_to_recent_records() {
        let mut buffer = ReplayBuffer::new(10_000);
        for tag in 0..250 {
            buffer.push(experience(tag as f32));
        }
        let snapshot = buffer.snapshot();
        assert_eq!(snapshot.len(), PERSISTED_EXPERIENCES);
        assert_eq!(snapshot[0].reward, 150.0);
        assert_eq!(snapshot.last().unwrap().reward, 249.0);
    }
}
