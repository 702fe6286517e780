use ndarray::{Array1, Array2, Axis};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use critter_neural::{FeedForwardConfig, FeedForwardNetwork, FeedForwardSnapshot, NeuralError};

use crate::actions::{Action, ACTION_COUNT};
use crate::replay::{Experience, ReplayBuffer};

/// Hyperparameters of the Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Encoded state width.
    pub state_size: usize,
    /// Number of discrete actions; must match the fixed action set.
    pub actions: usize,
    /// Estimator learning rate.
    pub learning_rate: f32,
    /// Discount factor on future value.
    pub gamma: f32,
    /// Starting exploration rate.
    pub epsilon: f32,
    /// Geometric decay applied once per completed learning step.
    pub epsilon_decay: f32,
    /// Exploration floor; epsilon never drops below it.
    pub epsilon_floor: f32,
    /// Training batch size.
    pub batch: usize,
    /// Replay buffer capacity.
    pub replay_capacity: usize,
    /// Hard-sync the target estimator every this many insertions.
    pub target_sync: u64,
    /// Scale of the curiosity bonus added to Q-values at choice time.
    pub curiosity_weight: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            state_size: 35,
            actions: ACTION_COUNT,
            learning_rate: 0.001,
            gamma: 0.95,
            epsilon: 1.0,
            epsilon_decay: 0.995,
            epsilon_floor: 0.1,
            batch: 32,
            replay_capacity: 10_000,
            target_sync: 100,
            curiosity_weight: 0.1,
        }
    }
}

/// Q-value estimator with an online and a target copy, epsilon-greedy
/// policy, and experience replay.
///
/// The target copy only changes on periodic hard syncs, which keeps the
/// bootstrap targets stable between syncs.
#[derive(Debug)]
pub struct QEstimator {
    config: AgentConfig,
    online: FeedForwardNetwork,
    target: FeedForwardNetwork,
    replay: ReplayBuffer,
    epsilon: f32,
    action_counts: [u64; ACTION_COUNT],
    insertions: u64,
    rng: SmallRng,
}

impl QEstimator {
    /// Builds a fresh agent: random estimator weights, empty replay,
    /// epsilon at its configured start.
    pub fn new(config: AgentConfig) -> Result<Self, NeuralError> {
        if config.actions != ACTION_COUNT {
            return Err(NeuralError::InvalidArchitecture(format!(
                "agent supports exactly {ACTION_COUNT} actions, configured {}",
                config.actions
            )));
        }
        let network_config = FeedForwardConfig::linear(
            config.state_size,
            vec![64, 32],
            config.actions,
            config.learning_rate,
        );
        let online = FeedForwardNetwork::new(network_config.clone())?;
        let mut target = FeedForwardNetwork::new(network_config)?;
        target.copy_parameters_from(&online)?;
        Ok(Self {
            epsilon: config.epsilon,
            replay: ReplayBuffer::new(config.replay_capacity),
            online,
            target,
            action_counts: [0; ACTION_COUNT],
            insertions: 0,
            rng: SmallRng::from_entropy(),
            config,
        })
    }

    /// Current exploration rate.
    #[must_use]
    pub const fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// How often each action has been recorded, in action-index order.
    #[must_use]
    pub const fn action_counts(&self) -> &[u64; ACTION_COUNT] {
        &self.action_counts
    }

    /// Number of experiences currently in replay.
    #[must_use]
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }

    /// Raw Q-values for a state, without any curiosity bonus.
    pub fn q_values(&self, state: &Array1<f32>) -> Result<Array1<f32>, NeuralError> {
        self.online.predict(state)
    }

    /// Greedy action choice: ranks Q-values with a curiosity bonus that
    /// nudges rarely-tried actions. The epsilon split between this and
    /// [`Self::explore`] belongs to the caller.
    pub fn choose(&self, state: &Array1<f32>) -> Result<Action, NeuralError> {
        let mut q = self.online.predict(state)?;
        for (value, count) in q.iter_mut().zip(self.action_counts.iter()) {
            *value += self.config.curiosity_weight / (*count as f32 + 1.0);
        }
        let best = q
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map_or(0, |(index, _)| index);
        Ok(Action::from_index(best).unwrap_or(Action::Hold))
    }

    /// Samples an exploratory action with probability inverse to its
    /// usage count, so under-tried actions come up first.
    pub fn explore(&mut self) -> Action {
        let weights: Vec<f32> = self
            .action_counts
            .iter()
            .map(|count| 1.0 / (*count as f32 + 1.0))
            .collect();
        let total: f32 = weights.iter().sum();
        let mut draw = self.rng.gen::<f32>() * total;
        for (index, weight) in weights.iter().enumerate() {
            draw -= weight;
            if draw <= 0.0 {
                return Action::ALL[index];
            }
        }
        Action::RandomWander
    }

    /// Stores one transition and hard-syncs the target estimator on the
    /// configured insertion cadence.
    pub fn record(&mut self, experience: Experience) -> Result<(), NeuralError> {
        self.action_counts[experience.action.index()] += 1;
        self.replay.push(experience);
        self.insertions += 1;
        if self.config.target_sync > 0 && self.insertions % self.config.target_sync == 0 {
            self.target.copy_parameters_from(&self.online)?;
        }
        Ok(())
    }

    /// One learning step: sample a uniform batch, build one-step targets
    /// against the target estimator, train the online estimator, then
    /// decay epsilon toward the floor.
    ///
    /// Returns `None` without touching anything when replay holds fewer
    /// than one batch.
    pub fn learn(&mut self) -> Result<Option<f32>, NeuralError> {
        if self.replay.len() < self.config.batch {
            return Ok(None);
        }
        let batch = self.replay.sample(&mut self.rng, self.config.batch);
        let n = batch.len();
        let mut states = Array2::zeros((n, self.config.state_size));
        let mut next_states = Array2::zeros((n, self.config.state_size));
        for (row, experience) in batch.iter().enumerate() {
            states.row_mut(row).assign(&experience.state);
            next_states.row_mut(row).assign(&experience.next_state);
        }

        let mut targets = self.online.forward(&states)?;
        let next_q = self.target.forward(&next_states)?;
        for (row, experience) in batch.iter().enumerate() {
            let future = next_q
                .index_axis(Axis(0), row)
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
            let value = if experience.terminal {
                experience.reward
            } else {
                experience.reward + self.config.gamma * future
            };
            targets[[row, experience.action.index()]] = value;
        }
        drop(batch);

        let loss = self.online.train_step(&states, &targets)?;
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_floor);
        Ok(Some(loss))
    }

    /// Serializable view: online weights, policy state, and the truncated
    /// replay tail. The target copy is rebuilt from the online weights on
    /// restore.
    #[must_use]
    pub fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            config: self.config.clone(),
            online: self.online.snapshot(),
            epsilon: self.epsilon,
            action_counts: self.action_counts.to_vec(),
            insertions: self.insertions,
            replay: self.replay.snapshot(),
        }
    }

    /// Rebuilds an agent from its snapshot.
    pub fn restore(snapshot: AgentSnapshot) -> Result<Self, NeuralError> {
        if snapshot.config.actions != ACTION_COUNT {
            return Err(NeuralError::SnapshotMismatch(format!(
                "snapshot built for {} actions, this build has {ACTION_COUNT}",
                snapshot.config.actions
            )));
        }
        let online = FeedForwardNetwork::restore(snapshot.online.clone())?;
        let target = FeedForwardNetwork::restore(snapshot.online)?;
        let mut action_counts = [0_u64; ACTION_COUNT];
        for (slot, count) in action_counts.iter_mut().zip(snapshot.action_counts) {
            *slot = count;
        }
        Ok(Self {
            epsilon: snapshot.epsilon.max(snapshot.config.epsilon_floor),
            replay: ReplayBuffer::restore(snapshot.config.replay_capacity, snapshot.replay),
            online,
            target,
            action_counts,
            insertions: snapshot.insertions,
            rng: SmallRng::from_entropy(),
            config: snapshot.config,
        })
    }
}

/// Persisted agent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    /// Hyperparameters the agent was running with.
    pub config: AgentConfig,
    /// Online estimator weights and optimizer state.
    pub online: FeedForwardSnapshot,
    /// Exploration rate at save time.
    pub epsilon: f32,
    /// Per-action usage counts.
    #[serde(default)]
    pub action_counts: Vec<u64>,
    /// Total experiences ever recorded.
    #[serde(default)]
    pub insertions: u64,
    /// Most recent experiences, truncated to bound file size.
    #[serde(default)]
    pub replay: Vec<Experience>,
}
