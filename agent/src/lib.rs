#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Reinforcement learning for the critter decision core.
//!
//! The agent owns a Q-value estimator (online plus target copy), a bounded
//! replay buffer, and an epsilon-greedy policy with a curiosity bias toward
//! rarely-tried actions. Rewards are shaped by a pure function over the
//! creature's vital signs before and after each action.

/// Discrete action set and symbolic goals.
#[path = "../actions.rs"]
pub mod actions;

/// Bounded experience replay.
#[path = "../replay.rs"]
pub mod replay;

/// Reward shaping.
#[path = "../reward.rs"]
pub mod reward;

/// Q-estimator and epsilon-greedy policy.
#[path = "../qlearn.rs"]
pub mod qlearn;

pub use actions::{Action, Goal, ACTION_COUNT};
pub use qlearn::{AgentConfig, AgentSnapshot, QEstimator};
pub use replay::{Experience, ReplayBuffer, PERSISTED_EXPERIENCES};
pub use reward::{RewardContext, RewardWeights, VitalSigns};
