#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Neural primitives for the critter decision core: dense feedforward
//! predictors, a bounded-window gated sequence model, and the Adam/SGD
//! optimizer stack they share. Everything here learns online, one small
//! gradient step at a time, and must stay numerically sane while doing so.

/// Error taxonomy shared by every learner.
#[path = "../error.rs"]
pub mod error;

/// Activation functions, weight initialization, gradient clipping.
#[path = "../tensor.rs"]
pub mod tensor;

/// Adaptive per-parameter optimizers and learning-rate schedules.
#[path = "../optimizer.rs"]
pub mod optimizer;

/// Multi-layer feedforward predictor.
#[path = "../feedforward/main.rs"]
pub mod feedforward;

/// Two-layer gated sequence memory with a bounded training window.
#[path = "../recurrent/main.rs"]
pub mod recurrent;

pub use error::NeuralError;
pub use feedforward::{FeedForwardConfig, FeedForwardNetwork, FeedForwardSnapshot, OutputActivation};
pub use optimizer::{AdamOptimizer, AdamSnapshot, LrSchedule, ScheduleKind, SgdOptimizer};
pub use recurrent::{SequenceConfig, SequenceNetwork, SequenceSnapshot};
pub use tensor::clip_gradients;
