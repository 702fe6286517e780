#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Environmental awareness for the critter decision core.
//!
//! A [`snapshot::EnvironmentSnapshot`] is an immutable per-tick value: the
//! window layer assembles one each frame and every downstream component
//! reads from the same copy. The [`encoder`] turns a snapshot into the
//! fixed-length sensory vector the predictors consume, and the
//! [`pointer`] tracker derives pointer kinematics from raw positions.

/// Immutable per-tick environment value.
#[path = "../snapshot.rs"]
pub mod snapshot;

/// Pointer position history and kinematics.
#[path = "../pointer.rs"]
pub mod pointer;

/// Snapshot to fixed-length sensory vector.
#[path = "../encoder.rs"]
pub mod encoder;

pub use encoder::{encode, SensoryVector, SENSORY_LEN};
pub use pointer::{PointerState, PointerTracker};
pub use snapshot::{EnvironmentSnapshot, FieldSize, Rect, Vec2};
