#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! The critter's mind: vital stats, four specialized predictors, the
//! reinforcement-learning agent, and the behavior coordinator that runs
//! them in a fixed order every tick. The whole mind serializes to one
//! JSON record and comes back from it, surviving restarts, offline time,
//! and forward-compatible format changes.

/// Vital stats and their time evolution.
#[path = "../stats.rs"]
pub mod stats;

/// Personality kinds and trait encoding.
#[path = "../personality.rs"]
pub mod personality;

/// The four specialized predictors and interaction bookkeeping.
#[path = "../predictors/main.rs"]
pub mod predictors;

/// Life stages and the per-tick pipeline.
#[path = "../coordinator.rs"]
pub mod coordinator;

/// Creature record serialization and the state store.
#[path = "../persistence.rs"]
pub mod persistence;

/// Optional structured telemetry sink.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use coordinator::{
    Capabilities, CoordinatorConfig, Creature, DecisionSource, LifeStage, TickOutcome,
};
pub use persistence::{
    load_creature, save_creature, CreatureRecord, FileStateStore, PersistenceError, PredictorBlock,
    StateStore,
};
pub use personality::Personality;
pub use stats::{CreatureStats, Exertion, StatSnapshot};
pub use telemetry::MindTelemetry;
