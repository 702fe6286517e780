use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use critter_agent::AgentSnapshot;
use critter_neural::{FeedForwardSnapshot, SequenceSnapshot};
use critter_senses::Vec2;

use crate::coordinator::{CoordinatorConfig, Creature, LifeStage};
use crate::personality::Personality;
use crate::predictors::InteractionLog;
use crate::stats::CreatureStats;
use crate::telemetry::MindTelemetry;

const COMPONENT: &str = "persistence";

/// Errors from the persistence layer. Load paths downgrade most of these
/// to a fresh creature; only the store itself surfaces them.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Underlying filesystem failure.
    #[error("state store i/o: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Where creature records live. The mind only needs whole-file reads and
/// writes; the host decides what backs them.
pub trait StateStore {
    /// Reads the full contents at `path`, or `None` when absent.
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Replaces the contents at `path`. Must be atomic: a crash mid-write
    /// may lose the new record but never corrupt the old one.
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError>;
}

/// Filesystem store writing through a temp file and an atomic rename.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStateStore;

impl StateStore for FileStateStore {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut temp = path.to_path_buf();
        temp.set_extension("tmp");
        {
            let mut file = fs::File::create(&temp)?;
            file.write_all(bytes)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&temp, path)?;
        Ok(())
    }
}

/// One persisted predictor: a kind tag plus its raw payload.
///
/// The tag is dispatched through a fixed decode table; unknown tags are
/// skipped on load so newer builds can add predictors without breaking
/// older records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorBlock {
    /// Decode-table key: `"feedforward"` or `"sequence"`.
    pub kind: String,
    /// Serialized snapshot.
    pub data: Value,
}

impl PredictorBlock {
    /// Wraps a feedforward snapshot.
    pub fn feedforward(snapshot: &FeedForwardSnapshot) -> Result<Self, PersistenceError> {
        Ok(Self {
            kind: "feedforward".to_string(),
            data: serde_json::to_value(snapshot)?,
        })
    }

    /// Wraps a sequence snapshot.
    pub fn sequence(snapshot: &SequenceSnapshot) -> Result<Self, PersistenceError> {
        Ok(Self {
            kind: "sequence".to_string(),
            data: serde_json::to_value(snapshot)?,
        })
    }
}

/// A decoded predictor block.
#[derive(Debug)]
pub enum DecodedPredictor {
    /// Feedforward weights.
    FeedForward(FeedForwardSnapshot),
    /// Sequence-model weights and state.
    Sequence(SequenceSnapshot),
}

/// Runs one block through the decode table. Returns `None` (with a log)
/// for unknown kinds or undecodable payloads; the caller keeps a fresh
/// predictor in that case.
#[must_use]
pub fn decode_block(
    name: &str,
    block: &PredictorBlock,
    telemetry: &MindTelemetry,
) -> Option<DecodedPredictor> {
    let decoded = match block.kind.as_str() {
        "feedforward" => serde_json::from_value(block.data.clone())
            .map(DecodedPredictor::FeedForward)
            .ok(),
        "sequence" => serde_json::from_value(block.data.clone())
            .map(DecodedPredictor::Sequence)
            .ok(),
        _ => None,
    };
    if decoded.is_none() {
        telemetry.warn(
            COMPONENT,
            format!("skipping predictor block '{name}' of kind '{}'", block.kind),
        );
    }
    decoded
}

/// Everything about one creature, as written to disk.
///
/// Every non-identity field is optional on load: missing blocks are
/// default-constructed and unknown keys are ignored, so records move
/// forward and backward across builds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureRecord {
    /// Display name.
    pub name: String,
    /// Species label.
    pub species: String,
    /// Palette label for the renderer.
    pub palette: String,
    /// Stable identity.
    pub id: Uuid,
    /// Position at save time.
    pub position: Vec2,
    /// Velocity at save time.
    pub velocity: Vec2,
    /// Life stage at save time.
    pub stage: LifeStage,
    /// Fixed personality.
    pub personality: Personality,
    /// Vital stats and their timestamps.
    pub stats: CreatureStats,
    /// Latest emotional state.
    #[serde(default)]
    pub emotions: Array1<f32>,
    /// Recent interaction log.
    #[serde(default)]
    pub interactions: InteractionLog,
    /// Ticks lived so far.
    #[serde(default)]
    pub tick_count: u64,
    /// Predictor weight blocks keyed by predictor name.
    #[serde(default)]
    pub predictors: IndexMap<String, PredictorBlock>,
    /// RL agent block.
    #[serde(default)]
    pub agent: Option<AgentSnapshot>,
}

impl CreatureRecord {
    /// Encodes the record as JSON bytes. Pure serialization; two calls on
    /// the same record produce identical bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PersistenceError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Decodes a record from JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PersistenceError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Saves a creature through the store. One of the three designated save
/// points (interval, explicit, shutdown) should be the only callers.
pub fn save_creature(
    store: &dyn StateStore,
    path: &Path,
    creature: &Creature,
) -> Result<(), PersistenceError> {
    let record = creature.to_record()?;
    store.write(path, &record.to_bytes()?)
}

/// Loads a creature, tolerating absence and corruption.
///
/// Absent file: a fresh egg. Unparseable file: the original is preserved
/// next to itself with a `.corrupt` extension and a fresh egg is returned;
/// this path never fails the caller. A parsed record gets offline
/// elapsed-time effects applied deterministically, which may yield a
/// deceased creature.
pub fn load_creature(
    store: &dyn StateStore,
    path: &Path,
    config: CoordinatorConfig,
    telemetry: &MindTelemetry,
    now: DateTime<Utc>,
) -> Result<Creature, PersistenceError> {
    let Some(bytes) = store.read(path)? else {
        telemetry.info(COMPONENT, "no saved state, starting fresh");
        return fresh(config, telemetry, now);
    };
    match CreatureRecord::from_bytes(&bytes) {
        Ok(record) => Creature::from_record(record, config, telemetry.clone(), now)
            .map_err(PersistenceError::from),
        Err(err) => {
            telemetry.warn(
                COMPONENT,
                format!("unreadable save, preserving and starting fresh: {err}"),
            );
            let mut corrupt = path.to_path_buf();
            corrupt.set_extension("corrupt");
            store.write(&corrupt, &bytes)?;
            fresh(config, telemetry, now)
        }
    }
}

fn fresh(
    config: CoordinatorConfig,
    telemetry: &MindTelemetry,
    now: DateTime<Utc>,
) -> Result<Creature, PersistenceError> {
    Creature::fresh(config, telemetry.clone(), now).map_err(PersistenceError::from)
}

impl From<critter_neural::NeuralError> for PersistenceError {
    fn from(err: critter_neural::NeuralError) -> Self {
        Self::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn read_absent_returns_none() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        assert!(store.read(&dir.path().join("missing.json")).unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        let path = dir.path().join("creature.json");
        store.write(&path, b"{\"a\":1}").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"{\"a\":1}");
        // No temp file left behind.
        assert!(!dir.path().join("creature.tmp").exists());
    }

    #[test]
    fn overwrite_replaces_contents() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        let path = dir.path().join("creature.json");
        store.write(&path, b"old").unwrap();
        store.write(&path, b"new").unwrap();
        assert_eq!(store.read(&path).unwrap().unwrap(), b"new");
    }

    #[test]
    fn unknown_predictor_kind_is_skipped() {
        let telemetry = MindTelemetry::disabled();
        let block = PredictorBlock {
            kind: "holographic".to_string(),
            data: Value::Null,
        };
        assert!(decode_block("future", &block, &telemetry).is_none());
    }

    #[test]
    fn absent_file_yields_a_fresh_egg() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        let creature = load_creature(
            &store,
            &dir.path().join("creature.json"),
            CoordinatorConfig::default(),
            &MindTelemetry::disabled(),
            now(),
        )
        .unwrap();
        assert_eq!(creature.stage(), LifeStage::Egg);
    }

    #[test]
    fn corrupt_file_is_preserved_and_replaced() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        let path = dir.path().join("creature.json");
        store.write(&path, b"definitely not json").unwrap();
        let creature = load_creature(
            &store,
            &path,
            CoordinatorConfig::default(),
            &MindTelemetry::disabled(),
            now(),
        )
        .unwrap();
        assert_eq!(creature.stage(), LifeStage::Egg);
        let preserved = std::fs::read(dir.path().join("creature.corrupt")).unwrap();
        assert_eq!(preserved, b"definitely not json");
    }

    #[test]
    fn save_then_load_round_trips_through_the_store() {
        let dir = tempdir().unwrap();
        let store = FileStateStore;
        let path = dir.path().join("creature.json");
        let mut creature =
            Creature::fresh(CoordinatorConfig::default(), MindTelemetry::disabled(), now())
                .unwrap();
        creature.hatch(now());
        save_creature(&store, &path, &creature).unwrap();
        let restored = load_creature(
            &store,
            &path,
            CoordinatorConfig::default(),
            &MindTelemetry::disabled(),
            now() + chrono::Duration::seconds(5),
        )
        .unwrap();
        assert_eq!(restored.id(), creature.id());
        assert_eq!(restored.stage(), LifeStage::Active);
    }

    #[test]
    fn undecodable_payload_is_skipped() {
        let telemetry = MindTelemetry::disabled();
        let block = PredictorBlock {
            kind: "feedforward".to_string(),
            data: serde_json::json!({"weights": "not really"}),
        };
        assert!(decode_block("emotion", &block, &telemetry).is_none());
    }
}
