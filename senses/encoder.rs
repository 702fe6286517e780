use chrono::{Datelike, Timelike};
use ndarray::Array1;

use crate::snapshot::EnvironmentSnapshot;

/// Length of the encoded sensory vector.
pub const SENSORY_LEN: usize = 28;

/// Fixed-length ordered sensory features, every value in `[-1, 1]`.
pub type SensoryVector = Array1<f32>;

/// Velocity normalization ceiling, pixels per second.
const MAX_POINTER_SPEED: f32 = 1000.0;
/// Pointer distance normalization ceiling, pixels.
const POINTER_RANGE: f32 = 500.0;
/// Range within which the approach flag can fire, pixels.
const APPROACH_RANGE: f32 = 200.0;
/// Edge distance normalization ceiling, pixels.
const EDGE_RANGE: f32 = 200.0;
/// Obstacle distance normalization ceiling, pixels.
const OBSTACLE_RANGE: f32 = 300.0;
/// Radius counting as "nearby" for the obstacle count feature, pixels.
const NEARBY_RANGE: f32 = 200.0;

/// Encodes one environment snapshot into the sensory vector.
///
/// Layout: time of day (6), day of week (3), pointer (11), proximity (8).
/// Deterministic for a given snapshot; the wall clock is read from the
/// snapshot, never from the system.
#[must_use]
pub fn encode(snapshot: &EnvironmentSnapshot) -> SensoryVector {
    let mut features = Vec::with_capacity(SENSORY_LEN);
    features.extend_from_slice(&time_of_day(snapshot));
    features.extend_from_slice(&day_of_week(snapshot));
    features.extend_from_slice(&pointer_features(snapshot));
    features.extend_from_slice(&proximity_features(snapshot));
    Array1::from_vec(features)
}

/// Hour sine/cosine plus morning/afternoon/evening/night flags.
fn time_of_day(snapshot: &EnvironmentSnapshot) -> [f32; 6] {
    let hour = snapshot.clock.hour();
    let phase = std::f32::consts::TAU * hour as f32 / 24.0;
    [
        phase.sin(),
        phase.cos(),
        f32::from((6..12).contains(&hour)),
        f32::from((12..18).contains(&hour)),
        f32::from((18..22).contains(&hour)),
        f32::from(!(6..22).contains(&hour)),
    ]
}

/// Weekday sine/cosine plus weekend flag.
fn day_of_week(snapshot: &EnvironmentSnapshot) -> [f32; 3] {
    let day = snapshot.clock.weekday().num_days_from_monday();
    let phase = std::f32::consts::TAU * day as f32 / 7.0;
    [phase.sin(), phase.cos(), f32::from(day >= 5)]
}

/// Pointer position, clipped velocity, distance, bearing, approach flag,
/// and three speed-band flags.
fn pointer_features(snapshot: &EnvironmentSnapshot) -> [f32; 11] {
    let pointer = snapshot.pointer;
    let distance = snapshot.position.distance_to(pointer.position);
    let bearing = snapshot.position.angle_to(pointer.position);
    let speed = pointer.speed();
    [
        pointer.position.x / snapshot.field.width,
        pointer.position.y / snapshot.field.height,
        (pointer.velocity.x / MAX_POINTER_SPEED).clamp(-1.0, 1.0),
        (pointer.velocity.y / MAX_POINTER_SPEED).clamp(-1.0, 1.0),
        (distance / POINTER_RANGE).min(1.0),
        bearing.sin(),
        bearing.cos(),
        f32::from(pointer.approaching(snapshot.position, APPROACH_RANGE)),
        f32::from(speed < 50.0),
        f32::from((50.0..200.0).contains(&speed)),
        f32::from(speed >= 200.0),
    ]
}

/// Four edge distances, nearest-obstacle distance and bearing, and a
/// normalized nearby-obstacle count.
fn proximity_features(snapshot: &EnvironmentSnapshot) -> [f32; 8] {
    let position = snapshot.position;
    let field = snapshot.field;
    let top = (position.y / EDGE_RANGE).min(1.0);
    let bottom = ((field.height - position.y) / EDGE_RANGE).min(1.0);
    let left = (position.x / EDGE_RANGE).min(1.0);
    let right = ((field.width - position.x) / EDGE_RANGE).min(1.0);

    let (obstacle_distance, bearing_sin, bearing_cos) = snapshot.nearest_obstacle().map_or(
        (1.0, 0.0, 1.0),
        |(distance, center)| {
            let bearing = position.angle_to(center);
            ((distance / OBSTACLE_RANGE).min(1.0), bearing.sin(), bearing.cos())
        },
    );
    let nearby = snapshot
        .obstacles
        .iter()
        .filter(|rect| position.distance_to(rect.center()) < NEARBY_RANGE)
        .count();
    let nearby = (nearby as f32 / 5.0).min(1.0);

    [
        top,
        bottom,
        left,
        right,
        obstacle_distance,
        bearing_sin,
        bearing_cos,
        nearby,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::PointerState;
    use crate::snapshot::{FieldSize, Rect, Vec2};
    use chrono::{TimeZone, Utc};

    fn snapshot_at(hour: u32) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            position: Vec2::new(960.0, 540.0),
            velocity: Vec2::default(),
            pointer: PointerState::default(),
            field: FieldSize::default(),
            obstacles: Vec::new(),
            food: None,
            // 2026-06-01 is a Monday.
            clock: Utc.with_ymd_and_hms(2026, 6, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn vector_has_fixed_length_and_bounded_values() {
        let mut snapshot = snapshot_at(14);
        snapshot.obstacles.push(Rect {
            x: 900.0,
            y: 500.0,
            width: 80.0,
            height: 80.0,
        });
        snapshot.pointer = PointerState {
            position: Vec2::new(1000.0, 560.0),
            velocity: Vec2::new(2500.0, -40.0),
        };
        let vector = encode(&snapshot);
        assert_eq!(vector.len(), SENSORY_LEN);
        assert!(vector.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn encoding_is_deterministic() {
        let snapshot = snapshot_at(9);
        assert_eq!(encode(&snapshot), encode(&snapshot));
    }

    #[test]
    fn night_and_weekend_flags() {
        let mut snapshot = snapshot_at(23);
        // 2026-06-06 is a Saturday.
        snapshot.clock = Utc.with_ymd_and_hms(2026, 6, 6, 23, 0, 0).unwrap();
        let vector = encode(&snapshot);
        // Night flag is the sixth time feature, weekend flag the last day feature.
        assert!((vector[5] - 1.0).abs() < f32::EPSILON);
        assert!((vector[8] - 1.0).abs() < f32::EPSILON);
        assert!(vector[2].abs() < f32::EPSILON);
    }

    #[test]
    fn morning_flag_set_in_morning() {
        let vector = encode(&snapshot_at(8));
        assert!((vector[2] - 1.0).abs() < f32::EPSILON);
        assert!(vector[5].abs() < f32::EPSILON);
    }

    #[test]
    fn no_obstacles_yields_neutral_proximity() {
        let vector = encode(&snapshot_at(12));
        // Nearest-obstacle distance saturates at 1 and the count is zero.
        assert!((vector[24] - 1.0).abs() < f32::EPSILON);
        assert!(vector[27].abs() < f32::EPSILON);
    }

    #[test]
    fn approach_flag_fires_when_pointer_closes_in() {
        let mut snapshot = snapshot_at(10);
        snapshot.pointer = PointerState {
            position: Vec2::new(1000.0, 540.0),
            velocity: Vec2::new(-300.0, 0.0),
        };
        let vector = encode(&snapshot);
        assert!((vector[16] - 1.0).abs() < f32::EPSILON);
    }
}
