use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pointer::PointerState;

/// A 2D point or vector in field (screen) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// Horizontal component, pixels.
    pub x: f32,
    /// Vertical component, pixels.
    pub y: f32,
}

impl Vec2 {
    /// Constructs a vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Angle in radians from this point toward another.
    #[must_use]
    pub fn angle_to(self, other: Self) -> f32 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    /// Dot product.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

/// Dimensions of the field the creature lives on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSize {
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
}

impl Default for FieldSize {
    fn default() -> Self {
        Self {
            width: 1920.0,
            height: 1080.0,
        }
    }
}

/// An axis-aligned obstacle rectangle (icon, window, furniture).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width.
    pub width: f32,
    /// Height.
    pub height: f32,
}

impl Rect {
    /// Center point of the rectangle.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Everything the creature can sense on one tick.
///
/// Assembled once per frame by the window layer and passed by shared
/// reference; nothing downstream mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    /// Creature position.
    pub position: Vec2,
    /// Creature velocity.
    pub velocity: Vec2,
    /// Pointer position and velocity as tracked this tick.
    pub pointer: PointerState,
    /// Field dimensions.
    pub field: FieldSize,
    /// Obstacle rectangles currently on the field.
    pub obstacles: Vec<Rect>,
    /// Location of available food, when any is placed.
    #[serde(default)]
    pub food: Option<Vec2>,
    /// Wall-clock time of the tick.
    pub clock: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    /// Distance from the creature to the nearest obstacle center, if any.
    #[must_use]
    pub fn nearest_obstacle(&self) -> Option<(f32, Vec2)> {
        self.obstacles
            .iter()
            .map(|rect| {
                let center = rect.center();
                (self.position.distance_to(center), center)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}
