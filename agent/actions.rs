use serde::{Deserialize, Serialize};

/// Number of discrete actions the agent can take.
pub const ACTION_COUNT: usize = 10;

/// The fixed action set the Q-estimator scores.
///
/// The discriminant order is load-bearing: it is the output index of the
/// estimator and the index into the persisted action counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Move toward the pointer.
    ChaseTarget,
    /// Visit an unvisited part of the field.
    Explore,
    /// Head for the food location.
    SeekFood,
    /// Duck behind the nearest obstacle.
    Hide,
    /// Play near the player.
    Play,
    /// Sleep to recover energy.
    Sleep,
    /// Return to the field center.
    MoveToCenter,
    /// Stay put.
    Hold,
    /// Solicit attention from the player.
    SeekInteraction,
    /// Drift in a random direction.
    RandomWander,
}

impl Action {
    /// Every action, in estimator output order.
    pub const ALL: [Self; ACTION_COUNT] = [
        Self::ChaseTarget,
        Self::Explore,
        Self::SeekFood,
        Self::Hide,
        Self::Play,
        Self::Sleep,
        Self::MoveToCenter,
        Self::Hold,
        Self::SeekInteraction,
        Self::RandomWander,
    ];

    /// Estimator output index of this action.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Action for an estimator output index, if in range.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name for logs and debug overlays.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ChaseTarget => "chase target",
            Self::Explore => "explore",
            Self::SeekFood => "seek food",
            Self::Hide => "hide",
            Self::Play => "play",
            Self::Sleep => "sleep",
            Self::MoveToCenter => "move to center",
            Self::Hold => "hold",
            Self::SeekInteraction => "seek interaction",
            Self::RandomWander => "wander",
        }
    }
}

/// Symbolic goal recomputed from the vital signs each tick. Never
/// persisted; the derivation is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    /// Hunger is pressing.
    SeekFood,
    /// Energy is low.
    Rest,
    /// Lonely; find the player.
    SeekInteraction,
    /// Player is close, engage.
    Play,
    /// Nothing urgent.
    Explore,
}

impl Goal {
    /// Derives the goal from current vitals, in priority order.
    #[must_use]
    pub fn derive(hunger: f32, energy: f32, happiness: f32, player_nearby: bool) -> Self {
        if hunger > 70.0 {
            Self::SeekFood
        } else if energy < 25.0 {
            Self::Rest
        } else if happiness < 40.0 {
            Self::SeekInteraction
        } else if player_nearby {
            Self::Play
        } else {
            Self::Explore
        }
    }

    /// The action taken when the policy falls back to the goal instead of
    /// the learned choice.
    #[must_use]
    pub const fn default_action(self) -> Action {
        match self {
            Self::SeekFood => Action::SeekFood,
            Self::Rest => Action::Sleep,
            Self::SeekInteraction => Action::SeekInteraction,
            Self::Play => Action::Play,
            Self::Explore => Action::Explore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_round_trip() {
        for action in Action::ALL {
            assert_eq!(Action::from_index(action.index()), Some(action));
        }
        assert_eq!(Action::from_index(ACTION_COUNT), None);
    }

    #[test]
    fn goal_priority_order() {
        // Hunger outranks everything.
        assert_eq!(Goal::derive(75.0, 10.0, 10.0, true), Goal::SeekFood);
        assert_eq!(Goal::derive(10.0, 20.0, 10.0, true), Goal::Rest);
        assert_eq!(Goal::derive(10.0, 80.0, 30.0, true), Goal::SeekInteraction);
        assert_eq!(Goal::derive(10.0, 80.0, 80.0, true), Goal::Play);
        assert_eq!(Goal::derive(10.0, 80.0, 80.0, false), Goal::Explore);
    }

    #[test]
    fn serde_names_are_stable() {
        let json = serde_json::to_string(&Action::SeekInteraction).unwrap();
        assert_eq!(json, "\"seek_interaction\"");
    }
}
