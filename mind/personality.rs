use serde::{Deserialize, Serialize};

/// Width of the personality trait vector.
pub const TRAIT_DIMS: usize = 8;

/// Fixed personality kinds, assigned at hatch and never changed.
///
/// The one-hot encoding feeds the Emotion and Movement predictors, so the
/// discriminant order is part of the persisted weight layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Personality {
    /// Seeks games and attention.
    Playful,
    /// Keeps distance from the pointer.
    Shy,
    /// Investigates everything new.
    Curious,
    /// Moves as little as possible.
    Lazy,
    /// High activity, fast drain.
    Energetic,
    /// Strongly attached to the player.
    Affectionate,
    /// Content alone.
    Independent,
    /// Pokes at things it should not.
    Mischievous,
}

impl Personality {
    /// Every personality kind, in trait-vector order.
    pub const ALL: [Self; TRAIT_DIMS] = [
        Self::Playful,
        Self::Shy,
        Self::Curious,
        Self::Lazy,
        Self::Energetic,
        Self::Affectionate,
        Self::Independent,
        Self::Mischievous,
    ];

    /// One-hot trait vector.
    #[must_use]
    pub fn traits(self) -> [f32; TRAIT_DIMS] {
        let mut traits = [0.0; TRAIT_DIMS];
        traits[self as usize] = 1.0;
        traits
    }
}

impl Default for Personality {
    fn default() -> Self {
        Self::Curious
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traits_are_one_hot() {
        for (index, kind) in Personality::ALL.iter().enumerate() {
            let traits = kind.traits();
            assert!((traits.iter().sum::<f32>() - 1.0).abs() < f32::EPSILON);
            assert!((traits[index] - 1.0).abs() < f32::EPSILON);
        }
    }
}
