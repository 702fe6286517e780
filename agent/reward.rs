use serde::{Deserialize, Serialize};

use crate::actions::Action;

/// The three vitals the reward function reads. A view, not the full
/// creature record; reward shaping must stay a pure function of values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    /// 0 = sated, 100 = starving.
    pub hunger: f32,
    /// 0 = miserable, 100 = delighted.
    pub happiness: f32,
    /// 0 = exhausted, 100 = rested.
    pub energy: f32,
}

/// Everything about the transition that is not a vital sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardContext {
    /// Creature survived the transition.
    pub alive: bool,
    /// Player interacted this tick.
    pub interacted: bool,
    /// That interaction was a positive kind (pet, feed, play).
    pub interaction_positive: bool,
    /// The symbolic goal for this tick was satisfied by the action.
    pub goal_achieved: bool,
    /// How often this action has been chosen so far.
    pub action_count: u64,
}

/// Weights of the shaped reward. The defaults are the tuned values; tests
/// and experiments may override individual terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Multiplier on the happiness delta.
    pub happiness_delta: f32,
    /// Penalty once hunger exceeds 80.
    pub hunger_severe: f32,
    /// Penalty once hunger exceeds 60.
    pub hunger_mild: f32,
    /// Penalty once energy drops below 20.
    pub energy_low: f32,
    /// Bonus for sleeping while energy is below 50.
    pub rest_when_tired: f32,
    /// Per-tick bonus for staying alive.
    pub survival: f32,
    /// One-time penalty for dying.
    pub death: f32,
    /// Bonus when the player interacts.
    pub interaction: f32,
    /// Extra bonus when that interaction is positive.
    pub interaction_positive: f32,
    /// Bonus for seeking food and actually reducing hunger.
    pub feeding_success: f32,
    /// Bonus when the action satisfies the current goal.
    pub goal_success: f32,
    /// Bonus for actions tried fewer than five times.
    pub novelty: f32,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            happiness_delta: 0.1,
            hunger_severe: -2.0,
            hunger_mild: -0.5,
            energy_low: -1.0,
            rest_when_tired: 1.0,
            survival: 0.5,
            death: -50.0,
            interaction: 2.0,
            interaction_positive: 1.0,
            feeding_success: 1.5,
            goal_success: 1.0,
            novelty: 0.3,
        }
    }
}

impl RewardWeights {
    /// Shaped reward for one transition. Pure; identical inputs always
    /// produce the identical reward.
    #[must_use]
    pub fn evaluate(
        &self,
        before: &VitalSigns,
        after: &VitalSigns,
        action: Action,
        context: &RewardContext,
    ) -> f32 {
        let mut reward = (after.happiness - before.happiness) * self.happiness_delta;

        if after.hunger > 80.0 {
            reward += self.hunger_severe;
        } else if after.hunger > 60.0 {
            reward += self.hunger_mild;
        }

        if after.energy < 20.0 {
            reward += self.energy_low;
        } else if action == Action::Sleep && after.energy < 50.0 {
            reward += self.rest_when_tired;
        }

        if context.alive {
            reward += self.survival;
        } else {
            reward += self.death;
        }

        if context.interacted {
            reward += self.interaction;
            if context.interaction_positive {
                reward += self.interaction_positive;
            }
        }

        if action == Action::SeekFood && after.hunger < before.hunger {
            reward += self.feeding_success;
        }

        if context.goal_achieved {
            reward += self.goal_success;
        }

        if context.action_count < 5 {
            reward += self.novelty;
        }

        reward
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vitals(hunger: f32, happiness: f32, energy: f32) -> VitalSigns {
        VitalSigns {
            hunger,
            happiness,
            energy,
        }
    }

    fn alive() -> RewardContext {
        RewardContext {
            alive: true,
            action_count: 100,
            ..RewardContext::default()
        }
    }

    #[test]
    fn survival_alone_pays_half_point() {
        let weights = RewardWeights::default();
        let v = vitals(30.0, 50.0, 80.0);
        let reward = weights.evaluate(&v, &v, Action::Hold, &alive());
        assert!((reward - 0.5).abs() < 1e-6);
    }

    #[test]
    fn death_dominates_everything_else() {
        let weights = RewardWeights::default();
        let before = vitals(90.0, 50.0, 10.0);
        let after = vitals(100.0, 60.0, 10.0);
        let context = RewardContext {
            alive: false,
            action_count: 100,
            ..RewardContext::default()
        };
        let reward = weights.evaluate(&before, &after, Action::Explore, &context);
        assert!(reward < -40.0);
    }

    #[test]
    fn sleeping_while_tired_is_rewarded_unless_critical() {
        let weights = RewardWeights::default();
        let v = vitals(30.0, 50.0, 40.0);
        let rested = weights.evaluate(&v, &v, Action::Sleep, &alive());
        assert!((rested - 1.5).abs() < 1e-6);
        // Below 20 energy the low-energy penalty applies instead.
        let critical = vitals(30.0, 50.0, 15.0);
        let penalized = weights.evaluate(&critical, &critical, Action::Sleep, &alive());
        assert!((penalized - (0.5 - 1.0)).abs() < 1e-6);
    }

    #[test]
    fn successful_feeding_stacks_with_goal_success() {
        let weights = RewardWeights::default();
        let before = vitals(75.0, 50.0, 80.0);
        let after = vitals(45.0, 50.0, 80.0);
        let context = RewardContext {
            alive: true,
            goal_achieved: true,
            action_count: 100,
            ..RewardContext::default()
        };
        let reward = weights.evaluate(&before, &after, Action::SeekFood, &context);
        // survival 0.5 + feeding 1.5 + goal 1.0
        assert!((reward - 3.0).abs() < 1e-6);
    }

    #[test]
    fn rare_actions_earn_novelty() {
        let weights = RewardWeights::default();
        let v = vitals(30.0, 50.0, 80.0);
        let mut context = alive();
        context.action_count = 2;
        let rare = weights.evaluate(&v, &v, Action::Hide, &context);
        context.action_count = 5;
        let common = weights.evaluate(&v, &v, Action::Hide, &context);
        assert!((rare - common - 0.3).abs() < 1e-6);
    }

    #[test]
    fn hunger_thresholds_are_tiered() {
        let weights = RewardWeights::default();
        let mild = vitals(65.0, 50.0, 80.0);
        let severe = vitals(85.0, 50.0, 80.0);
        let mild_reward = weights.evaluate(&mild, &mild, Action::Hold, &alive());
        let severe_reward = weights.evaluate(&severe, &severe, Action::Hold, &alive());
        assert!((mild_reward - 0.0).abs() < 1e-6);
        assert!((severe_reward - (-1.5)).abs() < 1e-6);
    }
}
