use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Hunger accrual per minute of elapsed time.
pub const HUNGER_RATE_PER_MIN: f32 = 0.1;
/// How much one feeding reduces hunger.
pub const FEED_AMOUNT: f32 = 30.0;
/// Hunger level at which the creature dies.
pub const STARVATION_THRESHOLD: f32 = 100.0;
/// Width of the stat slice of the RL state vector.
pub const STAT_FEATURES: usize = 7;

/// What the creature is doing with its body, for energy accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exertion {
    /// Asleep or dormant; energy recovers.
    Resting,
    /// Awake but still.
    Idle,
    /// Moving or playing; energy drains fastest.
    Active,
}

impl Exertion {
    /// Energy change per minute for this exertion level.
    #[must_use]
    pub const fn energy_rate(self) -> f32 {
        match self {
            Self::Resting => 1.0,
            Self::Idle => -0.1,
            Self::Active => -0.5,
        }
    }
}

/// The creature's vital stats and the timestamps they evolve from.
///
/// All stat fields live in `[0, 100]`. Time only moves through the
/// timestamps; every mutation takes `now` explicitly so replays and
/// offline catch-up stay deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureStats {
    /// 0 = sated, 100 = starved to death.
    pub hunger: f32,
    /// 0 = miserable, 100 = delighted.
    pub happiness: f32,
    /// 0 = exhausted, 100 = rested.
    pub energy: f32,
    /// Age in days, derived from `birth` on each advance.
    pub age_days: f32,
    /// When the creature hatched.
    pub birth: DateTime<Utc>,
    /// Last feeding.
    pub last_fed: DateTime<Utc>,
    /// Last player interaction.
    pub last_interaction: DateTime<Utc>,
    /// Last time `advance` or `offline_elapse` ran.
    pub last_update: DateTime<Utc>,
}

impl CreatureStats {
    /// Fresh stats for a creature hatching at `now`.
    #[must_use]
    pub const fn hatched(now: DateTime<Utc>) -> Self {
        Self {
            hunger: 0.0,
            happiness: 100.0,
            energy: 100.0,
            age_days: 0.0,
            birth: now,
            last_fed: now,
            last_interaction: now,
            last_update: now,
        }
    }

    /// Advances the stats to `now` under the given exertion.
    ///
    /// Hunger accrues at the fixed rate. Happiness decays slowly, faster
    /// while hunger is above 50. Energy follows the exertion rate.
    pub fn advance(&mut self, now: DateTime<Utc>, exertion: Exertion) {
        let minutes = self.elapsed_minutes(now);
        self.hunger = (self.hunger + HUNGER_RATE_PER_MIN * minutes).min(STARVATION_THRESHOLD);
        let mut happiness_decay = 0.01;
        if self.hunger > 50.0 {
            happiness_decay += 0.05 * (self.hunger - 50.0) / 50.0;
        }
        self.happiness = (self.happiness - happiness_decay * minutes).clamp(0.0, 100.0);
        self.energy = (self.energy + exertion.energy_rate() * minutes).clamp(0.0, 100.0);
        self.age_days = (now - self.birth).num_seconds() as f32 / 86_400.0;
        self.last_update = now;
    }

    /// Applies one feeding at `now`.
    pub fn feed(&mut self, now: DateTime<Utc>) {
        self.hunger = (self.hunger - FEED_AMOUNT).max(0.0);
        self.happiness = (self.happiness + 5.0).min(100.0);
        self.last_fed = now;
    }

    /// Registers a player interaction of the given quality in `[0, 1]`.
    pub fn register_interaction(&mut self, now: DateTime<Utc>, quality: f32) {
        self.happiness = (self.happiness + quality.clamp(0.0, 1.0) * 10.0).min(100.0);
        self.last_interaction = now;
    }

    /// Whether the terminal hunger threshold has been reached.
    #[must_use]
    pub fn is_starving(&self) -> bool {
        self.hunger >= STARVATION_THRESHOLD
    }

    /// Catches stats up over offline time, deterministically from the
    /// stored timestamps. Returns true when the creature starved while
    /// away.
    pub fn offline_elapse(&mut self, now: DateTime<Utc>) -> bool {
        let minutes = self.elapsed_minutes(now);
        self.hunger = (self.hunger + HUNGER_RATE_PER_MIN * minutes).min(STARVATION_THRESHOLD);
        // Nobody was exerting it while the process was down.
        self.energy = (self.energy + Exertion::Resting.energy_rate() * minutes).min(100.0);
        self.age_days = (now - self.birth).num_seconds() as f32 / 86_400.0;
        self.last_update = now;
        self.is_starving()
    }

    /// Immutable per-tick view used to build the RL state.
    #[must_use]
    pub fn snapshot(&self, alive: bool) -> StatSnapshot {
        StatSnapshot {
            hunger: self.hunger,
            happiness: self.happiness,
            energy: self.energy,
            age_days: self.age_days,
            minutes_since_fed: (self.last_update - self.last_fed).num_seconds() as f32 / 60.0,
            minutes_since_interaction: (self.last_update - self.last_interaction).num_seconds()
                as f32
                / 60.0,
            alive,
        }
    }

    fn elapsed_minutes(&self, now: DateTime<Utc>) -> f32 {
        let seconds = (now - self.last_update).num_milliseconds() as f32 / 1000.0;
        (seconds / 60.0).max(0.0)
    }
}

/// Read-only stat view taken once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSnapshot {
    /// Hunger in `[0, 100]`.
    pub hunger: f32,
    /// Happiness in `[0, 100]`.
    pub happiness: f32,
    /// Energy in `[0, 100]`.
    pub energy: f32,
    /// Age in days.
    pub age_days: f32,
    /// Minutes since the last feeding.
    pub minutes_since_fed: f32,
    /// Minutes since the last interaction.
    pub minutes_since_interaction: f32,
    /// Whether the creature is alive.
    pub alive: bool,
}

impl StatSnapshot {
    /// Normalized feature slice for the RL state, `STAT_FEATURES` long,
    /// every value in `[0, 1]`.
    #[must_use]
    pub fn to_features(&self) -> Array1<f32> {
        Array1::from_vec(vec![
            self.hunger / 100.0,
            self.happiness / 100.0,
            self.energy / 100.0,
            (self.age_days / 365.0).min(1.0),
            (self.minutes_since_fed / 180.0).min(1.0),
            (self.minutes_since_interaction / 180.0).min(1.0),
            f32::from(self.alive),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn hunger_accrues_at_fixed_rate() {
        let mut stats = CreatureStats::hatched(t0());
        stats.advance(t0() + chrono::Duration::minutes(100), Exertion::Idle);
        assert!((stats.hunger - 10.0).abs() < 1e-3);
    }

    #[test]
    fn offline_starvation_is_detected() {
        let mut stats = CreatureStats::hatched(t0());
        stats.hunger = 90.0;
        // 0.1 per minute over 200 minutes crosses the threshold exactly.
        let died = stats.offline_elapse(t0() + chrono::Duration::minutes(200));
        assert!(died);
        assert!((stats.hunger - 100.0).abs() < 1e-3);
    }

    #[test]
    fn offline_just_short_of_starvation_survives() {
        let mut stats = CreatureStats::hatched(t0());
        stats.hunger = 90.0;
        let died = stats.offline_elapse(t0() + chrono::Duration::minutes(90));
        assert!(!died);
        assert!(stats.hunger < 100.0);
    }

    #[test]
    fn feeding_reduces_hunger_and_floors_at_zero() {
        let mut stats = CreatureStats::hatched(t0());
        stats.hunger = 40.0;
        stats.feed(t0());
        assert!((stats.hunger - 10.0).abs() < 1e-6);
        stats.feed(t0());
        assert_eq!(stats.hunger, 0.0);
    }

    #[test]
    fn resting_recovers_energy() {
        let mut stats = CreatureStats::hatched(t0());
        stats.energy = 30.0;
        stats.advance(t0() + chrono::Duration::minutes(20), Exertion::Resting);
        assert!((stats.energy - 50.0).abs() < 1e-3);
    }

    #[test]
    fn hungry_creatures_lose_happiness_faster() {
        let mut sated = CreatureStats::hatched(t0());
        let mut hungry = CreatureStats::hatched(t0());
        hungry.hunger = 80.0;
        let later = t0() + chrono::Duration::minutes(60);
        sated.advance(later, Exertion::Idle);
        hungry.advance(later, Exertion::Idle);
        assert!(hungry.happiness < sated.happiness);
    }

    #[test]
    fn feature_slice_is_normalized() {
        let stats = CreatureStats::hatched(t0());
        let features = stats.snapshot(true).to_features();
        assert_eq!(features.len(), STAT_FEATURES);
        assert!(features.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
