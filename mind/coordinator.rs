use std::time::{Duration, Instant};

use chrono::{DateTime, Timelike, Utc};
use indexmap::IndexMap;
use ndarray::Array1;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use uuid::Uuid;

use critter_agent::{
    Action, AgentConfig, Experience, Goal, QEstimator, RewardContext, RewardWeights, VitalSigns,
};
use critter_neural::NeuralError;
use critter_senses::{encode, EnvironmentSnapshot, FieldSize, SensoryVector, Vec2, SENSORY_LEN};

use crate::persistence::{
    decode_block, CreatureRecord, DecodedPredictor, PersistenceError, PredictorBlock,
};
use crate::personality::{Personality, TRAIT_DIMS};
use crate::predictors::activity::{ActivityKind, ActivityPredictor};
use crate::predictors::emotion::EmotionPredictor;
use crate::predictors::movement::{MovementDecision, MovementPredictor};
use crate::predictors::social::{SocialForecast, SocialPredictor};
use crate::predictors::{InteractionKind, InteractionLog};
use crate::stats::{CreatureStats, Exertion, StatSnapshot, STAT_FEATURES};
use crate::telemetry::MindTelemetry;

const COMPONENT: &str = "coordinator";

/// Pointer distance, in pixels, under which the player counts as nearby.
const PLAYER_NEAR_RANGE: f32 = 150.0;

/// Where the creature is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    /// Not hatched yet; ticks are no-ops.
    Egg,
    /// Awake and running the full pipeline.
    Active,
    /// Night rest; stats recover, the pipeline runs on a stride.
    Dormant,
    /// Starved. Terminal; no event revives it.
    Deceased,
}

/// Which subsystems the coordinator runs. Disabling one skips its
/// predictions and learning while the rest of the pipeline continues on
/// neutral fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Run the emotion predictor.
    pub emotion: bool,
    /// Run the social predictor.
    pub social: bool,
    /// Run the activity predictor.
    pub activity: bool,
    /// Run the movement predictor.
    pub movement: bool,
    /// Run all learning passes.
    pub learning: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            emotion: true,
            social: true,
            activity: true,
            movement: true,
            learning: true,
        }
    }
}

/// Tuning knobs of the per-tick pipeline.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Run the learning passes every this many pipeline ticks.
    pub learn_every: u32,
    /// Skip learning for the tick when the pipeline already spent longer
    /// than this; the skipped pass runs on the next tick instead.
    pub latency_budget: Duration,
    /// While dormant, run the full pipeline only every this many ticks.
    pub dormant_stride: u64,
    /// Learning rate shared by the four predictors.
    pub predictor_learning_rate: f32,
    /// Reward shaping weights.
    pub reward: RewardWeights,
    /// RL agent hyperparameters.
    pub agent: AgentConfig,
    /// Subsystem switches.
    pub capabilities: Capabilities,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            learn_every: 4,
            latency_budget: Duration::from_millis(10),
            dormant_stride: 5,
            predictor_learning_rate: 0.001,
            reward: RewardWeights::default(),
            agent: AgentConfig::default(),
            capabilities: Capabilities::default(),
        }
    }
}

/// Whether the tick's action came from the learned policy or from the
/// symbolic goal fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// Greedy choice of the Q-estimator.
    Learned,
    /// Goal-driven fallback: the goal's default action, or a novelty
    /// sample when the goal is Explore.
    GoalDefault,
}

/// What one tick decided, for the host to render and log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Life stage after the tick.
    pub stage: LifeStage,
    /// Derived goal, when the pipeline ran.
    pub goal: Option<Goal>,
    /// Chosen action, when the pipeline ran.
    pub action: Option<Action>,
    /// Where the action came from.
    pub source: Option<DecisionSource>,
    /// Movement to apply this tick.
    pub movement: MovementDecision,
    /// Best-scoring activity, when the predictor ran.
    pub activity: Option<ActivityKind>,
    /// Social forecast, when the predictor ran.
    pub social: Option<SocialForecast>,
    /// Reward credited to the previous tick's decision.
    pub reward: Option<f32>,
    /// Agent training loss, when a learning pass ran.
    pub loss: Option<f32>,
    /// Whether learning was pushed to the next tick by the latency budget.
    pub deferred_learning: bool,
}

impl TickOutcome {
    /// Outcome of a tick that ran no pipeline.
    #[must_use]
    pub const fn idle(stage: LifeStage) -> Self {
        Self {
            stage,
            goal: None,
            action: None,
            source: None,
            movement: MovementDecision::hold(),
            activity: None,
            social: None,
            reward: None,
            loss: None,
            deferred_learning: false,
        }
    }
}

/// The decision taken on the previous pipeline tick, held until the next
/// tick reveals its consequences and turns it into a reward.
struct PendingDecision {
    snapshot: EnvironmentSnapshot,
    state: Array1<f32>,
    action: Action,
    vitals: VitalSigns,
    goal: Goal,
    sensory: SensoryVector,
    emotions: Array1<f32>,
    social_probability: f32,
    activity: Option<ActivityKind>,
    goal_target: Vec2,
    movement: MovementDecision,
}

/// One creature: stats, personality, the four predictors, the RL agent,
/// and the per-tick coordination between them.
///
/// All time enters through event and tick timestamps; the creature never
/// reads a wall clock of its own, so a replayed tick stream reproduces the
/// same stat evolution.
pub struct Creature {
    id: Uuid,
    name: String,
    species: String,
    palette: String,
    config: CoordinatorConfig,
    stage: LifeStage,
    stats: CreatureStats,
    personality: Personality,
    interactions: InteractionLog,
    emotion: EmotionPredictor,
    social: SocialPredictor,
    activity: ActivityPredictor,
    movement: MovementPredictor,
    agent: QEstimator,
    position: Vec2,
    velocity: Vec2,
    tick_count: u64,
    ticks_since_learn: u32,
    learning_deferred: bool,
    pending: Option<PendingDecision>,
    pending_interaction: Option<(InteractionKind, bool)>,
    fed_since_tick: bool,
    rng: SmallRng,
    telemetry: MindTelemetry,
}

impl Creature {
    /// A new, unhatched creature with fresh predictors.
    pub fn fresh(
        config: CoordinatorConfig,
        telemetry: MindTelemetry,
        now: DateTime<Utc>,
    ) -> Result<Self, NeuralError> {
        let learning_rate = config.predictor_learning_rate;
        let field = FieldSize::default();
        Ok(Self {
            id: Uuid::new_v4(),
            name: "Critter".to_string(),
            species: "critter".to_string(),
            palette: "meadow".to_string(),
            stage: LifeStage::Egg,
            stats: CreatureStats::hatched(now),
            personality: Personality::default(),
            interactions: InteractionLog::new(),
            emotion: EmotionPredictor::new(learning_rate)?,
            social: SocialPredictor::new(learning_rate)?,
            activity: ActivityPredictor::new(learning_rate)?,
            movement: MovementPredictor::new(learning_rate)?,
            agent: QEstimator::new(config.agent.clone())?,
            position: Vec2::new(field.width / 2.0, field.height / 2.0),
            velocity: Vec2::default(),
            tick_count: 0,
            ticks_since_learn: 0,
            learning_deferred: false,
            pending: None,
            pending_interaction: None,
            fed_since_tick: false,
            rng: SmallRng::from_entropy(),
            telemetry,
            config,
        })
    }

    /// Stable identity.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the creature.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Current life stage.
    #[must_use]
    pub const fn stage(&self) -> LifeStage {
        self.stage
    }

    /// Current vital stats.
    #[must_use]
    pub const fn stats(&self) -> &CreatureStats {
        &self.stats
    }

    /// Fixed personality.
    #[must_use]
    pub const fn personality(&self) -> Personality {
        self.personality
    }

    /// Latest emotional state.
    #[must_use]
    pub const fn emotions(&self) -> &Array1<f32> {
        self.emotion.current()
    }

    /// Current position on the field.
    #[must_use]
    pub const fn position(&self) -> Vec2 {
        self.position
    }

    /// Ticks lived so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Current exploration rate of the agent.
    #[must_use]
    pub const fn epsilon(&self) -> f32 {
        self.agent.epsilon()
    }

    /// Hatches the egg at `now`. A no-op in any other stage.
    pub fn hatch(&mut self, now: DateTime<Utc>) {
        if self.stage != LifeStage::Egg {
            return;
        }
        self.stats = CreatureStats::hatched(now);
        self.stage = LifeStage::Active;
        self.telemetry.info(COMPONENT, "hatched");
    }

    /// Feeds the creature at `now`. Ignored before hatching and after
    /// death; wakes a dormant creature.
    pub fn feed(&mut self, now: DateTime<Utc>) {
        if matches!(self.stage, LifeStage::Egg | LifeStage::Deceased) {
            return;
        }
        self.wake();
        self.stats.feed(now);
        self.stats.register_interaction(now, 0.9);
        self.interactions.record(InteractionKind::Feed, 0.9);
        self.pending_interaction = Some((InteractionKind::Feed, true));
        self.fed_since_tick = true;
    }

    /// Registers a player interaction at `now`. Ignored before hatching
    /// and after death; wakes a dormant creature.
    pub fn interact(&mut self, kind: InteractionKind, positive: bool, now: DateTime<Utc>) {
        if matches!(self.stage, LifeStage::Egg | LifeStage::Deceased) {
            return;
        }
        self.wake();
        let quality = if positive { 0.9 } else { 0.1 };
        self.stats.register_interaction(now, quality);
        self.interactions.record(kind, quality);
        self.pending_interaction = Some((kind, positive));
    }

    fn wake(&mut self) {
        if self.stage == LifeStage::Dormant {
            self.stage = LifeStage::Active;
            self.telemetry.info(COMPONENT, "woken by the player");
        }
    }

    /// Runs one tick against the host-provided environment.
    ///
    /// Eggs and the deceased do nothing. A dormant creature recovers
    /// energy and runs the pipeline only on the configured stride, waking
    /// at daybreak or once rested. An active creature runs the full
    /// pipeline: stat advance, the predictors in their fixed order, the
    /// policy, reward crediting for the previous tick, and the periodic
    /// learning pass. Prediction failures degrade to neutral defaults and
    /// learning failures skip that update; both are logged, neither fails
    /// the tick.
    pub fn tick(&mut self, environment: &EnvironmentSnapshot) -> Result<TickOutcome, NeuralError> {
        let now = environment.clock;
        match self.stage {
            LifeStage::Egg | LifeStage::Deceased => Ok(TickOutcome::idle(self.stage)),
            LifeStage::Dormant => {
                self.tick_count += 1;
                self.stats.advance(now, Exertion::Resting);
                if self.stats.is_starving() {
                    return self.die(environment);
                }
                let daytime = (6..22).contains(&now.hour());
                if daytime || self.stats.energy > 70.0 {
                    self.stage = LifeStage::Active;
                    self.telemetry.info(COMPONENT, "waking up");
                    self.run_pipeline(environment)
                } else if self.tick_count % self.config.dormant_stride == 0 {
                    self.run_pipeline(environment)
                } else {
                    Ok(TickOutcome::idle(LifeStage::Dormant))
                }
            }
            LifeStage::Active => {
                self.tick_count += 1;
                self.stats.advance(now, self.current_exertion());
                if self.stats.is_starving() {
                    return self.die(environment);
                }
                let night = now.hour() >= 22 || now.hour() < 6;
                if night && self.stats.energy < 30.0 {
                    self.stage = LifeStage::Dormant;
                    self.telemetry.info(COMPONENT, "entering dormancy");
                    return Ok(TickOutcome::idle(LifeStage::Dormant));
                }
                self.run_pipeline(environment)
            }
        }
    }

    /// Exertion implied by the previous tick's decision.
    fn current_exertion(&self) -> Exertion {
        match &self.pending {
            Some(pending) if pending.action == Action::Sleep => Exertion::Resting,
            Some(pending) if pending.movement.moving => Exertion::Active,
            _ => Exertion::Idle,
        }
    }

    fn die(&mut self, environment: &EnvironmentSnapshot) -> Result<TickOutcome, NeuralError> {
        self.stage = LifeStage::Deceased;
        self.telemetry
            .warn_at(COMPONENT, self.tick_count, "starved to death");
        if let Some(previous) = self.pending.take() {
            let interaction = self.pending_interaction.take();
            let context = RewardContext {
                alive: false,
                interacted: interaction.is_some(),
                interaction_positive: interaction.is_some_and(|(_, positive)| positive),
                goal_achieved: false,
                action_count: self.agent.action_counts()[previous.action.index()],
            };
            let after = self.vitals();
            let reward =
                self.config
                    .reward
                    .evaluate(&previous.vitals, &after, previous.action, &context);
            let sensory = encode(environment);
            let next_state = state_vector(&self.stats.snapshot(false), &sensory);
            self.agent.record(Experience {
                state: previous.state,
                action: previous.action,
                reward,
                next_state,
                terminal: true,
            })?;
        }
        Ok(TickOutcome::idle(LifeStage::Deceased))
    }

    #[allow(clippy::too_many_lines)]
    fn run_pipeline(&mut self, environment: &EnvironmentSnapshot) -> Result<TickOutcome, NeuralError> {
        let started = Instant::now();
        let now = environment.clock;
        let caps = self.config.capabilities;
        let stat_view = self.stats.snapshot(true);
        let sensory = encode(environment);
        let traits = self.personality.traits();

        // Emotion first; every later predictor may read its output.
        if caps.emotion {
            let quality = self.interactions.quality_features();
            if let Err(err) = self.emotion.predict(&stat_view, &quality, &traits) {
                self.telemetry.warn_at(
                    COMPONENT,
                    self.tick_count,
                    format!("emotion prediction failed, keeping last state: {err}"),
                );
            }
        }
        let emotions = self.emotion.current().clone();
        let modifiers = self.emotion.modifiers();

        let social = if caps.social {
            match self
                .social
                .predict(now, stat_view.minutes_since_interaction, &self.interactions)
            {
                Ok(forecast) => forecast,
                Err(err) => {
                    self.telemetry.warn_at(
                        COMPONENT,
                        self.tick_count,
                        format!("social prediction failed: {err}"),
                    );
                    SocialForecast::default()
                }
            }
        } else {
            SocialForecast::default()
        };

        let activity = if caps.activity {
            match self.activity.predict(&sensory, &emotions, social.probability) {
                Ok((kind, _)) => Some(kind),
                Err(err) => {
                    self.telemetry.warn_at(
                        COMPONENT,
                        self.tick_count,
                        format!("activity prediction failed: {err}"),
                    );
                    None
                }
            }
        } else {
            None
        };

        let player_nearby =
            environment.pointer.position.distance_to(environment.position) < PLAYER_NEAR_RANGE;
        let goal = Goal::derive(
            stat_view.hunger,
            stat_view.energy,
            stat_view.happiness,
            player_nearby,
        );
        let goal_target = self.goal_target(goal, environment);

        // Exploration follows the goal: pressing goals take their default
        // action, while the Explore goal samples an action the creature
        // has tried least.
        let state = state_vector(&stat_view, &sensory);
        let (action, source) = if self.rng.gen::<f32>() < self.agent.epsilon() {
            let action = if goal == Goal::Explore {
                self.agent.explore()
            } else {
                goal.default_action()
            };
            (action, DecisionSource::GoalDefault)
        } else {
            match self.agent.choose(&state) {
                Ok(action) => (action, DecisionSource::Learned),
                Err(err) => {
                    self.telemetry.warn_at(
                        COMPONENT,
                        self.tick_count,
                        format!("policy failed, using the goal default: {err}"),
                    );
                    (goal.default_action(), DecisionSource::GoalDefault)
                }
            }
        };

        let movement = if action == Action::Sleep || !caps.movement {
            MovementDecision::hold()
        } else {
            match self.movement.predict(
                environment,
                goal_target,
                stat_view.energy,
                &traits,
                modifiers.movement_speed,
            ) {
                Ok(decision) => decision,
                Err(err) => {
                    self.telemetry.warn_at(
                        COMPONENT,
                        self.tick_count,
                        format!("movement prediction failed: {err}"),
                    );
                    MovementDecision::hold()
                }
            }
        };
        if movement.moving {
            self.velocity = movement.velocity;
            self.position = Vec2::new(
                (environment.position.x + movement.velocity.x).clamp(0.0, environment.field.width),
                (environment.position.y + movement.velocity.y).clamp(0.0, environment.field.height),
            );
        } else {
            self.velocity = Vec2::default();
            self.position = environment.position;
        }

        // Credit the previous decision now that its consequences are
        // visible, and feed the per-tick observation windows.
        let interaction = self.pending_interaction.take();
        let fed = std::mem::take(&mut self.fed_since_tick);
        let after = self.vitals();
        let previous = self.pending.take();
        let mut reward_value = None;
        if let Some(previous) = &previous {
            let context = RewardContext {
                alive: true,
                interacted: interaction.is_some(),
                interaction_positive: interaction.is_some_and(|(_, positive)| positive),
                goal_achieved: goal_achieved(previous.goal, &previous.vitals, &after, fed, interaction.is_some()),
                action_count: self.agent.action_counts()[previous.action.index()],
            };
            let reward =
                self.config
                    .reward
                    .evaluate(&previous.vitals, &after, previous.action, &context);
            reward_value = Some(reward);
            self.agent.record(Experience {
                state: previous.state.clone(),
                action: previous.action,
                reward,
                next_state: state.clone(),
                terminal: false,
            })?;
            if caps.activity {
                if let Some(kind) = previous.activity {
                    self.activity.observe(
                        &previous.sensory,
                        &previous.emotions,
                        previous.social_probability,
                        kind,
                        reward,
                    )?;
                }
            }
        }
        if caps.social {
            self.social.observe(
                now,
                stat_view.minutes_since_interaction,
                &self.interactions,
                interaction,
            )?;
        }

        self.ticks_since_learn += 1;
        let learning_due = caps.learning
            && (self.ticks_since_learn >= self.config.learn_every || self.learning_deferred);
        let mut loss = None;
        let mut deferred = false;
        if learning_due {
            if started.elapsed() > self.config.latency_budget {
                deferred = true;
                self.learning_deferred = true;
                self.telemetry.warn_at(
                    COMPONENT,
                    self.tick_count,
                    "learning deferred past the latency budget",
                );
            } else {
                // A failed update leaves that learner's weights as they
                // were; the tick still completes with the decision made
                // above.
                self.learning_deferred = false;
                self.ticks_since_learn = 0;
                loss = match self.agent.learn() {
                    Ok(value) => value,
                    Err(err) => {
                        self.telemetry.warn_at(
                            COMPONENT,
                            self.tick_count,
                            format!("agent learning skipped: {err}"),
                        );
                        None
                    }
                };
                if caps.social {
                    if let Err(err) = self.social.train() {
                        self.telemetry.warn_at(
                            COMPONENT,
                            self.tick_count,
                            format!("social training skipped: {err}"),
                        );
                    }
                }
                if caps.activity {
                    if let Err(err) = self.activity.train() {
                        self.telemetry.warn_at(
                            COMPONENT,
                            self.tick_count,
                            format!("activity training skipped: {err}"),
                        );
                    }
                }
                if caps.emotion {
                    let expected = expected_emotions(&stat_view, player_nearby);
                    let quality = self.interactions.quality_features();
                    if let Err(err) = self.emotion.learn(&stat_view, &quality, &traits, &expected)
                    {
                        self.telemetry.warn_at(
                            COMPONENT,
                            self.tick_count,
                            format!("emotion learning skipped: {err}"),
                        );
                    }
                }
                if caps.movement {
                    if let (Some(previous), Some(reward)) = (&previous, reward_value) {
                        if let Err(err) = self.movement.learn(
                            &previous.snapshot,
                            previous.goal_target,
                            previous.vitals.energy,
                            &traits,
                            &previous.movement,
                            reward,
                        ) {
                            self.telemetry.warn_at(
                                COMPONENT,
                                self.tick_count,
                                format!("movement learning skipped: {err}"),
                            );
                        }
                    }
                }
            }
        }

        self.pending = Some(PendingDecision {
            snapshot: environment.clone(),
            state,
            action,
            vitals: after,
            goal,
            sensory,
            emotions,
            social_probability: social.probability,
            activity,
            goal_target,
            movement,
        });

        Ok(TickOutcome {
            stage: self.stage,
            goal: Some(goal),
            action: Some(action),
            source: Some(source),
            movement,
            activity,
            social: Some(social),
            reward: reward_value,
            loss,
            deferred_learning: deferred,
        })
    }

    fn goal_target(&mut self, goal: Goal, environment: &EnvironmentSnapshot) -> Vec2 {
        let field = environment.field;
        match goal {
            Goal::SeekFood => environment
                .food
                .unwrap_or(Vec2::new(field.width / 2.0, field.height / 2.0)),
            Goal::Rest => environment.position,
            Goal::SeekInteraction | Goal::Play => environment.pointer.position,
            Goal::Explore => Vec2::new(
                self.rng.gen::<f32>() * field.width,
                self.rng.gen::<f32>() * field.height,
            ),
        }
    }

    fn vitals(&self) -> VitalSigns {
        VitalSigns {
            hunger: self.stats.hunger,
            happiness: self.stats.happiness,
            energy: self.stats.energy,
        }
    }

    /// Serializes the whole mind into one record. Pure: no clock reads, so
    /// saving twice in a row produces byte-identical records.
    pub fn to_record(&self) -> Result<CreatureRecord, PersistenceError> {
        let mut predictors = IndexMap::new();
        predictors.insert(
            "emotion".to_string(),
            PredictorBlock::feedforward(&self.emotion.snapshot())?,
        );
        predictors.insert(
            "social".to_string(),
            PredictorBlock::sequence(&self.social.snapshot())?,
        );
        predictors.insert(
            "activity".to_string(),
            PredictorBlock::sequence(&self.activity.snapshot())?,
        );
        predictors.insert(
            "movement".to_string(),
            PredictorBlock::feedforward(&self.movement.snapshot())?,
        );
        Ok(CreatureRecord {
            name: self.name.clone(),
            species: self.species.clone(),
            palette: self.palette.clone(),
            id: self.id,
            position: self.position,
            velocity: self.velocity,
            stage: self.stage,
            personality: self.personality,
            stats: self.stats.clone(),
            emotions: self.emotion.current().clone(),
            interactions: self.interactions.clone(),
            tick_count: self.tick_count,
            predictors,
            agent: Some(self.agent.snapshot()),
        })
    }

    /// Rebuilds a creature from its record, catching up over offline time.
    ///
    /// Any predictor or agent block that is missing, of an unknown kind,
    /// or shaped for a different build is replaced with a fresh one; the
    /// rest of the record still loads. Offline starvation loads the
    /// creature as deceased.
    pub fn from_record(
        record: CreatureRecord,
        config: CoordinatorConfig,
        telemetry: MindTelemetry,
        now: DateTime<Utc>,
    ) -> Result<Self, NeuralError> {
        let learning_rate = config.predictor_learning_rate;

        let emotion = match restored_block(&record, "emotion", &telemetry) {
            Some(DecodedPredictor::FeedForward(snapshot)) => {
                EmotionPredictor::restore(snapshot, Some(record.emotions.clone()))
                    .map_err(|err| warn_restore(&telemetry, "emotion", &err))
                    .ok()
            }
            _ => None,
        };
        let emotion = match emotion {
            Some(predictor) => predictor,
            None => EmotionPredictor::new(learning_rate)?,
        };

        let social = match restored_block(&record, "social", &telemetry) {
            Some(DecodedPredictor::Sequence(snapshot)) => SocialPredictor::restore(snapshot)
                .map_err(|err| warn_restore(&telemetry, "social", &err))
                .ok(),
            _ => None,
        };
        let social = match social {
            Some(predictor) => predictor,
            None => SocialPredictor::new(learning_rate)?,
        };

        let activity = match restored_block(&record, "activity", &telemetry) {
            Some(DecodedPredictor::Sequence(snapshot)) => ActivityPredictor::restore(snapshot)
                .map_err(|err| warn_restore(&telemetry, "activity", &err))
                .ok(),
            _ => None,
        };
        let activity = match activity {
            Some(predictor) => predictor,
            None => ActivityPredictor::new(learning_rate)?,
        };

        let movement = match restored_block(&record, "movement", &telemetry) {
            Some(DecodedPredictor::FeedForward(snapshot)) => MovementPredictor::restore(snapshot)
                .map_err(|err| warn_restore(&telemetry, "movement", &err))
                .ok(),
            _ => None,
        };
        let movement = match movement {
            Some(predictor) => predictor,
            None => MovementPredictor::new(learning_rate)?,
        };

        let agent = record
            .agent
            .and_then(|snapshot| {
                QEstimator::restore(snapshot)
                    .map_err(|err| warn_restore(&telemetry, "agent", &err))
                    .ok()
            });
        let agent = match agent {
            Some(agent) => agent,
            None => QEstimator::new(config.agent.clone())?,
        };

        let mut stats = record.stats;
        let mut stage = record.stage;
        if matches!(stage, LifeStage::Active | LifeStage::Dormant) && stats.offline_elapse(now) {
            telemetry.warn(COMPONENT, "starved while the process was away");
            stage = LifeStage::Deceased;
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            species: record.species,
            palette: record.palette,
            stage,
            stats,
            personality: record.personality,
            interactions: record.interactions,
            emotion,
            social,
            activity,
            movement,
            agent,
            position: record.position,
            velocity: record.velocity,
            tick_count: record.tick_count,
            ticks_since_learn: 0,
            learning_deferred: false,
            pending: None,
            pending_interaction: None,
            fed_since_tick: false,
            rng: SmallRng::from_entropy(),
            telemetry,
            config,
        })
    }
}

fn restored_block(
    record: &CreatureRecord,
    name: &str,
    telemetry: &MindTelemetry,
) -> Option<DecodedPredictor> {
    record
        .predictors
        .get(name)
        .and_then(|block| decode_block(name, block, telemetry))
}

fn warn_restore(telemetry: &MindTelemetry, name: &str, err: &NeuralError) {
    telemetry.warn(
        COMPONENT,
        format!("could not restore {name}, starting it fresh: {err}"),
    );
}

/// RL state: the normalized stat slice followed by the sensory vector.
fn state_vector(stats: &StatSnapshot, sensory: &SensoryVector) -> Array1<f32> {
    let mut values = Vec::with_capacity(STAT_FEATURES + SENSORY_LEN);
    values.extend(stats.to_features().iter().copied());
    values.extend(sensory.iter().copied());
    Array1::from_vec(values)
}

fn goal_achieved(
    goal: Goal,
    before: &VitalSigns,
    after: &VitalSigns,
    fed: bool,
    interacted: bool,
) -> bool {
    match goal {
        Goal::SeekFood => fed || after.hunger < before.hunger,
        Goal::Rest => after.energy > before.energy,
        Goal::SeekInteraction | Goal::Play => interacted,
        Goal::Explore => after.happiness > before.happiness,
    }
}

/// Heuristic teaching signal for the emotion predictor, in output order:
/// joy, excitement, contentment, anxiety, loneliness.
fn expected_emotions(stats: &StatSnapshot, player_nearby: bool) -> Array1<f32> {
    let joy = stats.happiness / 100.0;
    let excitement = if player_nearby { 0.8 } else { 0.4 };
    let contentment = (100.0 - stats.hunger) / 100.0 * stats.energy / 100.0;
    let anxiety = if stats.hunger > 70.0 || stats.energy < 20.0 {
        0.8
    } else {
        0.2
    };
    let loneliness = (stats.minutes_since_interaction / 120.0).min(1.0);
    Array1::from_vec(vec![joy, excitement, contentment, anxiety, loneliness])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use critter_senses::PointerState;

    fn t0() -> DateTime<Utc> {
        // A Tuesday afternoon.
        Utc.with_ymd_and_hms(2026, 3, 10, 14, 0, 0).unwrap()
    }

    fn environment(clock: DateTime<Utc>) -> EnvironmentSnapshot {
        EnvironmentSnapshot {
            position: Vec2::new(960.0, 540.0),
            velocity: Vec2::default(),
            pointer: PointerState {
                position: Vec2::new(100.0, 100.0),
                velocity: Vec2::default(),
            },
            field: FieldSize::default(),
            obstacles: Vec::new(),
            food: None,
            clock,
        }
    }

    fn hatched(config: CoordinatorConfig) -> Creature {
        let mut creature = Creature::fresh(config, MindTelemetry::disabled(), t0()).unwrap();
        creature.hatch(t0());
        creature
    }

    #[test]
    fn eggs_ignore_ticks() {
        let mut creature =
            Creature::fresh(CoordinatorConfig::default(), MindTelemetry::disabled(), t0()).unwrap();
        let outcome = creature.tick(&environment(t0())).unwrap();
        assert_eq!(outcome.stage, LifeStage::Egg);
        assert!(outcome.action.is_none());
        assert_eq!(creature.tick_count(), 0);
    }

    #[test]
    fn hatched_creatures_run_the_pipeline() {
        let mut creature = hatched(CoordinatorConfig::default());
        let outcome = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert_eq!(outcome.stage, LifeStage::Active);
        assert!(outcome.goal.is_some());
        assert!(outcome.action.is_some());
        assert!(outcome.social.is_some());
        assert_eq!(creature.tick_count(), 1);
    }

    #[test]
    fn fresh_creatures_follow_the_goal_default() {
        // Epsilon starts at 1.0 and hunger keeps the goal pressing, so
        // every choice falls back to the goal's default action.
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stats.hunger = 80.0;
        for step in 1..=5 {
            let outcome = creature
                .tick(&environment(t0() + ChronoDuration::seconds(step)))
                .unwrap();
            assert_eq!(outcome.source, Some(DecisionSource::GoalDefault));
            assert_eq!(outcome.goal, Some(Goal::SeekFood));
            assert_eq!(outcome.action, Some(Action::SeekFood));
        }
    }

    #[test]
    fn explore_goal_samples_varied_actions() {
        // A contented creature derives Explore; the exploratory branch
        // then draws by novelty instead of repeating one fixed action.
        // Learning stays off so epsilon holds at 1.0 throughout.
        let config = CoordinatorConfig {
            capabilities: Capabilities {
                learning: false,
                ..Capabilities::default()
            },
            ..CoordinatorConfig::default()
        };
        let mut creature = hatched(config);
        let mut seen = std::collections::HashSet::new();
        for step in 1..=40 {
            let outcome = creature
                .tick(&environment(t0() + ChronoDuration::seconds(step)))
                .unwrap();
            assert_eq!(outcome.goal, Some(Goal::Explore));
            assert_eq!(outcome.source, Some(DecisionSource::GoalDefault));
            if let Some(action) = outcome.action {
                seen.insert(action);
            }
        }
        assert!(seen.len() > 1);
    }

    #[test]
    fn reward_is_credited_one_tick_late() {
        let mut creature = hatched(CoordinatorConfig::default());
        let first = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert!(first.reward.is_none());
        let second = creature
            .tick(&environment(t0() + ChronoDuration::seconds(2)))
            .unwrap();
        assert!(second.reward.is_some());
    }

    #[test]
    fn starvation_is_terminal() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stats.hunger = 100.0;
        let outcome = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert_eq!(outcome.stage, LifeStage::Deceased);
        // Events and further ticks are no-ops now.
        creature.feed(t0() + ChronoDuration::seconds(2));
        assert_eq!(creature.stage(), LifeStage::Deceased);
        let again = creature
            .tick(&environment(t0() + ChronoDuration::seconds(3)))
            .unwrap();
        assert_eq!(again.stage, LifeStage::Deceased);
    }

    #[test]
    fn tired_creatures_sleep_through_the_night() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stats.energy = 20.0;
        let night = Utc.with_ymd_and_hms(2026, 3, 10, 23, 0, 0).unwrap();
        creature.stats.last_update = night;
        let outcome = creature
            .tick(&environment(night + ChronoDuration::seconds(1)))
            .unwrap();
        assert_eq!(outcome.stage, LifeStage::Dormant);
        // Most dormant ticks are idle.
        let idle = creature
            .tick(&environment(night + ChronoDuration::seconds(2)))
            .unwrap();
        assert!(idle.action.is_none());
    }

    #[test]
    fn dormant_creatures_wake_at_daybreak() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stage = LifeStage::Dormant;
        creature.stats.energy = 40.0;
        let morning = Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap();
        creature.stats.last_update = morning;
        let outcome = creature
            .tick(&environment(morning + ChronoDuration::seconds(1)))
            .unwrap();
        assert_eq!(outcome.stage, LifeStage::Active);
        assert!(outcome.action.is_some());
    }

    #[test]
    fn feeding_wakes_and_sates() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stage = LifeStage::Dormant;
        creature.stats.hunger = 50.0;
        creature.feed(t0() + ChronoDuration::seconds(1));
        assert_eq!(creature.stage(), LifeStage::Active);
        assert!((creature.stats().hunger - 20.0).abs() < 1e-3);
        assert_eq!(creature.interactions.len(), 1);
    }

    #[test]
    fn disabled_movement_holds_still() {
        let config = CoordinatorConfig {
            capabilities: Capabilities {
                movement: false,
                ..Capabilities::default()
            },
            ..CoordinatorConfig::default()
        };
        let mut creature = hatched(config);
        let outcome = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert!(!outcome.movement.moving);
        assert_eq!(creature.position(), environment(t0()).position);
    }

    #[test]
    fn zero_latency_budget_defers_learning() {
        let config = CoordinatorConfig {
            learn_every: 1,
            latency_budget: Duration::ZERO,
            ..CoordinatorConfig::default()
        };
        let mut creature = hatched(config);
        let outcome = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert!(outcome.deferred_learning);
        assert!(outcome.loss.is_none());
    }

    #[test]
    fn learning_runs_on_the_configured_cadence() {
        let config = CoordinatorConfig {
            learn_every: 2,
            latency_budget: Duration::from_secs(60),
            ..CoordinatorConfig::default()
        };
        let mut creature = hatched(config);
        let first = creature
            .tick(&environment(t0() + ChronoDuration::seconds(1)))
            .unwrap();
        assert!(!first.deferred_learning);
        // Replay is still short of a batch, so the pass runs but reports
        // no loss; what matters is that it is not deferred.
        let second = creature
            .tick(&environment(t0() + ChronoDuration::seconds(2)))
            .unwrap();
        assert!(!second.deferred_learning);
    }

    #[test]
    fn unstable_agent_weights_skip_learning_not_the_tick() {
        let config = CoordinatorConfig {
            learn_every: 1,
            latency_budget: Duration::from_secs(60),
            agent: AgentConfig {
                batch: 1,
                ..AgentConfig::default()
            },
            ..CoordinatorConfig::default()
        };
        let mut creature = hatched(config.clone());
        for step in 1..=3 {
            creature
                .tick(&environment(t0() + ChronoDuration::seconds(step)))
                .unwrap();
        }
        // Blow the online estimator up through its record so the next
        // learning pass overflows to a non-finite loss.
        let mut record = creature.to_record().unwrap();
        if let Some(agent) = record.agent.as_mut() {
            for weight in &mut agent.online.weights {
                weight.mapv_inplace(|_| 1e30);
            }
        }
        let mut creature = Creature::from_record(
            record,
            config,
            MindTelemetry::disabled(),
            t0() + ChronoDuration::seconds(3),
        )
        .unwrap();
        let outcome = creature
            .tick(&environment(t0() + ChronoDuration::seconds(4)))
            .unwrap();
        assert!(!outcome.deferred_learning);
        assert!(outcome.loss.is_none());
        assert!(outcome.action.is_some());
        // The decision survived the failed update and is credited next
        // tick as usual.
        let next = creature
            .tick(&environment(t0() + ChronoDuration::seconds(5)))
            .unwrap();
        assert!(next.reward.is_some());
    }

    #[test]
    fn record_round_trip_preserves_the_mind() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.set_name("Pebble");
        creature.interact(InteractionKind::Pet, true, t0() + ChronoDuration::seconds(1));
        for step in 2..=6 {
            let _ = creature
                .tick(&environment(t0() + ChronoDuration::seconds(step)))
                .unwrap();
        }
        let record = creature.to_record().unwrap();
        let restored = Creature::from_record(
            record,
            CoordinatorConfig::default(),
            MindTelemetry::disabled(),
            t0() + ChronoDuration::seconds(7),
        )
        .unwrap();
        assert_eq!(restored.id(), creature.id());
        assert_eq!(restored.name(), "Pebble");
        assert_eq!(restored.stage(), LifeStage::Active);
        assert_eq!(restored.tick_count(), creature.tick_count());
        assert_eq!(restored.emotions(), creature.emotions());
        assert_eq!(restored.interactions.len(), creature.interactions.len());
    }

    #[test]
    fn double_save_is_byte_identical() {
        let mut creature = hatched(CoordinatorConfig::default());
        for step in 1..=3 {
            let _ = creature
                .tick(&environment(t0() + ChronoDuration::seconds(step)))
                .unwrap();
        }
        let first = creature.to_record().unwrap().to_bytes().unwrap();
        let second = creature.to_record().unwrap().to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn offline_starvation_loads_as_deceased() {
        let mut creature = hatched(CoordinatorConfig::default());
        creature.stats.hunger = 95.0;
        let record = creature.to_record().unwrap();
        let restored = Creature::from_record(
            record,
            CoordinatorConfig::default(),
            MindTelemetry::disabled(),
            t0() + ChronoDuration::minutes(200),
        )
        .unwrap();
        assert_eq!(restored.stage(), LifeStage::Deceased);
    }

    #[test]
    fn unknown_predictor_blocks_fall_back_to_fresh() {
        let creature = hatched(CoordinatorConfig::default());
        let mut record = creature.to_record().unwrap();
        if let Some(block) = record.predictors.get_mut("social") {
            block.kind = "holographic".to_string();
        }
        let restored = Creature::from_record(
            record,
            CoordinatorConfig::default(),
            MindTelemetry::disabled(),
            t0() + ChronoDuration::seconds(1),
        )
        .unwrap();
        // The creature itself survives with a fresh social predictor.
        assert_eq!(restored.stage(), LifeStage::Active);
    }

    #[test]
    fn expected_emotions_track_the_vitals() {
        let hungry = StatSnapshot {
            hunger: 90.0,
            happiness: 20.0,
            energy: 50.0,
            age_days: 1.0,
            minutes_since_fed: 300.0,
            minutes_since_interaction: 300.0,
            alive: true,
        };
        let signal = expected_emotions(&hungry, false);
        assert!((signal[3] - 0.8).abs() < f32::EPSILON);
        assert!((signal[4] - 1.0).abs() < f32::EPSILON);
        assert!(signal[2] < 0.1);
    }

    #[test]
    fn state_vector_has_the_agent_width() {
        let stats = CreatureStats::hatched(t0()).snapshot(true);
        let sensory = encode(&environment(t0()));
        let state = state_vector(&stats, &sensory);
        assert_eq!(state.len(), AgentConfig::default().state_size);
    }
}
