//! One bandit run: payoffs, policy and beliefs composed over T turns.

use std::time::{Duration, Instant};

use rand::{Rng, RngCore};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::belief::{BeliefError, BeliefEstimator, History};
use crate::policy::{ChoicePolicy, PolicyError, sample_choice};
use crate::reward::{self, PayoffSource, TurbulenceModel};

/// Scalar parameters of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BanditConfig {
    pub arms: usize,
    pub turns: usize,
    /// Per-turn probability of a turbulence event.
    pub turbulence: f64,
    /// Exploration control handed to the choice policy.
    pub strategy: f64,
    pub latency: usize,
    pub memory: usize,
    /// Free random-choice turns played before the scored turns begin.
    pub initial_learning: usize,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            arms: 10,
            turns: 500,
            turbulence: 0.0,
            strategy: 0.5,
            latency: 0,
            memory: 500,
            initial_learning: 0,
        }
    }
}

impl BanditConfig {
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.arms == 0 {
            return Err(SimulationError::invalid("arms", "at least one arm is required"));
        }
        if self.turns == 0 {
            return Err(SimulationError::invalid("turns", "at least one turn is required"));
        }
        if !(self.turbulence.is_finite() && (0.0..=1.0).contains(&self.turbulence)) {
            return Err(SimulationError::invalid(
                "turbulence",
                format!("turbulence rate must lie in [0, 1], got {}", self.turbulence),
            ));
        }
        if !self.strategy.is_finite() {
            return Err(SimulationError::invalid(
                "strategy",
                format!("strategy parameter must be finite, got {}", self.strategy),
            ));
        }
        Ok(())
    }
}

/// The pluggable pieces a run is assembled from.
#[derive(Clone, Copy)]
pub struct Components<'a> {
    pub payoff: &'a dyn PayoffSource,
    pub turbulence: &'a dyn TurbulenceModel,
    pub policy: &'a dyn ChoicePolicy,
    pub belief: &'a dyn BeliefEstimator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Complete,
}

/// Per-turn metrics of the scored phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub score: Vec<i64>,
    pub knowledge: Vec<f64>,
    pub opinion: Vec<f64>,
    pub probexplore: Vec<f64>,
}

impl TimeSeries {
    fn with_capacity(turns: usize) -> Self {
        Self {
            score: Vec::with_capacity(turns),
            knowledge: Vec::with_capacity(turns),
            opinion: Vec::with_capacity(turns),
            probexplore: Vec::with_capacity(turns),
        }
    }

    pub fn len(&self) -> usize {
        self.score.len()
    }

    pub fn is_empty(&self) -> bool {
        self.score.is_empty()
    }
}

/// Last entry of every series once a run is complete.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinalMetrics {
    pub score: i64,
    pub knowledge: f64,
    pub opinion: f64,
    pub probexplore: f64,
}

/// What happened during one scored turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnOutcome {
    pub turn: usize,
    pub choice: usize,
    pub won: bool,
    pub redrawn: usize,
}

/// A single simulation run of the bandit learning model.
pub struct Bandit<'a> {
    config: BanditConfig,
    components: Components<'a>,
    state: RunState,
    payoffs: Vec<f64>,
    beliefs: Vec<f64>,
    history: History,
    asset_stock: i64,
    turn: usize,
    series: TimeSeries,
    started_at: Option<Instant>,
    elapsed: Option<Duration>,
}

impl<'a> Bandit<'a> {
    /// Validates `config` and draws the initial payoffs from `rng`.
    pub fn new(
        config: BanditConfig,
        components: Components<'a>,
        rng: &mut dyn RngCore,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let payoffs = reward::initialize(components.payoff, config.arms, rng);

        Ok(Self {
            config,
            components,
            state: RunState::NotStarted,
            payoffs,
            beliefs: vec![0.5; config.arms],
            history: History::new(config.arms, config.latency, config.memory),
            asset_stock: 0,
            turn: 0,
            series: TimeSeries::with_capacity(config.turns),
            started_at: None,
            elapsed: None,
        })
    }

    /// Run every remaining phase to completion.
    pub fn simulate(&mut self, rng: &mut dyn RngCore) -> Result<FinalMetrics, SimulationError> {
        if self.state == RunState::NotStarted {
            self.start(rng)?;
        }
        if self.state == RunState::Complete {
            return Err(SimulationError::AlreadyComplete);
        }
        while self.state == RunState::Running {
            self.step(rng)?;
        }
        self.final_metrics().ok_or(SimulationError::AlreadyComplete)
    }

    /// Play the initial-learning phase and form the first beliefs.
    ///
    /// Each free turn applies turbulence and tries a uniformly random arm,
    /// recording the outcome without touching the score.
    pub fn start(&mut self, rng: &mut dyn RngCore) -> Result<(), SimulationError> {
        match self.state {
            RunState::NotStarted => {}
            RunState::Running => return Err(SimulationError::AlreadyRunning),
            RunState::Complete => return Err(SimulationError::AlreadyComplete),
        }
        self.state = RunState::Running;
        self.started_at = Some(Instant::now());

        for _ in 0..self.config.initial_learning {
            self.apply_turbulence(rng);
            let choice = rng.gen_range(0..self.config.arms);
            let won = rng.r#gen::<f64>() < self.payoffs[choice];
            self.history.record_choice(choice, won)?;
        }
        self.refresh_beliefs()
    }

    /// Play one scored turn. The run completes after the last one.
    pub fn step(&mut self, rng: &mut dyn RngCore) -> Result<TurnOutcome, SimulationError> {
        match self.state {
            RunState::Running => {}
            RunState::NotStarted => return Err(SimulationError::NotStarted),
            RunState::Complete => return Err(SimulationError::AlreadyComplete),
        }
        let turn = self.turn;

        let redrawn = self.apply_turbulence(rng);

        let probabilities = self
            .components
            .policy
            .distribution(&self.beliefs, self.config.strategy)
            .map_err(|source| SimulationError::Policy { turn, source })?;
        if probabilities.len() != self.config.arms {
            return Err(SimulationError::DistributionShape {
                turn,
                expected: self.config.arms,
                found: probabilities.len(),
            });
        }
        let u = rng.r#gen::<f64>();
        let choice = sample_choice(&probabilities, u).ok_or(SimulationError::NoChoice { turn })?;

        let won = rng.r#gen::<f64>() < self.payoffs[choice];
        self.asset_stock += if won { 1 } else { -1 };

        self.history.record_choice(choice, won)?;
        self.refresh_beliefs()?;
        self.record_metrics(&probabilities);

        if tracing::enabled!(Level::TRACE) {
            event!(
                target: "bandit_core::engine",
                Level::TRACE,
                turn,
                choice,
                won,
                redrawn,
                asset_stock = self.asset_stock
            );
        }

        self.turn += 1;
        if self.turn == self.config.turns {
            self.finish();
        }

        Ok(TurnOutcome {
            turn,
            choice,
            won,
            redrawn,
        })
    }

    fn apply_turbulence(&mut self, rng: &mut dyn RngCore) -> usize {
        self.components.turbulence.step(
            &mut self.payoffs,
            self.components.payoff,
            self.config.turbulence,
            rng,
        )
    }

    fn refresh_beliefs(&mut self) -> Result<(), SimulationError> {
        self.components
            .belief
            .estimate(&self.history, &mut self.beliefs)?;
        Ok(())
    }

    fn record_metrics(&mut self, probabilities: &[f64]) {
        let arms = self.config.arms as f64;
        let knowledge = 1.0
            - self
                .beliefs
                .iter()
                .zip(&self.payoffs)
                .map(|(b, p)| (b - p).powi(2))
                .sum::<f64>();
        let mean_belief = self.beliefs.iter().sum::<f64>() / arms;
        let opinion = self
            .beliefs
            .iter()
            .map(|b| (b - mean_belief).powi(2))
            .sum::<f64>();
        let max_probability = probabilities.iter().copied().fold(0.0, f64::max);

        self.series.score.push(self.asset_stock);
        self.series.knowledge.push(knowledge);
        self.series.opinion.push(opinion);
        self.series.probexplore.push(1.0 - max_probability);
    }

    fn finish(&mut self) {
        self.state = RunState::Complete;
        self.elapsed = self.started_at.map(|start| start.elapsed());
        event!(
            target: "bandit_core::engine",
            Level::DEBUG,
            arms = self.config.arms,
            turns = self.config.turns,
            score = self.asset_stock,
            elapsed_us = self.elapsed.map(|d| d.as_micros() as u64).unwrap_or(0),
            "simulation complete"
        );
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &BanditConfig {
        &self.config
    }

    /// Current true payoff probabilities.
    pub fn payoffs(&self) -> &[f64] {
        &self.payoffs
    }

    pub fn beliefs(&self) -> &[f64] {
        &self.beliefs
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn asset_stock(&self) -> i64 {
        self.asset_stock
    }

    /// Wall-clock duration of the run, once complete.
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Full time series, available once the run is complete.
    pub fn series(&self) -> Option<&TimeSeries> {
        (self.state == RunState::Complete).then_some(&self.series)
    }

    pub fn score(&self) -> Option<i64> {
        self.series().and_then(|s| s.score.last().copied())
    }

    pub fn knowledge(&self) -> Option<f64> {
        self.series().and_then(|s| s.knowledge.last().copied())
    }

    pub fn opinion(&self) -> Option<f64> {
        self.series().and_then(|s| s.opinion.last().copied())
    }

    pub fn probexplore(&self) -> Option<f64> {
        self.series().and_then(|s| s.probexplore.last().copied())
    }

    pub fn final_metrics(&self) -> Option<FinalMetrics> {
        Some(FinalMetrics {
            score: self.score()?,
            knowledge: self.knowledge()?,
            opinion: self.opinion()?,
            probexplore: self.probexplore()?,
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },
    #[error("choice policy failed on turn {turn}: {source}")]
    Policy {
        turn: usize,
        #[source]
        source: PolicyError,
    },
    #[error("choice policy returned {found} probabilities for {expected} arms on turn {turn}")]
    DistributionShape {
        turn: usize,
        expected: usize,
        found: usize,
    },
    #[error("choice distribution on turn {turn} has no selectable arm")]
    NoChoice { turn: usize },
    #[error("belief update failed: {0}")]
    Belief(#[from] BeliefError),
    #[error("simulation has not been started")]
    NotStarted,
    #[error("simulation is already running")]
    AlreadyRunning,
    #[error("simulation is already complete")]
    AlreadyComplete,
}

impl SimulationError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        SimulationError::InvalidConfig {
            field,
            message: message.into(),
        }
    }
}
