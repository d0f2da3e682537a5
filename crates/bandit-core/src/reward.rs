//! Hidden payoff probabilities and the turbulence that reshuffles them.

use rand::{Rng, RngCore};
use rand_distr::{Beta, Distribution, Uniform};
use thiserror::Error;

/// Source of fresh payoff probabilities for an arm.
pub trait PayoffSource: Send + Sync {
    /// Stable, comma-free identifier used in output tables.
    fn label(&self) -> String;

    /// Draw one payoff probability in `[0, 1]`.
    fn draw(&self, rng: &mut dyn RngCore) -> f64;
}

/// Perturbs the current payoff vector once per elapsed turn.
pub trait TurbulenceModel: Send + Sync {
    fn label(&self) -> String;

    /// Apply one turn of turbulence in place and return how many arms were redrawn.
    fn step(
        &self,
        payoffs: &mut [f64],
        source: &dyn PayoffSource,
        rate: f64,
        rng: &mut dyn RngCore,
    ) -> usize;
}

/// Draw `arms` independent payoffs from `source`.
pub fn initialize(source: &dyn PayoffSource, arms: usize, rng: &mut dyn RngCore) -> Vec<f64> {
    (0..arms).map(|_| source.draw(rng)).collect()
}

/// Payoffs drawn from a Beta distribution; Beta(2, 2) is bell-shaped on
/// `[0, 1]` with mean 0.5 and standard deviation ~0.22.
#[derive(Debug, Clone)]
pub struct BetaPayoff {
    alpha: f64,
    beta: f64,
    dist: Beta<f64>,
}

impl BetaPayoff {
    pub const DEFAULT_ALPHA: f64 = 2.0;
    pub const DEFAULT_BETA: f64 = 2.0;

    pub fn new(alpha: f64, beta: f64) -> Result<Self, PayoffError> {
        if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) {
            return Err(PayoffError::InvalidShape { alpha, beta });
        }
        let dist = Beta::new(alpha, beta).map_err(|_| PayoffError::InvalidShape { alpha, beta })?;
        Ok(Self { alpha, beta, dist })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }
}

impl PayoffSource for BetaPayoff {
    fn label(&self) -> String {
        format!("beta[{} {}]", self.alpha, self.beta)
    }

    fn draw(&self, rng: &mut dyn RngCore) -> f64 {
        self.dist.sample(rng)
    }
}

/// Payoffs drawn uniformly from `[low, high)`.
#[derive(Debug, Clone)]
pub struct UniformPayoff {
    low: f64,
    high: f64,
    dist: Uniform<f64>,
}

impl UniformPayoff {
    pub fn new(low: f64, high: f64) -> Result<Self, PayoffError> {
        let in_unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if !(in_unit(low) && in_unit(high) && low < high) {
            return Err(PayoffError::InvalidRange { low, high });
        }
        Ok(Self {
            low,
            high,
            dist: Uniform::new(low, high),
        })
    }
}

impl PayoffSource for UniformPayoff {
    fn label(&self) -> String {
        format!("uniform[{} {}]", self.low, self.high)
    }

    fn draw(&self, rng: &mut dyn RngCore) -> f64 {
        self.dist.sample(rng)
    }
}

/// Environmental shocks: with probability `rate` per turn a shock occurs, and
/// each arm is then independently redrawn with `redraw_probability`.
#[derive(Debug, Clone, Copy)]
pub struct RandomShock {
    redraw_probability: f64,
}

impl RandomShock {
    pub const DEFAULT_REDRAW_PROBABILITY: f64 = 0.5;

    pub fn new(redraw_probability: f64) -> Result<Self, PayoffError> {
        validate_probability("redraw_probability", redraw_probability)?;
        Ok(Self { redraw_probability })
    }

    pub fn redraw_probability(&self) -> f64 {
        self.redraw_probability
    }
}

impl Default for RandomShock {
    fn default() -> Self {
        Self {
            redraw_probability: Self::DEFAULT_REDRAW_PROBABILITY,
        }
    }
}

impl TurbulenceModel for RandomShock {
    fn label(&self) -> String {
        format!("random_shock[{}]", self.redraw_probability)
    }

    fn step(
        &self,
        payoffs: &mut [f64],
        source: &dyn PayoffSource,
        rate: f64,
        rng: &mut dyn RngCore,
    ) -> usize {
        // The shock coin is consumed even at rate 0 so draw order does not
        // depend on the turbulence level.
        if rng.r#gen::<f64>() >= rate {
            return 0;
        }

        let mut redrawn = 0;
        for payoff in payoffs.iter_mut() {
            if rng.r#gen::<f64>() < self.redraw_probability {
                *payoff = source.draw(rng);
                redrawn += 1;
            }
        }
        redrawn
    }
}

pub(crate) fn validate_probability(field: &'static str, value: f64) -> Result<(), PayoffError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PayoffError::InvalidProbability { field, value })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PayoffError {
    #[error("beta shape parameters must be positive and finite (alpha={alpha}, beta={beta})")]
    InvalidShape { alpha: f64, beta: f64 },
    #[error("uniform payoff range must satisfy 0 <= low < high <= 1 (low={low}, high={high})")]
    InvalidRange { low: f64, high: f64 },
    #[error("{field} must be a probability in [0, 1], got {value}")]
    InvalidProbability { field: &'static str, value: f64 },
}
