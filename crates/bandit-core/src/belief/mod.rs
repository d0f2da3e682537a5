//! Belief formation over the trial history.
//!
//! This module is composed of:
//! - `history`: the ring-buffered per-arm trial log and its running window sums.
//! - estimators turning that log into one payoff estimate per arm.

mod history;

pub use history::{Counts, History, Trial, visible_range};

use thiserror::Error;

/// Turns the trial history into one payoff estimate per arm.
pub trait BeliefEstimator: Send + Sync {
    fn label(&self) -> String;

    /// Overwrite `beliefs` with the current estimate for every arm.
    fn estimate(&self, history: &History, beliefs: &mut [f64]) -> Result<(), BeliefError>;
}

/// Laplace estimate over the window left visible by latency and memory.
///
/// With no visible trials the estimate is exactly 0.5, the same as the
/// one-win-in-two-tries prior every arm starts from.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowedBelief;

impl BeliefEstimator for WindowedBelief {
    fn label(&self) -> String {
        "windowed".to_string()
    }

    fn estimate(&self, history: &History, beliefs: &mut [f64]) -> Result<(), BeliefError> {
        check_arms(history, beliefs)?;
        for (arm, belief) in beliefs.iter_mut().enumerate() {
            *belief = history.visible(arm).smoothed();
        }
        Ok(())
    }
}

/// Laplace estimate over the complete history; never forgets and ignores latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct CumulativeBelief;

impl BeliefEstimator for CumulativeBelief {
    fn label(&self) -> String {
        "cumulative".to_string()
    }

    fn estimate(&self, history: &History, beliefs: &mut [f64]) -> Result<(), BeliefError> {
        check_arms(history, beliefs)?;
        for (arm, belief) in beliefs.iter_mut().enumerate() {
            *belief = history.totals(arm).smoothed();
        }
        Ok(())
    }
}

fn check_arms(history: &History, beliefs: &[f64]) -> Result<(), BeliefError> {
    if history.arms() != beliefs.len() {
        return Err(BeliefError::ArmMismatch {
            history: history.arms(),
            beliefs: beliefs.len(),
        });
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BeliefError {
    #[error("history tracks {history} arms but {beliefs} beliefs were requested")]
    ArmMismatch { history: usize, beliefs: usize },
    #[error("arm {arm} is out of range for a history of {arms} arms")]
    ArmOutOfRange { arm: usize, arms: usize },
}
