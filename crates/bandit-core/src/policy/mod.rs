mod epsilon_greedy;
mod softmax;

pub use epsilon_greedy::EpsilonGreedy;
pub use softmax::Softmax;

use thiserror::Error;

/// Maps the current beliefs to a probability of choosing each arm.
pub trait ChoicePolicy: Send + Sync {
    fn label(&self) -> String;

    /// Returns one nonnegative probability per belief, summing to 1.
    ///
    /// `parameter` is the policy-specific exploration control (softmax tau,
    /// epsilon for epsilon-greedy).
    fn distribution(&self, beliefs: &[f64], parameter: f64) -> Result<Vec<f64>, PolicyError>;
}

/// Cumulative-sum inversion: the first arm whose cumulative probability
/// exceeds `u`. When rounding leaves the running total at or below `u`, the
/// last arm with positive probability is returned.
pub fn sample_choice(probabilities: &[f64], u: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (arm, &p) in probabilities.iter().enumerate() {
        cumulative += p;
        if p > 0.0 {
            last_positive = Some(arm);
        }
        if cumulative > u {
            return Some(arm);
        }
    }
    last_positive
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("cannot build a choice distribution over zero arms")]
    NoArms,
    #[error("softmax temperature tau={tau} is degenerate")]
    DegenerateTemperature { tau: f64 },
    #[error("epsilon must lie in [0, 1], got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },
    #[error("belief for arm {arm} is not finite ({value})")]
    NonFiniteBelief { arm: usize, value: f64 },
}

pub(crate) fn check_beliefs(beliefs: &[f64]) -> Result<(), PolicyError> {
    if beliefs.is_empty() {
        return Err(PolicyError::NoArms);
    }
    if let Some((arm, &value)) = beliefs.iter().enumerate().find(|(_, b)| !b.is_finite()) {
        return Err(PolicyError::NonFiniteBelief { arm, value });
    }
    Ok(())
}
