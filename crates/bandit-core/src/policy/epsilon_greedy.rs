use super::{ChoicePolicy, PolicyError, check_beliefs};

/// Explore with probability epsilon (uniform over the arms not believed to be
/// best), otherwise exploit (uniform over the arms tied for the best belief).
///
/// When every arm is tied there is nothing to explore, so the whole mass is
/// spread uniformly.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsilonGreedy;

impl ChoicePolicy for EpsilonGreedy {
    fn label(&self) -> String {
        "epsilon_greedy".to_string()
    }

    fn distribution(&self, beliefs: &[f64], epsilon: f64) -> Result<Vec<f64>, PolicyError> {
        check_beliefs(beliefs)?;
        if !(epsilon.is_finite() && (0.0..=1.0).contains(&epsilon)) {
            return Err(PolicyError::InvalidEpsilon { epsilon });
        }

        let best = beliefs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let greedy = beliefs.iter().filter(|b| **b == best).count();
        let others = beliefs.len() - greedy;

        if others == 0 {
            let uniform = 1.0 / beliefs.len() as f64;
            return Ok(vec![uniform; beliefs.len()]);
        }

        let exploit = (1.0 - epsilon) / greedy as f64;
        let explore = epsilon / others as f64;
        Ok(beliefs
            .iter()
            .map(|b| if *b == best { exploit } else { explore })
            .collect())
    }
}
