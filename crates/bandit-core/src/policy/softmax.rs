use super::{ChoicePolicy, PolicyError, check_beliefs};

/// Boltzmann exploration: `p_i ∝ exp(belief_i / (tau / 10))`.
///
/// Larger tau flattens the distribution towards uniform exploration; tau near
/// zero concentrates all mass on the believed-best arm. The maximum belief is
/// subtracted before dividing by the temperature, so arbitrarily small
/// temperatures stay finite. A zero temperature has no defined distribution.
#[derive(Debug, Clone, Copy, Default)]
pub struct Softmax;

impl ChoicePolicy for Softmax {
    fn label(&self) -> String {
        "softmax".to_string()
    }

    fn distribution(&self, beliefs: &[f64], tau: f64) -> Result<Vec<f64>, PolicyError> {
        check_beliefs(beliefs)?;

        let temperature = tau / 10.0;
        if temperature == 0.0 || !temperature.is_finite() {
            return Err(PolicyError::DegenerateTemperature { tau });
        }

        let max = beliefs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = beliefs
            .iter()
            .map(|b| ((b - max) / temperature).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(PolicyError::DegenerateTemperature { tau });
        }

        Ok(weights.into_iter().map(|w| w / total).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_beliefs_give_uniform_choice() {
        let probs = Softmax.distribution(&[0.5, 0.5, 0.5, 0.5], 0.5).unwrap();
        for p in probs {
            assert!((p - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn matches_direct_formula_for_moderate_tau() {
        let beliefs = [0.3, 0.6, 0.45];
        let tau = 0.5_f64;
        let direct: Vec<f64> = {
            let exps: Vec<f64> = beliefs.iter().map(|b| (b / (tau / 10.0)).exp()).collect();
            let total: f64 = exps.iter().sum();
            exps.iter().map(|e| e / total).collect()
        };
        let probs = Softmax.distribution(&beliefs, tau).unwrap();
        for (a, b) in probs.iter().zip(&direct) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn near_zero_tau_is_greedy_without_overflow() {
        let probs = Softmax.distribution(&[0.6, 0.4], 0.02).unwrap();
        assert!(probs[0] >= 0.99, "greedy mass was {}", probs[0]);

        let tiny = Softmax.distribution(&[0.61, 0.6], 1e-9).unwrap();
        assert!(tiny.iter().all(|p| p.is_finite()));
        assert!(tiny[0] >= 0.99);
    }

    #[test]
    fn subnormal_tau_still_yields_greedy_distribution() {
        let probs = Softmax.distribution(&[0.6, 0.4], 1e-308).unwrap();
        assert_eq!(probs, vec![1.0, 0.0]);

        let tied = Softmax.distribution(&[0.6, 0.6, 0.4], 1e-308).unwrap();
        assert_eq!(tied, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn zero_tau_is_an_error() {
        let err = Softmax.distribution(&[0.5, 0.7], 0.0).unwrap_err();
        assert_eq!(err, PolicyError::DegenerateTemperature { tau: 0.0 });
    }

    #[test]
    fn larger_tau_explores_more() {
        let beliefs = [0.7, 0.5, 0.3];
        let cold = Softmax.distribution(&beliefs, 0.1).unwrap();
        let warm = Softmax.distribution(&beliefs, 1.0).unwrap();
        assert!(1.0 - warm[0] > 1.0 - cold[0]);
    }
}
