use bandit_core::{
    BeliefEstimator, BetaPayoff, ChoicePolicy, Components, CumulativeBelief, EpsilonGreedy,
    PayoffError, PayoffSource, RandomShock, Softmax, TurbulenceModel, UniformPayoff,
    WindowedBelief,
};
use thiserror::Error;

use crate::config::{AxesConfig, BeliefSpec, PayoffSpec, PolicySpec, TurbulenceSpec};

use super::conditions::Condition;

/// Concrete components for every entry of the component axes, built once
/// and shared by all conditions.
pub struct ComponentSet {
    payoffs: Vec<Box<dyn PayoffSource>>,
    turbulence_models: Vec<Box<dyn TurbulenceModel>>,
    policies: Vec<Box<dyn ChoicePolicy>>,
    beliefs: Vec<Box<dyn BeliefEstimator>>,
}

impl ComponentSet {
    pub fn from_axes(axes: &AxesConfig) -> Result<Self, ComponentError> {
        let payoffs = axes
            .payoff
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                build_payoff(spec).map_err(|source| ComponentError::Payoff { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let turbulence_models = axes
            .turbulence_model
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                build_turbulence(spec)
                    .map_err(|source| ComponentError::Turbulence { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let policies = axes.policy.iter().map(build_policy).collect();
        let beliefs = axes.belief.iter().map(build_belief).collect();

        Ok(Self {
            payoffs,
            turbulence_models,
            policies,
            beliefs,
        })
    }

    /// Borrow the components selected by `condition`.
    pub fn for_condition(&self, condition: &Condition) -> Result<Components<'_>, ComponentError> {
        let missing =
            |axis: &'static str, index: usize| ComponentError::MissingEntry { axis, index };
        Ok(Components {
            payoff: self
                .payoffs
                .get(condition.payoff)
                .ok_or_else(|| missing("payoff", condition.payoff))?
                .as_ref(),
            turbulence: self
                .turbulence_models
                .get(condition.turbulence_model)
                .ok_or_else(|| missing("turbulence_model", condition.turbulence_model))?
                .as_ref(),
            policy: self
                .policies
                .get(condition.policy)
                .ok_or_else(|| missing("policy", condition.policy))?
                .as_ref(),
            belief: self
                .beliefs
                .get(condition.belief)
                .ok_or_else(|| missing("belief", condition.belief))?
                .as_ref(),
        })
    }
}

fn build_payoff(spec: &PayoffSpec) -> Result<Box<dyn PayoffSource>, PayoffError> {
    let source: Box<dyn PayoffSource> = match *spec {
        PayoffSpec::Beta { alpha, beta } => Box::new(BetaPayoff::new(alpha, beta)?),
        PayoffSpec::Uniform { low, high } => Box::new(UniformPayoff::new(low, high)?),
    };
    Ok(source)
}

fn build_turbulence(spec: &TurbulenceSpec) -> Result<Box<dyn TurbulenceModel>, PayoffError> {
    let model: Box<dyn TurbulenceModel> = match *spec {
        TurbulenceSpec::RandomShock { redraw_probability } => {
            Box::new(RandomShock::new(redraw_probability)?)
        }
    };
    Ok(model)
}

fn build_policy(spec: &PolicySpec) -> Box<dyn ChoicePolicy> {
    match spec {
        PolicySpec::Softmax => Box::new(Softmax),
        PolicySpec::EpsilonGreedy => Box::new(EpsilonGreedy),
    }
}

fn build_belief(spec: &BeliefSpec) -> Box<dyn BeliefEstimator> {
    match spec {
        BeliefSpec::Windowed => Box::new(WindowedBelief),
        BeliefSpec::Cumulative => Box::new(CumulativeBelief),
    }
}

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("invalid payoff source at axes.payoff[{index}]: {source}")]
    Payoff {
        index: usize,
        #[source]
        source: PayoffError,
    },
    #[error("invalid turbulence model at axes.turbulence_model[{index}]: {source}")]
    Turbulence {
        index: usize,
        #[source]
        source: PayoffError,
    },
    #[error("condition references missing {axis} entry {index}")]
    MissingEntry { axis: &'static str, index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::conditions::ConditionGrid;

    #[test]
    fn builds_labelled_components_for_each_condition() {
        let axes = AxesConfig {
            payoff: vec![
                PayoffSpec::Beta {
                    alpha: 2.0,
                    beta: 2.0,
                },
                PayoffSpec::Uniform { low: 0.0, high: 1.0 },
            ],
            policy: vec![PolicySpec::Softmax, PolicySpec::EpsilonGreedy],
            ..AxesConfig::default()
        };
        let set = ComponentSet::from_axes(&axes).expect("components");
        let grid = ConditionGrid::new(&axes);

        let labels: Vec<(String, String)> = grid
            .iter()
            .map(|condition| {
                let components = set.for_condition(&condition).expect("components");
                (components.payoff.label(), components.policy.label())
            })
            .collect();
        assert_eq!(
            labels,
            vec![
                ("beta[2 2]".to_string(), "softmax".to_string()),
                ("beta[2 2]".to_string(), "epsilon_greedy".to_string()),
                ("uniform[0 1]".to_string(), "softmax".to_string()),
                ("uniform[0 1]".to_string(), "epsilon_greedy".to_string()),
            ]
        );
        for (payoff, policy) in &labels {
            assert!(!payoff.contains(',') && !policy.contains(','));
        }
    }

    #[test]
    fn rejects_invalid_parameters_with_axis_position() {
        let axes = AxesConfig {
            payoff: vec![
                PayoffSpec::Beta {
                    alpha: 2.0,
                    beta: 2.0,
                },
                PayoffSpec::Beta {
                    alpha: -1.0,
                    beta: 2.0,
                },
            ],
            ..AxesConfig::default()
        };
        let err = ComponentSet::from_axes(&axes).err().expect("invalid shape");
        assert!(matches!(err, ComponentError::Payoff { index: 1, .. }));

        let axes = AxesConfig {
            turbulence_model: vec![TurbulenceSpec::RandomShock {
                redraw_probability: 2.0,
            }],
            ..AxesConfig::default()
        };
        let err = ComponentSet::from_axes(&axes).err().expect("invalid probability");
        assert!(matches!(err, ComponentError::Turbulence { index: 0, .. }));
    }
}
