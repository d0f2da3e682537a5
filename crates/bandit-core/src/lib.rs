//! Multi-armed bandit learning model: payoff processes, choice policies,
//! windowed beliefs and the per-run simulation engine.

pub mod belief;
pub mod engine;
pub mod policy;
pub mod reward;

pub use belief::{
    BeliefError, BeliefEstimator, Counts, CumulativeBelief, History, Trial, WindowedBelief,
};
pub use engine::{
    Bandit, BanditConfig, Components, FinalMetrics, RunState, SimulationError, TimeSeries,
    TurnOutcome,
};
pub use policy::{ChoicePolicy, EpsilonGreedy, PolicyError, Softmax, sample_choice};
pub use reward::{
    BetaPayoff, PayoffError, PayoffSource, RandomShock, TurbulenceModel, UniformPayoff,
};

pub struct AppInfo;

impl AppInfo {
    pub const fn name() -> &'static str {
        "bandit"
    }

    pub const fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }
}
