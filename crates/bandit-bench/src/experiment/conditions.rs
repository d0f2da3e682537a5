use bandit_core::BanditConfig;

use crate::config::AxesConfig;

const AXES: usize = 11;

/// One point of the parameter sweep. Component fields index into the
/// configured component lists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Condition {
    /// 1-based position in sweep order.
    pub id: usize,
    pub arms: usize,
    pub turns: usize,
    pub payoff: usize,
    pub turbulence_model: usize,
    pub policy: usize,
    pub turbulence: f64,
    pub belief: usize,
    pub strategy: f64,
    pub latency: usize,
    pub memory: usize,
    pub initial_learning: usize,
}

impl Condition {
    pub fn bandit_config(&self) -> BanditConfig {
        BanditConfig {
            arms: self.arms,
            turns: self.turns,
            turbulence: self.turbulence,
            strategy: self.strategy,
            latency: self.latency,
            memory: self.memory,
            initial_learning: self.initial_learning,
        }
    }
}

/// Cartesian product of every axis, enumerated odometer style with the
/// last axis (initial learning) varying fastest.
pub struct ConditionGrid {
    axes: AxesConfig,
    lengths: [usize; AXES],
}

impl ConditionGrid {
    pub fn new(axes: &AxesConfig) -> Self {
        let lengths = [
            axes.arms.len(),
            axes.turns.len(),
            axes.payoff.len(),
            axes.turbulence_model.len(),
            axes.policy.len(),
            axes.turbulence.len(),
            axes.belief.len(),
            axes.strategy.len(),
            axes.latency.len(),
            axes.memory.len(),
            axes.initial_learning.as_ref().map_or(1, Vec::len),
        ];
        Self {
            axes: axes.clone(),
            lengths,
        }
    }

    pub fn len(&self) -> usize {
        self.lengths.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The condition at 0-based sweep position `index`.
    pub fn get(&self, index: usize) -> Option<Condition> {
        if index >= self.len() {
            return None;
        }
        let mut digits = [0usize; AXES];
        let mut rest = index;
        for (digit, len) in digits.iter_mut().zip(self.lengths).rev() {
            *digit = rest % len;
            rest /= len;
        }

        let axes = &self.axes;
        let latency = axes.latency[digits[8]];
        let initial_learning = axes
            .initial_learning
            .as_ref()
            .map_or(latency, |values| values[digits[10]]);
        Some(Condition {
            id: index + 1,
            arms: axes.arms[digits[0]],
            turns: axes.turns[digits[1]],
            payoff: digits[2],
            turbulence_model: digits[3],
            policy: digits[4],
            turbulence: axes.turbulence[digits[5]],
            belief: digits[6],
            strategy: axes.strategy[digits[7]],
            latency,
            memory: axes.memory[digits[9]],
            initial_learning,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Condition> + '_ {
        (0..self.len()).filter_map(|index| self.get(index))
    }

    /// Scored turns summed over every condition, for one replication each.
    pub fn turns_per_replication(&self) -> u64 {
        let others = (self.len() / self.lengths[1]) as u64;
        others * self.axes.turns.iter().map(|t| *t as u64).sum::<u64>()
    }

    pub fn longest_run(&self) -> usize {
        self.axes.turns.iter().copied().max().unwrap_or(0)
    }
}
