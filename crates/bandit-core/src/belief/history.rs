//! Per-arm trial/outcome history with incrementally maintained window sums.

use std::ops::Range;

use super::BeliefError;

/// One arm's record for one elapsed turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trial {
    pub tried: bool,
    pub won: bool,
}

impl Trial {
    pub const IDLE: Trial = Trial {
        tried: false,
        won: false,
    };

    pub const fn new(tried: bool, won: bool) -> Self {
        Self { tried, won }
    }
}

/// Trial and win counts over some index range of the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub tries: u64,
    pub wins: u64,
}

impl Counts {
    fn add(&mut self, trial: Trial) {
        self.tries += u64::from(trial.tried);
        self.wins += u64::from(trial.won);
    }

    fn remove(&mut self, trial: Trial) {
        self.tries -= u64::from(trial.tried);
        self.wins -= u64::from(trial.won);
    }

    /// Laplace-smoothed estimate: one prior win out of two prior tries.
    pub fn smoothed(&self) -> f64 {
        (self.wins as f64 + 1.0) / (self.tries as f64 + 2.0)
    }
}

/// Visible slice `[max(0, H - memory - latency), max(0, H - latency))` of a
/// history of length `len`.
pub fn visible_range(len: usize, latency: usize, memory: usize) -> Range<usize> {
    let end = len.saturating_sub(latency);
    let start = end.saturating_sub(memory);
    start..end
}

/// Ever-growing logical history of `(tried, won)` pairs for every arm.
///
/// Only the entries a window can still reference are kept: the backing store
/// is a ring addressed by `turn % capacity`, with `capacity = latency +
/// memory + 1`. It grows on demand until the capacity is reached, so an
/// effectively unbounded memory never preallocates. Window and all-time
/// counts are updated as each turn is pushed.
#[derive(Debug, Clone)]
pub struct History {
    arms: usize,
    latency: usize,
    memory: usize,
    capacity: usize,
    len: usize,
    slots: Vec<Trial>,
    window: Vec<Counts>,
    totals: Vec<Counts>,
}

impl History {
    pub fn new(arms: usize, latency: usize, memory: usize) -> Self {
        Self {
            arms,
            latency,
            memory,
            capacity: latency.saturating_add(memory).saturating_add(1),
            len: 0,
            slots: Vec::new(),
            window: vec![Counts::default(); arms],
            totals: vec![Counts::default(); arms],
        }
    }

    pub fn arms(&self) -> usize {
        self.arms
    }

    pub fn latency(&self) -> usize {
        self.latency
    }

    pub fn memory(&self) -> usize {
        self.memory
    }

    /// Number of elapsed turns recorded for every arm.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Record the turn in which `chosen` was tried; every other arm gets an
    /// idle entry so all arms advance in lockstep. An out-of-range arm leaves
    /// the history untouched.
    pub fn record_choice(&mut self, chosen: usize, won: bool) -> Result<(), BeliefError> {
        if chosen >= self.arms {
            return Err(BeliefError::ArmOutOfRange {
                arm: chosen,
                arms: self.arms,
            });
        }
        let turn = self.len;
        let base = self.slot_base(turn);
        let growing = base == self.slots.len();
        for arm in 0..self.arms {
            let trial = if arm == chosen {
                Trial::new(true, won)
            } else {
                Trial::IDLE
            };
            if growing {
                self.slots.push(trial);
            } else {
                self.slots[base + arm] = trial;
            }
            self.totals[arm].add(trial);
        }
        self.len += 1;
        self.slide_window(turn);
        Ok(())
    }

    /// Indices of the turns currently visible to belief formation.
    pub fn visible_range(&self) -> Range<usize> {
        visible_range(self.len, self.latency, self.memory)
    }

    /// Length of the visible window: `min(memory, max(0, H - latency))`.
    pub fn window_len(&self) -> usize {
        self.visible_range().len()
    }

    /// Counts over the visible window for `arm`.
    pub fn visible(&self, arm: usize) -> Counts {
        self.window[arm]
    }

    /// Counts over the whole history for `arm`, ignoring latency and memory.
    pub fn totals(&self, arm: usize) -> Counts {
        self.totals[arm]
    }

    /// The entry recorded at `turn` for `arm`, if it is still retained.
    pub fn get(&self, turn: usize, arm: usize) -> Option<Trial> {
        if arm >= self.arms || turn >= self.len || self.len - turn > self.capacity {
            return None;
        }
        self.slots.get(self.slot_base(turn) + arm).copied()
    }

    fn slot_base(&self, turn: usize) -> usize {
        (turn % self.capacity) * self.arms
    }

    // The window end advances over `turn - latency` and its start drops
    // `turn - latency - memory`; both are still inside the ring.
    fn slide_window(&mut self, turn: usize) {
        let Some(entering) = turn.checked_sub(self.latency) else {
            return;
        };
        for arm in 0..self.arms {
            let trial = self.slots[self.slot_base(entering) + arm];
            self.window[arm].add(trial);
        }

        let Some(leaving) = entering.checked_sub(self.memory) else {
            return;
        };
        for arm in 0..self.arms {
            let trial = self.slots[self.slot_base(leaving) + arm];
            self.window[arm].remove(trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_counts(log: &[(usize, bool)], arm: usize, range: Range<usize>) -> Counts {
        let mut counts = Counts::default();
        for &(chosen, won) in &log[range] {
            if chosen == arm {
                counts.tries += 1;
                counts.wins += u64::from(won);
            }
        }
        counts
    }

    #[test]
    fn visible_range_clamps_at_zero() {
        assert_eq!(visible_range(0, 4, 10), 0..0);
        assert_eq!(visible_range(3, 4, 10), 0..0);
        assert_eq!(visible_range(6, 4, 10), 0..2);
        assert_eq!(visible_range(30, 4, 10), 16..26);
        assert_eq!(visible_range(30, 0, 10), 20..30);
        assert_eq!(visible_range(30, 0, usize::MAX), 0..30);
        assert_eq!(visible_range(30, 12, 5), 13..18);
        assert_eq!(visible_range(30, 2, 0), 28..28);
    }

    #[test]
    fn every_arm_grows_by_one_entry_per_turn() {
        let mut history = History::new(3, 0, 500);
        for turn in 0..10 {
            history.record_choice(turn % 3, turn % 2 == 0).unwrap();
        }
        assert_eq!(history.len(), 10);
        for arm in 0..3 {
            let recorded = (0..10).filter(|t| history.get(*t, arm).is_some()).count();
            assert_eq!(recorded, 10);
        }
        assert_eq!(history.get(4, 1), Some(Trial::new(true, true)));
        assert_eq!(history.get(4, 0), Some(Trial::IDLE));
    }

    #[test]
    fn incremental_window_matches_resummation() {
        let log: Vec<(usize, bool)> = (0..200)
            .map(|t| ((t * 7 + t / 3) % 4, (t * 13) % 5 < 2))
            .collect();

        for &(latency, memory) in &[(0, 500), (0, 10), (3, 10), (12, 5), (5, 0), (0, 1)] {
            let mut history = History::new(4, latency, memory);
            for (step, &(chosen, won)) in log.iter().enumerate() {
                history.record_choice(chosen, won).unwrap();
                let range = visible_range(step + 1, latency, memory);
                assert_eq!(history.window_len(), range.len());
                for arm in 0..4 {
                    assert_eq!(
                        history.visible(arm),
                        naive_counts(&log, arm, range.clone()),
                        "latency={latency} memory={memory} len={}",
                        step + 1
                    );
                }
            }
        }
    }

    #[test]
    fn totals_ignore_the_window() {
        let mut history = History::new(2, 3, 1);
        for turn in 0..8 {
            history.record_choice(0, turn % 2 == 0).unwrap();
        }
        assert_eq!(history.totals(0), Counts { tries: 8, wins: 4 });
        assert_eq!(history.totals(1), Counts::default());
        assert_eq!(history.visible(0).tries, 1);
    }

    #[test]
    fn evicted_entries_are_no_longer_addressable() {
        let mut history = History::new(1, 1, 2);
        for _ in 0..10 {
            history.record_choice(0, true).unwrap();
        }
        assert!(history.get(9, 0).is_some());
        assert!(history.get(6, 0).is_some());
        assert!(history.get(5, 0).is_none());
    }

    #[test]
    fn out_of_range_arm_is_rejected_without_recording() {
        let mut history = History::new(2, 0, 5);
        history.record_choice(1, true).unwrap();

        let err = history.record_choice(2, true).unwrap_err();
        assert_eq!(err, BeliefError::ArmOutOfRange { arm: 2, arms: 2 });
        assert_eq!(history.len(), 1);
        assert_eq!(history.totals(0).tries + history.totals(1).tries, 1);
        assert_eq!(history.get(1, 0), None);
    }

    #[test]
    fn smoothing_never_reaches_the_bounds() {
        assert_eq!(Counts::default().smoothed(), 0.5);
        let all_wins = Counts { tries: 1_000, wins: 1_000 };
        let no_wins = Counts { tries: 1_000, wins: 0 };
        assert!(all_wins.smoothed() < 1.0);
        assert!(no_wins.smoothed() > 0.0);
    }
}
