use std::fs;
use std::path::Path;

use bandit_core::FinalMetrics;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use thiserror::Error;

const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("condition {condition} finished without any replication")]
    EmptyCondition { condition: usize },
    #[error("failed to build t distribution: {0}")]
    Distribution(String),
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Running totals of the final metrics of one condition.
#[derive(Debug, Clone)]
pub struct ConditionAccumulator {
    condition: usize,
    scores: Vec<f64>,
    knowledge: f64,
    opinion: f64,
    probexplore: f64,
}

impl ConditionAccumulator {
    pub fn new(condition: usize) -> Self {
        Self {
            condition,
            scores: Vec::new(),
            knowledge: 0.0,
            opinion: 0.0,
            probexplore: 0.0,
        }
    }

    pub fn record(&mut self, metrics: &FinalMetrics) {
        self.scores.push(metrics.score as f64);
        self.knowledge += metrics.knowledge;
        self.opinion += metrics.opinion;
        self.probexplore += metrics.probexplore;
    }

    pub fn replications(&self) -> usize {
        self.scores.len()
    }

    pub fn finish(self) -> Result<ConditionSummary, AnalyticsError> {
        if self.scores.is_empty() {
            return Err(AnalyticsError::EmptyCondition {
                condition: self.condition,
            });
        }
        let n = self.scores.len() as f64;
        let (ci_low, ci_high) = confidence_interval(&self.scores)?;
        Ok(ConditionSummary {
            condition: self.condition,
            replications: self.scores.len(),
            mean_score: self.scores.iter().sum::<f64>() / n,
            mean_knowledge: self.knowledge / n,
            mean_opinion: self.opinion / n,
            mean_probexplore: self.probexplore / n,
            score_ci_low: ci_low,
            score_ci_high: ci_high,
        })
    }
}

/// Arithmetic means of one condition's final metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionSummary {
    pub condition: usize,
    pub replications: usize,
    pub mean_score: f64,
    pub mean_knowledge: f64,
    pub mean_opinion: f64,
    pub mean_probexplore: f64,
    pub score_ci_low: f64,
    pub score_ci_high: f64,
}

impl ConditionSummary {
    /// Means in table column order.
    pub fn means(&self) -> [f64; 4] {
        [
            self.mean_score,
            self.mean_knowledge,
            self.mean_opinion,
            self.mean_probexplore,
        ]
    }
}

/// Report row: a condition's summary with a human-readable parameter line.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub parameters: String,
    pub summary: ConditionSummary,
}

/// Markdown digest of a finished experiment.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub name: String,
    pub seed: u64,
    pub replications: usize,
    pub rows: Vec<ReportRow>,
}

impl ExperimentReport {
    pub fn new(name: impl Into<String>, seed: u64, replications: usize) -> Self {
        Self {
            name: name.into(),
            seed,
            replications,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, parameters: String, summary: ConditionSummary) {
        self.rows.push(ReportRow {
            parameters,
            summary,
        });
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# Experiment {}\n\n", self.name));
        out.push_str(&format!(
            "Seed: {} | Replications per condition: {}\n\n",
            self.seed, self.replications
        ));
        out.push_str("| Condition | Parameters | Mean score | 95% CI | Mean knowledge | Mean opinion | Mean probexplore |\n");
        out.push_str("|-----------|------------|------------|--------|----------------|--------------|------------------|\n");
        for row in &self.rows {
            let s = &row.summary;
            out.push_str(&format!(
                "| {id} | {params} | {score:.3} | [{low:.3}, {high:.3}] | {knowledge:.4} | {opinion:.4} | {explore:.4} |\n",
                id = s.condition,
                params = row.parameters,
                score = s.mean_score,
                low = s.score_ci_low,
                high = s.score_ci_high,
                knowledge = s.mean_knowledge,
                opinion = s.mean_opinion,
                explore = s.mean_probexplore,
            ));
        }
        out
    }

    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        fs::write(path, self.to_markdown()).map_err(|source| AnalyticsError::Io {
            context: "writing experiment report",
            source,
        })
    }
}

/// Two-sided Student's t interval for the mean of `points`.
pub fn confidence_interval(points: &[f64]) -> Result<(f64, f64), AnalyticsError> {
    if points.is_empty() {
        return Ok((0.0, 0.0));
    }
    let n = points.len() as f64;
    let mean = points.iter().sum::<f64>() / n;
    if points.len() == 1 {
        return Ok((mean, mean));
    }
    let variance = points
        .iter()
        .map(|value| (value - mean).powi(2))
        .sum::<f64>()
        / (n - 1.0);
    let std_error = (variance / n).sqrt();
    let t = StudentsT::new(0.0, 1.0, n - 1.0)
        .map_err(|err| AnalyticsError::Distribution(err.to_string()))?;
    let margin = t.inverse_cdf(0.5 + CONFIDENCE_LEVEL / 2.0) * std_error;
    Ok((mean - margin, mean + margin))
}
