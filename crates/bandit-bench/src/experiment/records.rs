use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bandit_core::{FinalMetrics, TimeSeries};
use serde::Serialize;

use super::RunnerError;
use super::conditions::Condition;

pub const PARAMETER_HEADER: [&str; 11] = [
    "ARMS",
    "TURNS",
    "PAYOFF_FXN",
    "TURBULENCE_FXN",
    "STRATEGY_FXN",
    "BELIEF_FXN",
    "TURBULENCE",
    "STRATEGY",
    "LATENCY",
    "INITIAL_LEARNING",
    "MEMORY",
];

pub const METRIC_NAMES: [&str; 4] = ["SCORE", "KNOWLEDGE", "OPINION", "PROBEXPLORE"];

/// Component labels of one condition, as they appear in every table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionLabels {
    pub payoff: String,
    pub turbulence_model: String,
    pub policy: String,
    pub belief: String,
}

/// Parameter columns shared by the detail and summary tables.
pub fn parameter_fields(condition: &Condition, labels: &ConditionLabels) -> Vec<String> {
    vec![
        condition.arms.to_string(),
        condition.turns.to_string(),
        labels.payoff.clone(),
        labels.turbulence_model.clone(),
        labels.policy.clone(),
        labels.belief.clone(),
        condition.turbulence.to_string(),
        condition.strategy.to_string(),
        condition.latency.to_string(),
        condition.initial_learning.to_string(),
        condition.memory.to_string(),
    ]
}

pub fn detail_header() -> Vec<String> {
    ["EXPERIMENT", "REPLICATION"]
        .into_iter()
        .chain(PARAMETER_HEADER)
        .chain(METRIC_NAMES)
        .map(str::to_string)
        .collect()
}

pub fn summary_header() -> Vec<String> {
    std::iter::once("EXPERIMENT".to_string())
        .chain(PARAMETER_HEADER.into_iter().map(str::to_string))
        .chain(METRIC_NAMES.into_iter().map(|name| format!("MEAN_{name}")))
        .collect()
}

/// `EXPERIMENT,REPLICATION,METRIC,T1..Tn` with `n` the longest run.
pub fn timeseries_header(turns: usize) -> Vec<String> {
    ["EXPERIMENT", "REPLICATION", "METRIC"]
        .into_iter()
        .map(str::to_string)
        .chain((1..=turns).map(|turn| format!("T{turn}")))
        .collect()
}

pub fn detail_fields(
    condition: &Condition,
    replication: usize,
    parameters: &[String],
    metrics: &FinalMetrics,
) -> Vec<String> {
    let mut fields = Vec::with_capacity(2 + parameters.len() + METRIC_NAMES.len());
    fields.push(condition.id.to_string());
    fields.push(replication.to_string());
    fields.extend(parameters.iter().cloned());
    fields.push(metrics.score.to_string());
    fields.push(metrics.knowledge.to_string());
    fields.push(metrics.opinion.to_string());
    fields.push(metrics.probexplore.to_string());
    fields
}

pub fn summary_fields(
    condition: &Condition,
    parameters: &[String],
    means: [f64; 4],
) -> Vec<String> {
    std::iter::once(condition.id.to_string())
        .chain(parameters.iter().cloned())
        .chain(means.iter().map(f64::to_string))
        .collect()
}

/// One row per metric for a finished replication.
pub fn timeseries_rows(
    condition: &Condition,
    replication: usize,
    series: &TimeSeries,
) -> Vec<Vec<String>> {
    let prefix = |metric: &str| {
        vec![
            condition.id.to_string(),
            replication.to_string(),
            metric.to_string(),
        ]
    };
    let mut score = prefix(METRIC_NAMES[0]);
    score.extend(series.score.iter().map(i64::to_string));
    let mut knowledge = prefix(METRIC_NAMES[1]);
    knowledge.extend(series.knowledge.iter().map(f64::to_string));
    let mut opinion = prefix(METRIC_NAMES[2]);
    opinion.extend(series.opinion.iter().map(f64::to_string));
    let mut probexplore = prefix(METRIC_NAMES[3]);
    probexplore.extend(series.probexplore.iter().map(f64::to_string));
    vec![score, knowledge, opinion, probexplore]
}

/// Comma-separated table flushed after every record, so an aborted sweep
/// leaves only complete rows behind.
pub struct CsvTable {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: usize,
}

impl CsvTable {
    pub fn create(path: &Path, header: &[String]) -> Result<Self, RunnerError> {
        let file =
            File::create(path).map_err(|source| RunnerError::io("creating table", path, source))?;
        let mut table = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            rows: 0,
        };
        table.write_line(header)?;
        Ok(table)
    }

    pub fn append(&mut self, fields: &[String]) -> Result<(), RunnerError> {
        self.write_line(fields)?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far, excluding the header.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, fields: &[String]) -> Result<(), RunnerError> {
        let line = fields.join(",");
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|source| RunnerError::io("writing table row", &self.path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition() -> Condition {
        Condition {
            id: 3,
            arms: 10,
            turns: 500,
            payoff: 0,
            turbulence_model: 0,
            policy: 0,
            turbulence: 0.02,
            belief: 0,
            strategy: 0.5,
            latency: 4,
            memory: 500,
            initial_learning: 4,
        }
    }

    fn labels() -> ConditionLabels {
        ConditionLabels {
            payoff: "beta[2 2]".to_string(),
            turbulence_model: "random_shock[0.5]".to_string(),
            policy: "softmax".to_string(),
            belief: "windowed".to_string(),
        }
    }

    #[test]
    fn headers_match_the_published_layout() {
        assert_eq!(
            detail_header().join(","),
            "EXPERIMENT,REPLICATION,ARMS,TURNS,PAYOFF_FXN,TURBULENCE_FXN,STRATEGY_FXN,BELIEF_FXN,TURBULENCE,STRATEGY,LATENCY,INITIAL_LEARNING,MEMORY,SCORE,KNOWLEDGE,OPINION,PROBEXPLORE"
        );
        assert_eq!(
            summary_header().join(","),
            "EXPERIMENT,ARMS,TURNS,PAYOFF_FXN,TURBULENCE_FXN,STRATEGY_FXN,BELIEF_FXN,TURBULENCE,STRATEGY,LATENCY,INITIAL_LEARNING,MEMORY,MEAN_SCORE,MEAN_KNOWLEDGE,MEAN_OPINION,MEAN_PROBEXPLORE"
        );
        assert_eq!(
            timeseries_header(3).join(","),
            "EXPERIMENT,REPLICATION,METRIC,T1,T2,T3"
        );
    }

    #[test]
    fn detail_row_lines_up_with_header() {
        let parameters = parameter_fields(&condition(), &labels());
        let metrics = FinalMetrics {
            score: -12,
            knowledge: 0.75,
            opinion: 0.125,
            probexplore: 0.5,
        };
        let fields = detail_fields(&condition(), 7, &parameters, &metrics);
        assert_eq!(fields.len(), detail_header().len());
        assert_eq!(
            fields.join(","),
            "3,7,10,500,beta[2 2],random_shock[0.5],softmax,windowed,0.02,0.5,4,4,500,-12,0.75,0.125,0.5"
        );

        let summary = summary_fields(&condition(), &parameters, [1.5, 0.25, 0.0, 1.0]);
        assert_eq!(summary.len(), summary_header().len());
        assert!(summary.join(",").ends_with(",500,1.5,0.25,0,1"));
    }

    #[test]
    fn timeseries_rows_cover_every_metric() {
        let series = TimeSeries {
            score: vec![1, 0],
            knowledge: vec![0.5, 0.6],
            opinion: vec![0.0, 0.1],
            probexplore: vec![0.9, 0.8],
        };
        let rows = timeseries_rows(&condition(), 2, &series);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].join(","), "3,2,SCORE,1,0");
        assert_eq!(rows[3].join(","), "3,2,PROBEXPLORE,0.9,0.8");
    }

    #[test]
    fn table_rows_are_flushed_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("table.csv");
        let mut table =
            CsvTable::create(&path, &["A".to_string(), "B".to_string()]).expect("create");
        table
            .append(&["1".to_string(), "2".to_string()])
            .expect("append");

        let contents = std::fs::read_to_string(&path).expect("read");
        assert_eq!(contents, "A,B\n1,2\n");
        assert_eq!(table.rows(), 1);
        assert_eq!(table.path(), path.as_path());
    }
}
