mod components;
mod conditions;
mod records;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bandit_core::{AppInfo, Bandit, BanditConfig, FinalMetrics, SimulationError, TimeSeries};
use rand::{RngCore, SeedableRng, rngs::StdRng};
use serde::Serialize;
use thiserror::Error;
use tracing::{Level, event};

use crate::analytics::{AnalyticsError, ConditionAccumulator, ExperimentReport};
use crate::config::{AxesConfig, ExperimentConfig, ResolvedOutputs, RngMode};

pub use components::{ComponentError, ComponentSet};
pub use conditions::{Condition, ConditionGrid};
pub use records::ConditionLabels;

use records::CsvTable;

/// Runs every condition of a parameter sweep and streams its tables to disk.
pub struct ExperimentRunner {
    config: ExperimentConfig,
    outputs: ResolvedOutputs,
    components: ComponentSet,
    grid: ConditionGrid,
    seed: u64,
}

/// Workload announced before the sweep starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub conditions: usize,
    pub replications: usize,
    pub turns: Vec<usize>,
    /// Scored turns over the whole sweep.
    pub total_turns: u64,
}

/// Summary details returned after a run.
#[derive(Debug)]
pub struct RunSummary {
    pub conditions: usize,
    pub replications: usize,
    pub seed: u64,
    pub rows_written: usize,
    pub elapsed: Duration,
    pub data_path: PathBuf,
    pub summary_path: PathBuf,
    pub manifest_path: PathBuf,
    pub timeseries_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
}

/// Result of a single replication.
struct Replication {
    metrics: FinalMetrics,
    series: Option<TimeSeries>,
    elapsed: Option<Duration>,
}

#[derive(Serialize)]
struct Manifest<'a> {
    name: &'a str,
    engine: String,
    seed: u64,
    rng_mode: RngMode,
    plan: &'a Plan,
    axes: &'a AxesConfig,
    conditions: Vec<ManifestCondition>,
}

/// Resolved run parameters of one condition, in sweep order.
#[derive(Serialize)]
struct ManifestCondition {
    id: usize,
    config: BanditConfig,
    labels: ConditionLabels,
}

impl ExperimentRunner {
    /// Build a runner from a validated configuration. An absent seed is
    /// drawn here so it can be announced and recorded before running.
    pub fn new(config: ExperimentConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let components = ComponentSet::from_axes(&config.axes)?;
        let grid = ConditionGrid::new(&config.axes);
        let seed = config.rng.seed.unwrap_or_else(rand::random);

        Ok(Self {
            config,
            outputs,
            components,
            grid,
            seed,
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn plan(&self) -> Plan {
        Plan {
            conditions: self.grid.len(),
            replications: self.config.replications,
            turns: self.config.axes.turns.clone(),
            total_turns: self.grid.turns_per_replication() * self.config.replications as u64,
        }
    }

    /// Execute the sweep. Any failure aborts the remaining conditions; rows
    /// already written stay on disk.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        let started = Instant::now();
        let plan = self.plan();
        let name = self.config.name.as_str();

        ensure_parent(self.outputs.data.parent())?;
        ensure_parent(self.outputs.summary.parent())?;
        self.write_manifest(&plan)?;

        let mut detail = CsvTable::create(&self.outputs.data, &records::detail_header())?;
        let mut summary = CsvTable::create(&self.outputs.summary, &records::summary_header())?;
        let mut timeseries = match self.outputs.timeseries.as_deref() {
            Some(path) => {
                ensure_parent(path.parent())?;
                Some(CsvTable::create(
                    path,
                    &records::timeseries_header(self.grid.longest_run()),
                )?)
            }
            None => None,
        };
        let mut report = ExperimentReport::new(name, self.seed, self.config.replications);

        let turns = plan
            .turns
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(" or ");
        event!(
            target: "bandit_bench::progress",
            Level::INFO,
            experiment = name,
            seed = self.seed,
            "Planning {} experiments with {} replications x {} turns each. I.e., a total of {} turns of processing.",
            plan.conditions,
            plan.replications,
            turns,
            plan.total_turns
        );

        let mut master = StdRng::seed_from_u64(self.seed);
        for condition in self.grid.iter() {
            let labels = self.labels(&condition)?;
            let parameters = records::parameter_fields(&condition, &labels);
            let description = describe(&condition, &labels);
            event!(
                target: "bandit_bench::progress",
                Level::INFO,
                condition = condition.id,
                "Starting experiment {} of {} with: {}",
                condition.id,
                plan.conditions,
                description
            );

            let condition_started = Instant::now();
            let mut accumulator = ConditionAccumulator::new(condition.id);
            for replication in 1..=self.config.replications {
                let outcome = match self.config.rng.mode {
                    RngMode::Shared => self.replicate(&condition, &mut master),
                    RngMode::PerReplication => {
                        let mut rng = StdRng::seed_from_u64(master.next_u64());
                        self.replicate(&condition, &mut rng)
                    }
                }
                .map_err(|err| {
                    event!(
                        target: "bandit_bench::progress",
                        Level::ERROR,
                        condition = condition.id,
                        replication,
                        "Experiment {} failed on replication {}: {}",
                        condition.id,
                        replication,
                        err
                    );
                    err.at(condition.id, replication)
                })?;

                detail.append(&records::detail_fields(
                    &condition,
                    replication,
                    &parameters,
                    &outcome.metrics,
                ))?;
                if let (Some(table), Some(series)) = (timeseries.as_mut(), outcome.series.as_ref())
                {
                    for row in records::timeseries_rows(&condition, replication, series) {
                        table.append(&row)?;
                    }
                }
                accumulator.record(&outcome.metrics);

                if tracing::enabled!(target: "bandit_bench::replication", Level::DEBUG) {
                    event!(
                        target: "bandit_bench::replication",
                        Level::DEBUG,
                        condition = condition.id,
                        replication,
                        score = outcome.metrics.score,
                        elapsed_us = outcome.elapsed.map(|d| d.as_micros() as u64).unwrap_or(0),
                        "replication {} of experiment {} simulated in {:?}",
                        replication,
                        condition.id,
                        outcome.elapsed.unwrap_or_default()
                    );
                }
            }

            let condition_summary = accumulator.finish()?;
            summary.append(&records::summary_fields(
                &condition,
                &parameters,
                condition_summary.means(),
            ))?;
            report.push(description, condition_summary);

            event!(
                target: "bandit_bench::progress",
                Level::INFO,
                condition = condition.id,
                "FINISHED in {:?}",
                condition_started.elapsed()
            );
        }

        if let Some(path) = self.outputs.report.as_deref() {
            ensure_parent(path.parent())?;
            report.write_markdown(path)?;
        }

        let elapsed = started.elapsed();
        event!(
            target: "bandit_bench::progress",
            Level::INFO,
            experiment = name,
            rows = detail.rows(),
            "All experiments completed in {:?}",
            elapsed
        );

        Ok(RunSummary {
            conditions: plan.conditions,
            replications: plan.replications,
            seed: self.seed,
            rows_written: detail.rows(),
            elapsed,
            data_path: detail.path().to_path_buf(),
            summary_path: summary.path().to_path_buf(),
            manifest_path: self.outputs.manifest.clone(),
            timeseries_path: timeseries.as_ref().map(|table| table.path().to_path_buf()),
            report_path: self.outputs.report.clone(),
        })
    }

    fn replicate(
        &self,
        condition: &Condition,
        rng: &mut dyn RngCore,
    ) -> Result<Replication, ReplicationError> {
        let components = self.components.for_condition(condition)?;
        let mut bandit = Bandit::new(condition.bandit_config(), components, rng)?;
        let metrics = bandit.simulate(rng)?;
        let series = if self.outputs.timeseries.is_some() {
            bandit.series().cloned()
        } else {
            None
        };
        Ok(Replication {
            metrics,
            series,
            elapsed: bandit.elapsed(),
        })
    }

    fn labels(&self, condition: &Condition) -> Result<ConditionLabels, RunnerError> {
        let components = self.components.for_condition(condition)?;
        Ok(ConditionLabels {
            payoff: components.payoff.label(),
            turbulence_model: components.turbulence.label(),
            policy: components.policy.label(),
            belief: components.belief.label(),
        })
    }

    fn write_manifest(&self, plan: &Plan) -> Result<(), RunnerError> {
        let path = &self.outputs.manifest;
        ensure_parent(path.parent())?;
        let file = File::create(path)
            .map_err(|source| RunnerError::io("creating manifest", path, source))?;
        let mut writer = BufWriter::new(file);
        let conditions = self
            .grid
            .iter()
            .map(|condition| {
                Ok(ManifestCondition {
                    id: condition.id,
                    config: condition.bandit_config(),
                    labels: self.labels(&condition)?,
                })
            })
            .collect::<Result<Vec<_>, RunnerError>>()?;
        let manifest = Manifest {
            name: &self.config.name,
            engine: format!("{} {}", AppInfo::name(), AppInfo::version()),
            seed: self.seed,
            rng_mode: self.config.rng.mode,
            plan,
            axes: &self.config.axes,
            conditions,
        };
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer
            .write_all(b"\n")
            .and_then(|_| writer.flush())
            .map_err(|source| RunnerError::io("writing manifest", path, source))
    }
}

fn describe(condition: &Condition, labels: &ConditionLabels) -> String {
    format!(
        "arms={} turns={} payoff={} turbulence_fxn={} strategy_fxn={} belief={} turbulence={} strategy={} latency={} initial_learning={} memory={}",
        condition.arms,
        condition.turns,
        labels.payoff,
        labels.turbulence_model,
        labels.policy,
        labels.belief,
        condition.turbulence,
        condition.strategy,
        condition.latency,
        condition.initial_learning,
        condition.memory
    )
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .map_err(|source| RunnerError::io("creating output directory", dir, source))?;
    }
    Ok(())
}

/// Failure inside one replication, before it is tagged with its position.
#[derive(Debug, Error)]
enum ReplicationError {
    #[error("{0}")]
    Component(#[from] ComponentError),
    #[error("{0}")]
    Simulation(#[from] SimulationError),
}

impl ReplicationError {
    fn at(self, condition: usize, replication: usize) -> RunnerError {
        match self {
            ReplicationError::Component(source) => RunnerError::Component(source),
            ReplicationError::Simulation(source) => RunnerError::Simulation {
                condition,
                replication,
                source,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{0}")]
    Component(#[from] ComponentError),
    #[error("experiment {condition} replication {replication} failed: {source}")]
    Simulation {
        condition: usize,
        replication: usize,
        #[source]
        source: SimulationError,
    },
    #[error("{context} at {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize manifest: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
}

impl RunnerError {
    fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        RunnerError::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputsConfig, PolicySpec};

    fn config(dir: &Path) -> ExperimentConfig {
        let mut config = ExperimentConfig {
            name: "unit".to_string(),
            replications: 3,
            axes: AxesConfig {
                arms: vec![3],
                turns: vec![20],
                strategy: vec![0.5, 1.0],
                ..AxesConfig::default()
            },
            outputs: OutputsConfig {
                dir: dir.display().to_string(),
                timeseries: true,
                report: true,
            },
            ..ExperimentConfig::default()
        };
        config.rng.seed = Some(99);
        config.logging.echo = false;
        config.validate().expect("valid config");
        config
    }

    #[test]
    fn plan_counts_conditions_and_turns() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.axes.turns = vec![10, 30];
        let outputs = cfg.resolved_outputs();
        let runner = ExperimentRunner::new(cfg, outputs).expect("runner");
        let plan = runner.plan();
        assert_eq!(plan.conditions, 4);
        assert_eq!(plan.replications, 3);
        assert_eq!(plan.total_turns, 3 * 2 * 40);
        assert_eq!(runner.seed(), 99);
    }

    #[test]
    fn writes_every_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());
        let outputs = cfg.resolved_outputs();
        let runner = ExperimentRunner::new(cfg, outputs).expect("runner");
        let summary = runner.run().expect("run");

        assert_eq!(summary.conditions, 2);
        assert_eq!(summary.rows_written, 6);

        let data = fs::read_to_string(&summary.data_path).expect("data");
        assert_eq!(data.lines().count(), 7);
        let table = fs::read_to_string(&summary.summary_path).expect("summary");
        assert_eq!(table.lines().count(), 3);
        let series_path = summary.timeseries_path.expect("timeseries enabled");
        let series = fs::read_to_string(series_path).expect("timeseries");
        assert_eq!(series.lines().count(), 1 + 6 * 4);
        let header = series.lines().next().expect("header");
        assert!(header.ends_with(",T20"));
        let report = fs::read_to_string(summary.report_path.expect("report")).expect("report");
        assert!(report.contains("# Experiment unit"));
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary.manifest_path).expect("manifest"))
                .expect("json");
        assert_eq!(manifest["seed"], 99);
        assert_eq!(manifest["plan"]["conditions"], 2);
    }

    #[test]
    fn manifest_lists_resolved_condition_parameters() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());
        let outputs = cfg.resolved_outputs();
        let runner = ExperimentRunner::new(cfg, outputs).expect("runner");
        let summary = runner.run().expect("run");

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(summary.manifest_path).expect("manifest"))
                .expect("json");
        let engine = manifest["engine"].as_str().expect("engine string");
        assert_eq!(engine, format!("bandit {}", AppInfo::version()));
        let conditions = manifest["conditions"].as_array().expect("condition list");
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0]["id"], 1);
        assert_eq!(conditions[0]["config"]["arms"], 3);
        assert_eq!(conditions[0]["config"]["turns"], 20);
        assert_eq!(conditions[1]["config"]["strategy"], 1.0);
        assert_eq!(conditions[1]["labels"]["policy"], "softmax");
    }

    #[test]
    fn failure_aborts_remaining_conditions() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cfg = config(dir.path());
        cfg.axes.policy = vec![PolicySpec::Softmax];
        cfg.axes.strategy = vec![1.0, 0.0, 0.5];
        let outputs = cfg.resolved_outputs();
        let runner = ExperimentRunner::new(cfg, outputs.clone()).expect("runner");

        let err = runner.run().err().expect("tau = 0 fails");
        assert!(matches!(
            err,
            RunnerError::Simulation {
                condition: 2,
                replication: 1,
                ..
            }
        ));

        let data = fs::read_to_string(&outputs.data).expect("data");
        assert_eq!(data.lines().count(), 1 + 3);
        assert!(data.lines().skip(1).all(|line| line.starts_with("1,")));
        let summary = fs::read_to_string(&outputs.summary).expect("summary");
        assert_eq!(summary.lines().count(), 2);
    }
}
