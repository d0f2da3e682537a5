use std::fs;
use std::path::Path;

use bandit_bench::config::{ExperimentConfig, RngMode};
use bandit_bench::experiment::{ExperimentRunner, RunSummary, RunnerError};
use sha2::{Digest, Sha256};
use tempfile::tempdir;

fn load_config(output_dir: &Path, name: &str) -> ExperimentConfig {
    let yaml = format!(
        r#"
name: "{name}"
replications: 4
rng:
  seed: 4242
axes:
  arms: [4]
  turns: [60]
  turbulence: [0, 0.05]
  strategy: [0.25, 1]
  latency: [0, 2]
  memory: [30]
outputs:
  dir: "{dir}"
  timeseries: false
  report: true
logging:
  echo: false
"#,
        dir = output_dir.display(),
    );

    let mut cfg: ExperimentConfig = serde_yaml::from_str(&yaml).expect("valid yaml");
    cfg.validate().expect("config validates");
    cfg
}

fn run(cfg: ExperimentConfig) -> Result<RunSummary, RunnerError> {
    let outputs = cfg.resolved_outputs();
    ExperimentRunner::new(cfg, outputs)
        .expect("runner created")
        .run()
}

fn digest(path: &Path) -> String {
    let bytes = fs::read(path).expect("output readable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    hex::encode(hasher.finalize())
}

fn rows(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .expect("table readable")
        .lines()
        .skip(1)
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

#[test]
fn same_seed_produces_identical_tables() {
    let dir = tempdir().expect("temp dir");
    let first = run(load_config(dir.path(), "first")).expect("first run");
    let second = run(load_config(dir.path(), "second")).expect("second run");

    assert_eq!(first.conditions, 8);
    assert_eq!(first.rows_written, 32);
    assert_eq!(digest(&first.data_path), digest(&second.data_path));
    assert_eq!(digest(&first.summary_path), digest(&second.summary_path));
    assert!(first.report_path.expect("report enabled").exists());
}

#[test]
fn summary_means_equal_mean_of_detail_rows() {
    let dir = tempdir().expect("temp dir");
    let summary = run(load_config(dir.path(), "means")).expect("run");

    let detail = rows(&summary.data_path);
    let means = rows(&summary.summary_path);
    assert_eq!(means.len(), summary.conditions);

    for row in &means {
        let condition = &row[0];
        let members: Vec<&Vec<String>> = detail.iter().filter(|d| &d[0] == condition).collect();
        assert_eq!(members.len(), 4);
        for member in &members {
            // Parameter columns repeat verbatim between the two tables.
            assert_eq!(&member[2..13], &row[1..12]);
        }
        for (metric, column) in (13..17).enumerate() {
            let expected = members
                .iter()
                .map(|m| m[column].parse::<f64>().expect("numeric metric"))
                .sum::<f64>()
                / members.len() as f64;
            let actual: f64 = row[12 + metric].parse().expect("numeric mean");
            assert!(
                (expected - actual).abs() < 1e-9,
                "condition {condition} metric {metric}: {expected} vs {actual}"
            );
        }
    }
}

#[test]
fn initial_learning_defaults_to_latency_in_tables() {
    let dir = tempdir().expect("temp dir");
    let summary = run(load_config(dir.path(), "learning")).expect("run");
    for row in rows(&summary.data_path) {
        // LATENCY and INITIAL_LEARNING columns.
        assert_eq!(row[10], row[11]);
    }
}

#[test]
fn per_replication_streams_are_reproducible() {
    let dir = tempdir().expect("temp dir");
    let mut first = load_config(dir.path(), "split_a");
    let mut second = load_config(dir.path(), "split_b");
    let shared = load_config(dir.path(), "joined");
    for cfg in [&mut first, &mut second] {
        cfg.rng.mode = RngMode::PerReplication;
    }

    let first = run(first).expect("first run");
    let second = run(second).expect("second run");
    let shared = run(shared).expect("shared run");

    assert_eq!(digest(&first.data_path), digest(&second.data_path));
    assert_ne!(digest(&first.data_path), digest(&shared.data_path));
}

#[test]
fn degenerate_temperature_aborts_but_keeps_flushed_rows() {
    let dir = tempdir().expect("temp dir");
    let mut cfg = load_config(dir.path(), "broken");
    cfg.axes.turbulence = vec![0.0];
    cfg.axes.latency = vec![0];
    cfg.axes.strategy = vec![0.5, 0.0];
    let outputs = cfg.resolved_outputs();

    let err = run(cfg).err().expect("tau = 0 aborts the sweep");
    assert!(matches!(err, RunnerError::Simulation { condition: 2, .. }));
    assert!(err.to_string().contains("experiment 2 replication 1"));

    let detail = rows(&outputs.data);
    assert_eq!(detail.len(), 4);
    assert!(detail.iter().all(|row| row[0] == "1"));
    assert_eq!(rows(&outputs.summary).len(), 1);
}

#[test]
fn unwritable_output_directory_is_reported() {
    let dir = tempdir().expect("temp dir");
    let blocker = dir.path().join("blocked");
    fs::write(&blocker, b"not a directory").expect("blocker written");
    let cfg = load_config(&blocker.join("out"), "unwritable");
    let outputs = cfg.resolved_outputs();

    let err = run(cfg).err().expect("output directory cannot be created");
    match &err {
        RunnerError::Io { context, path, .. } => {
            assert_eq!(*context, "creating output directory");
            assert!(path.starts_with(&blocker));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!outputs.data.exists());
    assert!(!outputs.manifest.exists());
}
