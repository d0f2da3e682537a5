use std::path::PathBuf;

use bandit_core::AppInfo;
use clap::Parser;

use bandit_bench::config::{ExperimentConfig, ResolvedOutputs};
use bandit_bench::experiment::ExperimentRunner;
use bandit_bench::logging::init_logging;

/// Parameter-sweep driver for the bandit learning model.
#[derive(Debug, Parser)]
#[command(
    name = "bandit-bench",
    author,
    version,
    about = "Reproducible multi-armed bandit learning experiments"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "bench/experiment.yaml")]
    config: PathBuf,

    /// Override the experiment name (prefix of every output file).
    #[arg(long, value_name = "NAME")]
    name: Option<String>,

    /// Override the number of replications per condition.
    #[arg(long, value_name = "COUNT")]
    replications: Option<usize>,

    /// Override the experiment RNG seed.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Override the directory output tables are written to.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<String>,

    /// Do not mirror the narration to stdout.
    #[arg(short, long)]
    quiet: bool,

    /// Print the planned workload and exit (no experiment is run).
    #[arg(long)]
    validate_only: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = ExperimentConfig::from_path(&cli.config)?;

    if let Some(name) = cli.name {
        config.name = name;
    }

    if let Some(replications) = cli.replications {
        config.replications = replications;
    }

    if let Some(seed) = cli.seed {
        config.rng.seed = Some(seed);
    }

    if let Some(dir) = cli.output_dir {
        config.outputs.dir = dir;
    }

    if cli.quiet {
        config.logging.echo = false;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let name = config.name.clone();
    let conditions = config.axes.condition_count();
    let replications = config.replications;
    let logging = config.logging.clone();

    println!("{} engine {}", AppInfo::name(), AppInfo::version());
    println!(
        "Loaded experiment '{name}' with {conditions} condition{} ({replications} replications each)",
        if conditions == 1 { "" } else { "s" }
    );

    let runner = ExperimentRunner::new(config, outputs.clone())?;

    if cli.validate_only {
        let plan = runner.plan();
        println!(
            "Validation-only mode: {} conditions x {} replications, {} turns of processing planned; experiment skipped.",
            plan.conditions, plan.replications, plan.total_turns
        );
        return Ok(());
    }

    let _logging_guard = init_logging(&logging, &outputs)?;
    let summary = runner.run()?;
    println!(
        "Experiment '{name}' complete (seed {}): {} conditions x {} replications -> {} rows at {}",
        summary.seed,
        summary.conditions,
        summary.replications,
        summary.rows_written,
        summary.data_path.display()
    );
    println!("Summary table: {}", summary.summary_path.display());
    println!("Manifest: {}", summary.manifest_path.display());
    if let Some(path) = summary.timeseries_path.as_ref() {
        println!("Time series: {}", path.display());
    }
    if let Some(path) = summary.report_path.as_ref() {
        println!("Report: {}", path.display());
    }
    println!("Log: {}", outputs.log.display());

    Ok(())
}
