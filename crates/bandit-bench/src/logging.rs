use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::{self, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LoggingConfig, ResolvedOutputs};

/// Keeps the background log writer alive; dropping it flushes the log file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
    pub log_path: PathBuf,
}

/// Route narration and diagnostics to the experiment log file, mirrored to
/// stdout when `echo` is set.
pub fn init_logging(logging: &LoggingConfig, outputs: &ResolvedOutputs) -> Result<LoggingGuard> {
    let log_path = outputs.log.clone();
    if let Some(dir) = log_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
    {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating log directory at {}", dir.display()))?;
    }

    let file = File::create(&log_path)
        .with_context(|| format!("creating log file at {}", log_path.display()))?;

    let (writer, guard) = non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(file);

    let level = logging.level().unwrap_or(Level::INFO);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let file_layer = match logging.format {
        LogFormat::Text => fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(writer)
            .boxed(),
    };
    let echo_layer = logging.echo.then(|| {
        fmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stdout)
            .boxed()
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(echo_layer);

    // A global subscriber may already be installed when running in tests.
    let _ = tracing::subscriber::set_global_default(subscriber);

    Ok(LoggingGuard {
        _guard: guard,
        log_path,
    })
}
