use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE: &str = "gamejam.log";

fn default_directives(level: &str) -> String {
    format!("{},gamejam=debug,sqlx=warn", level)
}

/// Install the global subscriber: console output plus an optional daily-rolling file.
///
/// `RUST_LOG` wins over the configured level. Keep the returned guard alive for as long
/// as file logging should keep flushing.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level)));

    let (file_layer, guard) = match config.dir.as_deref() {
        Some(dir) => match file_writer(dir) {
            Ok((writer, guard)) => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                ),
                Some(guard),
            ),
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    dir.display(),
                    e
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let (json_layer, plain_layer) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(false)
                    .with_line_number(false),
            ),
        )
    };

    let file_logging_enabled = file_layer.is_some();
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed && file_logging_enabled {
        if let Some(dir) = &config.dir {
            eprintln!("Logging to: {}/{}", dir.display(), LOG_FILE);
        }
    }
    guard
}

/// `tracing_appender::rolling::daily` panics when it cannot create its file, so the
/// directory is checked for writability first.
fn file_writer(
    dir: &Path,
) -> std::io::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    let marker = dir.join(".gamejam_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&marker)?;
    let _ = std::fs::remove_file(&marker);

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_quiet_sqlx() {
        assert_eq!(default_directives("warn"), "warn,gamejam=debug,sqlx=warn");
    }

    #[test]
    fn unwritable_directory_is_reported() {
        assert!(file_writer(Path::new("/proc/gamejam-cannot-exist")).is_err());
    }
}
