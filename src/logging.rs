//! Log sink setup.
//!
//! Output goes either to standard output or to a single append-only file
//! written through a background worker. `RUST_LOG` overrides the level
//! chosen by `-v`/`-q`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity flags.
pub fn level_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    }
}

/// Install the global subscriber.
///
/// With `log_file` set, the returned guard must live until exit so buffered
/// lines are flushed.
pub fn init(log_file: Option<&Path>, verbose: bool, quiet: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_directive(verbose, quiet)));

    let Some(path) = log_file else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stdout),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
        return Ok(None);
    };

    let appender = file_appender(path)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(Some(guard))
}

/// Open `path` for appending, without rotation.
fn file_appender(path: &Path) -> Result<RollingFileAppender> {
    let (dir, name) = split_log_path(path)?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(&dir)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid log file path {}", path.display()))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_level_directive() {
        assert_eq!(level_directive(false, false), "info");
        assert_eq!(level_directive(true, false), "debug");
        assert_eq!(level_directive(false, true), "error");
    }

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("/var/log/apiban.log")).unwrap();
        assert_eq!(dir, PathBuf::from("/var/log"));
        assert_eq!(name, "apiban.log");

        let (dir, name) = split_log_path(Path::new("apiban.log")).unwrap();
        assert_eq!(dir, PathBuf::from("."));
        assert_eq!(name, "apiban.log");

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_file_appender_appends_to_exact_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("client.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let mut appender = file_appender(&path).unwrap();
        appender.write_all(b"this run\n").unwrap();
        appender.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "earlier run\nthis run\n");
    }
}
