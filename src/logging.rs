//! Log output: always stderr, plus an optional append-only file so a headless
//! board keeps a record across restarts.
//!
//! `RUST_LOG` overrides the default level for both outputs.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use tracing::{warn, Subscriber};
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

/// Open `path` for appending, creating missing parent directories.
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Plain-text fmt layer writing into `file`.
pub fn file_layer<S>(file: File) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_ansi(false).with_writer(Mutex::new(file))
}

/// Install the global subscriber. A log file that cannot be opened is reported
/// and skipped; stderr logging always works.
pub fn init(verbose: bool, log_file: Option<&Path>) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file, failure) = match log_file.map(open_log_file) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(err)) => (None, Some(err)),
        None => (None, None),
    };

    // stdout belongs to the console display in development mode
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file.map(|file| file_layer(file)))
        .init();

    if let (Some(path), Some(err)) = (log_file, failure) {
        warn!(path = %path.display(), %err, "log file unavailable, logging to stderr only");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn test_log_file_from_config_is_created_and_written() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs").join("frida-freq.log");
        let config_path = dir.path().join("frida-config.toml");
        fs::write(
            &config_path,
            format!("[general]\nlog_file = {:?}\n", log_path.display().to_string()),
        )
        .unwrap();

        let config = Config::load_from_path(&config_path).unwrap();
        assert_eq!(config.log_file(), Some(log_path.as_path()));

        let file = open_log_file(config.log_file().unwrap()).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(arrivals = 2, "arrivals updated");
        });

        let written = fs::read_to_string(&log_path).unwrap();
        assert!(written.contains("arrivals updated"));
        assert!(written.contains("arrivals=2"));
    }

    #[test]
    fn test_log_file_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("board.log");
        fs::write(&path, "earlier run\n").unwrap();

        let file = open_log_file(&path).unwrap();
        let subscriber = tracing_subscriber::registry().with(file_layer(file));
        tracing::subscriber::with_default(subscriber, || tracing::warn!("later run"));

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("earlier run\n"));
        assert!(written.contains("later run"));
    }

    #[test]
    fn test_empty_log_file_disables_it() {
        let mut config = Config::default();
        assert_eq!(
            config.log_file(),
            Some(Path::new("logs/frida-freq.log"))
        );
        config.general.log_file = "  ".to_string();
        assert_eq!(config.log_file(), None);
    }
}
