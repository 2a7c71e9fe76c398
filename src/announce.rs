//! # Spoken Announcements
//!
//! The [`Announcer`] trait speaks one short phrase. The production implementation
//! shells out to a text-to-speech program (`espeak` by default) through
//! `tokio::process`; [`NullAnnouncer`] stands in when audio is disabled or the
//! program is missing.
//!
//! Phrases are built from the nearest arrival with [`format_phrase`].

use crate::config::AudioConfig;
use crate::ArrivalRecord;
use async_trait::async_trait;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum AnnounceError {
    /// The speech program could not be started or exited unsuccessfully
    #[error("playback failed: {0}")]
    Playback(String),

    #[error("announcement timed out after {0:?}")]
    Timeout(Duration),

    /// Audio is disabled or no speech program is installed
    #[error("announcer unavailable: {0}")]
    Unavailable(String),
}

/// Speaks a phrase. Implementations must be cancel-safe: the dispatcher drops the
/// future when the announcement exceeds its timeout.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn speak(&self, phrase: &str) -> Result<(), AnnounceError>;
}

/// Runs `<command> [args...] <phrase>` for each announcement.
#[derive(Debug)]
pub struct CommandAnnouncer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandAnnouncer {
    /// Resolve the configured program up front so a missing TTS engine is reported
    /// at startup instead of on the first button press.
    pub fn new(config: &AudioConfig) -> Result<Self, AnnounceError> {
        if !config.enabled {
            return Err(AnnounceError::Unavailable("audio disabled".to_string()));
        }
        let program = find_program(&config.command).ok_or_else(|| {
            AnnounceError::Unavailable(format!("'{}' not found on PATH", config.command))
        })?;
        debug!(program = %program.display(), "speech program resolved");
        Ok(Self {
            program,
            args: config.args.clone(),
        })
    }
}

#[async_trait]
impl Announcer for CommandAnnouncer {
    async fn speak(&self, phrase: &str) -> Result<(), AnnounceError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(phrase)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AnnounceError::Playback(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnnounceError::Playback(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Stand-in when no speech program is available. Logs instead of speaking.
#[derive(Debug, Default)]
pub struct NullAnnouncer;

#[async_trait]
impl Announcer for NullAnnouncer {
    async fn speak(&self, phrase: &str) -> Result<(), AnnounceError> {
        warn!(phrase, "audio unavailable, announcement skipped");
        Ok(())
    }
}

/// Fill `{route}`, `{destination}` and `{minutes}` in `template` from `record`.
///
/// # Example
/// ```
/// use frida_freq_lib::announce::format_phrase;
/// use frida_freq_lib::ArrivalRecord;
///
/// let bus = ArrivalRecord::new("Bus 42", "Downtown", Some(5));
/// assert_eq!(
///     format_phrase("{route} to {destination} in {minutes}", &bus),
///     "Bus 42 to Downtown in 5 minutes"
/// );
/// ```
pub fn format_phrase(template: &str, record: &ArrivalRecord) -> String {
    template
        .replace("{route}", record.route())
        .replace("{destination}", record.destination())
        .replace("{minutes}", &spoken_minutes(record.minutes()))
}

fn spoken_minutes(minutes: Option<u32>) -> String {
    match minutes {
        Some(0) => "less than a minute".to_string(),
        Some(1) => "1 minute".to_string(),
        Some(m) => format!("{m} minutes"),
        None => "an unknown time".to_string(),
    }
}

fn find_program(command: &str) -> Option<PathBuf> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }
    let direct = Path::new(command);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}
