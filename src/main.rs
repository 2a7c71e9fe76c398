//! # Frida Freq Entry Point
//!
//! Loads configuration, sets up logging and hands control to the lifecycle
//! controller until a shutdown signal arrives.
//!
//! Development mode (`--dev` or `FRIDA_DEV_MODE=1`) runs without any hardware:
//! the board is printed to stdout, buttons are read from stdin and demo arrivals
//! are used when no feed URL is configured.

use anyhow::Context;
use clap::Parser;
use frida_freq_lib::config::{Config, DEFAULT_CONFIG_PATH};
use frida_freq_lib::lifecycle::{HardwareProvider, Lifecycle};
use frida_freq_lib::logging;
use frida_freq_lib::signals::ShutdownSignal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

/// Transit arrival board for a Raspberry Pi with an e-ink panel
#[derive(Parser, Debug)]
#[command(name = "frida-freq", version, about)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Run without hardware: console display, stdin buttons, demo data
    #[arg(long)]
    dev: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load_from_path(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env();
    if cli.dev {
        config.general.dev_mode = true;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn try_main(config: Config) -> anyhow::Result<ExitCode> {
    info!(
        dev_mode = config.general.dev_mode,
        display = %config.display.model,
        fetch_every = ?config.fetch_interval(),
        render_every = ?config.render_interval(),
        "starting frida-freq"
    );

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;

    let outcome = rt.block_on(async {
        let signal = ShutdownSignal::install().context("installing signal handlers")?;
        let mut lifecycle = Lifecycle::new(config, HardwareProvider);
        let outcome = lifecycle
            .run(async {
                signal.recv().await;
            })
            .await;
        anyhow::Ok(outcome)
    })?;

    // A display call abandoned by its timeout may still be running on the
    // blocking pool; do not let it hold the process open.
    rt.shutdown_timeout(Duration::from_secs(1));

    info!(?outcome, "frida-freq stopped");
    Ok(ExitCode::from(outcome.exit_code()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The log file location comes from the config, so logging starts after it loads
    let config = load_config(&cli);
    let log_file = config
        .as_ref()
        .ok()
        .and_then(|config| config.log_file().map(PathBuf::from));
    logging::init(cli.verbose, log_file.as_deref());
    if !cli.config.exists() {
        info!(path = %cli.config.display(), "no configuration file, using defaults");
    }

    match config.and_then(try_main) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
