//! # Lifecycle Controller
//!
//! Owns the board from startup to exit:
//!
//! ```text
//! Created ──► Initializing ──► Running ──► ShuttingDown ──► Terminated
//!                   │                                           ▲
//!                   └──────────── critical init failure ────────┘
//! ```
//!
//! - **Initializing**: every adapter is built independently through an
//!   [`AdapterProvider`]. Only the display is critical, and only outside
//!   development mode; anything else that fails is replaced by a no-op and marked
//!   [`ComponentHealth::Unavailable`].
//! - **Running**: one synchronous fetch and render seed the board, then the fetch
//!   loop, render loop and event dispatcher run as separate tasks. The controller
//!   waits for the shutdown future or for any task to stop on its own, which is a
//!   fatal error.
//! - **ShuttingDown**: the shared token is cancelled and tasks get a bounded grace
//!   period before the stragglers are aborted.
//! - **Terminated**: buttons are released and the panel is cleared and put to
//!   sleep. Cleanup problems are logged, never raised.

use crate::announce::{AnnounceError, Announcer, CommandAnnouncer, NullAnnouncer};
use crate::config::Config;
use crate::demo::DemoSource;
use crate::display::{ConsoleDisplay, Display, DisplayError, DisplayHandle, NullDisplay};
use crate::health::{Component, ComponentHealth, HealthBoard};
use crate::input::{ButtonInput, ConsoleButtons, InputError, NoButtons};
use crate::state::SharedState;
use crate::tasks::dispatch::{self, DispatchSettings};
use crate::tasks::fetch::{self, fetch_once};
use crate::tasks::render::{self, render_logged};
use crate::tasks::{AliveTasks, Dispatcher, FetchLoop, RenderLoop, TaskName};
use crate::transit::{ArrivalSource, FetchError, HttpArrivalSource, UnavailableSource};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long aborted tasks get to unwind after the grace period ran out.
const REAP_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Initializing,
    Running,
    ShuttingDown,
    Terminated,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Created, Initializing)
                | (Initializing, Running)
                | (Initializing, Terminated)
                | (Running, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    /// A component the board cannot run without failed to start
    #[error("critical component failed to initialize: {0}")]
    CriticalInit(String),

    /// A background task stopped while the board was running
    #[error("background task failed: {0}")]
    TaskFailed(String),

    /// Tasks were still running when the shutdown grace period ran out
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    ShutdownTimeout {
        grace: Duration,
        stuck: Vec<TaskName>,
    },

    #[error("lifecycle cannot move from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stopped by the shutdown signal
    Clean,
    /// A critical adapter could not be built; no loops were started
    InitFailed,
    /// A background task stopped or panicked while running
    RunFailed,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Clean => 0,
            Outcome::InitFailed | Outcome::RunFailed => 1,
        }
    }
}

/// Builds the adapters for a configuration. Each constructor is called once,
/// independently of the others, during initialization.
pub trait AdapterProvider {
    fn display(&self, config: &Config) -> Result<Box<dyn Display>, DisplayError>;

    fn source(&self, config: &Config) -> Result<Arc<dyn ArrivalSource>, FetchError>;

    fn announcer(&self, config: &Config) -> Result<Arc<dyn Announcer>, AnnounceError>;

    fn input(&self, config: &Config) -> Result<Box<dyn ButtonInput>, InputError>;
}

/// The real device, or its development stand-ins when `general.dev_mode` is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareProvider;

impl AdapterProvider for HardwareProvider {
    fn display(&self, config: &Config) -> Result<Box<dyn Display>, DisplayError> {
        if config.general.dev_mode || config.display.model == "console" {
            return Ok(Box::new(ConsoleDisplay::stdout()));
        }
        match config.display.model.as_str() {
            "epd4in2b_v2" => open_panel(config),
            other => Err(DisplayError::Unsupported(other.to_string())),
        }
    }

    fn source(&self, config: &Config) -> Result<Arc<dyn ArrivalSource>, FetchError> {
        if config.transit.url.trim().is_empty() && config.general.dev_mode {
            info!("no transit URL configured, using demo arrivals");
            return Ok(Arc::new(DemoSource));
        }
        Ok(Arc::new(HttpArrivalSource::new(&config.transit)?))
    }

    fn announcer(&self, config: &Config) -> Result<Arc<dyn Announcer>, AnnounceError> {
        Ok(Arc::new(CommandAnnouncer::new(&config.audio)?))
    }

    fn input(&self, config: &Config) -> Result<Box<dyn ButtonInput>, InputError> {
        if !config.input.enabled {
            return Err(InputError::Disabled);
        }
        if config.general.dev_mode {
            return Ok(Box::new(ConsoleButtons::stdin()));
        }
        open_buttons(config)
    }
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn open_panel(config: &Config) -> Result<Box<dyn Display>, DisplayError> {
    use crate::epd4in2b_v2::Rotation;

    let rotation = Rotation::from_degrees(config.display.rotation).ok_or_else(|| {
        DisplayError::Unsupported(format!("rotation {}", config.display.rotation))
    })?;
    crate::eink_display::open_waveshare(&config.display.hardware, rotation)
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn open_panel(config: &Config) -> Result<Box<dyn Display>, DisplayError> {
    Err(DisplayError::Unsupported(format!(
        "{} (built without the `hardware` feature)",
        config.display.model
    )))
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn open_buttons(config: &Config) -> Result<Box<dyn ButtonInput>, InputError> {
    Ok(Box::new(crate::input::GpioButtons::new(&config.input)?))
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn open_buttons(_config: &Config) -> Result<Box<dyn ButtonInput>, InputError> {
    Err(InputError::Gpio(
        "built without the `hardware` feature".to_string(),
    ))
}

/// Adapters in use for one run, real or stand-in.
struct Adapters {
    display: DisplayHandle,
    source: Arc<dyn ArrivalSource>,
    announcer: Arc<dyn Announcer>,
    input: Box<dyn ButtonInput>,
}

pub struct Lifecycle<P> {
    config: Config,
    provider: P,
    phase: Phase,
    state: Arc<SharedState>,
    health: Arc<HealthBoard>,
}

impl<P: AdapterProvider> Lifecycle<P> {
    pub fn new(config: Config, provider: P) -> Self {
        Self {
            config,
            provider,
            phase: Phase::Created,
            state: Arc::new(SharedState::new()),
            health: Arc::new(HealthBoard::new()),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn health(&self) -> &HealthBoard {
        &self.health
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Run the board until `shutdown` completes or a task fails.
    ///
    /// A `Lifecycle` runs once; calling this again reports [`Outcome::InitFailed`].
    pub async fn run<F>(&mut self, shutdown: F) -> Outcome
    where
        F: Future<Output = ()>,
    {
        if let Err(err) = self.enter(Phase::Initializing) {
            error!(%err, "lifecycle already used");
            return Outcome::InitFailed;
        }

        let mut adapters = match self.initialize() {
            Ok(adapters) => adapters,
            Err(err) => {
                error!(%err, "startup aborted");
                self.force(Phase::Terminated);
                return Outcome::InitFailed;
            }
        };
        self.force(Phase::Running);
        info!(health = %self.health.summary(), "adapters ready");

        self.seed(&adapters).await;

        let cancel = CancellationToken::new();
        let alive = AliveTasks::new();
        let mut tasks = self.spawn_tasks(&mut adapters, &cancel, &alive);

        let run_result = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested");
                Ok(())
            }
            joined = tasks.join_next() => {
                let err = task_failure(joined);
                error!(%err, "board stopped unexpectedly");
                Err(err)
            }
        };

        self.force(Phase::ShuttingDown);
        cancel.cancel();
        if let Err(err) = self.drain(&mut tasks, &alive).await {
            warn!(%err, "tasks aborted");
        }

        self.teardown(&mut adapters).await;
        self.force(Phase::Terminated);

        match run_result {
            Ok(()) => Outcome::Clean,
            Err(_) => Outcome::RunFailed,
        }
    }

    fn enter(&mut self, next: Phase) -> Result<(), LifecycleError> {
        if !self.phase.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        info!(from = %self.phase, to = %next, "lifecycle phase");
        self.phase = next;
        Ok(())
    }

    // Transitions inside `run` follow the diagram by construction.
    fn force(&mut self, next: Phase) {
        if let Err(err) = self.enter(next) {
            warn!(%err, "unexpected lifecycle transition");
            self.phase = next;
        }
    }

    fn initialize(&self) -> Result<Adapters, LifecycleError> {
        let config = &self.config;
        let dev_mode = config.general.dev_mode;

        let display = match self.provider.display(config) {
            Ok(display) => {
                self.health.set(Component::Display, ComponentHealth::Healthy);
                display
            }
            Err(err) if dev_mode => {
                warn!(%err, "display unavailable, continuing without one (development mode)");
                self.health.set(Component::Display, ComponentHealth::Unavailable);
                Box::new(NullDisplay)
            }
            Err(err) => return Err(LifecycleError::CriticalInit(format!("display: {err}"))),
        };

        let source: Arc<dyn ArrivalSource> = match self.provider.source(config) {
            Ok(source) => {
                self.health.set(Component::Transit, ComponentHealth::Healthy);
                source
            }
            Err(FetchError::Unavailable) => {
                warn!("no transit URL configured, the board will show the placeholder");
                Arc::new(UnavailableSource)
            }
            Err(err) => {
                warn!(%err, "transit source unavailable");
                Arc::new(UnavailableSource)
            }
        };

        let announcer: Arc<dyn Announcer> = match self.provider.announcer(config) {
            Ok(announcer) => {
                self.health.set(Component::Audio, ComponentHealth::Healthy);
                announcer
            }
            Err(err) => {
                warn!(%err, "announcements disabled");
                Arc::new(NullAnnouncer)
            }
        };

        let input: Box<dyn ButtonInput> = match self.provider.input(config) {
            Ok(input) => {
                self.health.set(Component::Input, ComponentHealth::Healthy);
                input
            }
            Err(InputError::Disabled) => {
                info!("buttons disabled");
                Box::new(NoButtons)
            }
            Err(err) => {
                warn!(%err, "buttons unavailable");
                Box::new(NoButtons)
            }
        };

        Ok(Adapters {
            display: DisplayHandle::new(display, config.display_timeout()),
            source,
            announcer,
            input,
        })
    }

    /// The first fetch and render happen before any loop starts, so the render
    /// loop only ever sees "nothing fetched yet" or real data.
    async fn seed(&self, adapters: &Adapters) {
        if let Err(err) = fetch_once(
            adapters.source.as_ref(),
            &self.state,
            &self.health,
            self.config.fetch_timeout(),
        )
        .await
        {
            fetch::log_failure(&err);
        }
        render_logged(
            &adapters.display,
            &self.state,
            &self.config.display.no_data_message,
        )
        .await;
    }

    fn spawn_tasks(
        &self,
        adapters: &mut Adapters,
        cancel: &CancellationToken,
        alive: &AliveTasks,
    ) -> JoinSet<TaskName> {
        let config = &self.config;
        let (tx, rx) = mpsc::channel(config.input.queue_capacity);
        if let Err(err) = adapters.input.start(tx) {
            warn!(%err, "buttons failed to start");
            self.health.set(Component::Input, ComponentHealth::Unavailable);
        }

        let mut tasks = JoinSet::new();

        let fetch_loop = FetchLoop::new(
            Arc::clone(&adapters.source),
            Arc::clone(&self.state),
            Arc::clone(&self.health),
            config.fetch_interval(),
            config.fetch_timeout(),
        );
        let guard = alive.enter(fetch::NAME);
        let token = cancel.clone();
        tasks.spawn(async move {
            let _alive = guard;
            fetch_loop.run(token).await
        });

        let render_loop = RenderLoop::new(
            adapters.display.clone(),
            Arc::clone(&self.state),
            config.render_interval(),
            config.display.no_data_message.clone(),
        );
        let guard = alive.enter(render::NAME);
        let token = cancel.clone();
        tasks.spawn(async move {
            let _alive = guard;
            render_loop.run(token).await
        });

        let dispatcher = Dispatcher::new(
            Arc::clone(&self.state),
            adapters.display.clone(),
            Arc::clone(&adapters.announcer),
            Arc::clone(&self.health),
            DispatchSettings::from(config),
        );
        let guard = alive.enter(dispatch::NAME);
        let token = cancel.clone();
        tasks.spawn(async move {
            let _alive = guard;
            dispatcher.run(rx, token).await
        });

        info!(tasks = ?alive.snapshot(), "board running");
        tasks
    }

    /// Wait for every task to finish within the grace period, then abort the rest.
    async fn drain(
        &self,
        tasks: &mut JoinSet<TaskName>,
        alive: &AliveTasks,
    ) -> Result<(), LifecycleError> {
        let grace = self.config.shutdown_grace();
        let done = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(name) => debug!(task = name, "task stopped"),
                    Err(err) => warn!(%err, "task ended abnormally during shutdown"),
                }
            }
        };
        let drained = tokio::time::timeout(grace, done).await;

        if drained.is_ok() {
            info!("all tasks stopped");
            return Ok(());
        }

        let stuck = alive.snapshot();
        tasks.abort_all();
        // Abort lands at the next await; a task stuck in blocking code is left behind
        let reaped = tokio::time::timeout(REAP_TIMEOUT, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if reaped.is_err() {
            warn!(tasks = ?alive.snapshot(), "tasks did not acknowledge abort, detaching");
            tasks.detach_all();
        }
        Err(LifecycleError::ShutdownTimeout { grace, stuck })
    }

    async fn teardown(&self, adapters: &mut Adapters) {
        if let Err(err) = adapters.input.cleanup() {
            warn!(%err, "failed to release buttons");
        }
        adapters
            .display
            .shutdown(self.config.display.clear_on_exit)
            .await;
        info!(health = %self.health.summary(), "teardown complete");
    }
}

fn task_failure(joined: Option<Result<TaskName, JoinError>>) -> LifecycleError {
    let reason = match joined {
        Some(Ok(name)) => format!("{name} exited on its own"),
        Some(Err(err)) if err.is_panic() => format!("panic: {err}"),
        Some(Err(err)) => err.to_string(),
        None => "no tasks running".to_string(),
    };
    LifecycleError::TaskFailed(reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        use Phase::*;
        assert!(Created.can_transition_to(Initializing));
        assert!(Initializing.can_transition_to(Running));
        assert!(Initializing.can_transition_to(Terminated));
        assert!(Running.can_transition_to(ShuttingDown));
        assert!(ShuttingDown.can_transition_to(Terminated));

        assert!(!Created.can_transition_to(Running));
        assert!(!Running.can_transition_to(Terminated));
        assert!(!Terminated.can_transition_to(Initializing));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Clean.exit_code(), 0);
        assert_eq!(Outcome::InitFailed.exit_code(), 1);
        assert_eq!(Outcome::RunFailed.exit_code(), 1);
    }

    #[test]
    fn test_shutdown_timeout_names_stuck_tasks() {
        let err = LifecycleError::ShutdownTimeout {
            grace: Duration::from_secs(5),
            stuck: vec!["fetch", "render"],
        };
        let message = err.to_string();
        assert!(message.contains("5s"));
        assert!(message.contains("\"fetch\""));
        assert!(message.contains("\"render\""));
    }

    #[test]
    fn test_task_failure_reasons() {
        assert!(task_failure(Some(Ok("render")))
            .to_string()
            .contains("render exited on its own"));
        assert!(task_failure(None).to_string().contains("no tasks"));
    }

    #[test]
    fn test_hardware_provider_dev_mode_stand_ins() {
        let mut config = Config::default();
        config.general.dev_mode = true;
        config.input.enabled = false;

        assert!(HardwareProvider.display(&config).is_ok());
        assert!(HardwareProvider.source(&config).is_ok());
        assert!(matches!(
            HardwareProvider.input(&config),
            Err(InputError::Disabled)
        ));
    }

    #[test]
    fn test_hardware_provider_rejects_unknown_model() {
        let mut config = Config::default();
        config.display.model = "crt".to_string();
        assert!(matches!(
            HardwareProvider.display(&config),
            Err(DisplayError::Unsupported(_))
        ));
    }
}
