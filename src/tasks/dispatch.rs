//! Event dispatcher: turn button presses into announcements and selection changes.
//!
//! Events are handled strictly one at a time, in arrival order. A press that
//! comes in while an announcement is playing waits in the channel.

use super::render::render_logged;
use super::TaskName;
use crate::announce::{format_phrase, AnnounceError, Announcer};
use crate::display::DisplayHandle;
use crate::health::{Component, HealthBoard};
use crate::input::ButtonEvent;
use crate::state::SharedState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const NAME: TaskName = "dispatch";

pub struct Dispatcher {
    state: Arc<SharedState>,
    display: DisplayHandle,
    announcer: Arc<dyn Announcer>,
    health: Arc<HealthBoard>,
    phrase_template: String,
    no_data_phrase: String,
    placeholder: String,
    announce_timeout: Duration,
}

/// Phrases and limits used by the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub phrase_template: String,
    pub no_data_phrase: String,
    pub placeholder: String,
    pub announce_timeout: Duration,
}

impl From<&crate::config::Config> for DispatchSettings {
    fn from(config: &crate::config::Config) -> Self {
        Self {
            phrase_template: config.audio.phrase_template.clone(),
            no_data_phrase: config.audio.no_data_phrase.clone(),
            placeholder: config.display.no_data_message.clone(),
            announce_timeout: config.announce_timeout(),
        }
    }
}

impl Dispatcher {
    pub fn new(
        state: Arc<SharedState>,
        display: DisplayHandle,
        announcer: Arc<dyn Announcer>,
        health: Arc<HealthBoard>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            state,
            display,
            announcer,
            health,
            phrase_template: settings.phrase_template,
            no_data_phrase: settings.no_data_phrase,
            placeholder: settings.placeholder,
            announce_timeout: settings.announce_timeout,
        }
    }

    pub async fn handle(&self, event: ButtonEvent) {
        match event {
            ButtonEvent::Announce => self.handle_announce().await,
            ButtonEvent::Cycle => self.handle_cycle().await,
        }
    }

    /// The phrase an announce press would speak right now. Always the nearest
    /// arrival, whatever row is selected.
    pub fn announcement(&self) -> String {
        let snapshot = self.state.read().snapshot;
        match snapshot.first() {
            Some(record) => format_phrase(&self.phrase_template, record),
            None => self.no_data_phrase.clone(),
        }
    }

    async fn handle_announce(&self) {
        let phrase = self.announcement();
        info!(phrase = %phrase, "announcing");

        let speak = self.announcer.speak(&phrase);
        let result = match tokio::time::timeout(self.announce_timeout, speak).await {
            Ok(result) => result,
            Err(_) => Err(AnnounceError::Timeout(self.announce_timeout)),
        };
        self.health.record_attempt(Component::Audio, result.is_ok());
        if let Err(err) = result {
            warn!(%err, "announcement failed");
        }
    }

    /// Advance the selection, then redraw immediately. The index moves even if
    /// the redraw fails.
    async fn handle_cycle(&self) {
        let index = self.state.advance_index();
        debug!(index, "selection advanced");
        render_logged(&self.display, &self.state, &self.placeholder).await;
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<ButtonEvent>,
        cancel: CancellationToken,
    ) -> TaskName {
        info!("event dispatcher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                // No input adapter is feeding the channel; idle until shutdown
                debug!("button channel closed");
                cancel.cancelled().await;
                break;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.handle(event) => {}
            }
        }
        info!("event dispatcher stopped");
        NAME
    }
}
