//! Render loop: redraw the panel from the shared state on a fixed cadence.

use super::TaskName;
use crate::display::{DisplayError, DisplayHandle};
use crate::state::{DisplayState, SharedState};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const NAME: TaskName = "render";

/// Draw whatever the store holds right now: the placeholder message when
/// nothing has been fetched yet, the board with the selected row otherwise.
pub async fn render_current(
    display: &DisplayHandle,
    state: &SharedState,
    placeholder: &str,
) -> Result<(), DisplayError> {
    let DisplayState { snapshot, index } = state.read();
    if snapshot.is_empty() {
        debug!("no arrivals yet, rendering placeholder");
        display.render_message(placeholder).await
    } else {
        debug!(arrivals = snapshot.len(), index, "rendering board");
        display.render(snapshot, index).await
    }
}

/// [`render_current`] with failures logged and swallowed; the next tick retries.
pub async fn render_logged(display: &DisplayHandle, state: &SharedState, placeholder: &str) {
    if let Err(err) = render_current(display, state, placeholder).await {
        error!(%err, "render failed");
    }
}

pub struct RenderLoop {
    display: DisplayHandle,
    state: Arc<SharedState>,
    interval: Duration,
    placeholder: String,
}

impl RenderLoop {
    pub fn new(
        display: DisplayHandle,
        state: Arc<SharedState>,
        interval: Duration,
        placeholder: impl Into<String>,
    ) -> Self {
        Self {
            display,
            state,
            interval,
            placeholder: placeholder.into(),
        }
    }

    pub async fn run(self, cancel: CancellationToken) -> TaskName {
        info!(interval = ?self.interval, "render loop started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = render_logged(&self.display, &self.state, &self.placeholder) => {}
            }
        }
        info!("render loop stopped");
        NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::tests::{Call, RecordingDisplay};
    use crate::{ArrivalRecord, ArrivalSnapshot};

    fn handle(display: &RecordingDisplay) -> DisplayHandle {
        DisplayHandle::new(Box::new(display.clone()), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn empty_state_renders_placeholder() {
        let display = RecordingDisplay::default();
        let state = SharedState::new();

        render_current(&handle(&display), &state, "No arrival data")
            .await
            .unwrap();

        assert_eq!(
            display.calls(),
            vec![Call::Message("No arrival data".to_string())]
        );
    }

    #[tokio::test]
    async fn populated_state_renders_selected_row() {
        let display = RecordingDisplay::default();
        let state = SharedState::new();
        state.publish(ArrivalSnapshot::new(vec![
            ArrivalRecord::new("A", "X", Some(3)),
            ArrivalRecord::new("B", "Y", Some(7)),
        ]));
        state.set_index(1);

        render_current(&handle(&display), &state, "unused")
            .await
            .unwrap();

        assert_eq!(display.calls(), vec![Call::Render(2, 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_survives_render_failures() {
        let display = RecordingDisplay {
            fail_renders: true,
            ..Default::default()
        };
        let state = Arc::new(SharedState::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            RenderLoop::new(handle(&display), state, Duration::from_secs(300), "none")
                .run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(300 * 3 + 1)).await;
        assert!(!task.is_finished());
        assert_eq!(display.calls().len(), 3);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), NAME);
    }
}
