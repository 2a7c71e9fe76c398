//! # Display Boundary
//!
//! The [`Display`] trait is the narrow interface every panel implements. Panel
//! drivers are blocking and not reentrant, so the loops never call them directly:
//! they go through a [`DisplayHandle`], which
//!
//! - serializes calls behind one async mutex (scheduled and button-triggered
//!   renders may race),
//! - runs the blocking work on tokio's blocking pool,
//! - bounds every call (waiting for the gate included) with a timeout,
//! - makes teardown idempotent.
//!
//! Implementations here: [`NullDisplay`] (no-op stand-in), [`ConsoleDisplay`]
//! (ASCII board on stdout for development mode) and
//! [`EinkDisplay`](crate::eink_display::EinkDisplay) for the real panel.

use crate::renderer::{format_board, format_message};
use crate::ArrivalSnapshot;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Errors raised by display adapters and the display gate.
#[derive(Error, Debug)]
pub enum DisplayError {
    /// The panel or its bus reported a failure
    #[error("display hardware error: {0}")]
    Hardware(String),

    /// The call (including the wait for the gate) exceeded its budget
    #[error("display call timed out after {0:?}")]
    Timeout(Duration),

    /// The display was already shut down
    #[error("display already shut down")]
    Closed,

    /// The configured model cannot be driven by this build
    #[error("unsupported display model '{0}'")]
    Unsupported(String),
}

impl From<io::Error> for DisplayError {
    fn from(err: io::Error) -> Self {
        DisplayError::Hardware(err.to_string())
    }
}

/// A panel that can show a snapshot or a message.
///
/// Calls may block (a full e-ink refresh takes seconds). Implementations do not
/// need to be reentrant; [`DisplayHandle`] guarantees exclusive access.
pub trait Display: Send {
    /// Draw the board with row `index` selected.
    fn render(&mut self, snapshot: &ArrivalSnapshot, index: usize) -> Result<(), DisplayError>;

    /// Draw a full-screen message.
    fn render_message(&mut self, text: &str) -> Result<(), DisplayError>;

    /// Blank the panel.
    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Put the panel into its low-power state.
    fn sleep(&mut self) -> Result<(), DisplayError>;
}

/// Stand-in used when no panel could be initialized in development mode.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn render(&mut self, snapshot: &ArrivalSnapshot, index: usize) -> Result<(), DisplayError> {
        debug!(records = snapshot.len(), index, "null display: render");
        Ok(())
    }

    fn render_message(&mut self, text: &str) -> Result<(), DisplayError> {
        debug!(text, "null display: message");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// ASCII rendering for development without a panel.
pub struct ConsoleDisplay {
    out: Box<dyn Write + Send>,
}

impl ConsoleDisplay {
    /// Console display writing to stdout.
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out }
    }

    fn write_block(&mut self, block: &str) -> Result<(), DisplayError> {
        writeln!(self.out)?;
        self.out.write_all(block.as_bytes())?;
        self.out.flush()?;
        Ok(())
    }
}

impl Display for ConsoleDisplay {
    fn render(&mut self, snapshot: &ArrivalSnapshot, index: usize) -> Result<(), DisplayError> {
        self.write_block(&format_board(snapshot, index))
    }

    fn render_message(&mut self, text: &str) -> Result<(), DisplayError> {
        self.write_block(&format_message(text))
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.write_block("[display cleared]\n")
    }

    fn sleep(&mut self) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Shared, serialized, time-bounded access to the one display.
#[derive(Clone)]
pub struct DisplayHandle {
    gate: Arc<Mutex<Box<dyn Display>>>,
    timeout: Duration,
    closed: Arc<AtomicBool>,
}

impl DisplayHandle {
    pub fn new(display: Box<dyn Display>, timeout: Duration) -> Self {
        Self {
            gate: Arc::new(Mutex::new(display)),
            timeout,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn render(&self, snapshot: Arc<ArrivalSnapshot>, index: usize) -> Result<(), DisplayError> {
        self.call(move |display| display.render(&snapshot, index)).await
    }

    pub async fn render_message(&self, text: impl Into<String>) -> Result<(), DisplayError> {
        let text = text.into();
        self.call(move |display| display.render_message(&text)).await
    }

    /// Clear (optionally) and sleep the panel. Only the first call does anything;
    /// failures are logged, not returned.
    pub async fn shutdown(&self, clear: bool) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("display already shut down");
            return;
        }

        if clear {
            if let Err(err) = self.call_unchecked(|display| display.clear()).await {
                error!(%err, "failed to clear display during shutdown");
            }
        }
        match self.call_unchecked(|display| display.sleep()).await {
            Ok(()) => info!("display asleep"),
            Err(err) => error!(%err, "failed to put display to sleep"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn call<F>(&self, op: F) -> Result<(), DisplayError>
    where
        F: FnOnce(&mut dyn Display) -> Result<(), DisplayError> + Send + 'static,
    {
        if self.is_closed() {
            return Err(DisplayError::Closed);
        }
        self.call_unchecked(op).await
    }

    async fn call_unchecked<F>(&self, op: F) -> Result<(), DisplayError>
    where
        F: FnOnce(&mut dyn Display) -> Result<(), DisplayError> + Send + 'static,
    {
        let gate = Arc::clone(&self.gate);
        let work = async move {
            let mut display = gate.lock_owned().await;
            // The guard moves into the blocking task, so a call abandoned by the
            // timeout keeps the gate until the hardware actually finishes.
            tokio::task::spawn_blocking(move || op(display.as_mut()))
                .await
                .map_err(|err| DisplayError::Hardware(format!("display task failed: {err}")))?
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| DisplayError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ArrivalRecord;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Render(usize, usize),
        Message(String),
        Clear,
        Sleep,
    }

    /// Records calls; can be told to fail renders or to stall.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingDisplay {
        pub calls: Arc<StdMutex<Vec<Call>>>,
        pub fail_renders: bool,
        pub delay: Duration,
    }

    impl RecordingDisplay {
        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> Result<(), DisplayError> {
            std::thread::sleep(self.delay);
            self.calls.lock().unwrap().push(call);
            Ok(())
        }
    }

    impl Display for RecordingDisplay {
        fn render(&mut self, snapshot: &ArrivalSnapshot, index: usize) -> Result<(), DisplayError> {
            self.record(Call::Render(snapshot.len(), index))?;
            if self.fail_renders {
                return Err(DisplayError::Hardware("injected".to_string()));
            }
            Ok(())
        }

        fn render_message(&mut self, text: &str) -> Result<(), DisplayError> {
            self.record(Call::Message(text.to_string()))?;
            if self.fail_renders {
                return Err(DisplayError::Hardware("injected".to_string()));
            }
            Ok(())
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.record(Call::Clear)
        }

        fn sleep(&mut self) -> Result<(), DisplayError> {
            self.record(Call::Sleep)
        }
    }

    /// Writer whose contents stay readable after being boxed.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<StdMutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn two_records() -> Arc<ArrivalSnapshot> {
        Arc::new(ArrivalSnapshot::new(vec![
            ArrivalRecord::new("A", "X", Some(3)),
            ArrivalRecord::new("B", "Y", Some(7)),
        ]))
    }

    #[tokio::test]
    async fn handle_forwards_calls() {
        let display = RecordingDisplay::default();
        let handle = DisplayHandle::new(Box::new(display.clone()), Duration::from_secs(1));

        handle.render(two_records(), 1).await.unwrap();
        handle.render_message("hello").await.unwrap();

        assert_eq!(
            display.calls(),
            vec![Call::Render(2, 1), Call::Message("hello".to_string())]
        );
    }

    #[tokio::test]
    async fn handle_times_out_slow_display() {
        let display = RecordingDisplay {
            delay: Duration::from_millis(300),
            ..Default::default()
        };
        let handle = DisplayHandle::new(Box::new(display), Duration::from_millis(50));

        let result = handle.render_message("slow").await;
        assert!(matches!(result, Err(DisplayError::Timeout(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_calls_are_serialized() {
        let display = RecordingDisplay {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let handle = DisplayHandle::new(Box::new(display.clone()), Duration::from_secs(2));

        let a = tokio::spawn({
            let handle = handle.clone();
            async move { handle.render(two_records(), 0).await }
        });
        let b = tokio::spawn({
            let handle = handle.clone();
            async move { handle.render(two_records(), 1).await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(display.calls().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_closes_handle() {
        let display = RecordingDisplay::default();
        let handle = DisplayHandle::new(Box::new(display.clone()), Duration::from_secs(1));

        handle.shutdown(true).await;
        handle.shutdown(true).await;

        assert_eq!(display.calls(), vec![Call::Clear, Call::Sleep]);
        assert!(matches!(
            handle.render_message("late").await,
            Err(DisplayError::Closed)
        ));
    }

    #[tokio::test]
    async fn shutdown_without_clear_only_sleeps() {
        let display = RecordingDisplay::default();
        let handle = DisplayHandle::new(Box::new(display.clone()), Duration::from_secs(1));
        handle.shutdown(false).await;
        assert_eq!(display.calls(), vec![Call::Sleep]);
    }

    #[test]
    fn console_display_writes_board_and_messages() {
        let buf = SharedBuf::default();
        let mut console = ConsoleDisplay::new(Box::new(buf.clone()));

        console.render(&two_records(), 0).unwrap();
        console.render_message("No arrival data").unwrap();

        let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("> A "));
        assert!(text.contains("No arrival data"));
    }
}
