//! # Button Input
//!
//! Two push buttons drive the board: one announces the next arrival, the other
//! moves the selection. A [`ButtonInput`] turns presses into [`ButtonEvent`]s on a
//! bounded channel; the event dispatcher is the only consumer.
//!
//! Implementations:
//! - [`GpioButtons`] (`hardware` feature): falling-edge interrupts on the Pi's GPIO
//!   via `rppal`, with software debounce
//! - [`ConsoleButtons`]: `a` / `c` lines on stdin for development mode
//! - [`NoButtons`]: stand-in when input is disabled or unavailable

use std::io::{self, BufRead};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Announce,
    Cycle,
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("GPIO error: {0}")]
    Gpio(String),

    #[error("input disabled")]
    Disabled,

    #[error("input already started")]
    AlreadyStarted,
}

/// Source of button presses.
///
/// `start` hands the implementation the sending half of the event channel; presses
/// are delivered from an implementation-owned context (interrupt thread, reader
/// thread). `cleanup` releases pins and must tolerate being called more than once.
pub trait ButtonInput: Send {
    fn start(&mut self, events: mpsc::Sender<ButtonEvent>) -> Result<(), InputError>;

    fn cleanup(&mut self) -> Result<(), InputError>;
}

/// Stand-in that never produces events. Dropping the sender closes the channel.
#[derive(Debug, Default)]
pub struct NoButtons;

impl ButtonInput for NoButtons {
    fn start(&mut self, _events: mpsc::Sender<ButtonEvent>) -> Result<(), InputError> {
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}

/// Deliver an event from a non-async context without blocking it.
///
/// Interrupt callbacks must return quickly, so a full queue drops the press.
pub fn forward(events: &mpsc::Sender<ButtonEvent>, event: ButtonEvent) {
    match events.try_send(event) {
        Ok(()) => debug!(?event, "button event queued"),
        Err(TrySendError::Full(event)) => warn!(?event, "button queue full, press dropped"),
        Err(TrySendError::Closed(_)) => debug!(?event, "dispatcher gone, press ignored"),
    }
}

/// Rejects edges closer together than the window. Mechanical buttons bounce for a
/// few milliseconds and would otherwise register several presses.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    /// True if an edge at `now` counts as a new press.
    pub fn accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.window {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Development stand-in for the buttons: each line read is a press.
/// `a` announces, `c` cycles, anything else is ignored.
pub struct ConsoleButtons {
    reader: Option<Box<dyn BufRead + Send>>,
}

impl ConsoleButtons {
    pub fn stdin() -> Self {
        Self::new(Box::new(io::BufReader::new(io::stdin())))
    }

    pub fn new(reader: Box<dyn BufRead + Send>) -> Self {
        Self {
            reader: Some(reader),
        }
    }
}

fn parse_command(line: &str) -> Option<ButtonEvent> {
    match line.trim() {
        "a" | "announce" => Some(ButtonEvent::Announce),
        "c" | "cycle" => Some(ButtonEvent::Cycle),
        _ => None,
    }
}

impl ButtonInput for ConsoleButtons {
    fn start(&mut self, events: mpsc::Sender<ButtonEvent>) -> Result<(), InputError> {
        let reader = self.reader.take().ok_or(InputError::AlreadyStarted)?;
        info!("console buttons: type 'a' + Enter to announce, 'c' + Enter to cycle");

        // Detached: a blocking stdin read cannot be interrupted. The thread ends at
        // EOF or once the dispatcher drops the receiver.
        std::thread::Builder::new()
            .name("console-buttons".to_string())
            .spawn(move || {
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    let Some(event) = parse_command(&line) else {
                        debug!(line, "ignoring console input");
                        continue;
                    };
                    if events.blocking_send(event).is_err() {
                        break;
                    }
                }
                debug!("console button reader finished");
            })
            .map_err(|e| InputError::Gpio(format!("failed to spawn reader thread: {e}")))?;
        Ok(())
    }

    fn cleanup(&mut self) -> Result<(), InputError> {
        Ok(())
    }
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
pub use gpio::GpioButtons;

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod gpio {
    use super::{forward, ButtonEvent, ButtonInput, Debouncer, InputError};
    use crate::config::InputConfig;
    use rppal::gpio::{Gpio, InputPin, Trigger};
    use std::time::{Duration, Instant};
    use tokio::sync::mpsc;
    use tracing::{info, warn};

    impl From<rppal::gpio::Error> for InputError {
        fn from(err: rppal::gpio::Error) -> Self {
            InputError::Gpio(err.to_string())
        }
    }

    /// Two active-low buttons with internal pull-ups, wired to ground.
    pub struct GpioButtons {
        gpio: Gpio,
        announce_pin: u8,
        cycle_pin: u8,
        debounce: Duration,
        pins: Vec<InputPin>,
    }

    impl GpioButtons {
        pub fn new(config: &InputConfig) -> Result<Self, InputError> {
            if !config.enabled {
                return Err(InputError::Disabled);
            }
            Ok(Self {
                gpio: Gpio::new()?,
                announce_pin: config.announce_pin,
                cycle_pin: config.cycle_pin,
                debounce: Duration::from_millis(config.debounce_ms),
                pins: Vec::new(),
            })
        }
    }

    impl ButtonInput for GpioButtons {
        fn start(&mut self, events: mpsc::Sender<ButtonEvent>) -> Result<(), InputError> {
            if !self.pins.is_empty() {
                return Err(InputError::AlreadyStarted);
            }
            let wiring = [
                (self.announce_pin, ButtonEvent::Announce),
                (self.cycle_pin, ButtonEvent::Cycle),
            ];
            for (pin, event) in wiring {
                let mut input = self.gpio.get(pin)?.into_input_pullup();
                let events = events.clone();
                let mut debouncer = Debouncer::new(self.debounce);
                input.set_async_interrupt(Trigger::FallingEdge, move |_level| {
                    if debouncer.accept(Instant::now()) {
                        forward(&events, event);
                    }
                })?;
                info!(pin, ?event, "button armed");
                self.pins.push(input);
            }
            Ok(())
        }

        fn cleanup(&mut self) -> Result<(), InputError> {
            for pin in &mut self.pins {
                if let Err(err) = pin.clear_async_interrupt() {
                    warn!(pin = pin.pin(), %err, "failed to clear button interrupt");
                }
            }
            // Dropping the pins restores their previous mode
            self.pins.clear();
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_debouncer_rejects_bounces() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        let t0 = Instant::now();
        assert!(debouncer.accept(t0));
        assert!(!debouncer.accept(t0 + Duration::from_millis(5)));
        assert!(!debouncer.accept(t0 + Duration::from_millis(199)));
        assert!(debouncer.accept(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn test_forward_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        forward(&tx, ButtonEvent::Announce);
        forward(&tx, ButtonEvent::Cycle);
        assert_eq!(rx.try_recv().ok(), Some(ButtonEvent::Announce));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_forward_after_receiver_dropped_is_silent() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        forward(&tx, ButtonEvent::Cycle);
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("a\n"), Some(ButtonEvent::Announce));
        assert_eq!(parse_command(" c "), Some(ButtonEvent::Cycle));
        assert_eq!(parse_command("cycle"), Some(ButtonEvent::Cycle));
        assert_eq!(parse_command("x"), None);
    }

    #[tokio::test]
    async fn test_console_buttons_forward_lines_in_order() {
        let script = "a\nnoise\nc\nc\n";
        let mut buttons = ConsoleButtons::new(Box::new(Cursor::new(script.as_bytes().to_vec())));
        let (tx, mut rx) = mpsc::channel(8);
        buttons.start(tx).unwrap();

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(
            received,
            vec![ButtonEvent::Announce, ButtonEvent::Cycle, ButtonEvent::Cycle]
        );
        assert!(matches!(
            buttons.start(mpsc::channel(1).0),
            Err(InputError::AlreadyStarted)
        ));
        buttons.cleanup().unwrap();
    }
}
