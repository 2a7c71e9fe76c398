//! # Frida Freq Core Library
//!
//! This library drives a small transit arrival board: a Raspberry Pi that polls an
//! arrivals feed, draws the results on a slow-refresh e-ink panel, and optionally
//! speaks the next arrival or reacts to two push buttons.
//!
//! ## Design Philosophy
//!
//! ### Orchestration First
//! The individual drivers are deliberately thin. The interesting part is the set of
//! loops that run side by side:
//! - **Fetch loop** ([`tasks::fetch`]): polls the [`transit::ArrivalSource`] and publishes
//!   fresh snapshots into the [`state::SharedState`]
//! - **Render loop** ([`tasks::render`]): redraws the panel from the shared state on its
//!   own, slower cadence
//! - **Event dispatcher** ([`tasks::dispatch`]): turns button presses into announcements
//!   or selection changes
//!
//! The [`lifecycle::Lifecycle`] controller owns startup ordering, the shutdown signal
//! and teardown.
//!
//! ### Graceful Degradation
//! - Only the display is critical, and only outside development mode
//! - A missing speaker, missing buttons or an unreachable feed each leave the rest of
//!   the board working; see [`health`]
//! - Stale data stays on screen during an outage rather than blanking the panel
//!
//! ## Core Types
//! - [`ArrivalRecord`]: one upcoming arrival
//! - [`ArrivalSnapshot`]: an ordered, immutable set of arrivals captured at one instant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Module declarations
pub mod announce;
pub mod config;
pub mod demo;
pub mod display;
pub mod eink_display;
pub mod epd4in2b_v2;
pub mod health;
pub mod input;
pub mod lifecycle;
pub mod logging;
pub mod renderer;
pub mod signals;
pub mod state;
pub mod tasks;
pub mod transit;

#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod gpio_sysfs;
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod hw_spi_spidev;

#[cfg(test)]
mod tests;

/// A single upcoming arrival at the configured stop.
///
/// Records are immutable once built; the fetch loop always replaces a whole
/// [`ArrivalSnapshot`] rather than editing records in place.
///
/// `minutes` is `None` when the feed does not know when the vehicle will arrive.
///
/// # Example
/// ```
/// use frida_freq_lib::ArrivalRecord;
///
/// let bus = ArrivalRecord::new("42", "Downtown", Some(5));
/// assert_eq!(bus.route(), "42");
/// assert_eq!(bus.minutes(), Some(5));
/// assert_eq!(bus.minutes_label(), "5 min");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    route: String,
    destination: String,
    minutes: Option<u32>,
}

impl ArrivalRecord {
    pub fn new(
        route: impl Into<String>,
        destination: impl Into<String>,
        minutes: Option<u32>,
    ) -> Self {
        Self {
            route: route.into(),
            destination: destination.into(),
            minutes,
        }
    }

    /// Route identifier, e.g. `"42"` or `"Train A"`.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Destination or headsign shown on the vehicle.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Minutes until arrival, `None` when unknown.
    pub fn minutes(&self) -> Option<u32> {
        self.minutes
    }

    /// Short label for the panel: `"Due"`, `"7 min"` or `"--"`.
    pub fn minutes_label(&self) -> String {
        match self.minutes {
            Some(0) => "Due".to_string(),
            Some(m) => format!("{m} min"),
            None => "--".to_string(),
        }
    }
}

impl fmt::Display for ArrivalRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to {} ({})",
            self.route,
            self.destination,
            self.minutes_label()
        )
    }
}

/// Ordered set of arrivals captured at one instant.
///
/// The order is exactly what the source returned. Nothing downstream sorts it,
/// which keeps cycling through entries with the buttons deterministic.
///
/// # Example
/// ```
/// use frida_freq_lib::{ArrivalRecord, ArrivalSnapshot};
///
/// let snapshot = ArrivalSnapshot::new(vec![
///     ArrivalRecord::new("B", "Harbor", Some(7)),
///     ArrivalRecord::new("A", "Airport", Some(3)),
/// ]);
///
/// assert_eq!(snapshot.len(), 2);
/// assert_eq!(snapshot.first().map(|r| r.route()), Some("B"));
/// assert!(!snapshot.is_simulated());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArrivalSnapshot {
    records: Vec<ArrivalRecord>,
    captured_at: DateTime<Utc>,
    simulated: bool,
}

impl ArrivalSnapshot {
    /// Snapshot captured now.
    pub fn new(records: Vec<ArrivalRecord>) -> Self {
        Self::captured(records, Utc::now())
    }

    /// Snapshot with an explicit capture time.
    pub fn captured(records: Vec<ArrivalRecord>, captured_at: DateTime<Utc>) -> Self {
        Self {
            records,
            captured_at,
            simulated: false,
        }
    }

    /// An empty snapshot, the state before the first successful fetch.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Mark the snapshot as produced by the built-in demo source.
    pub fn into_simulated(mut self) -> Self {
        self.simulated = true;
        self
    }

    pub fn records(&self) -> &[ArrivalRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&ArrivalRecord> {
        self.records.get(index)
    }

    /// The nearest arrival, which is always what gets announced.
    pub fn first(&self) -> Option<&ArrivalRecord> {
        self.records.first()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// True when the data came from the demo source rather than a real feed.
    pub fn is_simulated(&self) -> bool {
        self.simulated
    }
}
