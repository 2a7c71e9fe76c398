//! # Demo Arrival Model
//!
//! This module provides a clock-driven stand-in for the arrivals feed, used in
//! development mode when no feed URL is configured.
//!
//! ## Model Characteristics
//!
//! Each demo route runs on a fixed headway with a per-route offset, so the
//! countdown for a route is:
//!
//! ```text
//! minutes = (offset - minute_of_day) mod headway
//! ```
//!
//! - The countdown ticks down as real time passes and wraps to a full headway once a
//!   vehicle "departs"
//! - Output is a pure function of the instant, which keeps it testable
//! - Route order is fixed (the order of [`ROUTES`]), never sorted by arrival time,
//!   matching how a real feed is treated
//!
//! Snapshots are marked [`simulated`](ArrivalSnapshot::is_simulated) so the panel can
//! flag them as demo data.

use crate::transit::{ArrivalSource, FetchError};
use crate::{ArrivalRecord, ArrivalSnapshot};
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};

/// Demo routes: (route, destination, headway minutes, offset minutes)
const ROUTES: [(&str, &str, u32, u32); 4] = [
    ("Bus 42", "Downtown", 12, 5),
    ("Train A", "Airport", 20, 12),
    ("Bus 7", "Harbor", 15, 3),
    ("Tram 3", "University", 9, 7),
];

/// Generate a demo snapshot for `now`. If `now` is `None`, fall back to `Utc::now()`.
pub fn approximate(now: Option<DateTime<Utc>>) -> ArrivalSnapshot {
    let now = now.unwrap_or_else(Utc::now);
    let minute_of_day = now.hour() * 60 + now.minute();

    let records = ROUTES
        .iter()
        .map(|&(route, destination, headway, offset)| {
            let minutes = (offset + headway - minute_of_day % headway) % headway;
            ArrivalRecord::new(route, destination, Some(minutes))
        })
        .collect();

    ArrivalSnapshot::captured(records, now).into_simulated()
}

/// [`ArrivalSource`] backed by [`approximate`]. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DemoSource;

#[async_trait]
impl ArrivalSource for DemoSource {
    async fn fetch(&self) -> Result<ArrivalSnapshot, FetchError> {
        Ok(approximate(None))
    }
}
