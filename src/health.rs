//! # Component Health
//!
//! Tri-state health per adapter. The display is recorded once during startup;
//! transit, audio and input are updated as attempts succeed or fail.
//!
//! Health never gates a call site directly. An adapter that failed to construct is
//! replaced by a no-op stand-in and marked [`ComponentHealth::Unavailable`]; the
//! board is only consulted for logging and status reporting.

use std::fmt;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentHealth {
    /// Construction failed or the feature is disabled; a no-op stands in
    Unavailable,
    /// Present but the last attempt failed
    Degraded,
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Display,
    Transit,
    Audio,
    Input,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::Display,
        Component::Transit,
        Component::Audio,
        Component::Input,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Component::Display => "display",
            Component::Transit => "transit",
            Component::Audio => "audio",
            Component::Input => "input",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for ComponentHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ComponentHealth::Unavailable => "unavailable",
            ComponentHealth::Degraded => "degraded",
            ComponentHealth::Healthy => "healthy",
        };
        f.write_str(label)
    }
}

/// Health of every component, shared between the loops and the controller.
#[derive(Debug)]
pub struct HealthBoard {
    slots: Mutex<[ComponentHealth; 4]>,
}

impl Default for HealthBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthBoard {
    /// Everything starts unavailable until initialization says otherwise.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([ComponentHealth::Unavailable; 4]),
        }
    }

    pub fn set(&self, component: Component, health: ComponentHealth) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)[component.slot()] = health;
    }

    pub fn get(&self, component: Component) -> ComponentHealth {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)[component.slot()]
    }

    /// Record the outcome of one attempt. Unavailable components stay unavailable:
    /// their no-op stand-in reporting success says nothing about the real device.
    pub fn record_attempt(&self, component: Component, ok: bool) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut slots[component.slot()];
        if *slot != ComponentHealth::Unavailable {
            *slot = if ok {
                ComponentHealth::Healthy
            } else {
                ComponentHealth::Degraded
            };
        }
    }

    /// `display=healthy transit=degraded ...` for log lines.
    pub fn summary(&self) -> String {
        Component::ALL
            .iter()
            .map(|c| format!("{}={}", c, self.get(*c)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
