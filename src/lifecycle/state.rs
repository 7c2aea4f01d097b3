use std::fmt;

use serde::Serialize;

/// Lifecycle phase of one controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    /// A load/mount attempt is in flight.
    Mounting,
    /// Waiting out the retry delay after a failed attempt.
    Retrying,
    Mounted,
    Unmounting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Mounting => "mounting",
            Phase::Retrying => "retrying",
            Phase::Mounted => "mounted",
            Phase::Unmounting => "unmounting",
        };
        f.write_str(s)
    }
}

/// Observable controller state, published on every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerStatus {
    pub phase: Phase,
    /// Attempts in the current mount cycle.
    pub attempts: u32,
    /// Attempts over the controller's lifetime.
    pub total_attempts: u64,
    /// Successful mounts over the controller's lifetime.
    pub mounts: u64,
    /// Set after the first successful mount and never cleared.
    pub loaded: bool,
    /// The current cycle gave up. Cleared when a new cycle starts.
    pub failed: bool,
    pub last_error: Option<String>,
}

impl ControllerStatus {
    pub fn is_mounted(&self) -> bool {
        self.phase == Phase::Mounted
    }

    /// No attempt is in flight or scheduled.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Mounted)
    }
}

impl Default for ControllerStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            attempts: 0,
            total_attempts: 0,
            mounts: 0,
            loaded: false,
            failed: false,
            last_error: None,
        }
    }
}
