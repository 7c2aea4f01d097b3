use std::fmt;

use serde::Serialize;

use super::controller::MicrofrontendController;
use super::state::ControllerStatus;

/// Coarse per-module status for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MfeStatus {
    Loading,
    Ready,
    Error,
}

impl From<&ControllerStatus> for MfeStatus {
    fn from(status: &ControllerStatus) -> Self {
        if status.is_mounted() {
            MfeStatus::Ready
        } else if status.failed {
            MfeStatus::Error
        } else {
            MfeStatus::Loading
        }
    }
}

impl fmt::Display for MfeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MfeStatus::Loading => f.write_str("loading"),
            MfeStatus::Ready => f.write_str("ready"),
            MfeStatus::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub module: String,
    pub label: String,
    pub status: MfeStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Live view over a set of controllers.
#[derive(Debug, Default, Clone)]
pub struct StatusBoard {
    controllers: Vec<(String, MicrofrontendController)>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, label: impl Into<String>, controller: MicrofrontendController) {
        self.controllers.push((label.into(), controller));
    }

    pub fn entries(&self) -> Vec<StatusEntry> {
        self.controllers
            .iter()
            .map(|(label, controller)| {
                let status = controller.status();
                StatusEntry {
                    module: controller.module().to_string(),
                    label: label.clone(),
                    status: MfeStatus::from(&status),
                    attempts: status.attempts,
                    last_error: status.last_error,
                }
            })
            .collect()
    }

    pub fn all_ready(&self) -> bool {
        self.entries().iter().all(|e| e.status == MfeStatus::Ready)
    }

    pub fn render(&self) -> Vec<String> {
        let entries = self.entries();
        let width = entries.iter().map(|e| e.label.len()).max().unwrap_or(0);
        entries
            .iter()
            .map(|e| {
                let mut line = format!(
                    "{:<7} {:<width$}  {}",
                    format!("[{}]", e.status),
                    e.label,
                    e.module,
                    width = width
                );
                if let (MfeStatus::Error, Some(err)) = (e.status, &e.last_error) {
                    line.push_str(&format!("  ({})", err));
                }
                line
            })
            .collect()
    }
}
