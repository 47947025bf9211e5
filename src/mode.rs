//! Operating mode state machine.
//!
//! The mode is resolved once per session from which collaborators are
//! configured and reachable, and only ever moves downward afterwards
//! (downgrade-not-abort), except through an explicit user-triggered retry.
//! Every other component is mode-agnostic: the session hands it a resolved
//! generator and executor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Model configured and warehouse reachable.
    Production,
    /// Model configured, warehouse unreachable: real generated SQL executed
    /// against synthetic data.
    AiOnly,
    /// Model unavailable: template SQL against the live warehouse.
    DbOnly,
    /// Neither available: template SQL, synthetic data.
    Demo,
}

impl Mode {
    /// Returns true if SQL generation goes through the language model.
    pub fn uses_model(&self) -> bool {
        matches!(self, Self::Production | Self::AiOnly)
    }

    /// Returns true if statements execute against the live warehouse.
    pub fn uses_live_warehouse(&self) -> bool {
        matches!(self, Self::Production | Self::DbOnly)
    }

    /// Stable string form for logs and mode indicators.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::AiOnly => "ai_only",
            Self::DbOnly => "db_only",
            Self::Demo => "demo",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session-scoped mode controller.
#[derive(Debug, Clone)]
pub struct ModeController {
    mode: Mode,
}

impl ModeController {
    /// Resolves the starting mode from collaborator availability, checked
    /// once at session start.
    pub fn new(model_available: bool, warehouse_available: bool) -> Self {
        Self {
            mode: Self::resolve(model_available, warehouse_available),
        }
    }

    /// Pure mapping from availability to mode.
    pub fn resolve(model_available: bool, warehouse_available: bool) -> Mode {
        match (model_available, warehouse_available) {
            (true, true) => Mode::Production,
            (true, false) => Mode::AiOnly,
            (false, true) => Mode::DbOnly,
            (false, false) => Mode::Demo,
        }
    }

    /// The current mode.
    pub fn current(&self) -> Mode {
        self.mode
    }

    /// Records that a live warehouse call failed. The session keeps its
    /// generated SQL but executes against synthetic data from here on.
    pub fn warehouse_lost(&mut self) -> Mode {
        self.mode = match self.mode {
            Mode::Production => Mode::AiOnly,
            Mode::DbOnly => Mode::Demo,
            other => other,
        };
        self.mode
    }

    /// Records that the model call failed, retry included.
    pub fn model_lost(&mut self) -> Mode {
        self.mode = match self.mode {
            Mode::Production => Mode::DbOnly,
            Mode::AiOnly => Mode::Demo,
            other => other,
        };
        self.mode
    }

    /// Explicit user-triggered re-resolution, the only upward transition.
    pub fn retry_connection(&mut self, model_available: bool, warehouse_available: bool) -> Mode {
        self.mode = Self::resolve(model_available, warehouse_available);
        self.mode
    }
}
