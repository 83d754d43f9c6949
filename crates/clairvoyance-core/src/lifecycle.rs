//! Lifecycle state machines reported by the host.
//!
//! `ProcessState`: Stopped -> Starting -> Ready, with Failed reachable from
//! Starting (spawn/readiness failure) and Ready (crash after the restart budget).
//!
//! `InitState`: Uninitialized -> Initializing -> Initialized | InitFailed.

use serde::{Deserialize, Serialize};

/// State of the supervised backend process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Failed,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Failed => "failed",
        }
    }

    /// Whether the process can serve requests
    pub fn is_ready(&self) -> bool {
        matches!(self, ProcessState::Ready)
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the one-time backend bootstrap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initializing,
    Initialized,
    InitFailed,
}

impl InitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitState::Uninitialized => "uninitialized",
            InitState::Initializing => "initializing",
            InitState::Initialized => "initialized",
            InitState::InitFailed => "init_failed",
        }
    }

    /// Whether the bootstrap has run to an outcome
    pub fn is_settled(&self) -> bool {
        matches!(self, InitState::Initialized | InitState::InitFailed)
    }
}

impl std::fmt::Display for InitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
