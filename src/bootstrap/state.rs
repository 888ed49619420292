// src/bootstrap/state.rs
use std::fmt;

/// Lifecycle of a [`super::Bootstrapper`].
///
/// `Uninitialized → Initializing → Ready → ShuttingDown → Stopped`, with a
/// failed initialization going straight from `Initializing` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Stopped,
}

impl BootstrapState {
    pub fn can_transition_to(self, next: BootstrapState) -> bool {
        use BootstrapState::*;

        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Initializing, Stopped)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Stopped)
        )
    }
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapState::Uninitialized => "uninitialized",
            BootstrapState::Initializing => "initializing",
            BootstrapState::Ready => "ready",
            BootstrapState::ShuttingDown => "shutting down",
            BootstrapState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
