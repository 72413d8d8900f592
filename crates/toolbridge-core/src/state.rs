//! Connection state machine
//!
//! [`transition`] is a pure function of (state, event). It returns the next
//! state plus the side effects the owner must perform; it never performs I/O
//! itself. [`crate::session::ConnectionManager`] is the only writer of a live
//! state value.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one hop, from installation through an active call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// The executable backing this hop is absent
    NotInstalled,
    /// An external installer is writing the executable
    Installing,
    /// Present on disk, no channel
    Installed,
    /// Spawning and handshaking
    Connecting,
    /// Handshake done, idle
    Connected,
    /// At least one capability call in flight
    Executing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotInstalled => "not_installed",
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Executing => "executing",
        };
        f.write_str(label)
    }
}

impl ConnectionState {
    /// Calls are accepted in these states
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Executing)
    }

    /// A channel exists or is being established
    pub fn has_channel(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Executing)
    }

    pub fn is_installed(&self) -> bool {
        !matches!(self, Self::NotInstalled | Self::Installing)
    }

    /// Resting state after losing a channel
    pub fn resting(installed: bool) -> Self {
        if installed {
            Self::Installed
        } else {
            Self::NotInstalled
        }
    }

    /// Short description for status displays
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotInstalled => "Executable not found",
            Self::Installing => "Installing executable",
            Self::Installed => "Ready to connect",
            Self::Connecting => "Starting and handshaking",
            Self::Connected => "Connected",
            Self::Executing => "Running a tool call",
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    InstallStarted,
    InstallFinished { success: bool },
    /// Result of re-checking the executable on disk
    PresenceChecked { installed: bool },
    ConnectRequested,
    HandshakeSucceeded,
    /// Spawn or handshake failed
    ConnectFailed { installed: bool },
    CallIssued,
    /// A call finished; `remaining` calls are still in flight
    CallCompleted { remaining: usize },
    DisconnectRequested { installed: bool },
    /// The channel closed without being asked to
    ChannelDied { installed: bool },
}

impl ConnectionEvent {
    fn operation(&self) -> &'static str {
        match self {
            Self::InstallStarted => "start installing",
            Self::InstallFinished { .. } => "finish installing",
            Self::PresenceChecked { .. } => "check installation",
            Self::ConnectRequested => "connect",
            Self::HandshakeSucceeded => "complete a handshake",
            Self::ConnectFailed { .. } => "fail a connection",
            Self::CallIssued => "call a tool",
            Self::CallCompleted { .. } => "complete a call",
            Self::DisconnectRequested { .. } => "disconnect",
            Self::ChannelDied { .. } => "lose the channel",
        }
    }
}

/// Side effects requested by a transition, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Close the current channel and fail its pending calls
    TeardownChannel,
    /// Open a fresh channel
    SpawnChannel,
    /// Run the one-round handshake call
    Handshake,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: ConnectionState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(next: ConnectionState, effects: &[Effect]) -> Self {
        Self {
            next,
            effects: effects.to_vec(),
        }
    }
}

/// Compute the next state for `event`.
///
/// Rejected events leave the state untouched; the caller keeps `state`.
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> BridgeResult<Transition> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    let next = match (state, event) {
        (S::NotInstalled | S::Installed, E::InstallStarted) => Transition::to(S::Installing),
        (S::Installing, E::InstallFinished { success }) => {
            Transition::to(S::resting(success))
        }

        (S::NotInstalled | S::Installed, E::PresenceChecked { installed }) => {
            Transition::to(S::resting(installed))
        }
        (s, E::PresenceChecked { .. }) => Transition::to(s),

        (S::Installed | S::Connected | S::Executing, E::ConnectRequested) => Transition::with(
            S::Connecting,
            &[Effect::TeardownChannel, Effect::SpawnChannel, Effect::Handshake],
        ),
        (S::NotInstalled, E::ConnectRequested) => {
            return Err(BridgeError::invalid_state(state, "connect before installing"));
        }

        (S::Connecting, E::HandshakeSucceeded) => Transition::to(S::Connected),
        (S::Connecting, E::ConnectFailed { installed }) => {
            Transition::with(S::resting(installed), &[Effect::TeardownChannel])
        }

        (S::Connected | S::Executing, E::CallIssued) => Transition::to(S::Executing),
        (_, E::CallIssued) => return Err(BridgeError::NotConnected),

        (S::Executing, E::CallCompleted { remaining: 0 }) => Transition::to(S::Connected),
        (s, E::CallCompleted { .. }) => Transition::to(s),

        (
            S::Connecting | S::Connected | S::Executing,
            E::DisconnectRequested { installed } | E::ChannelDied { installed },
        ) => Transition::with(S::resting(installed), &[Effect::TeardownChannel]),

        // Disconnecting at rest still sweeps, so it is safe to repeat
        (S::NotInstalled | S::Installed, E::DisconnectRequested { installed }) => {
            Transition::with(S::resting(installed), &[Effect::TeardownChannel])
        }
        (S::Installing, E::DisconnectRequested { .. }) => Transition::to(S::Installing),
        (S::NotInstalled | S::Installed | S::Installing, E::ChannelDied { .. }) => {
            Transition::to(state)
        }

        (s, e) => return Err(BridgeError::invalid_state(s, e.operation())),
    };

    Ok(next)
}
