// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Connection state machine for a transport.
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTING -> DISCONNECTED
//!                      |            |  \
//!                      v            v   `-> RECONNECTING (unsolicited drop)
//!                    ERROR <--------'
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Events that can trigger state transitions.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Open requested
    Open,
    /// Transport opened successfully
    Opened,
    /// Close requested
    Close,
    /// Transport closed
    Closed,
    /// Open or I/O failure
    Failed(String),
    /// Link went away without a close request
    Dropped { auto_reconnect: bool },
    /// Reconnect attempts exhausted
    GaveUp(String),
}

/// The current state of a transport connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "data")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Reconnecting { attempt: u32 },
    Error { message: String },
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Disconnecting => write!(f, "DISCONNECTING"),
            Self::Reconnecting { attempt } => write!(f, "RECONNECTING({})", attempt),
            Self::Error { message } => write!(f, "ERROR({})", message),
        }
    }
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    transition_count: u64,
    last_transition: Option<Instant>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transition_count: 0,
            last_transition: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    pub fn time_in_state(&self) -> Option<Duration> {
        self.last_transition.map(|t| t.elapsed())
    }

    /// Process an event. Returns true if a transition occurred.
    pub fn process_event(&mut self, event: ConnectionEvent) -> bool {
        match self.next_state(event) {
            Some(state) => {
                self.state = state;
                self.transition_count += 1;
                self.last_transition = Some(Instant::now());
                true
            }
            None => false,
        }
    }

    fn next_state(&self, event: ConnectionEvent) -> Option<ConnectionState> {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (&self.state, event) {
            (S::Disconnected | S::Error { .. }, E::Open) => Some(S::Connecting),

            (S::Connecting | S::Reconnecting { .. }, E::Opened) => Some(S::Connected),
            (S::Connecting | S::Connected, E::Failed(message)) => Some(S::Error { message }),

            (S::Connected, E::Dropped { auto_reconnect: true }) => {
                Some(S::Reconnecting { attempt: 0 })
            }
            (S::Connected, E::Dropped { auto_reconnect: false }) => Some(S::Disconnected),
            (S::Reconnecting { attempt }, E::Failed(_)) => Some(S::Reconnecting {
                attempt: attempt + 1,
            }),
            (S::Reconnecting { .. }, E::GaveUp(message)) => Some(S::Error { message }),

            (S::Connected | S::Reconnecting { .. }, E::Close) => Some(S::Disconnecting),
            (S::Error { .. }, E::Close) => Some(S::Disconnected),
            (S::Disconnected, E::Closed) => None,
            (_, E::Closed) => Some(S::Disconnected),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = ConnectionStateMachine::new();
        assert_eq!(sm.state(), &ConnectionState::Disconnected);
        assert_eq!(sm.transition_count(), 0);
    }

    #[test]
    fn test_full_lifecycle() {
        let mut sm = ConnectionStateMachine::new();

        assert!(sm.process_event(ConnectionEvent::Open));
        assert_eq!(sm.state(), &ConnectionState::Connecting);

        assert!(sm.process_event(ConnectionEvent::Opened));
        assert!(sm.state().is_connected());

        assert!(sm.process_event(ConnectionEvent::Close));
        assert_eq!(sm.state(), &ConnectionState::Disconnecting);

        assert!(sm.process_event(ConnectionEvent::Closed));
        assert_eq!(sm.state(), &ConnectionState::Disconnected);
        assert_eq!(sm.transition_count(), 4);
    }

    #[test]
    fn test_open_failure_goes_to_error() {
        let mut sm = ConnectionStateMachine::new();
        sm.process_event(ConnectionEvent::Open);
        sm.process_event(ConnectionEvent::Failed("no such port".into()));
        assert!(sm.state().is_error());

        // Error is left by a new open attempt or a close.
        assert!(sm.process_event(ConnectionEvent::Open));
        assert_eq!(sm.state(), &ConnectionState::Connecting);
    }

    #[test]
    fn test_io_failure_while_connected() {
        let mut sm = ConnectionStateMachine::new();
        sm.process_event(ConnectionEvent::Open);
        sm.process_event(ConnectionEvent::Opened);
        sm.process_event(ConnectionEvent::Failed("write failed".into()));
        assert_eq!(
            sm.state(),
            &ConnectionState::Error {
                message: "write failed".into()
            }
        );
        assert!(sm.process_event(ConnectionEvent::Close));
        assert_eq!(sm.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_drop_with_reconnect() {
        let mut sm = ConnectionStateMachine::new();
        sm.process_event(ConnectionEvent::Open);
        sm.process_event(ConnectionEvent::Opened);
        sm.process_event(ConnectionEvent::Dropped {
            auto_reconnect: true,
        });
        assert_eq!(sm.state(), &ConnectionState::Reconnecting { attempt: 0 });

        sm.process_event(ConnectionEvent::Failed("busy".into()));
        assert_eq!(sm.state(), &ConnectionState::Reconnecting { attempt: 1 });

        sm.process_event(ConnectionEvent::Opened);
        assert!(sm.state().is_connected());
    }

    #[test]
    fn test_drop_without_reconnect() {
        let mut sm = ConnectionStateMachine::new();
        sm.process_event(ConnectionEvent::Open);
        sm.process_event(ConnectionEvent::Opened);
        sm.process_event(ConnectionEvent::Dropped {
            auto_reconnect: false,
        });
        assert_eq!(sm.state(), &ConnectionState::Disconnected);
    }

    #[test]
    fn test_reconnect_gives_up() {
        let mut sm = ConnectionStateMachine::new();
        sm.process_event(ConnectionEvent::Open);
        sm.process_event(ConnectionEvent::Opened);
        sm.process_event(ConnectionEvent::Dropped {
            auto_reconnect: true,
        });
        sm.process_event(ConnectionEvent::GaveUp("unplugged".into()));
        assert!(sm.state().is_error());
    }

    #[test]
    fn test_invalid_transitions() {
        let mut sm = ConnectionStateMachine::new();
        assert!(!sm.process_event(ConnectionEvent::Opened));
        assert!(!sm.process_event(ConnectionEvent::Close));
        assert!(!sm.process_event(ConnectionEvent::Closed));
        assert_eq!(sm.state(), &ConnectionState::Disconnected);
    }
}
