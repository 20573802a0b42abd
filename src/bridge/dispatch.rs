//! Command dispatcher - the host-facing entry point
//!
//! The host calls one command at a time from a single thread. Three verbs
//! exist: `connect`, `getdata` and `disconnect`.

use std::str::FromStr;

use serde::Serialize;

use super::codec::{encode_rows, Row, COLUMNS};
use super::connection::{ConnectionManager, ConnectionState};
use super::engine::Engine;
use crate::error::BridgeError;

/// A host command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    GetData,
    Disconnect,
}

impl Command {
    pub const ALL: &[Command] = &[Self::Connect, Self::GetData, Self::Disconnect];

    /// The verb the host uses for this command
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::GetData => "getdata",
            Self::Disconnect => "disconnect",
        }
    }
}

impl FromStr for Command {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .iter()
            .find(|c| c.verb().eq_ignore_ascii_case(token))
            .copied()
            .ok_or_else(|| BridgeError::InvalidCommand(token.to_string()))
    }
}

/// Rows returned by `getdata`, plus the state they were read under
#[derive(Debug, Clone, Serialize)]
pub struct DataPayload {
    pub state: ConnectionState,
    pub columns: [&'static str; 12],
    pub rows: Vec<Row>,
}

/// Result of a successful command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Response {
    Connect { ok: bool, state: ConnectionState },
    #[serde(rename = "getdata")]
    Data(DataPayload),
    Disconnect { ok: bool },
}

/// Maps host commands onto the connection manager
pub struct CommandDispatcher {
    manager: ConnectionManager,
}

impl CommandDispatcher {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            manager: ConnectionManager::new(engine),
        }
    }

    /// Parse a verb and run it
    ///
    /// An unknown verb fails with `InvalidCommand` and touches no state.
    pub fn dispatch(&mut self, verb: &str) -> Result<Response, BridgeError> {
        let command = verb.parse()?;
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<Response, BridgeError> {
        match command {
            Command::Connect => {
                let state = self.manager.connect()?;
                // The engine may already have refused us during registration
                let ok = !matches!(state, ConnectionState::Failed(_));
                Ok(Response::Connect { ok, state })
            }
            Command::GetData => Ok(Response::Data(self.get_data())),
            Command::Disconnect => {
                self.manager.disconnect();
                Ok(Response::Disconnect { ok: true })
            }
        }
    }

    /// Drain everything received since the last call
    ///
    /// Returns no rows unless connected. After a failure, samples buffered
    /// before it are still handed out, once.
    pub fn get_data(&mut self) -> DataPayload {
        let state = self.manager.state();
        let rows = match state {
            ConnectionState::Connected | ConnectionState::Failed(_) => {
                encode_rows(&self.manager.drain())
            }
            ConnectionState::Disconnected | ConnectionState::Connecting => Vec::new(),
        };

        if let ConnectionState::Failed(reason) = state {
            log::debug!("getdata while failed ({:?}), {} residual rows", reason, rows.len());
        }

        DataPayload {
            state,
            columns: COLUMNS,
            rows,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }
}
