//! Errors surfaced to the host through a command's return path

use thiserror::Error;

use crate::bridge::EngineError;

/// Errors returned by bridge commands
///
/// Connection failures that happen after `connect` returns are not errors:
/// they are latched in `ConnectionState` and reported by the next command.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Engine is not running: {0}")]
    EngineNotRunning(String),

    #[error("Invalid command: {0:?}")]
    InvalidCommand(String),
}

impl From<EngineError> for BridgeError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NotRunning(reason) => Self::EngineNotRunning(reason),
            EngineError::Io(e) => Self::EngineNotRunning(e.to_string()),
        }
    }
}
