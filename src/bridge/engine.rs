//! Engine contract - what the bridge needs from an eye-tracking engine
//!
//! An engine delivers three asynchronous streams on a thread it owns:
//! connection-state notifications, gaze events and eye-position events.
//! The bridge registers one callback per stream when it opens a session
//! and unregisters them all when it closes it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Connection state as reported by the engine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    TryingToConnect,
    Connected,
    Disconnected,
    ServerVersionTooLow,
    ServerVersionTooHigh,
}

/// Raw gaze point event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeEvent {
    pub x_px: f64,
    pub y_px: f64,
    pub timestamp_ms: f64,
}

/// Raw eye-position event; `None` means the engine could not resolve that eye
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyePositionEvent {
    pub timestamp_ms: f64,
    pub left: Option<[f64; 3]>,
    pub right: Option<[f64; 3]>,
}

/// Errors reported by an engine while opening a session
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine is not running: {0}")]
    NotRunning(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StateCallback = Box<dyn Fn(EngineState) + Send + Sync>;
pub type GazeCallback = Box<dyn Fn(GazeEvent) + Send + Sync>;
pub type EyePositionCallback = Box<dyn Fn(EyePositionEvent) + Send + Sync>;
pub type MalformedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// The callbacks registered with an engine for one session
pub struct EngineHandlers {
    pub on_state: StateCallback,
    pub on_gaze: GazeCallback,
    pub on_eye_position: EyePositionCallback,
    /// An event arrived but could not be decoded at all
    pub on_malformed: MalformedCallback,
}

/// An eye-tracking engine the bridge can open sessions against
pub trait Engine: Send {
    /// Register `handlers` and start delivering events
    ///
    /// Callbacks may fire on the engine's thread before this returns.
    /// Fails with `EngineError::NotRunning` if the engine cannot be reached.
    fn open(&mut self, handlers: EngineHandlers) -> Result<Box<dyn EngineSession>, EngineError>;

    /// Engine name (for logs and status)
    fn name(&self) -> &str;
}

/// A live registration with an engine
pub trait EngineSession: Send {
    /// Unregister all callbacks and release the engine context
    ///
    /// Once this returns no further callback of this session runs.
    fn close(self: Box<Self>);
}
