//! Bridge module - turns engine-pushed gaze events into host-pulled rows
//!
//! This module provides:
//! - Sample buffer shared between the engine thread and the host thread
//! - Codec pairing gaze and eye-position events into fixed 12-column rows
//! - Connection manager driving the engine session state machine
//! - Command dispatcher exposing `connect`, `getdata` and `disconnect`
//! - Engines: socket transport to an engine process, and a simulated one

mod buffer;
mod codec;
mod connection;
mod dispatch;
mod engine;
mod sample;
mod simulated;
mod transport;

#[cfg(test)]
mod testing;

// Re-export public types
#[allow(unused_imports)]
pub use buffer::SampleBuffer;
#[allow(unused_imports)]
pub use codec::{encode_row, encode_rows, Row, SampleCodec, COLUMNS};
#[allow(unused_imports)]
pub use connection::{ConnectionManager, ConnectionState, FailureReason};
#[allow(unused_imports)]
pub use dispatch::{Command, CommandDispatcher, DataPayload, Response};
#[allow(unused_imports)]
pub use engine::{
    Engine, EngineError, EngineHandlers, EngineSession, EngineState, EyePositionEvent, GazeEvent,
};
#[allow(unused_imports)]
pub use sample::{EyePosition, GazeSample};
#[allow(unused_imports)]
pub use simulated::SimulatedEngine;
#[allow(unused_imports)]
pub use transport::SocketEngine;
