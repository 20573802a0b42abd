//! Connection manager - owns the engine session and its state machine
//!
//! State changes arrive asynchronously on the engine's thread. The host
//! thread reads them lazily. Both sides share one small lock around the
//! state; it is never held across a call into the engine.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use super::buffer::SampleBuffer;
use super::codec::SampleCodec;
use super::engine::{Engine, EngineHandlers, EngineSession, EngineState};
use super::sample::GazeSample;
use crate::error::BridgeError;

/// Why a connection ended up in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EngineNotRunning,
    VersionTooHigh,
    VersionTooLow,
    Lost,
}

/// Bridge-side connection state
///
/// `Failed` is latched: only an explicit `connect()` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Failed(FailureReason),
}

impl ConnectionState {
    /// Apply an engine notification, returning the new state
    fn on_engine_state(self, reported: EngineState) -> Self {
        match self {
            // Closed or latched: nothing the engine says changes that
            Self::Disconnected | Self::Failed(_) => self,
            Self::Connecting | Self::Connected => match reported {
                EngineState::Connected => Self::Connected,
                EngineState::TryingToConnect if self == Self::Connecting => Self::Connecting,
                EngineState::TryingToConnect | EngineState::Disconnected => {
                    Self::Failed(FailureReason::Lost)
                }
                EngineState::ServerVersionTooLow => Self::Failed(FailureReason::VersionTooLow),
                EngineState::ServerVersionTooHigh => Self::Failed(FailureReason::VersionTooHigh),
            },
        }
    }
}

/// State shared with the engine callbacks
struct Shared {
    state: ConnectionState,
    /// Bumped on every connect and disconnect. Callbacks carry the epoch
    /// they were registered under and are ignored once it is stale.
    epoch: u64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything that lives exactly as long as one engine session
struct Session {
    handle: Box<dyn EngineSession>,
    buffer: SampleBuffer,
    codec: Arc<SampleCodec>,
}

/// Manages the connection to an eye-tracking engine
pub struct ConnectionManager {
    engine: Box<dyn Engine>,

    shared: Arc<Mutex<Shared>>,

    /// Active session (None when disconnected or never connected)
    session: Option<Session>,

    /// Status message
    pub status: String,
}

impl ConnectionManager {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            shared: Arc::new(Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                epoch: 0,
            })),
            session: None,
            status: "Disconnected".to_string(),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open a session with the engine
    ///
    /// A no-op while `Connecting` or `Connected`. From `Disconnected` or a
    /// latched `Failed` state, any previous session is released and a new
    /// one is opened. Returns the state right after registration.
    pub fn connect(&mut self) -> Result<ConnectionState, BridgeError> {
        let current = self.state();
        if matches!(current, ConnectionState::Connecting | ConnectionState::Connected) {
            log::debug!("connect: already {:?}", current);
            return Ok(current);
        }

        self.close_session();

        let epoch = {
            let mut shared = lock(&self.shared);
            shared.epoch += 1;
            shared.state = ConnectionState::Connecting;
            shared.epoch
        };

        let buffer = SampleBuffer::new();
        let codec = Arc::new(SampleCodec::new());
        let handlers = Self::handlers(&self.shared, epoch, &buffer, &codec);

        log::info!("Connecting to engine: {}", self.engine.name());
        match self.engine.open(handlers) {
            Ok(handle) => {
                self.session = Some(Session {
                    handle,
                    buffer,
                    codec,
                });
                let state = self.state();
                self.status = format!("{:?}: {}", state, self.engine.name());
                Ok(state)
            }
            Err(e) => {
                {
                    let mut shared = lock(&self.shared);
                    if shared.epoch == epoch {
                        shared.state = ConnectionState::Failed(FailureReason::EngineNotRunning);
                    }
                }
                self.status = format!("Connect error: {}", e);
                log::error!("Engine connect error: {}", e);
                Err(e.into())
            }
        }
    }

    /// Close the session and drop any undrained samples
    ///
    /// Safe from any state. The state flips to `Disconnected` first so a
    /// callback already running on the engine thread stops pushing.
    pub fn disconnect(&mut self) {
        let previous = {
            let mut shared = lock(&self.shared);
            let previous = shared.state;
            shared.state = ConnectionState::Disconnected;
            shared.epoch += 1;
            previous
        };

        self.close_session();
        self.status = "Disconnected".to_string();
        if previous != ConnectionState::Disconnected {
            log::info!("Engine disconnected (was {:?})", previous);
        }
    }

    /// Remove and return every sample received so far, oldest first
    pub fn drain(&self) -> Vec<GazeSample> {
        self.session
            .as_ref()
            .map(|s| s.buffer.drain_all())
            .unwrap_or_default()
    }

    /// Samples waiting for the next drain
    pub fn pending_samples(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.buffer.len())
    }

    /// Samples received during the current session
    pub fn samples_received(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(0, |s| s.buffer.samples_written())
    }

    /// Malformed engine events dropped during the current session
    pub fn dropped_events(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.codec.dropped())
    }

    fn close_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.handle.close();
            session.buffer.clear();
        }
    }

    fn handlers(
        shared: &Arc<Mutex<Shared>>,
        epoch: u64,
        buffer: &SampleBuffer,
        codec: &Arc<SampleCodec>,
    ) -> EngineHandlers {
        let on_state = {
            let shared = Arc::clone(shared);
            move |reported: EngineState| {
                let mut shared = lock(&shared);
                if shared.epoch != epoch {
                    return;
                }
                let next = shared.state.on_engine_state(reported);
                if next != shared.state {
                    let previous = std::mem::replace(&mut shared.state, next);
                    drop(shared);
                    match next {
                        ConnectionState::Failed(reason) => {
                            log::warn!("Engine connection failed: {:?} (was {:?})", reason, previous)
                        }
                        _ => log::info!("Engine state: {:?} -> {:?}", previous, next),
                    }
                }
            }
        };

        let on_gaze = {
            let shared = Arc::clone(shared);
            let buffer = buffer.clone_ref();
            let codec = Arc::clone(codec);
            move |event| {
                let Some(sample) = codec.on_gaze(event) else {
                    return;
                };
                // Held across the push so a concurrent disconnect cannot
                // slip in between the check and the append.
                let shared = lock(&shared);
                if shared.epoch == epoch && shared.state == ConnectionState::Connected {
                    buffer.push(sample);
                }
            }
        };

        let on_eye_position = {
            let shared = Arc::clone(shared);
            let codec = Arc::clone(codec);
            move |event| {
                if lock(&shared).epoch == epoch {
                    codec.on_eye_position(event);
                }
            }
        };

        let on_malformed = {
            let shared = Arc::clone(shared);
            let codec = Arc::clone(codec);
            move |what: &str| {
                if lock(&shared).epoch == epoch {
                    codec.drop_event(what);
                }
            }
        };

        EngineHandlers {
            on_state: Box::new(on_state),
            on_gaze: Box::new(on_gaze),
            on_eye_position: Box::new(on_eye_position),
            on_malformed: Box::new(on_malformed),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::ManualEngine;
    use crate::bridge::SimulatedEngine;
    use std::thread;
    use std::time::{Duration, Instant};

    fn connected(engine: &ManualEngine) -> ConnectionManager {
        let mut manager = ConnectionManager::new(Box::new(engine.clone()));
        manager.connect().unwrap();
        engine.state(EngineState::Connected);
        manager
    }

    #[test]
    fn test_connect_transitions() {
        let engine = ManualEngine::new();
        let mut manager = ConnectionManager::new(Box::new(engine.clone()));
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        assert_eq!(manager.connect().unwrap(), ConnectionState::Connecting);
        engine.state(EngineState::TryingToConnect);
        assert_eq!(manager.state(), ConnectionState::Connecting);

        engine.state(EngineState::Connected);
        assert!(manager.is_connected());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let engine = ManualEngine::new();
        let mut manager = connected(&engine);

        assert_eq!(manager.connect().unwrap(), ConnectionState::Connected);
        assert_eq!(engine.opens(), 1);
        assert_eq!(engine.closes(), 0);
    }

    #[test]
    fn test_engine_not_running() {
        let engine = ManualEngine::not_running();
        let mut manager = ConnectionManager::new(Box::new(engine.clone()));

        let err = manager.connect().unwrap_err();
        assert!(matches!(err, BridgeError::EngineNotRunning(_)));
        assert_eq!(
            manager.state(),
            ConnectionState::Failed(FailureReason::EngineNotRunning)
        );

        // Retry is the caller's call, and works once the engine is up
        engine.set_running(true);
        assert_eq!(manager.connect().unwrap(), ConnectionState::Connecting);
    }

    #[test]
    fn test_samples_only_pushed_while_connected() {
        let engine = ManualEngine::new();
        let mut manager = ConnectionManager::new(Box::new(engine.clone()));
        manager.connect().unwrap();

        engine.gaze(1.0, 1.0, 1.0);
        assert!(manager.drain().is_empty());

        engine.state(EngineState::Connected);
        engine.gaze(2.0, 2.0, 2.0);
        assert_eq!(manager.drain().len(), 1);
        assert_eq!(manager.samples_received(), 1);
    }

    #[test]
    fn test_failure_is_latched() {
        let engine = ManualEngine::new();
        let manager = connected(&engine);

        engine.state(EngineState::ServerVersionTooHigh);
        assert_eq!(
            manager.state(),
            ConnectionState::Failed(FailureReason::VersionTooHigh)
        );

        // No silent recovery
        engine.state(EngineState::Connected);
        assert_eq!(
            manager.state(),
            ConnectionState::Failed(FailureReason::VersionTooHigh)
        );
        engine.gaze(1.0, 1.0, 1.0);
        assert!(manager.drain().is_empty());
    }

    #[test]
    fn test_lost_keeps_residue() {
        let engine = ManualEngine::new();
        let manager = connected(&engine);
        engine.gaze(1.0, 1.0, 1.0);
        engine.gaze(2.0, 2.0, 2.0);

        engine.state(EngineState::Disconnected);
        assert_eq!(manager.state(), ConnectionState::Failed(FailureReason::Lost));
        engine.gaze(3.0, 3.0, 3.0);

        assert_eq!(manager.drain().len(), 2);
    }

    #[test]
    fn test_trying_to_connect_after_connected_is_lost() {
        let engine = ManualEngine::new();
        let manager = connected(&engine);

        engine.state(EngineState::TryingToConnect);
        assert_eq!(manager.state(), ConnectionState::Failed(FailureReason::Lost));
    }

    #[test]
    fn test_reconnect_from_failed() {
        let engine = ManualEngine::new();
        let mut manager = connected(&engine);
        engine.gaze(1.0, 1.0, 1.0);
        engine.state(EngineState::ServerVersionTooLow);

        assert_eq!(manager.connect().unwrap(), ConnectionState::Connecting);
        assert_eq!(engine.opens(), 2);
        assert_eq!(engine.closes(), 1);
        // Residue of the failed session is gone
        assert!(manager.drain().is_empty());
    }

    #[test]
    fn test_disconnect_clears_and_is_idempotent() {
        let engine = ManualEngine::new();
        let mut manager = connected(&engine);
        engine.gaze(1.0, 1.0, 1.0);

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.drain().is_empty());
        assert_eq!(engine.closes(), 1);

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(engine.closes(), 1);
    }

    #[test]
    fn test_stale_callbacks_ignored() {
        let engine = ManualEngine::new();
        let mut manager = connected(&engine);
        let stale = engine.current_handlers().unwrap();

        manager.disconnect();
        manager.connect().unwrap();
        engine.state(EngineState::Connected);

        // The old registration fires after it was closed
        (stale.on_state)(EngineState::Disconnected);
        (stale.on_gaze)(crate::bridge::GazeEvent {
            x_px: 1.0,
            y_px: 1.0,
            timestamp_ms: 1.0,
        });

        assert!(manager.is_connected());
        assert!(manager.drain().is_empty());
    }

    #[test]
    fn test_malformed_events_counted() {
        let engine = ManualEngine::new();
        let manager = connected(&engine);
        engine.gaze(f64::NAN, 0.0, 1.0);
        engine.gaze(1.0, 1.0, 2.0);

        assert_eq!(manager.dropped_events(), 1);
        assert_eq!(manager.drain().len(), 1);

        // Frames the engine transport could not decode count too
        engine.malformed();
        assert_eq!(manager.dropped_events(), 2);
    }

    #[test]
    fn test_disconnect_while_engine_thread_pushes() {
        let mut manager = ConnectionManager::new(Box::new(SimulatedEngine::new(100_000.0)));

        for _ in 0..50 {
            manager.connect().unwrap();
            thread::sleep(Duration::from_millis(2));
            manager.disconnect();

            assert_eq!(manager.state(), ConnectionState::Disconnected);
            assert!(manager.drain().is_empty());
            assert_eq!(manager.pending_samples(), 0);
        }

        manager.connect().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.pending_samples() < 100 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        let samples = manager.drain();
        assert!(!samples.is_empty());
        assert!(samples
            .windows(2)
            .all(|w| w[0].gaze_timestamp_ms <= w[1].gaze_timestamp_ms));

        manager.disconnect();
        assert!(manager.drain().is_empty());
    }
}
