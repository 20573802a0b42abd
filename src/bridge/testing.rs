//! Hand-driven engine for tests
//!
//! The test thread plays the engine's callback thread: every `state()`,
//! `gaze()` and `eye()` call invokes the registered callback directly.

use std::sync::{Arc, Mutex};

use super::engine::{
    Engine, EngineError, EngineHandlers, EngineSession, EngineState, EyePositionEvent, GazeEvent,
};

#[derive(Default)]
struct ManualInner {
    running: bool,
    handlers: Option<Arc<EngineHandlers>>,
    opens: usize,
    closes: usize,
}

#[derive(Clone)]
pub struct ManualEngine {
    inner: Arc<Mutex<ManualInner>>,
}

impl ManualEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualInner {
                running: true,
                ..Default::default()
            })),
        }
    }

    pub fn not_running() -> Self {
        let engine = Self::new();
        engine.set_running(false);
        engine
    }

    pub fn set_running(&self, running: bool) {
        self.inner.lock().unwrap().running = running;
    }

    pub fn opens(&self) -> usize {
        self.inner.lock().unwrap().opens
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    /// Handlers of the open session, if any
    pub fn current_handlers(&self) -> Option<Arc<EngineHandlers>> {
        self.inner.lock().unwrap().handlers.clone()
    }

    pub fn state(&self, state: EngineState) {
        if let Some(h) = self.current_handlers() {
            (h.on_state)(state);
        }
    }

    pub fn gaze(&self, x_px: f64, y_px: f64, timestamp_ms: f64) {
        if let Some(h) = self.current_handlers() {
            (h.on_gaze)(GazeEvent {
                x_px,
                y_px,
                timestamp_ms,
            });
        }
    }

    pub fn malformed(&self) {
        if let Some(h) = self.current_handlers() {
            (h.on_malformed)("test frame");
        }
    }

    pub fn eye(&self, timestamp_ms: f64, left: Option<[f64; 3]>, right: Option<[f64; 3]>) {
        if let Some(h) = self.current_handlers() {
            (h.on_eye_position)(EyePositionEvent {
                timestamp_ms,
                left,
                right,
            });
        }
    }
}

impl Engine for ManualEngine {
    fn open(&mut self, handlers: EngineHandlers) -> Result<Box<dyn EngineSession>, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.running {
            return Err(EngineError::NotRunning("manual engine stopped".to_string()));
        }
        inner.handlers = Some(Arc::new(handlers));
        inner.opens += 1;
        Ok(Box::new(ManualSession {
            inner: Arc::clone(&self.inner),
        }))
    }

    fn name(&self) -> &str {
        "manual"
    }
}

struct ManualSession {
    inner: Arc<Mutex<ManualInner>>,
}

impl EngineSession for ManualSession {
    fn close(self: Box<Self>) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers = None;
        inner.closes += 1;
    }
}
