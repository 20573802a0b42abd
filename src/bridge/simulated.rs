//! Simulated engine for running the bridge without tracking hardware
//!
//! Gaze wanders across the screen with saccade-like jumps between targets.
//! Eye positions are reported on every other tick, and the right eye drops
//! out now and then so invalid-eye rows show up in normal runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::engine::{
    Engine, EngineError, EngineHandlers, EngineSession, EngineState, EyePositionEvent, GazeEvent,
};

/// Seconds between saccades
const SACCADE_INTERVAL_S: f64 = 0.6;

/// Deterministic gaze path generator
pub struct SimulatedGaze {
    screen: (f64, f64),
    current: (f64, f64),
    target: (f64, f64),
    last_saccade_s: f64,
    tick: u64,
}

impl SimulatedGaze {
    pub fn new(screen_width: f64, screen_height: f64) -> Self {
        let centre = (screen_width / 2.0, screen_height / 2.0);
        Self {
            screen: (screen_width, screen_height),
            current: centre,
            target: centre,
            last_saccade_s: 0.0,
            tick: 0,
        }
    }

    /// Produce the events for one tick at `time_s`
    pub fn generate(&mut self, time_s: f64) -> (GazeEvent, Option<EyePositionEvent>) {
        let (w, h) = self.screen;
        if time_s - self.last_saccade_s > SACCADE_INTERVAL_S {
            self.target = (
                w * (0.5 + 0.4 * (time_s * 1.7).sin()),
                h * (0.5 + 0.4 * (time_s * 1.3).cos()),
            );
            self.last_saccade_s = time_s;
        }
        // Smooth toward target (fixation drift)
        self.current.0 += 0.2 * (self.target.0 - self.current.0);
        self.current.1 += 0.2 * (self.target.1 - self.current.1);

        let timestamp_ms = time_s * 1000.0;
        let gaze = GazeEvent {
            x_px: self.current.0,
            y_px: self.current.1,
            timestamp_ms,
        };

        let eyes = (self.tick % 2 == 0).then(|| {
            // Head sways a little in front of the tracker
            let sway = (time_s * 0.5).sin() * 20.0;
            EyePositionEvent {
                timestamp_ms,
                left: Some([-31.0 + sway, 5.0, 600.0 + sway]),
                right: (self.tick % 50 != 0).then_some([31.0 + sway, 5.0, 602.0 + sway]),
            }
        });

        self.tick += 1;
        (gaze, eyes)
    }
}

/// In-process engine driving `SimulatedGaze` from its own thread
pub struct SimulatedEngine {
    rate_hz: f64,
    screen: (f64, f64),
}

impl SimulatedEngine {
    pub fn new(rate_hz: f64) -> Self {
        Self {
            rate_hz: rate_hz.max(1.0),
            screen: (1920.0, 1080.0),
        }
    }
}

impl Engine for SimulatedEngine {
    fn open(&mut self, handlers: EngineHandlers) -> Result<Box<dyn EngineSession>, EngineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs_f64(1.0 / self.rate_hz);
        let mut gaze = SimulatedGaze::new(self.screen.0, self.screen.1);

        let worker = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("gaze-engine-sim".to_string())
                .spawn(move || {
                    (handlers.on_state)(EngineState::TryingToConnect);
                    (handlers.on_state)(EngineState::Connected);

                    let start = Instant::now();
                    while !stop.load(Ordering::Acquire) {
                        let (g, eyes) = gaze.generate(start.elapsed().as_secs_f64());
                        if let Some(e) = eyes {
                            (handlers.on_eye_position)(e);
                        }
                        (handlers.on_gaze)(g);
                        thread::sleep(period);
                    }
                })?
        };

        log::info!("Simulated engine started at {} Hz", self.rate_hz);
        Ok(Box::new(SimulatedSession {
            stop,
            worker: Some(worker),
        }))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedSession {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl EngineSession for SimulatedSession {
    fn close(mut self: Box<Self>) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Simulated engine thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_generate_stays_on_screen() {
        let mut sim = SimulatedGaze::new(1920.0, 1080.0);
        for i in 0..1000 {
            let (g, _) = sim.generate(i as f64 * 0.01);
            assert!(g.x_px >= 0.0 && g.x_px <= 1920.0);
            assert!(g.y_px >= 0.0 && g.y_px <= 1080.0);
        }
    }

    #[test]
    fn test_eye_positions_every_other_tick() {
        let mut sim = SimulatedGaze::new(100.0, 100.0);
        let eyes: Vec<_> = (0..4).map(|i| sim.generate(i as f64).1).collect();
        assert!(eyes[0].is_some());
        assert!(eyes[1].is_none());
        assert!(eyes[2].is_some());
        // Tick 0 is a right-eye dropout
        assert!(eyes[0].unwrap().right.is_none());
        assert!(eyes[2].unwrap().right.is_some());
    }

    #[test]
    fn test_close_stops_thread() {
        let gazes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&gazes);
        let handlers = EngineHandlers {
            on_state: Box::new(|_| {}),
            on_gaze: Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
            }),
            on_eye_position: Box::new(|_| {}),
            on_malformed: Box::new(|_: &str| {}),
        };

        let mut engine = SimulatedEngine::new(1000.0);
        let session = engine.open(handlers).unwrap();
        thread::sleep(Duration::from_millis(50));
        session.close();

        let after_close = gazes.load(Ordering::Relaxed);
        assert!(after_close > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(gazes.load(Ordering::Relaxed), after_close);
    }
}
