//! Sample codec - engine events in, fixed-shape rows out
//!
//! Gaze and eye-position events arrive on separate sub-streams. Each gaze
//! event is paired with the most recent eye-position event to form one
//! `GazeSample`. Samples are then flattened into 12-column rows for the host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use super::engine::{EyePositionEvent, GazeEvent};
use super::sample::{EyePosition, GazeSample};

/// Column names of an encoded row, in order
pub const COLUMNS: [&str; 12] = [
    "gazeX_px",
    "gazeY_px",
    "gazeTimestamp_ms",
    "leftValid",
    "rightValid",
    "leftEyeX_mm",
    "leftEyeY_mm",
    "leftEyeZ_mm",
    "rightEyeX_mm",
    "rightEyeY_mm",
    "rightEyeZ_mm",
    "eyePosTimestamp_ms",
];

/// One encoded sample
pub type Row = [f64; 12];

/// Latest reconciled eye-position state
#[derive(Clone, Copy)]
struct EyeState {
    timestamp_ms: f64,
    left: Option<EyePosition>,
    right: Option<EyePosition>,
}

#[derive(Default)]
struct CodecState {
    last_eyes: Option<EyeState>,
    last_gaze_timestamp_ms: Option<f64>,
}

/// Merges the gaze and eye-position sub-streams into samples
///
/// Malformed events are dropped here and counted, so a bad event can
/// never become a corrupt row.
#[derive(Default)]
pub struct SampleCodec {
    state: Mutex<CodecState>,
    dropped: AtomicU64,
}

impl SampleCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an event that never made it to a sample
    pub fn drop_event(&self, what: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        log::debug!("Dropped malformed {} event", what);
    }

    /// Record an eye-position event for pairing with later gaze events
    pub fn on_eye_position(&self, event: EyePositionEvent) {
        if !event.timestamp_ms.is_finite() {
            self.drop_event("eye-position");
            return;
        }

        // An eye with unusable coordinates is reported as not resolved
        let resolve = |eye: Option<[f64; 3]>| {
            eye.map(EyePosition::from).filter(EyePosition::is_finite)
        };

        let eyes = EyeState {
            timestamp_ms: event.timestamp_ms,
            left: resolve(event.left),
            right: resolve(event.right),
        };
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_eyes = Some(eyes);
    }

    /// Turn a gaze event into a sample, or `None` if the event is malformed
    pub fn on_gaze(&self, event: GazeEvent) -> Option<GazeSample> {
        if !(event.x_px.is_finite() && event.y_px.is_finite() && event.timestamp_ms.is_finite()) {
            self.drop_event("gaze");
            return None;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        // Gaze timestamps never go backwards within a session
        let previous = state.last_gaze_timestamp_ms;
        if previous.is_some_and(|last| event.timestamp_ms < last) {
            drop(state);
            self.drop_event("gaze (timestamp went backwards)");
            return None;
        }
        state.last_gaze_timestamp_ms = Some(event.timestamp_ms);

        let mut sample = GazeSample::gaze_only(event.x_px, event.y_px, event.timestamp_ms);
        if let Some(eyes) = state.last_eyes {
            sample.eye_pos_timestamp_ms = eyes.timestamp_ms;
            if let Some(left) = eyes.left {
                sample.left_valid = true;
                sample.left_eye_mm = left;
            }
            if let Some(right) = eyes.right {
                sample.right_valid = true;
                sample.right_eye_mm = right;
            }
        }
        Some(sample)
    }

    /// Number of malformed events dropped since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

fn flag(valid: bool) -> f64 {
    if valid {
        1.0
    } else {
        0.0
    }
}

/// Flatten one sample into a row, columns ordered as in `COLUMNS`
pub fn encode_row(s: &GazeSample) -> Row {
    [
        s.gaze_x_px,
        s.gaze_y_px,
        s.gaze_timestamp_ms,
        flag(s.left_valid),
        flag(s.right_valid),
        s.left_eye_mm.x,
        s.left_eye_mm.y,
        s.left_eye_mm.z,
        s.right_eye_mm.x,
        s.right_eye_mm.y,
        s.right_eye_mm.z,
        s.eye_pos_timestamp_ms,
    ]
}

/// Encode samples as rows, keeping arrival order
pub fn encode_rows(samples: &[GazeSample]) -> Vec<Row> {
    samples.iter().map(encode_row).collect()
}
