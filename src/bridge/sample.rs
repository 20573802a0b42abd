//! Gaze sample record
//!
//! One reconciled reading: a gaze point paired with the eye positions
//! reported on the engine's separate eye-position sub-stream.

use serde::{Deserialize, Serialize};

/// A 3D eye position in millimeters, z being distance from the tracker
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EyePosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl EyePosition {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Placeholder carried by an eye that was not resolved
    pub fn invalid() -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: f64::NAN,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for EyePosition {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// One gaze reading
///
/// Every field is always present. An eye whose validity flag is false
/// carries `EyePosition::invalid()` so the row shape never changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GazeSample {
    /// Gaze point X in screen pixels
    pub gaze_x_px: f64,
    /// Gaze point Y in screen pixels
    pub gaze_y_px: f64,
    /// Engine clock timestamp of the gaze event
    pub gaze_timestamp_ms: f64,
    pub left_valid: bool,
    pub right_valid: bool,
    pub left_eye_mm: EyePosition,
    pub right_eye_mm: EyePosition,
    /// Engine clock timestamp of the eye-position event
    pub eye_pos_timestamp_ms: f64,
}

impl GazeSample {
    /// Build a sample with no resolved eye positions
    pub fn gaze_only(x_px: f64, y_px: f64, timestamp_ms: f64) -> Self {
        Self {
            gaze_x_px: x_px,
            gaze_y_px: y_px,
            gaze_timestamp_ms: timestamp_ms,
            left_valid: false,
            right_valid: false,
            left_eye_mm: EyePosition::invalid(),
            right_eye_mm: EyePosition::invalid(),
            eye_pos_timestamp_ms: f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaze_only_has_placeholders() {
        let s = GazeSample::gaze_only(10.0, 20.0, 5.0);
        assert!(!s.left_valid && !s.right_valid);
        assert!(s.left_eye_mm.x.is_nan());
        assert!(s.right_eye_mm.z.is_nan());
        assert!(s.eye_pos_timestamp_ms.is_nan());
        assert_eq!(s.gaze_x_px, 10.0);
    }

    #[test]
    fn test_eye_position_finite() {
        assert!(EyePosition::new(1.0, 2.0, 600.0).is_finite());
        assert!(!EyePosition::invalid().is_finite());
        assert!(!EyePosition::from([1.0, f64::INFINITY, 3.0]).is_finite());
    }
}
