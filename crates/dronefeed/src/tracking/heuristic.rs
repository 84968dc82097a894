use super::{Axis, MotionCommand, Rect};
use crate::settings::TrackingSettings;

/// Face position history carried between frames.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackerState {
    pub previous: (i32, i32),
    pub current: (i32, i32),
    /// Total detections seen so far, across frames.
    pub detections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    /// Enough detections seen; land and stop the pipeline.
    Stop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub commands: Vec<MotionCommand>,
    pub verdict: Verdict,
}

/// Advance the tracker by one frame's detections and decide what to send.
///
/// The drone follows the last detected face: horizontal drift beyond the
/// dead band rolls toward it, vertical drift descends or climbs. The up
/// dead band is wider than the down one and the climb gentler, so the drone
/// does not bob on noisy detections.
pub fn step(state: &mut TrackerState, faces: &[Rect], settings: &TrackingSettings) -> Step {
    if state.detections > 1 {
        state.previous = state.current;
    }

    for face in faces {
        state.current = (face.x, face.y);
        state.detections += 1;
    }

    let mut commands = Vec::new();
    if state.detections > 2 {
        let dx = state.current.0 - state.previous.0;
        let dy = state.current.1 - state.previous.1;

        if dx > settings.deadband_x {
            commands.push(MotionCommand::Move {
                axis: Axis::Roll,
                magnitude: settings.roll_magnitude,
            });
        }
        if dx < -settings.deadband_x {
            commands.push(MotionCommand::Move {
                axis: Axis::Roll,
                magnitude: -settings.roll_magnitude,
            });
        }
        if dy > settings.deadband_down {
            commands.push(MotionCommand::Move {
                axis: Axis::Gaz,
                magnitude: -settings.descend_magnitude,
            });
        }
        if dy < -settings.deadband_up {
            commands.push(MotionCommand::Move {
                axis: Axis::Gaz,
                magnitude: settings.climb_magnitude,
            });
        }
    }

    if state.detections > settings.detection_limit {
        commands.push(MotionCommand::Land);
        return Step {
            commands,
            verdict: Verdict::Stop,
        };
    }

    Step {
        commands,
        verdict: Verdict::Continue,
    }
}
