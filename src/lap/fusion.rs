//! Boundary signal fusion.
//!
//! Each detector is noisy on its own: the lap counter lags or skips in menus,
//! the start/finish point is only as good as the first sample after the line,
//! and accumulated distance drifts with pit lanes and shortcuts. A boundary is
//! declared when any of them fires.

/// Radius around the learned start/finish point that counts as "at the line".
pub const START_FINISH_RADIUS_M: f32 = 50.0;

/// Fraction of the track length that must be covered before the position
/// detector may fire.
pub const POSITION_MIN_FRACTION: f32 = 0.9;

/// Fraction of the track length after which the distance detector fires.
pub const DISTANCE_FRACTION: f32 = 1.0;

/// Inputs the detectors look at for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectorSnapshot {
    /// A lap is being timed; nothing fires before the first moving frame
    pub lap_in_progress: bool,
    /// The console lap counter went up on this frame
    pub counter_increased: bool,
    /// Distance to the learned start/finish point, if one is known
    pub distance_to_start_m: Option<f32>,
    /// Distance accumulated since the last boundary
    pub lap_distance_m: f32,
    pub track_length_m: f32,
}

/// Which detectors fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals {
    pub counter: bool,
    pub position: bool,
    pub distance: bool,
}

impl Signals {
    pub fn any(&self) -> bool {
        self.counter || self.position || self.distance
    }

    /// Names of the detectors that fired, for logging.
    pub fn fired(&self) -> Vec<&'static str> {
        [(self.counter, "counter"), (self.position, "position"), (self.distance, "distance")]
            .into_iter()
            .filter_map(|(fired, name)| fired.then_some(name))
            .collect()
    }
}

/// Evaluate all detectors against `snapshot`.
pub fn fuse(snapshot: &DetectorSnapshot) -> Signals {
    if !snapshot.lap_in_progress {
        return Signals::default();
    }

    let covered = |fraction: f32| snapshot.lap_distance_m > snapshot.track_length_m * fraction;

    Signals {
        counter: snapshot.counter_increased,
        position: snapshot.distance_to_start_m.is_some_and(|d| d <= START_FINISH_RADIUS_M)
            && covered(POSITION_MIN_FRACTION),
        distance: covered(DISTANCE_FRACTION),
    }
}
