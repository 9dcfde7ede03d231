//! Decoded telemetry frame

use serde::{Deserialize, Serialize};

use super::SimulatorFlags;

/// Three-component vector in the console's world space (metres, m/s, rad/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Vec3) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Body rotation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

/// One value per wheel, front-left first.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Corners<T> {
    pub front_left: T,
    pub front_right: T,
    pub rear_left: T,
    pub rear_right: T,
}

impl<T: Copy> Corners<T> {
    pub fn from_array(values: [T; 4]) -> Self {
        Self {
            front_left: values[0],
            front_right: values[1],
            rear_left: values[2],
            rear_right: values[3],
        }
    }

    pub fn to_array(&self) -> [T; 4] {
        [self.front_left, self.front_right, self.rear_left, self.rear_right]
    }
}

/// Per-wheel tire and suspension state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TireState {
    /// Surface temperature in °C
    pub temperature_c: f32,
    /// Wheel speed in revolutions per second
    pub wheel_rps: f32,
    /// Tire radius in metres
    pub radius_m: f32,
    /// Suspension height in metres
    pub suspension_height_m: f32,
}

/// Chassis motion reported by extended packets.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Motion {
    pub sway: f32,
    pub heave: f32,
    pub surge: f32,
}

/// Snapshot of vehicle state at one instant.
///
/// Frames are immutable once decoded and are shared as `Arc<TelemetryFrame>`
/// between the lap detector, the recorder and event subscribers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TelemetryFrame {
    /// Monotonically increasing id assigned by the console
    pub packet_id: i32,
    /// Capture time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,

    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Rotation,
    pub angular_velocity: Vec3,
    pub orientation_to_north: f32,
    pub body_height_m: f32,

    pub speed_kmh: f32,
    pub rpm: f32,
    /// Current gear, 0 = neutral/reverse
    pub gear: u8,
    /// Gear the console suggests, if any
    pub suggested_gear: Option<u8>,
    pub throttle: f32,
    pub brake: f32,
    pub clutch: f32,
    /// Steering wheel rotation in radians (extended packets only)
    pub steering: Option<f32>,

    pub tires: Corners<TireState>,

    pub fuel_level: f32,
    pub fuel_capacity: f32,
    pub boost_bar: f32,
    pub oil_pressure: f32,
    pub water_temp_c: f32,
    pub oil_temp_c: f32,

    pub current_lap: i16,
    pub total_laps: i16,
    pub best_lap_ms: Option<u32>,
    pub last_lap_ms: Option<u32>,
    pub time_of_day_ms: u32,
    pub race_position: i16,
    pub cars_in_race: i16,

    pub min_alert_rpm: u16,
    pub max_alert_rpm: u16,
    pub top_speed_kmh: u16,
    pub flags: SimulatorFlags,

    /// Distance driven in the current lap, when the source knows it
    pub lap_distance_m: Option<f32>,
    pub car_code: i32,

    pub motion: Option<Motion>,
    pub energy_recovery: Option<f32>,
}

impl TelemetryFrame {
    /// Fuel level as a fraction of capacity, `0.0` when capacity is unknown.
    pub fn fuel_fraction(&self) -> f32 {
        if self.fuel_capacity > 0.0 {
            (self.fuel_level / self.fuel_capacity).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}
