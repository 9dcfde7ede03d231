//! Byte offsets of the decrypted packet layout (all little-endian).

pub const MAGIC: usize = 0x00; // i32
pub const POSITION: usize = 0x04; // 3 × f32
pub const VELOCITY: usize = 0x10; // 3 × f32
pub const ROTATION: usize = 0x1C; // pitch, yaw, roll f32
pub const ORIENTATION_TO_NORTH: usize = 0x28; // f32
pub const ANGULAR_VELOCITY: usize = 0x2C; // 3 × f32
pub const BODY_HEIGHT: usize = 0x38; // f32
pub const ENGINE_RPM: usize = 0x3C; // f32
// 0x40..0x44 holds the IV in the raw datagram
pub const FUEL_LEVEL: usize = 0x44; // f32
pub const FUEL_CAPACITY: usize = 0x48; // f32
pub const SPEED_MPS: usize = 0x4C; // f32
pub const BOOST: usize = 0x50; // f32, offset by +1 bar
pub const OIL_PRESSURE: usize = 0x54; // f32
pub const WATER_TEMP: usize = 0x58; // f32
pub const OIL_TEMP: usize = 0x5C; // f32
pub const TIRE_TEMP: usize = 0x60; // 4 × f32
pub const PACKET_ID: usize = 0x70; // i32
pub const LAP_COUNT: usize = 0x74; // i16
pub const TOTAL_LAPS: usize = 0x76; // i16
pub const BEST_LAP_MS: usize = 0x78; // i32, -1 = none
pub const LAST_LAP_MS: usize = 0x7C; // i32, -1 = none
pub const TIME_OF_DAY_MS: usize = 0x80; // i32
pub const RACE_POSITION: usize = 0x84; // i16
pub const CARS_IN_RACE: usize = 0x86; // i16
pub const MIN_ALERT_RPM: usize = 0x88; // i16
pub const MAX_ALERT_RPM: usize = 0x8A; // i16
pub const TOP_SPEED_KMH: usize = 0x8C; // i16
pub const FLAGS: usize = 0x8E; // u16
pub const GEARS: usize = 0x90; // u8, low nibble current, high nibble suggested
pub const THROTTLE: usize = 0x91; // u8
pub const BRAKE: usize = 0x92; // u8
pub const WHEEL_RPS: usize = 0xA4; // 4 × f32
pub const TIRE_RADIUS: usize = 0xB4; // 4 × f32
pub const SUSPENSION_HEIGHT: usize = 0xC4; // 4 × f32
pub const CLUTCH_PEDAL: usize = 0xF4; // f32
pub const CAR_CODE: usize = 0x124; // i32

// Type2 and later
pub const WHEEL_ROTATION: usize = 0x128; // f32, radians
pub const SWAY: usize = 0x130; // f32
pub const HEAVE: usize = 0x134; // f32
pub const SURGE: usize = 0x138; // f32

// Type3
pub const ENERGY_RECOVERY: usize = 0x150; // f32

/// m/s to km/h
pub const MPS_TO_KMH: f32 = 3.6;

/// No suggested gear is encoded as 15 in the high nibble.
pub const NO_SUGGESTED_GEAR: u8 = 0x0F;
