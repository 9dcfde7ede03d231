//! Decoding of decrypted packets into [`TelemetryFrame`]s.

use super::offsets as off;
use super::{MAGIC, MIN_PACKET_SIZE, PACKET_SIZE_TYPE2, PACKET_SIZE_TYPE3};
use crate::cipher;
use crate::types::{Corners, Motion, Rotation, SimulatorFlags, TelemetryFrame, TireState, Vec3};
use crate::{Result, TelemetryError};

/// Bounds-checked little-endian reads over a packet buffer.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn bytes<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        self.buf.get(offset..offset.checked_add(N)?)?.try_into().ok()
    }

    fn u8(&self, offset: usize) -> Option<u8> {
        self.buf.get(offset).copied()
    }

    fn i16(&self, offset: usize) -> Option<i16> {
        self.bytes(offset).map(i16::from_le_bytes)
    }

    fn u16(&self, offset: usize) -> Option<u16> {
        self.bytes(offset).map(u16::from_le_bytes)
    }

    fn i32(&self, offset: usize) -> Option<i32> {
        self.bytes(offset).map(i32::from_le_bytes)
    }

    fn u32(&self, offset: usize) -> Option<u32> {
        self.bytes(offset).map(u32::from_le_bytes)
    }

    /// Non-finite values are reported as zero.
    fn f32(&self, offset: usize) -> Option<f32> {
        let value = self.bytes(offset).map(f32::from_le_bytes)?;
        Some(if value.is_finite() { value } else { 0.0 })
    }

    fn vec3(&self, offset: usize) -> Option<Vec3> {
        Some(Vec3::new(self.f32(offset)?, self.f32(offset + 4)?, self.f32(offset + 8)?))
    }

    fn quad(&self, offset: usize) -> Option<[f32; 4]> {
        Some([
            self.f32(offset)?,
            self.f32(offset + 4)?,
            self.f32(offset + 8)?,
            self.f32(offset + 12)?,
        ])
    }

    fn lap_time(&self, offset: usize) -> Option<Option<u32>> {
        let ms = self.i32(offset)?;
        Some(if ms > 0 { Some(ms as u32) } else { None })
    }
}

/// Decode a decrypted packet.
///
/// Returns `None` when the buffer is shorter than [`MIN_PACKET_SIZE`], when the
/// magic marker does not match, or when any field would be read out of bounds.
/// The result depends only on `bytes` and `timestamp_ms`.
pub fn parse(bytes: &[u8], timestamp_ms: u64) -> Option<TelemetryFrame> {
    if bytes.len() < MIN_PACKET_SIZE {
        return None;
    }
    let r = Reader::new(bytes);
    if r.u32(off::MAGIC)? != MAGIC {
        return None;
    }

    let gears = r.u8(off::GEARS)?;
    let suggested = gears >> 4;
    let tire_temps = r.quad(off::TIRE_TEMP)?;
    let wheel_rps = r.quad(off::WHEEL_RPS)?;
    let radius = r.quad(off::TIRE_RADIUS)?;
    let suspension = r.quad(off::SUSPENSION_HEIGHT)?;
    let tire = |i: usize| TireState {
        temperature_c: tire_temps[i],
        wheel_rps: wheel_rps[i],
        radius_m: radius[i],
        suspension_height_m: suspension[i],
    };

    let extended = bytes.len() >= PACKET_SIZE_TYPE2;
    let (steering, motion) = if extended {
        let motion = Motion { sway: r.f32(off::SWAY)?, heave: r.f32(off::HEAVE)?, surge: r.f32(off::SURGE)? };
        (Some(r.f32(off::WHEEL_ROTATION)?), Some(motion))
    } else {
        (None, None)
    };
    let energy_recovery =
        if bytes.len() >= PACKET_SIZE_TYPE3 { Some(r.f32(off::ENERGY_RECOVERY)?) } else { None };

    Some(TelemetryFrame {
        packet_id: r.i32(off::PACKET_ID)?,
        timestamp_ms,
        position: r.vec3(off::POSITION)?,
        velocity: r.vec3(off::VELOCITY)?,
        rotation: Rotation {
            pitch: r.f32(off::ROTATION)?,
            yaw: r.f32(off::ROTATION + 4)?,
            roll: r.f32(off::ROTATION + 8)?,
        },
        angular_velocity: r.vec3(off::ANGULAR_VELOCITY)?,
        orientation_to_north: r.f32(off::ORIENTATION_TO_NORTH)?,
        body_height_m: r.f32(off::BODY_HEIGHT)?,
        speed_kmh: r.f32(off::SPEED_MPS)?.max(0.0) * off::MPS_TO_KMH,
        rpm: r.f32(off::ENGINE_RPM)?,
        gear: gears & 0x0F,
        suggested_gear: (suggested != off::NO_SUGGESTED_GEAR).then_some(suggested),
        throttle: r.u8(off::THROTTLE)? as f32 / 255.0,
        brake: r.u8(off::BRAKE)? as f32 / 255.0,
        clutch: r.f32(off::CLUTCH_PEDAL)?.clamp(0.0, 1.0),
        steering,
        tires: Corners { front_left: tire(0), front_right: tire(1), rear_left: tire(2), rear_right: tire(3) },
        fuel_level: r.f32(off::FUEL_LEVEL)?,
        fuel_capacity: r.f32(off::FUEL_CAPACITY)?,
        boost_bar: r.f32(off::BOOST)? - 1.0,
        oil_pressure: r.f32(off::OIL_PRESSURE)?,
        water_temp_c: r.f32(off::WATER_TEMP)?,
        oil_temp_c: r.f32(off::OIL_TEMP)?,
        current_lap: r.i16(off::LAP_COUNT)?,
        total_laps: r.i16(off::TOTAL_LAPS)?,
        best_lap_ms: r.lap_time(off::BEST_LAP_MS)?,
        last_lap_ms: r.lap_time(off::LAST_LAP_MS)?,
        time_of_day_ms: r.i32(off::TIME_OF_DAY_MS)?.max(0) as u32,
        race_position: r.i16(off::RACE_POSITION)?,
        cars_in_race: r.i16(off::CARS_IN_RACE)?,
        min_alert_rpm: r.i16(off::MIN_ALERT_RPM)?.max(0) as u16,
        max_alert_rpm: r.i16(off::MAX_ALERT_RPM)?.max(0) as u16,
        top_speed_kmh: r.i16(off::TOP_SPEED_KMH)?.max(0) as u16,
        flags: SimulatorFlags::new(r.u16(off::FLAGS)?),
        lap_distance_m: None,
        car_code: r.i32(off::CAR_CODE)?,
        motion,
        energy_recovery,
    })
}

/// Decrypt and decode one raw datagram.
///
/// Errors are the recoverable kind: the caller counts them and drops the
/// datagram.
pub fn decode_datagram(datagram: &[u8], timestamp_ms: u64) -> Result<TelemetryFrame> {
    let plaintext = cipher::open_datagram(datagram)?;
    parse(&plaintext, timestamp_ms).ok_or_else(|| {
        TelemetryError::parse_error("telemetry frame", format!("{} byte packet", plaintext.len()))
    })
}
