//! Inverse of the parser: lays a [`TelemetryFrame`] out as a plaintext packet.
//!
//! Used by the simulator to produce datagrams that take the same decode path
//! as real console traffic. Scaled fields lose precision (pedals are stored as
//! bytes) and `lap_distance_m` has no wire slot.

use super::offsets as off;
use super::{MAGIC, PacketType};
use crate::types::{TelemetryFrame, Vec3};

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(len: usize) -> Self {
        Self { buf: vec![0u8; len] }
    }

    fn put<const N: usize>(&mut self, offset: usize, bytes: [u8; N]) {
        if let Some(slot) = self.buf.get_mut(offset..offset + N) {
            slot.copy_from_slice(&bytes);
        }
    }

    fn f32(&mut self, offset: usize, value: f32) {
        self.put(offset, value.to_le_bytes());
    }

    fn vec3(&mut self, offset: usize, value: Vec3) {
        self.f32(offset, value.x);
        self.f32(offset + 4, value.y);
        self.f32(offset + 8, value.z);
    }

    fn quad(&mut self, offset: usize, values: [f32; 4]) {
        for (i, value) in values.into_iter().enumerate() {
            self.f32(offset + i * 4, value);
        }
    }

    fn unit_byte(&mut self, offset: usize, value: f32) {
        self.put(offset, [(value.clamp(0.0, 1.0) * 255.0).round() as u8]);
    }
}

/// Encode `frame` into a plaintext packet of `packet_type`'s size.
pub fn encode(frame: &TelemetryFrame, packet_type: PacketType) -> Vec<u8> {
    let mut w = Writer::new(packet_type.size());
    let lap_time = |ms: Option<u32>| ms.map_or(-1i32, |ms| ms.min(i32::MAX as u32) as i32);
    let clamp_i16 = |v: u16| v.min(i16::MAX as u16) as i16;

    w.put(off::MAGIC, MAGIC.to_le_bytes());
    w.vec3(off::POSITION, frame.position);
    w.vec3(off::VELOCITY, frame.velocity);
    w.f32(off::ROTATION, frame.rotation.pitch);
    w.f32(off::ROTATION + 4, frame.rotation.yaw);
    w.f32(off::ROTATION + 8, frame.rotation.roll);
    w.f32(off::ORIENTATION_TO_NORTH, frame.orientation_to_north);
    w.vec3(off::ANGULAR_VELOCITY, frame.angular_velocity);
    w.f32(off::BODY_HEIGHT, frame.body_height_m);
    w.f32(off::ENGINE_RPM, frame.rpm);
    w.f32(off::FUEL_LEVEL, frame.fuel_level);
    w.f32(off::FUEL_CAPACITY, frame.fuel_capacity);
    w.f32(off::SPEED_MPS, frame.speed_kmh / off::MPS_TO_KMH);
    w.f32(off::BOOST, frame.boost_bar + 1.0);
    w.f32(off::OIL_PRESSURE, frame.oil_pressure);
    w.f32(off::WATER_TEMP, frame.water_temp_c);
    w.f32(off::OIL_TEMP, frame.oil_temp_c);

    let tires = frame.tires.to_array();
    w.quad(off::TIRE_TEMP, tires.map(|t| t.temperature_c));
    w.quad(off::WHEEL_RPS, tires.map(|t| t.wheel_rps));
    w.quad(off::TIRE_RADIUS, tires.map(|t| t.radius_m));
    w.quad(off::SUSPENSION_HEIGHT, tires.map(|t| t.suspension_height_m));

    w.put(off::PACKET_ID, frame.packet_id.to_le_bytes());
    w.put(off::LAP_COUNT, frame.current_lap.to_le_bytes());
    w.put(off::TOTAL_LAPS, frame.total_laps.to_le_bytes());
    w.put(off::BEST_LAP_MS, lap_time(frame.best_lap_ms).to_le_bytes());
    w.put(off::LAST_LAP_MS, lap_time(frame.last_lap_ms).to_le_bytes());
    w.put(off::TIME_OF_DAY_MS, (frame.time_of_day_ms.min(i32::MAX as u32) as i32).to_le_bytes());
    w.put(off::RACE_POSITION, frame.race_position.to_le_bytes());
    w.put(off::CARS_IN_RACE, frame.cars_in_race.to_le_bytes());
    w.put(off::MIN_ALERT_RPM, clamp_i16(frame.min_alert_rpm).to_le_bytes());
    w.put(off::MAX_ALERT_RPM, clamp_i16(frame.max_alert_rpm).to_le_bytes());
    w.put(off::TOP_SPEED_KMH, clamp_i16(frame.top_speed_kmh).to_le_bytes());
    w.put(off::FLAGS, frame.flags.value().to_le_bytes());

    let suggested = frame.suggested_gear.map_or(off::NO_SUGGESTED_GEAR, |g| g.min(0x0E));
    w.put(off::GEARS, [(suggested << 4) | (frame.gear & 0x0F)]);
    w.unit_byte(off::THROTTLE, frame.throttle);
    w.unit_byte(off::BRAKE, frame.brake);
    w.f32(off::CLUTCH_PEDAL, frame.clutch);
    w.put(off::CAR_CODE, frame.car_code.to_le_bytes());

    if packet_type != PacketType::Type1 {
        w.f32(off::WHEEL_ROTATION, frame.steering.unwrap_or_default());
        let motion = frame.motion.unwrap_or_default();
        w.f32(off::SWAY, motion.sway);
        w.f32(off::HEAVE, motion.heave);
        w.f32(off::SURGE, motion.surge);
    }
    if packet_type == PacketType::Type3 {
        w.f32(off::ENERGY_RECOVERY, frame.energy_recovery.unwrap_or_default());
    }

    w.buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher;
    use crate::protocol::{decode_datagram, parse};
    use crate::test_utils::FrameBuilder;

    #[test]
    fn encoded_frame_parses_back() {
        let original = FrameBuilder::new(1_000)
            .packet_id(77)
            .position(120.5, 3.0, -44.25)
            .speed_kmh(216.0)
            .lap(4)
            .last_lap_ms(Some(98_765))
            .throttle(1.0)
            .gear(5)
            .fuel(42.0, 100.0)
            .build();

        let decoded = parse(&encode(&original, PacketType::Type1), 1_000).expect("parses");
        assert_eq!(decoded.packet_id, 77);
        assert_eq!(decoded.position, original.position);
        assert!((decoded.speed_kmh - 216.0).abs() < 1e-3);
        assert_eq!(decoded.current_lap, 4);
        assert_eq!(decoded.last_lap_ms, Some(98_765));
        assert_eq!(decoded.best_lap_ms, None);
        assert_eq!(decoded.throttle, 1.0);
        assert_eq!(decoded.gear, 5);
        assert_eq!(decoded.fuel_level, 42.0);
        assert_eq!(decoded.flags, original.flags);
    }

    #[test]
    fn sealed_packet_decodes_through_cipher() {
        let frame = FrameBuilder::new(5_000).packet_id(9).speed_kmh(100.0).build();
        let plaintext = encode(&frame, PacketType::Type2);
        let datagram = cipher::seal_datagram(&plaintext, 0x0102_0304, PacketType::Type2);

        let decoded = decode_datagram(&datagram, 5_000).expect("decodes");
        assert_eq!(decoded.packet_id, 9);
        assert!(decoded.motion.is_some());
    }
}
