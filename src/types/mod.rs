//! Core types shared across the capture pipeline.
//!
//! - [`TelemetryFrame`] is the decoded, immutable snapshot of one datagram
//! - [`SimulatorFlags`] wraps the packed status bitfield
//! - [`ConnectionState`] describes the link to the console
//! - [`LapRecord`] and [`Session`] are what the recorder persists
//! - [`ClientEvent`] is what subscribers receive
//! - [`UpdateRate`] controls subscriber-side throttling

mod connection;
mod event;
mod flags;
mod frame;
mod session;
mod update_rate;

pub use connection::{ConnectionState, ConnectionStatus};
pub use event::ClientEvent;
pub use flags::{SimulatorFlags, simulator_flags};
pub use frame::{Corners, Motion, Rotation, TelemetryFrame, TireState, Vec3};
pub use session::{LapRecord, Session, SyncStatus};
pub use update_rate::UpdateRate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_distance() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 0.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fuel_fraction_handles_unknown_capacity() {
        let frame = TelemetryFrame { fuel_level: 30.0, fuel_capacity: 0.0, ..Default::default() };
        assert_eq!(frame.fuel_fraction(), 0.0);

        let frame = TelemetryFrame { fuel_level: 30.0, fuel_capacity: 60.0, ..Default::default() };
        assert!((frame.fuel_fraction() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn update_rate_normalizes_against_source() {
        assert_eq!(UpdateRate::Max(120).normalize(60.0), UpdateRate::Native);
        assert_eq!(UpdateRate::Max(10).normalize(60.0), UpdateRate::Max(10));
        assert!(UpdateRate::Native.throttle_interval(60.0).is_none());
        assert_eq!(
            UpdateRate::Max(10).throttle_interval(60.0),
            Some(std::time::Duration::from_millis(100))
        );
    }
}
