//! Wire protocol of the console's "Simulator Interface" telemetry feed.
//!
//! The console broadcasts one encrypted datagram per simulation tick (~60 Hz)
//! to any host that keeps sending it a single-byte heartbeat. Every datagram
//! decrypts to a fixed little-endian layout starting with [`MAGIC`].

pub(crate) mod offsets;
pub mod parser;
pub mod writer;

use serde::{Deserialize, Serialize};

pub use parser::{decode_datagram, parse};
pub use writer::encode;

/// UDP port the console sends telemetry to.
pub const RECV_PORT: u16 = 33740;

/// UDP port the console listens on for heartbeats.
pub const SEND_PORT: u16 = 33739;

/// Size of the standard packet (`0x128`). Anything shorter is discarded.
pub const MIN_PACKET_SIZE: usize = 0x128;

/// Size of the extended packet with steering and motion data (`0x13C`).
pub const PACKET_SIZE_TYPE2: usize = 0x13C;

/// Size of the full packet with energy recovery data (`0x158`).
pub const PACKET_SIZE_TYPE3: usize = 0x158;

/// Largest packet the console sends; used to size receive buffers.
pub const MAX_PACKET_SIZE: usize = PACKET_SIZE_TYPE3;

/// Marker at offset 0 of every correctly decrypted packet ("0S7G" little-endian).
pub const MAGIC: u32 = 0x4737_5330;

/// Packet layout requested by the heartbeat byte.
///
/// The heartbeat determines which layout the console sends back; the XOR
/// constant used for nonce derivation differs per layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketType {
    /// 296-byte packet, heartbeat `A`.
    #[default]
    Type1,
    /// 316-byte packet with steering and motion fields, heartbeat `B`.
    Type2,
    /// 344-byte packet with energy recovery, heartbeat `~`.
    Type3,
}

impl PacketType {
    /// The single heartbeat byte that requests this layout.
    pub const fn heartbeat(self) -> u8 {
        match self {
            PacketType::Type1 => b'A',
            PacketType::Type2 => b'B',
            PacketType::Type3 => b'~',
        }
    }

    /// Size of a datagram of this layout.
    pub const fn size(self) -> usize {
        match self {
            PacketType::Type1 => MIN_PACKET_SIZE,
            PacketType::Type2 => PACKET_SIZE_TYPE2,
            PacketType::Type3 => PACKET_SIZE_TYPE3,
        }
    }

    /// Constant XORed into the embedded IV to form the nonce.
    pub const fn xor_key(self) -> u32 {
        match self {
            PacketType::Type1 => 0xDEAD_BEAF,
            PacketType::Type2 => 0xDEAD_BEEF,
            PacketType::Type3 => 0x55FA_BB4F,
        }
    }

    /// Infer the layout from a received datagram length.
    ///
    /// Unknown lengths of at least [`MIN_PACKET_SIZE`] are treated as the
    /// largest known layout that fits.
    pub fn from_len(len: usize) -> Option<Self> {
        match len {
            l if l >= PACKET_SIZE_TYPE3 => Some(PacketType::Type3),
            l if l >= PACKET_SIZE_TYPE2 => Some(PacketType::Type2),
            l if l >= MIN_PACKET_SIZE => Some(PacketType::Type1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_type_from_len() {
        assert_eq!(PacketType::from_len(0), None);
        assert_eq!(PacketType::from_len(MIN_PACKET_SIZE - 1), None);
        assert_eq!(PacketType::from_len(MIN_PACKET_SIZE), Some(PacketType::Type1));
        assert_eq!(PacketType::from_len(PACKET_SIZE_TYPE2), Some(PacketType::Type2));
        assert_eq!(PacketType::from_len(PACKET_SIZE_TYPE3), Some(PacketType::Type3));
        assert_eq!(PacketType::from_len(1500), Some(PacketType::Type3));
    }

    #[test]
    fn heartbeat_bytes_are_distinct() {
        let bytes = [
            PacketType::Type1.heartbeat(),
            PacketType::Type2.heartbeat(),
            PacketType::Type3.heartbeat(),
        ];
        assert_eq!(bytes, [b'A', b'B', b'~']);
    }
}
