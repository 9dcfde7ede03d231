//! Salsa20 keystream used by the console to encrypt telemetry datagrams.
//!
//! Each datagram carries a 4-byte IV at [`NONCE_OFFSET`]. The nonce is
//! `iv ^ xor_key` followed by `iv`, both little-endian, and the key is fixed.
//! Decryption has no authentication: the magic marker at offset 0 of the
//! plaintext is the only integrity check.

use crate::protocol::{MAGIC, MIN_PACKET_SIZE, PacketType};
use crate::{Result, TelemetryError};

/// Fixed key: the first 32 bytes of "Simulator Interface Packet GT7 ver 0.0".
pub const KEY: [u8; 32] = *b"Simulator Interface Packet GT7 v";

/// Offset of the per-packet IV in the raw datagram.
pub const NONCE_OFFSET: usize = 0x40;

const BLOCK_LEN: usize = 64;

// "expand 32-byte k"
const SIGMA: [u32; 4] = [0x6170_7865, 0x3320_646e, 0x7962_2d32, 0x6b20_6574];

/// Build the 8-byte nonce from the IV embedded in a raw datagram.
///
/// Returns `None` when the datagram is too short to contain the IV.
pub fn derive_nonce(datagram: &[u8], xor_key: u32) -> Option<[u8; 8]> {
    let iv = datagram.get(NONCE_OFFSET..NONCE_OFFSET + 4)?;
    let iv1 = u32::from_le_bytes([iv[0], iv[1], iv[2], iv[3]]);
    Some(nonce_from_iv(iv1, xor_key))
}

fn nonce_from_iv(iv1: u32, xor_key: u32) -> [u8; 8] {
    let iv2 = iv1 ^ xor_key;
    let mut nonce = [0u8; 8];
    nonce[..4].copy_from_slice(&iv2.to_le_bytes());
    nonce[4..].copy_from_slice(&iv1.to_le_bytes());
    nonce
}

/// Decrypt `ciphertext` with Salsa20/20. Pure function; the block counter
/// starts at zero.
pub fn decrypt(ciphertext: &[u8], key: &[u8; 32], nonce: &[u8; 8]) -> Vec<u8> {
    let mut plaintext = ciphertext.to_vec();
    apply_keystream(&mut plaintext, key, nonce);
    plaintext
}

/// XOR `data` in place with the keystream for `key` and `nonce`.
pub fn apply_keystream(data: &mut [u8], key: &[u8; 32], nonce: &[u8; 8]) {
    for (counter, chunk) in data.chunks_mut(BLOCK_LEN).enumerate() {
        let keystream = keystream_block(key, nonce, counter as u64);
        for (byte, k) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= k;
        }
    }
}

/// Decrypt a received datagram and verify the magic marker.
///
/// The XOR constant is chosen from the datagram length, so a client asking for
/// one layout still decodes the others.
pub fn open_datagram(datagram: &[u8]) -> Result<Vec<u8>> {
    let packet_type = PacketType::from_len(datagram.len()).ok_or_else(|| {
        TelemetryError::parse_error(
            "datagram",
            format!("expected at least {MIN_PACKET_SIZE} bytes, got {}", datagram.len()),
        )
    })?;
    let nonce = derive_nonce(datagram, packet_type.xor_key())
        .ok_or_else(|| TelemetryError::parse_error("datagram", "missing IV"))?;

    let plaintext = decrypt(datagram, &KEY, &nonce);
    let found = u32::from_le_bytes([plaintext[0], plaintext[1], plaintext[2], plaintext[3]]);
    if found != MAGIC {
        return Err(TelemetryError::Decrypt { expected: MAGIC, found });
    }
    Ok(plaintext)
}

/// Encrypt a plaintext packet the way the console does and embed `iv`.
///
/// The IV bytes replace ciphertext at [`NONCE_OFFSET`], so the plaintext
/// content at that offset does not survive a round trip.
pub fn seal_datagram(plaintext: &[u8], iv: u32, packet_type: PacketType) -> Vec<u8> {
    let nonce = nonce_from_iv(iv, packet_type.xor_key());
    let mut datagram = plaintext.to_vec();
    apply_keystream(&mut datagram, &KEY, &nonce);
    if let Some(slot) = datagram.get_mut(NONCE_OFFSET..NONCE_OFFSET + 4) {
        slot.copy_from_slice(&iv.to_le_bytes());
    }
    datagram
}

/// One 64-byte Salsa20/20 keystream block.
fn keystream_block(key: &[u8; 32], nonce: &[u8; 8], counter: u64) -> [u8; BLOCK_LEN] {
    let word = |bytes: &[u8], i: usize| {
        u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
    };

    let state: [u32; 16] = [
        SIGMA[0],
        word(key, 0),
        word(key, 4),
        word(key, 8),
        word(key, 12),
        SIGMA[1],
        word(nonce, 0),
        word(nonce, 4),
        counter as u32,
        (counter >> 32) as u32,
        SIGMA[2],
        word(key, 16),
        word(key, 20),
        word(key, 24),
        word(key, 28),
        SIGMA[3],
    ];

    let mut x = state;
    for _ in 0..10 {
        // columns
        quarter_round(&mut x, 0, 4, 8, 12);
        quarter_round(&mut x, 5, 9, 13, 1);
        quarter_round(&mut x, 10, 14, 2, 6);
        quarter_round(&mut x, 15, 3, 7, 11);
        // rows
        quarter_round(&mut x, 0, 1, 2, 3);
        quarter_round(&mut x, 5, 6, 7, 4);
        quarter_round(&mut x, 10, 11, 8, 9);
        quarter_round(&mut x, 15, 12, 13, 14);
    }

    let mut out = [0u8; BLOCK_LEN];
    for (i, (w, s)) in x.iter().zip(state.iter()).enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&w.wrapping_add(*s).to_le_bytes());
    }
    out
}

#[inline]
fn quarter_round(s: &mut [u32; 16], a: usize, b: usize, c: usize, d: usize) {
    s[b] ^= s[a].wrapping_add(s[d]).rotate_left(7);
    s[c] ^= s[b].wrapping_add(s[a]).rotate_left(9);
    s[d] ^= s[c].wrapping_add(s[b]).rotate_left(13);
    s[a] ^= s[d].wrapping_add(s[c]).rotate_left(18);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plaintext_with_magic(len: usize) -> Vec<u8> {
        let mut buf: Vec<u8> = (0..len).map(|i| (i * 7 % 251) as u8).collect();
        buf[..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf
    }

    // eSTREAM Salsa20/20, 256-bit key, set 1 vector 0.
    #[test]
    fn keystream_matches_reference_vector() {
        let mut key = [0u8; 32];
        key[0] = 0x80;
        let nonce = [0u8; 8];
        let expected: [u8; 64] = [
            0xe3, 0xbe, 0x8f, 0xdd, 0x8b, 0xec, 0xa2, 0xe3, 0xea, 0x8e, 0xf9, 0x47, 0x5b, 0x29,
            0xa6, 0xe7, 0x00, 0x39, 0x51, 0xe1, 0x09, 0x7a, 0x5c, 0x38, 0xd2, 0x3b, 0x7a, 0x5f,
            0xad, 0x9f, 0x68, 0x44, 0xb2, 0x2c, 0x97, 0x55, 0x9e, 0x27, 0x23, 0xc7, 0xcb, 0xbd,
            0x3f, 0xe4, 0xfc, 0x8d, 0x9a, 0x07, 0x44, 0x65, 0x2a, 0x83, 0xe7, 0x2a, 0x9c, 0x46,
            0x18, 0x76, 0xaf, 0x4d, 0x7e, 0xf1, 0xa1, 0x17,
        ];

        let plaintext = decrypt(&[0u8; 64], &key, &nonce);
        assert_eq!(plaintext, expected.to_vec());
    }

    #[test]
    fn counter_advances_across_blocks() {
        let zeros = [0u8; 128];
        let stream = decrypt(&zeros, &KEY, &[0u8; 8]);
        assert_ne!(stream[..64], stream[64..]);
        assert_eq!(stream[64..].to_vec(), keystream_block(&KEY, &[0u8; 8], 1).to_vec());
    }

    #[test]
    fn nonce_is_xored_iv_then_iv() {
        let mut datagram = vec![0u8; MIN_PACKET_SIZE];
        datagram[NONCE_OFFSET..NONCE_OFFSET + 4].copy_from_slice(&0x1234_5678u32.to_le_bytes());

        let nonce = derive_nonce(&datagram, 0xDEAD_BEAF).expect("nonce");
        assert_eq!(nonce[..4], (0x1234_5678u32 ^ 0xDEAD_BEAF).to_le_bytes());
        assert_eq!(nonce[4..], 0x1234_5678u32.to_le_bytes());
        assert!(derive_nonce(&datagram[..NONCE_OFFSET + 3], 0).is_none());
    }

    #[test]
    fn sealed_datagram_opens_to_original_plaintext() {
        for packet_type in [PacketType::Type1, PacketType::Type2, PacketType::Type3] {
            let plaintext = plaintext_with_magic(packet_type.size());
            let datagram = seal_datagram(&plaintext, 0xCAFE_F00D, packet_type);
            assert_ne!(datagram, plaintext);

            let opened = open_datagram(&datagram).expect("datagram should open");
            assert_eq!(opened[..NONCE_OFFSET], plaintext[..NONCE_OFFSET]);
            assert_eq!(opened[NONCE_OFFSET + 4..], plaintext[NONCE_OFFSET + 4..]);
        }
    }

    #[test]
    fn wrong_nonce_fails_magic_check() {
        let plaintext = plaintext_with_magic(MIN_PACKET_SIZE);
        let mut datagram = seal_datagram(&plaintext, 42, PacketType::Type1);
        datagram[NONCE_OFFSET] ^= 0x01;

        match open_datagram(&datagram) {
            Err(TelemetryError::Decrypt { expected, found }) => {
                assert_eq!(expected, MAGIC);
                assert_ne!(found, MAGIC);
            }
            other => panic!("expected Decrypt error, got {other:?}"),
        }
    }

    #[test]
    fn short_datagram_is_rejected() {
        let result = open_datagram(&[0u8; MIN_PACKET_SIZE - 1]);
        assert!(matches!(result, Err(TelemetryError::Parse { .. })));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_datagrams_never_panic(
            data in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            let _ = open_datagram(&data);
        }

        #[test]
        fn prop_keystream_is_an_involution(
            data in proptest::collection::vec(any::<u8>(), 0..300),
            nonce in any::<[u8; 8]>(),
        ) {
            let once = decrypt(&data, &KEY, &nonce);
            let twice = decrypt(&once, &KEY, &nonce);
            prop_assert_eq!(twice, data);
        }
    }
}
