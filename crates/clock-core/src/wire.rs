//! Wire codec for the clock synchronization record (C1).
//!
//! Fixed 22-byte little-endian layout: `clock_id(4) | server_ts(8) | client_ts(8) | checksum(2)`.
//! Integer fields are normalized to little-endian on the wire regardless of host
//! architecture, so two peers on different architectures still interoperate.

use std::time::{SystemTime, UNIX_EPOCH};

/// Size in bytes of an encoded [`SyncRecord`] on the wire.
pub const RECORD_SIZE: usize = 4 + 8 + 8 + 2;

/// The four-field synchronization datagram exchanged by server and client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncRecord {
    /// Emitting server's clock id in a broadcast; replying client's id in a reply.
    pub clock_id: u32,
    /// Microseconds since epoch when the server built the broadcast. Echoed in replies.
    pub server_ts: u64,
    /// Zero in a broadcast; the client's arrival timestamp (µs) in a reply.
    pub client_ts: u64,
    pub checksum: u16,
}

impl SyncRecord {
    /// Builds a record with `checksum` computed over the other three fields.
    pub fn new(clock_id: u32, server_ts: u64, client_ts: u64) -> Self {
        let mut rec = Self { clock_id, server_ts, client_ts, checksum: 0 };
        rec.checksum = rec.compute_checksum();
        rec
    }

    /// Sum-of-bytes checksum over `clock_id`, `server_ts`, `client_ts`.
    ///
    /// A field that is exactly zero contributes 0 (a reproduced bit-compatibility
    /// quirk of the original implementation — in practice a no-op, since a zero
    /// field's bytes already sum to zero mod 2^16).
    pub fn compute_checksum(&self) -> u16 {
        let mut sum: u16 = 0;
        if self.clock_id != 0 {
            for b in self.clock_id.to_le_bytes() {
                sum = sum.wrapping_add(b as u16);
            }
        }
        if self.server_ts != 0 {
            for b in self.server_ts.to_le_bytes() {
                sum = sum.wrapping_add(b as u16);
            }
        }
        if self.client_ts != 0 {
            for b in self.client_ts.to_le_bytes() {
                sum = sum.wrapping_add(b as u16);
            }
        }
        sum
    }

    /// `true` iff the stored checksum matches a fresh recomputation.
    pub fn is_valid(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.clock_id.to_le_bytes());
        buf[4..12].copy_from_slice(&self.server_ts.to_le_bytes());
        buf[12..20].copy_from_slice(&self.client_ts.to_le_bytes());
        buf[20..22].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decodes a record from a datagram payload. Returns `None` if `buf`'s length
    /// doesn't exactly match [`RECORD_SIZE`] (§4.1 wire-size rejection).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() != RECORD_SIZE {
            return None;
        }
        let clock_id = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let server_ts = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        let client_ts = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        let checksum = u16::from_le_bytes(buf[20..22].try_into().unwrap());
        Some(Self { clock_id, server_ts, client_ts, checksum })
    }

    /// Renders all four fields in hexadecimal, for `diag`-gated tracing events.
    pub fn to_hex(&self) -> String {
        format!(
            "clock_id=0x{:08x} server_ts=0x{:016x} client_ts=0x{:016x} checksum=0x{:04x}",
            self.clock_id, self.server_ts, self.client_ts, self.checksum
        )
    }
}

/// Current microseconds since the Unix epoch, read from the system wall clock.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn encode_decode_round_trip() {
        let rec = SyncRecord::new(42, 1_700_000_000_000_000, 0);
        let encoded = rec.encode();
        let decoded = SyncRecord::decode(&encoded).unwrap();
        assert_eq!(rec, decoded);
        assert!(decoded.is_valid());
    }

    #[test]
    fn all_zero_fields_yield_zero_checksum() {
        let rec = SyncRecord::new(0, 0, 0);
        assert_eq!(rec.checksum, 0);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let rec = SyncRecord::new(7, 123, 456);
        let mut encoded = rec.encode().to_vec();
        encoded.push(0);
        assert!(SyncRecord::decode(&encoded).is_none());
        encoded.pop();
        encoded.pop();
        assert!(SyncRecord::decode(&encoded).is_none());
    }

    #[test]
    fn single_bit_flip_is_detected_at_least_99_percent_of_the_time() {
        let rec = SyncRecord::new(99, 1_700_000_000_000_001, 1_700_000_000_000_123);
        let base = rec.encode();
        let mut rng = rand::thread_rng();
        let trials = 10_000;
        let mut detected = 0;

        for _ in 0..trials {
            let mut mutated = base;
            let byte_idx = rng.gen_range(0..RECORD_SIZE);
            let bit_idx = rng.gen_range(0..8u8);
            mutated[byte_idx] ^= 1 << bit_idx;

            match SyncRecord::decode(&mutated) {
                Some(decoded) if decoded == rec => {
                    // Flipping a bit never leaves the record identical with this
                    // fixed-width layout; this arm should be unreachable.
                    detected += 1;
                }
                Some(decoded) => {
                    if !decoded.is_valid() {
                        detected += 1;
                    }
                }
                None => detected += 1,
            }
        }

        let rate = detected as f64 / trials as f64;
        assert!(rate >= 0.99, "detection rate {} below 99%", rate);
    }

    #[test]
    fn reply_echoes_server_ts_and_carries_client_id() {
        let broadcast = SyncRecord::new(42, now_micros(), 0);
        let reply = SyncRecord::new(7, broadcast.server_ts, now_micros());
        assert_eq!(reply.server_ts, broadcast.server_ts);
        assert_eq!(reply.clock_id, 7);
        assert!(reply.client_ts >= broadcast.server_ts);
    }
}
