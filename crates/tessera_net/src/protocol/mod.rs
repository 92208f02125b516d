//! # Wire Protocol
//!
//! Every gameplay datagram starts with a one-byte [`PacketType`] tag.
//!
//! ```text
//! Batch:    [0x00][count: i32 LE][record 0: 44 B]...[record n-1: 44 B]
//! Command:  [tag ][id: i32 LE]          (REQUEST_ID has no id)
//!
//! record:   [id i32][pos x y z f32][rot x y z w f32][scale x y z f32]
//! ```
//!
//! All scalars are little-endian. A batch is exactly `5 + 44 * count`
//! bytes; anything else is discarded whole. Commands are matched on their
//! exact length as well, so a truncated or padded datagram never decodes.
//!
//! Discovery runs on its own port and stays ASCII; see [`crate::discovery`].

pub mod packets;
pub mod serialization;

pub use packets::{Command, Packet, PacketType, TransformRecord};
pub use serialization::{PacketDeserializer, PacketSerializer};

/// Size of one transform record on the wire.
pub const RECORD_SIZE: usize = 44;

/// Tag plus record count.
pub const BATCH_HEADER_SIZE: usize = 5;

/// Tag plus entity id.
pub const COMMAND_WITH_ID_SIZE: usize = 5;

/// Largest record count that fits in `max_datagram` bytes.
#[must_use]
pub const fn max_records(max_datagram: usize) -> usize {
    max_datagram.saturating_sub(BATCH_HEADER_SIZE) / RECORD_SIZE
}

/// Encoded size of a batch of `count` records.
#[must_use]
pub const fn batch_size(count: usize) -> usize {
    BATCH_HEADER_SIZE + count * RECORD_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_limit_fits_1488_records() {
        assert_eq!(max_records(65_507), 1488);
        assert!(batch_size(1488) <= 65_507);
        assert!(batch_size(1489) > 65_507);
    }
}
