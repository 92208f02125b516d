//! # Packet Serialization
//!
//! Little-endian encoding of batches and commands.
//!
//! ## Design
//!
//! - One reusable buffer per loop (no allocation once warmed up)
//! - A hard byte limit: a batch that would exceed it is refused, never split
//! - Decoding is all-or-nothing; a malformed batch yields no records

use tessera_shared::{Quaternion, Transform, Vec3};

use super::packets::{Command, Packet, PacketType, TransformRecord};
use super::{batch_size, BATCH_HEADER_SIZE, COMMAND_WITH_ID_SIZE, RECORD_SIZE};
use crate::error::WireError;
use crate::world::NetId;

/// Packet serializer - writes packets into a reusable buffer.
///
/// This struct is designed to be reused across ticks to avoid allocations.
pub struct PacketSerializer {
    buffer: Vec<u8>,
    limit: usize,
}

impl PacketSerializer {
    /// Creates a serializer that never produces more than `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::new(),
            limit,
        }
    }

    /// Byte limit.
    #[inline]
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Resets the serializer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> bool {
        self.write_bytes(&[value])
    }

    /// Writes an i32 in little-endian format.
    #[inline]
    pub fn write_i32(&mut self, value: i32) -> bool {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> bool {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.buffer.len() + bytes.len() > self.limit {
            return false;
        }
        self.buffer.extend_from_slice(bytes);
        true
    }

    /// Writes one 44-byte record.
    pub fn write_record(&mut self, record: &TransformRecord) -> bool {
        let Transform {
            position,
            rotation,
            scale,
        } = record.transform;

        self.write_i32(record.id)
            && self.write_f32(position.x)
            && self.write_f32(position.y)
            && self.write_f32(position.z)
            && self.write_f32(rotation.x)
            && self.write_f32(rotation.y)
            && self.write_f32(rotation.z)
            && self.write_f32(rotation.w)
            && self.write_f32(scale.x)
            && self.write_f32(scale.y)
            && self.write_f32(scale.z)
    }

    /// Serializes a full transform batch.
    ///
    /// Returns `false` and leaves the buffer empty when the batch would not
    /// fit in the byte limit.
    pub fn serialize_batch(&mut self, records: &[TransformRecord]) -> bool {
        self.reset();

        let Ok(count) = i32::try_from(records.len()) else {
            return false;
        };
        if batch_size(records.len()) > self.limit {
            return false;
        }

        self.buffer.reserve(batch_size(records.len()));
        let ok = self.write_u8(PacketType::Batch as u8)
            && self.write_i32(count)
            && records.iter().all(|record| self.write_record(record));

        if !ok {
            self.reset();
        }
        ok
    }

    /// Serializes a control command.
    pub fn serialize_command(&mut self, command: Command) -> bool {
        self.reset();
        let tagged = self.write_u8(command.packet_type() as u8);
        match command.entity() {
            Some(id) => tagged && self.write_i32(id.0),
            None => tagged,
        }
    }

    /// Serializes any packet.
    pub fn serialize(&mut self, packet: &Packet) -> bool {
        match packet {
            Packet::Batch(records) => self.serialize_batch(records),
            Packet::Command(command) => self.serialize_command(*command),
        }
    }
}

/// Packet deserializer - reads packets from a buffer.
pub struct PacketDeserializer<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> PacketDeserializer<'a> {
    /// Creates a new deserializer from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        let value = *self.buffer.get(self.position)?;
        self.position += 1;
        Some(value)
    }

    #[inline]
    fn read_array(&mut self) -> Option<[u8; 4]> {
        let bytes = self.buffer.get(self.position..self.position + 4)?;
        self.position += 4;
        let mut out = [0u8; 4];
        out.copy_from_slice(bytes);
        Some(out)
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    fn read_vec3(&mut self) -> Option<Vec3> {
        Some(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Reads one 44-byte record.
    pub fn read_record(&mut self) -> Option<TransformRecord> {
        let id = self.read_i32()?;
        let position = self.read_vec3()?;
        let rotation = Quaternion::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        );
        let scale = self.read_vec3()?;
        Some(TransformRecord {
            id,
            transform: Transform::new(position, rotation, scale),
        })
    }

    /// Deserializes a whole datagram.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the datagram is empty, carries an unknown
    /// tag, or its length does not match exactly what its header implies.
    pub fn deserialize(&mut self) -> Result<Packet, WireError> {
        let tag = self.read_u8().ok_or(WireError::Empty)?;
        let kind = PacketType::from_u8(tag).ok_or(WireError::UnknownPacketType(tag))?;
        let actual = self.buffer.len();

        match kind {
            PacketType::Batch => {
                let count = self.read_i32().ok_or(WireError::Truncated {
                    expected: BATCH_HEADER_SIZE,
                    actual,
                })?;
                let count = usize::try_from(count).map_err(|_| WireError::NegativeCount(count))?;
                let expected = BATCH_HEADER_SIZE + count.saturating_mul(RECORD_SIZE);
                exact_length(expected, actual)?;

                let mut records = Vec::with_capacity(count);
                for _ in 0..count {
                    let record = self
                        .read_record()
                        .ok_or(WireError::Truncated { expected, actual })?;
                    records.push(record);
                }
                Ok(Packet::Batch(records))
            }
            PacketType::RequestId => {
                exact_length(1, actual)?;
                Ok(Packet::Command(Command::RequestId))
            }
            _ => {
                exact_length(COMMAND_WITH_ID_SIZE, actual)?;
                let id = self.read_i32().ok_or(WireError::Truncated {
                    expected: COMMAND_WITH_ID_SIZE,
                    actual,
                })?;
                Command::from_parts(kind, NetId(id))
                    .map(Packet::Command)
                    .ok_or(WireError::UnknownPacketType(tag))
            }
        }
    }
}

fn exact_length(expected: usize, actual: usize) -> Result<(), WireError> {
    match actual.cmp(&expected) {
        std::cmp::Ordering::Less => Err(WireError::Truncated { expected, actual }),
        std::cmp::Ordering::Greater => Err(WireError::TrailingBytes { expected, actual }),
        std::cmp::Ordering::Equal => Ok(()),
    }
}

/// Encodes a batch into a fresh buffer, or `None` if it exceeds `limit`.
#[must_use]
pub fn encode_batch(records: &[TransformRecord], limit: usize) -> Option<Vec<u8>> {
    let mut serializer = PacketSerializer::new(limit);
    serializer
        .serialize_batch(records)
        .then(|| serializer.as_slice().to_vec())
}

/// Encodes a command into a fresh buffer.
#[must_use]
pub fn encode_command(command: Command) -> Vec<u8> {
    let mut serializer = PacketSerializer::new(COMMAND_WITH_ID_SIZE);
    let written = serializer.serialize_command(command);
    debug_assert!(written);
    serializer.as_slice().to_vec()
}

/// Decodes one datagram.
///
/// # Errors
///
/// See [`PacketDeserializer::deserialize`].
pub fn decode(bytes: &[u8]) -> Result<Packet, WireError> {
    PacketDeserializer::new(bytes).deserialize()
}
