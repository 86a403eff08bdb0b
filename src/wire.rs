//! Little-endian message header codec.
//!
//! Reads and writes are pure and operate on fixed offsets within a
//! chunk buffer; see [`crate::protocol`] for the layout.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ErrorSet;
use crate::grow;
use crate::protocol::{
    Actor, Time, MAX_MESSAGE_DATA, MESSAGE_ACTOR_OFFSET, MESSAGE_CHECKSUM_OFFSET,
    MESSAGE_HEADER_SIZE, MESSAGE_INDEX_OFFSET, MESSAGE_SIZE_MODE_OFFSET, MESSAGE_SIZE_OFFSET,
    MESSAGE_TIME_OFFSET,
};

/// Reads the 10-bit total message size from a chunk header.
#[inline]
pub fn read_message_size(chunk: &[u8]) -> usize {
    let low = chunk[MESSAGE_SIZE_OFFSET] as usize;
    let high = (chunk[MESSAGE_SIZE_MODE_OFFSET] & 0x03) as usize;
    low | (high << 8)
}

/// Writes the 10-bit total message size, preserving the mode bits.
#[inline]
pub fn write_message_size(chunk: &mut [u8], size: usize) {
    debug_assert!(size < 1024);
    chunk[MESSAGE_SIZE_OFFSET] = (size & 0xff) as u8;
    chunk[MESSAGE_SIZE_MODE_OFFSET] =
        (chunk[MESSAGE_SIZE_MODE_OFFSET] & !0x03) | ((size >> 8) as u8 & 0x03);
}

/// Reads the 6-bit message mode from a chunk header.
#[inline]
pub fn read_message_mode(chunk: &[u8]) -> u8 {
    chunk[MESSAGE_SIZE_MODE_OFFSET] >> 2
}

/// Writes the 6-bit message mode, preserving the size bits.
#[inline]
pub fn write_message_mode(chunk: &mut [u8], mode: u8) {
    debug_assert!(mode < 4);
    chunk[MESSAGE_SIZE_MODE_OFFSET] = (chunk[MESSAGE_SIZE_MODE_OFFSET] & 0x03) | (mode << 2);
}

/// Decoded fixed fields of a message chunk.
///
/// `size` is the total chunk size including the header. The checksum
/// is carried but not verified; writers set it to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub checksum: u64,
    pub size: usize,
    pub mode: u8,
    pub index: i64,
    pub time: Time,
    pub actor: Actor,
}

impl MessageHeader {
    /// Decodes the header fields. The chunk must hold at least
    /// [`MESSAGE_HEADER_SIZE`] bytes.
    pub fn read(chunk: &[u8]) -> MessageHeader {
        debug_assert!(chunk.len() >= MESSAGE_HEADER_SIZE);
        MessageHeader {
            checksum: LittleEndian::read_u64(&chunk[MESSAGE_CHECKSUM_OFFSET..]),
            size: read_message_size(chunk),
            mode: read_message_mode(chunk),
            index: LittleEndian::read_i64(&chunk[MESSAGE_INDEX_OFFSET..]),
            time: LittleEndian::read_i64(&chunk[MESSAGE_TIME_OFFSET..]),
            actor: LittleEndian::read_i32(&chunk[MESSAGE_ACTOR_OFFSET..]) as Actor,
        }
    }

    /// Encodes the header fields into the chunk prefix.
    pub fn write(&self, chunk: &mut [u8]) {
        debug_assert!(chunk.len() >= MESSAGE_HEADER_SIZE);
        debug_assert!(self.size < 1024);
        debug_assert!(self.actor >= i32::MIN as i64 && self.actor <= i32::MAX as i64);
        LittleEndian::write_u64(&mut chunk[MESSAGE_CHECKSUM_OFFSET..], self.checksum);
        write_message_size(chunk, self.size);
        write_message_mode(chunk, self.mode);
        LittleEndian::write_i64(&mut chunk[MESSAGE_INDEX_OFFSET..], self.index);
        LittleEndian::write_i64(&mut chunk[MESSAGE_TIME_OFFSET..], self.time);
        LittleEndian::write_i32(&mut chunk[MESSAGE_ACTOR_OFFSET..], self.actor as i32);
    }

    /// Payload length implied by the size field.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.size - MESSAGE_HEADER_SIZE
    }
}

/// Serializes a complete message chunk: header plus payload.
pub fn encode_message(
    mode: u8,
    index: i64,
    time: Time,
    actor: Actor,
    data: &[u8],
) -> Result<Vec<u8>, ErrorSet> {
    debug_assert!(data.len() <= MAX_MESSAGE_DATA);
    let mut chunk = grow::try_zeroed(MESSAGE_HEADER_SIZE + data.len())?;
    let header = MessageHeader {
        checksum: 0,
        size: chunk.len(),
        mode,
        index,
        time,
        actor,
    };
    header.write(&mut chunk);
    chunk[MESSAGE_HEADER_SIZE..].copy_from_slice(data);
    Ok(chunk)
}
