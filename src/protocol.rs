//! Protocol constants and wire-level enumerations.
//!
//! All multi-byte integers on the wire are little-endian. A packet is a
//! fixed 400-byte datagram payload holding a 15-byte header followed by
//! a run of message chunks; the first zero-size chunk terminates the
//! run. A message chunk is a 30-byte header followed by its payload.

/// Session time in milliseconds.
pub type Time = i64;
/// Originator identity: 0 is the host, positive values are client slot
/// indices, [`UNDEFINED`] is unassigned.
pub type Actor = i64;
/// Opaque handle into the external endpoint table.
pub type EndpointId = i64;

/// Sentinel for unset ids, indices and actors.
pub const UNDEFINED: i64 = -1;

/// Size of one datagram payload.
pub const PACKET_SIZE: usize = 400;

/// Upper bound of a stored endpoint address, enough for IPv4 and IPv6
/// addresses with ports.
pub const ADDRESS_SIZE: usize = 64;

/// Packet header field offsets. The session and index fields are
/// reserved and written as zero.
pub const PACKET_SESSION_OFFSET: usize = 0; // 4 bytes
pub const PACKET_INDEX_OFFSET: usize = 4; // 8 bytes
pub const PACKET_MODE_OFFSET: usize = 12; // 1 byte
pub const PACKET_SIZE_OFFSET: usize = 13; // 2 bytes
pub const PACKET_HEADER_SIZE: usize = 15;

/// Message header field offsets. The size field is 10 bits split
/// across the two bytes at offsets 8 and 9; the upper 6 bits of the
/// byte at offset 9 hold the message mode.
pub const MESSAGE_CHECKSUM_OFFSET: usize = 0; // 8 bytes
pub const MESSAGE_SIZE_OFFSET: usize = 8; // 1 byte
pub const MESSAGE_SIZE_MODE_OFFSET: usize = 9; // 1 byte
pub const MESSAGE_INDEX_OFFSET: usize = 10; // 8 bytes
pub const MESSAGE_TIME_OFFSET: usize = 18; // 8 bytes
pub const MESSAGE_ACTOR_OFFSET: usize = 26; // 4 bytes
pub const MESSAGE_HEADER_SIZE: usize = 30;

/// Largest chunk that fits in a packet next to the packet header.
pub const MAX_PACKET_CHUNK: usize = PACKET_SIZE - PACKET_HEADER_SIZE;

/// Largest message payload. The 10-bit size field additionally caps a
/// message at 1023 bytes; this limit always binds first.
pub const MAX_MESSAGE_DATA: usize = MAX_PACKET_CHUNK - MESSAGE_HEADER_SIZE;

/// Number of recent messages re-sent with every outbound batch.
pub const TRAIL_SERIAL_SIZE: i64 = 5;
/// Number of randomly sampled older messages re-sent with every
/// outbound batch.
pub const TRAIL_SCATTER_SIZE: i64 = 5;
/// Maximum distance of randomly sampled older messages.
pub const TRAIL_SCATTER_DISTANCE: i64 = 100;
/// Upper bound of trail picks per batch.
pub const TRAIL_MAX: usize = (TRAIL_SERIAL_SIZE + TRAIL_SCATTER_SIZE) as usize;

/// A peer sends a heartbeat if nothing was transmitted for this long.
pub const HEARTBEAT_TIMEOUT: Time = 10;
/// Declared ping interval. No state transition drives it yet.
pub const PING_TIMEOUT: Time = 200;
/// Declared connection-loss interval. No state transition drives it
/// yet.
pub const CONNECTION_TIMEOUT: Time = 2000;

/// Seed of the session PRNG used for trail selection.
pub const MT64_SEED: u64 = 12345;

/// Packet-level encryption mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketMode {
    Plain = 0,
    /// Declared; the core never emits encrypted packets.
    Mt64 = 1,
}

/// Message mode stored in the upper 6 bits of header byte 9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageMode {
    Service = 0,
    Application = 1,
}

impl MessageMode {
    #[inline]
    pub fn from_u8(value: u8) -> Option<MessageMode> {
        match value {
            0 => Some(MessageMode::Service),
            1 => Some(MessageMode::Application),
            _ => None,
        }
    }
}

/// Service-level message ids, carried in the first payload byte of a
/// service message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceId {
    Heartbeat = 1,
    Ping = 2,
    Pong = 3,
    SessionRequest = 4,
    SessionResponse = 5,
    SessionResume = 6,
}

impl ServiceId {
    #[inline]
    pub fn from_u8(value: u8) -> Option<ServiceId> {
        match value {
            1 => Some(ServiceId::Heartbeat),
            2 => Some(ServiceId::Ping),
            3 => Some(ServiceId::Pong),
            4 => Some(ServiceId::SessionRequest),
            5 => Some(ServiceId::SessionResponse),
            6 => Some(ServiceId::SessionResume),
            _ => None,
        }
    }
}
