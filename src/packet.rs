//! Packing message chunks into transport packets.

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::ErrorSet;
use crate::grow;
use crate::protocol::{
    EndpointId, PacketMode, MAX_PACKET_CHUNK, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE,
    PACKET_MODE_OFFSET, PACKET_SIZE, PACKET_SIZE_OFFSET,
};
use crate::wire;

/// One transport datagram.
///
/// `source_id` and `destination_id` are opaque handles into the
/// external endpoint table; `size` is the number of bytes of `data`
/// actually used. The session and index header fields are reserved
/// and stay zero.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub source_id: EndpointId,
    pub destination_id: EndpointId,
    pub size: usize,
    pub data: [u8; PACKET_SIZE],
}

impl Packet {
    pub fn new(source_id: EndpointId, destination_id: EndpointId) -> Packet {
        Packet {
            source_id,
            destination_id,
            size: 0,
            data: [0; PACKET_SIZE],
        }
    }

    /// Packet-level encryption mode byte.
    #[inline]
    pub fn mode(&self) -> u8 {
        self.data[PACKET_MODE_OFFSET]
    }

    /// Finalizes the header once the chunk run is complete.
    fn finalize(&mut self, used: usize) {
        debug_assert!(used <= PACKET_SIZE);
        self.size = used;
        self.data[PACKET_MODE_OFFSET] = PacketMode::Plain as u8;
        LittleEndian::write_u16(&mut self.data[PACKET_SIZE_OFFSET..], used as u16);
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("source_id", &self.source_id)
            .field("destination_id", &self.destination_id)
            .field("size", &self.size)
            .finish()
    }
}

/// Packs an ordered list of pre-serialized message chunks into as few
/// packets as possible, filling greedily in chunk order.
///
/// Every chunk's length must match the size field inside its header.
/// An empty chunk list still produces exactly one zero-payload packet,
/// so the transport always sees outbound traffic.
pub fn pack(
    source_id: EndpointId,
    destination_id: EndpointId,
    chunks: &[Vec<u8>],
) -> Result<Vec<Packet>, ErrorSet> {
    debug_assert!(source_id != destination_id);

    let mut packets: Vec<Packet> = Vec::new();
    let mut offset = PACKET_SIZE;

    for chunk in chunks {
        if chunk.len() < MESSAGE_HEADER_SIZE || chunk.len() > MAX_PACKET_CHUNK {
            return Err(ErrorSet::INVALID_MESSAGE_SIZE);
        }
        if wire::read_message_size(chunk) != chunk.len() {
            return Err(ErrorSet::INVALID_MESSAGE_SIZE);
        }

        if offset + chunk.len() > PACKET_SIZE {
            if let Some(last) = packets.last_mut() {
                last.finalize(offset);
            }
            grow::try_push(&mut packets, Packet::new(source_id, destination_id))?;
            offset = PACKET_HEADER_SIZE;
        }

        let current = packets.last_mut().expect("a packet was just started");
        current.data[offset..offset + chunk.len()].copy_from_slice(chunk);
        offset += chunk.len();
    }

    if packets.is_empty() {
        grow::try_push(&mut packets, Packet::new(source_id, destination_id))?;
        offset = 0;
    }

    let last = packets.last_mut().expect("at least one packet exists");
    last.finalize(offset);

    Ok(packets)
}

/// Extracts message chunks from a run of packets.
///
/// Walks each packet from the end of the packet header, reading the
/// size field of every chunk, and stops at the first zero-size chunk
/// or when a chunk would run past the packet buffer. Errors accumulate
/// and processing continues with the next packet where possible.
pub fn unpack(packets: &[Packet]) -> (Vec<Vec<u8>>, ErrorSet) {
    let mut chunks = Vec::new();
    let mut status = ErrorSet::OK;

    for packet in packets {
        if packet.size == 0 {
            continue;
        }
        if packet.size < PACKET_HEADER_SIZE || packet.size > PACKET_SIZE {
            status |= ErrorSet::INVALID_PACKET_SIZE;
            continue;
        }

        let mut offset = PACKET_HEADER_SIZE;
        while offset + MESSAGE_HEADER_SIZE <= packet.size {
            let size = wire::read_message_size(&packet.data[offset..]);
            if size == 0 {
                break;
            }
            if offset + size > PACKET_SIZE {
                status |= ErrorSet::INVALID_MESSAGE_SIZE;
                break;
            }
            let copied = grow::try_copied(&packet.data[offset..offset + size])
                .and_then(|chunk| grow::try_push(&mut chunks, chunk));
            if let Err(error) = copied {
                status |= error;
                break;
            }
            offset += size;
        }
    }

    (chunks, status)
}
