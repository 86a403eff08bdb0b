//! Per-connection session state.

use crate::protocol::{Actor, EndpointId, ADDRESS_SIZE, UNDEFINED};
use crate::queue::MessageQueue;
use crate::time::Heartbeat;

/// One side of a datagram flow: an endpoint id plus the transport
/// address it resolves to.
///
/// The id is an opaque handle into the external endpoint table; the
/// resolution flags tell the transport which half it still has to
/// fill in.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub id: EndpointId,
    pub id_resolved: bool,
    pub address_resolved: bool,
    pub address_size: usize,
    pub address_data: [u8; ADDRESS_SIZE],
}

impl Endpoint {
    pub fn unresolved() -> Endpoint {
        Endpoint {
            id: UNDEFINED,
            id_resolved: false,
            address_resolved: false,
            address_size: 0,
            address_data: [0; ADDRESS_SIZE],
        }
    }

    pub fn with_id(id: EndpointId) -> Endpoint {
        Endpoint {
            id,
            id_resolved: true,
            ..Endpoint::unresolved()
        }
    }

    #[inline]
    pub fn address(&self) -> &[u8] {
        &self.address_data[..self.address_size]
    }

    pub fn set_address(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= ADDRESS_SIZE);
        let size = bytes.len().min(ADDRESS_SIZE);
        self.address_data[..size].copy_from_slice(&bytes[..size]);
        self.address_size = size;
        self.address_resolved = true;
    }

    #[inline]
    pub fn has_address(&self) -> bool {
        self.address_size > 0
    }
}

impl Default for Endpoint {
    fn default() -> Endpoint {
        Endpoint::unresolved()
    }
}

/// Connection state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// No peer bound.
    Empty,
    /// The host observed a new client and owes it a response.
    SessionRequest,
    /// Data flow active.
    Ready,
}

/// Per-connection container: endpoint pair, state machine, staging
/// queue and outbound cursor.
///
/// On the host, `queue` stages a client's not-yet-merged messages and
/// `in_index` tracks how far they have been merged into the mutual
/// queue. On a client, slot 0's `queue` holds locally originated
/// messages and `out_index` tracks how far they have been sent.
#[derive(Debug)]
pub struct Slot {
    pub state: SlotState,
    pub local: Endpoint,
    pub remote: Endpoint,
    pub queue: MessageQueue,
    pub actor: Actor,
    pub in_index: i64,
    pub out_index: i64,
    pub heartbeat: Heartbeat,
}

impl Slot {
    /// A fresh slot bound to a local endpoint id.
    pub fn opened(local_id: EndpointId) -> Slot {
        Slot {
            state: SlotState::Empty,
            local: Endpoint::with_id(local_id),
            remote: Endpoint::unresolved(),
            queue: MessageQueue::new(),
            actor: UNDEFINED,
            in_index: 0,
            out_index: 0,
            heartbeat: Heartbeat::new(),
        }
    }

    /// A slot is free while no remote endpoint claimed it.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.remote.id == UNDEFINED
    }

    /// A host slot can accept a new client once the owner filled in
    /// the session address it should hand out.
    #[inline]
    pub fn can_accept(&self) -> bool {
        self.is_free() && self.local.has_address()
    }
}
