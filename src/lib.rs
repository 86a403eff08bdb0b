//! # relay-session
//!
//! A reliable, ordered, multi-actor messaging session layer built on
//! top of a lossy datagram carrier.
//!
//! A single **host** mediates a session shared with any number of
//! **clients**. Every peer observes the same ordered *mutual queue* of
//! application messages; clients originate messages too, and the host
//! stamps them with authoritative time and actor metadata before
//! fanning them out.
//!
//! ## Architecture
//!
//! - **Reliability**: redundant delivery instead of acknowledgements —
//!   every outbound batch carries a trail of recent and randomly
//!   sampled older messages, and receivers deduplicate by message
//!   index.
//! - **Ordering**: the host is authoritative; once it commits a
//!   message at an index, every client observes the same bytes there.
//! - **Scheduling**: a sans-I/O, tick-driven protocol machine. The
//!   owner feeds received packets to [`Peer::input`], calls
//!   [`Peer::tick`] with the elapsed time, and transmits the returned
//!   packets.
//! - **Serialization**: a fixed-offset little-endian wire layout with
//!   400-byte packets.
//!
//! The datagram sockets, the packet cipher and the checksum primitive
//! live outside this crate; packets address abstract endpoint ids that
//! the owner maps to real sockets.

pub mod error;
mod grow;
pub mod packet;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod slot;
pub mod time;
pub mod trail;
pub mod wire;

pub use error::ErrorSet;
pub use packet::Packet;
pub use queue::{Entry, MessageQueue};
pub use session::{Mode, Peer, TickResult};
pub use slot::{Endpoint, Slot, SlotState};
