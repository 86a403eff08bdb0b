//! The session engine.
//!
//! A [`Peer`] is the session root: it owns the connection slots, the
//! mutual message queue and the session PRNG, and drives the whole
//! protocol from two entry points. [`Peer::input`] digests received
//! packets; [`Peer::tick`] advances session time and emits the packets
//! to transmit. The core performs no I/O and no locking: the owner
//! moves bytes between ticks.
//!
//! One peer per session runs as the [`Mode::Host`]. It stamps every
//! message that enters the mutual queue with authoritative time and
//! actor metadata and fans the queue out to every client, so all
//! clients observe the same ordered log.

use rand_mt::Mt64;
use tracing::{debug, trace, warn};

use crate::error::ErrorSet;
use crate::grow;
use crate::packet::{self, Packet};
use crate::protocol::{
    Actor, EndpointId, MessageMode, ServiceId, Time, MAX_MESSAGE_DATA, MESSAGE_HEADER_SIZE,
    MT64_SEED, UNDEFINED,
};
use crate::queue::MessageQueue;
use crate::slot::{Slot, SlotState};
use crate::time;
use crate::trail;
use crate::wire::{self, MessageHeader};

/// Role of a peer within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Host,
    Client,
}

/// Outcome of a [`Peer::tick`].
///
/// The packets are owned by the caller. Recoverable failures
/// accumulate in `status` while the tick keeps processing the
/// remaining slots, so packets may be present even when the status is
/// not empty.
#[derive(Debug)]
#[must_use]
pub struct TickResult {
    pub packets: Vec<Packet>,
    pub status: ErrorSet,
}

impl TickResult {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_empty()
    }
}

/// A session endpoint: either the host or one client.
pub struct Peer {
    pub mode: Mode,
    pub slots: Vec<Slot>,
    /// The mutual queue: the host-authoritative session-wide message
    /// log. Every client observes a prefix of the host's copy.
    pub queue: MessageQueue,
    /// This peer's identity: 0 for the host, the assigned slot index
    /// for a client, [`UNDEFINED`] before the session response.
    pub actor: Actor,
    queue_index: i64,
    time_local: Time,
    time_mutual: Time,
    rng: Mt64,
}

impl Peer {
    pub fn new(mode: Mode) -> Peer {
        Peer {
            mode,
            slots: Vec::new(),
            queue: MessageQueue::new(),
            actor: match mode {
                Mode::Host => 0,
                Mode::Client => UNDEFINED,
            },
            queue_index: 0,
            time_local: 0,
            time_mutual: 0,
            rng: Mt64::new(MT64_SEED),
        }
    }

    /// Local monotonic session time.
    #[inline]
    pub fn time_local(&self) -> Time {
        self.time_local
    }

    /// Authoritative session time as this peer knows it. Equal to
    /// `time_local` on the host; on a client it follows observed
    /// message timestamps and never decreases.
    #[inline]
    pub fn time_mutual(&self) -> Time {
        self.time_mutual
    }

    /// Registers local endpoint ids, appending one slot per id.
    ///
    /// On the host the first opened slot is reserved for the host
    /// itself; clients connect through the remaining ones.
    pub fn open(&mut self, ids: &[EndpointId]) -> Result<(), ErrorSet> {
        for &id in ids {
            grow::try_push(&mut self.slots, Slot::opened(id))?;
        }
        Ok(())
    }

    /// Binds the first free slot to a remote endpoint id. The next
    /// tick emits a session probe towards it.
    pub fn connect(&mut self, server_id: EndpointId) -> Result<(), ErrorSet> {
        if self.mode != Mode::Client {
            return Err(ErrorSet::INVALID_MODE);
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_free())
            .ok_or(ErrorSet::NO_FREE_SLOTS)?;
        slot.remote.id = server_id;
        slot.remote.id_resolved = true;
        slot.remote.address_size = 0;
        debug!(server_id, "connecting");
        Ok(())
    }

    /// Appends an application message to the session.
    ///
    /// The host appends straight to the mutual queue; a client appends
    /// to its local queue with zero time (the host's stamp is
    /// authoritative) and its current actor, which is fixed up
    /// retroactively if the session response has not arrived yet.
    pub fn queue(&mut self, data: &[u8]) -> Result<(), ErrorSet> {
        if data.len() > MAX_MESSAGE_DATA {
            return Err(ErrorSet::INVALID_MESSAGE_SIZE);
        }
        let data = grow::try_copied(data)?;
        match self.mode {
            Mode::Host => {
                self.queue.append(self.time_mutual, self.actor, data)?;
            }
            Mode::Client => {
                let actor = self.actor;
                let slot = self.slots.first_mut().ok_or(ErrorSet::INVALID_PEER)?;
                slot.queue.append(0, actor, data)?;
            }
        }
        Ok(())
    }

    /// Digests received packets.
    ///
    /// Packets for unknown destinations are dropped silently. Protocol
    /// violations are folded into the returned status and the
    /// offending chunk is skipped; they never invalidate sibling
    /// chunks or the slot.
    pub fn input(&mut self, packets: &[Packet]) -> Result<(), ErrorSet> {
        let mut status = ErrorSet::OK;
        for packet in packets {
            status |= self.input_packet(packet);
        }
        status.into_result()
    }

    /// Advances session time by `elapsed` and emits outbound packets.
    ///
    /// A negative delta or a time overflow aborts the tick without
    /// mutating the peer; the peer stays usable afterwards.
    pub fn tick(&mut self, elapsed: Time) -> TickResult {
        let now = match time::advance(self.time_local, elapsed) {
            Ok(now) => now,
            Err(error) => {
                return TickResult {
                    packets: Vec::new(),
                    status: error,
                }
            }
        };
        self.time_local = now;
        for slot in &mut self.slots {
            slot.heartbeat.advance(elapsed);
        }
        match self.mode {
            Mode::Host => self.host_tick(),
            Mode::Client => self.client_tick(),
        }
    }

    fn input_packet(&mut self, packet: &Packet) -> ErrorSet {
        if !self
            .slots
            .iter()
            .any(|slot| slot.local.id == packet.destination_id)
        {
            return ErrorSet::OK;
        }
        match self.mode {
            Mode::Host => self.host_input(packet),
            Mode::Client => self.client_input(packet),
        }
    }

    fn host_input(&mut self, packet: &Packet) -> ErrorSet {
        let pair = self.slots.iter().position(|slot| {
            slot.local.id == packet.destination_id && slot.remote.id == packet.source_id
        });
        if let Some(index) = pair {
            return self.host_receive(index, packet);
        }
        if self
            .slots
            .iter()
            .any(|slot| slot.remote.id == packet.source_id)
        {
            // Already claimed through another local endpoint.
            return ErrorSet::OK;
        }
        let free = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.can_accept());
        match free {
            Some((index, slot)) => {
                slot.state = SlotState::SessionRequest;
                slot.remote.id = packet.source_id;
                slot.remote.id_resolved = true;
                slot.actor = index as Actor;
                debug!(
                    slot = index,
                    source_id = packet.source_id,
                    "session requested"
                );
                ErrorSet::OK
            }
            None => {
                warn!(source_id = packet.source_id, "no free slots");
                ErrorSet::NO_FREE_SLOTS
            }
        }
    }

    fn host_receive(&mut self, slot_index: usize, packet: &Packet) -> ErrorSet {
        let (chunks, mut status) = packet::unpack(std::slice::from_ref(packet));
        for chunk in &chunks {
            if chunk.len() < MESSAGE_HEADER_SIZE {
                status |= ErrorSet::INVALID_MESSAGE_SIZE;
                continue;
            }
            let header = MessageHeader::read(chunk);
            let data = &chunk[MESSAGE_HEADER_SIZE..];
            let slot_actor = self.slots[slot_index].actor;
            if header.time != 0 {
                warn!(
                    slot = slot_index,
                    time = header.time,
                    "client message carries its own timestamp"
                );
                status |= ErrorSet::INVALID_MESSAGE_TIME;
                continue;
            }
            if header.actor != slot_actor {
                warn!(
                    slot = slot_index,
                    actor = header.actor,
                    expected = slot_actor,
                    "client message actor mismatch"
                );
                status |= ErrorSet::INVALID_MESSAGE_ACTOR;
                continue;
            }
            match MessageMode::from_u8(header.mode) {
                Some(MessageMode::Service) => status |= self.host_service(slot_index, data),
                Some(MessageMode::Application) => {
                    let slot = &mut self.slots[slot_index];
                    if let Err(error) =
                        slot.queue
                            .insert(header.index, header.time, header.actor, data)
                    {
                        status |= error;
                    }
                }
                None => status |= ErrorSet::INVALID_MESSAGE,
            }
        }
        status
    }

    fn host_service(&mut self, slot_index: usize, data: &[u8]) -> ErrorSet {
        match data.first().copied().and_then(ServiceId::from_u8) {
            Some(ServiceId::Heartbeat) => {
                trace!(slot = slot_index, "heartbeat received");
                ErrorSet::OK
            }
            other => {
                warn!(slot = slot_index, service = ?other, "unhandled service message");
                ErrorSet::UNKNOWN_SERVICE_ID
            }
        }
    }

    fn client_input(&mut self, packet: &Packet) -> ErrorSet {
        if self.slots.is_empty() {
            return ErrorSet::OK;
        }
        let (chunks, mut status) = packet::unpack(std::slice::from_ref(packet));
        for chunk in &chunks {
            if chunk.len() < MESSAGE_HEADER_SIZE {
                status |= ErrorSet::INVALID_MESSAGE_SIZE;
                continue;
            }
            let header = MessageHeader::read(chunk);
            let data = &chunk[MESSAGE_HEADER_SIZE..];
            match MessageMode::from_u8(header.mode) {
                Some(MessageMode::Service) => status |= self.client_service(&header, data),
                Some(MessageMode::Application) => {
                    if let Err(error) =
                        self.queue
                            .insert(header.index, header.time, header.actor, data)
                    {
                        status |= error;
                    }
                }
                None => status |= ErrorSet::INVALID_MESSAGE,
            }
            if header.time > self.time_mutual {
                self.time_mutual = header.time;
            }
        }
        status
    }

    fn client_service(&mut self, header: &MessageHeader, data: &[u8]) -> ErrorSet {
        match data.first().copied().and_then(ServiceId::from_u8) {
            Some(ServiceId::Heartbeat) => {
                trace!("heartbeat received");
                ErrorSet::OK
            }
            Some(ServiceId::SessionResponse) => {
                self.actor = header.actor;
                let slot = &mut self.slots[0];
                slot.remote.set_address(&data[1..]);
                // The transport must resolve the session address to a
                // possibly different endpoint id.
                slot.remote.id_resolved = false;
                slot.actor = header.actor;
                slot.state = SlotState::Ready;
                slot.queue.restamp_actor(header.actor);
                debug!(actor = header.actor, "session response accepted");
                ErrorSet::OK
            }
            other => {
                warn!(service = ?other, "unhandled service message");
                ErrorSet::UNKNOWN_SERVICE_ID
            }
        }
    }

    fn host_tick(&mut self) -> TickResult {
        let mut packets = Vec::new();
        let mut status = ErrorSet::OK;

        // The host clock is authoritative: commit it and stamp every
        // entry that joined the mutual queue since the previous tick.
        self.time_mutual = self.time_local;
        self.queue.restamp_time_from(self.queue_index, self.time_mutual);

        // Merge client staging queues, in slot order.
        for slot in self.slots.iter_mut().skip(1) {
            loop {
                let Some(entry) = slot.queue.get(slot.in_index) else {
                    break;
                };
                if !entry.ready {
                    break;
                }
                let data = match grow::try_copied(&entry.data) {
                    Ok(data) => data,
                    Err(error) => {
                        status |= error;
                        break;
                    }
                };
                match self.queue.append(self.time_mutual, slot.actor, data) {
                    Ok(_) => slot.in_index += 1,
                    Err(error) => {
                        status |= error;
                        break;
                    }
                }
            }
        }
        self.queue_index = self.queue.len();

        for index in 1..self.slots.len() {
            match self.slots[index].state {
                SlotState::Empty => {}
                SlotState::SessionRequest => {
                    let (local_id, remote_id, actor) = {
                        let slot = &self.slots[index];
                        (slot.local.id, slot.remote.id, slot.actor)
                    };
                    let result = service_chunk(
                        ServiceId::SessionResponse,
                        self.slots[index].local.address(),
                        self.time_mutual,
                        actor,
                    )
                    .and_then(|chunk| packet::pack(local_id, remote_id, &[chunk]))
                    .and_then(|out| grow::try_extend(&mut packets, out));
                    match result {
                        Ok(()) => {
                            let slot = &mut self.slots[index];
                            slot.state = SlotState::Ready;
                            slot.heartbeat.reset();
                            debug!(slot = index, actor, "session response sent");
                        }
                        Err(error) => status |= error,
                    }
                }
                SlotState::Ready => {
                    let queue_len = self.queue.len();
                    let (local_id, remote_id, out_index, expired, actor) = {
                        let slot = &self.slots[index];
                        (
                            slot.local.id,
                            slot.remote.id,
                            slot.out_index,
                            slot.heartbeat.is_expired(),
                            slot.actor,
                        )
                    };
                    if out_index > queue_len {
                        status |= ErrorSet::INVALID_OUT_INDEX;
                        continue;
                    }
                    if out_index < queue_len {
                        let result = update_chunks(&self.queue, out_index, &mut self.rng)
                            .and_then(|chunks| packet::pack(local_id, remote_id, &chunks))
                            .and_then(|out| grow::try_extend(&mut packets, out));
                        match result {
                            Ok(()) => {
                                let slot = &mut self.slots[index];
                                slot.out_index = queue_len;
                                slot.heartbeat.reset();
                                trace!(slot = index, up_to = queue_len, "queue update sent");
                            }
                            Err(error) => status |= error,
                        }
                    } else if expired {
                        let result = heartbeat_chunks(
                            &self.queue,
                            out_index,
                            &mut self.rng,
                            self.time_mutual,
                            actor,
                        )
                        .and_then(|chunks| packet::pack(local_id, remote_id, &chunks))
                        .and_then(|out| grow::try_extend(&mut packets, out));
                        match result {
                            Ok(()) => self.slots[index].heartbeat.reset(),
                            Err(error) => status |= error,
                        }
                    }
                }
            }
        }

        TickResult { packets, status }
    }

    fn client_tick(&mut self) -> TickResult {
        let mut packets = Vec::new();
        let mut status = ErrorSet::OK;

        let Some(first) = self.slots.first() else {
            return TickResult { packets, status };
        };
        if first.remote.id == UNDEFINED {
            return TickResult { packets, status };
        }
        let (local_id, remote_id, state, out_index, expired) = (
            first.local.id,
            first.remote.id,
            first.state,
            first.out_index,
            first.heartbeat.is_expired(),
        );

        if state != SlotState::Ready {
            // Session probe: an empty packet is enough to make the
            // host claim a slot for us.
            let result = packet::pack(local_id, remote_id, &[])
                .and_then(|out| grow::try_extend(&mut packets, out));
            if let Err(error) = result {
                status |= error;
            } else {
                trace!(remote_id, "session probe sent");
            }
            return TickResult { packets, status };
        }

        let queue_len = self.slots[0].queue.len();
        if out_index > queue_len {
            status |= ErrorSet::INVALID_OUT_INDEX;
            return TickResult { packets, status };
        }
        if out_index < queue_len {
            let result = update_chunks(&self.slots[0].queue, out_index, &mut self.rng)
                .and_then(|chunks| packet::pack(local_id, remote_id, &chunks))
                .and_then(|out| grow::try_extend(&mut packets, out));
            match result {
                Ok(()) => {
                    let slot = &mut self.slots[0];
                    slot.out_index = queue_len;
                    slot.heartbeat.reset();
                    trace!(up_to = queue_len, "local queue sent");
                }
                Err(error) => status |= error,
            }
        } else if expired {
            let actor = self.actor;
            let result = heartbeat_chunks(&self.slots[0].queue, out_index, &mut self.rng, 0, actor)
                .and_then(|chunks| packet::pack(local_id, remote_id, &chunks))
                .and_then(|out| grow::try_extend(&mut packets, out));
            match result {
                Ok(()) => self.slots[0].heartbeat.reset(),
                Err(error) => status |= error,
            }
        }

        TickResult { packets, status }
    }
}

/// Serializes the messages `from..len` of a queue plus their trail.
fn update_chunks(
    queue: &MessageQueue,
    from: i64,
    rng: &mut Mt64,
) -> Result<Vec<Vec<u8>>, ErrorSet> {
    let mut chunks = Vec::new();
    for index in from..queue.len() {
        if let Some(entry) = queue.get(index) {
            if entry.ready {
                let chunk = wire::encode_message(
                    MessageMode::Application as u8,
                    index,
                    entry.time,
                    entry.actor,
                    &entry.data,
                )?;
                grow::try_push(&mut chunks, chunk)?;
            }
        }
    }
    append_trail(queue, from, rng, &mut chunks)?;
    Ok(chunks)
}

/// Serializes a heartbeat followed by the trail at `from`.
fn heartbeat_chunks(
    queue: &MessageQueue,
    from: i64,
    rng: &mut Mt64,
    time: Time,
    actor: Actor,
) -> Result<Vec<Vec<u8>>, ErrorSet> {
    let mut chunks = Vec::new();
    grow::try_push(
        &mut chunks,
        service_chunk(ServiceId::Heartbeat, &[], time, actor)?,
    )?;
    append_trail(queue, from, rng, &mut chunks)?;
    Ok(chunks)
}

/// Re-serializes the trail picks behind `from` with their original
/// index, time and actor, so receivers can deduplicate.
fn append_trail(
    queue: &MessageQueue,
    from: i64,
    rng: &mut Mt64,
    chunks: &mut Vec<Vec<u8>>,
) -> Result<(), ErrorSet> {
    for index in trail::select(rng, from) {
        if let Some(entry) = queue.get(index) {
            if entry.ready {
                let chunk = wire::encode_message(
                    MessageMode::Application as u8,
                    index,
                    entry.time,
                    entry.actor,
                    &entry.data,
                )?;
                grow::try_push(chunks, chunk)?;
            }
        }
    }
    Ok(())
}

/// Serializes a service message: the id byte plus any extra payload.
fn service_chunk(
    id: ServiceId,
    extra: &[u8],
    time: Time,
    actor: Actor,
) -> Result<Vec<u8>, ErrorSet> {
    let mut data = grow::try_zeroed(1 + extra.len())?;
    data[0] = id as u8;
    data[1..].copy_from_slice(extra);
    wire::encode_message(MessageMode::Service as u8, UNDEFINED, time, actor, &data)
}
