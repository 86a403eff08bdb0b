use relay_session::error::ErrorSet;
use relay_session::packet::{self, Packet};
use relay_session::protocol::{MessageMode, MAX_MESSAGE_DATA, UNDEFINED};
use relay_session::session::{Mode, Peer, TickResult};
use relay_session::slot::SlotState;
use relay_session::wire;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn has_endpoint(peer: &Peer, id: i64) -> bool {
    peer.slots.iter().any(|slot| slot.local.id == id)
}

/// Stands in for the transport's address book: turns the one-byte
/// session address handed out by the host back into an endpoint id.
fn resolve_address(client: &mut Peer, host: &Peer) -> bool {
    if client.slots.is_empty() || client.slots[0].remote.address_size != 1 {
        return false;
    }
    let id = client.slots[0].remote.address_data[0] as i64;
    client.slots[0].remote.id = id;
    has_endpoint(host, id)
}

fn deliver(result: &TickResult, peer: &mut Peer) {
    assert!(result.status.is_empty(), "tick failed: {:?}", result.status);
    let packets: Vec<Packet> = result
        .packets
        .iter()
        .filter(|packet| has_endpoint(peer, packet.destination_id))
        .cloned()
        .collect();
    peer.input(&packets).unwrap();
}

/// Runs the canonical four-leg handshake: probe, session response,
/// join, first update.
fn handshake(host: &mut Peer, clients: &mut [&mut Peer]) {
    for client in clients.iter_mut() {
        let tick = client.tick(0);
        deliver(&tick, host);
    }
    let tick = host.tick(0);
    for client in clients.iter_mut() {
        deliver(&tick, client);
    }
    for client in clients.iter_mut() {
        assert!(resolve_address(client, host));
    }
    for client in clients.iter_mut() {
        let tick = client.tick(0);
        deliver(&tick, host);
    }
    let tick = host.tick(0);
    for client in clients.iter_mut() {
        deliver(&tick, client);
    }
}

/// A host peer whose non-reserved slots advertise their own endpoint
/// id as a one-byte session address.
fn host_with_slots(ids: &[i64]) -> Peer {
    let mut host = Peer::new(Mode::Host);
    host.open(ids).unwrap();
    for slot in host.slots.iter_mut().skip(1) {
        let address = [slot.local.id as u8];
        slot.local.set_address(&address);
    }
    host
}

#[test]
fn host_to_client_initial_state() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();

    let payload: [u8; 9] = [1, 2, 3, 4, 5, 6, 7, 8, 9];
    host.queue(&payload[0..2]).unwrap();
    host.queue(&payload[2..6]).unwrap();
    host.queue(&payload[6..9]).unwrap();

    assert_eq!(host.queue.len(), 3);
    for entry in host.queue.iter() {
        assert_eq!(entry.time, 0);
        assert_eq!(entry.actor, 0);
    }

    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    assert_eq!(client.queue.len(), 3);
    let expected: [&[u8]; 3] = [&payload[0..2], &payload[2..6], &payload[6..9]];
    for (index, bytes) in expected.iter().enumerate() {
        let entry = client.queue.get(index as i64).unwrap();
        assert!(entry.ready);
        assert_eq!(entry.time, 0);
        assert_eq!(entry.actor, 0);
        assert_eq!(entry.data.as_slice(), *bytes);
    }
}

#[test]
fn host_to_client_incremental_updates() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);
    assert!(client.queue.is_empty());

    host.queue(&[1, 2]).unwrap();
    let tick = host.tick(0);
    deliver(&tick, &mut client);
    assert_eq!(client.queue.len(), 1);
    assert_eq!(client.queue.get(0).unwrap().data, vec![1, 2]);

    host.queue(&[3, 4, 5, 6]).unwrap();
    host.queue(&[7, 8, 9]).unwrap();
    let tick = host.tick(0);
    deliver(&tick, &mut client);
    assert_eq!(client.queue.len(), 3);
    assert_eq!(client.queue.get(1).unwrap().data, vec![3, 4, 5, 6]);
    assert_eq!(client.queue.get(2).unwrap().data, vec![7, 8, 9]);
}

#[test]
fn client_to_client_fan_out() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2, 3]);
    let mut alice = Peer::new(Mode::Client);
    let mut bob = Peer::new(Mode::Client);
    alice.open(&[4]).unwrap();
    bob.open(&[5]).unwrap();
    alice.connect(1).unwrap();
    bob.connect(1).unwrap();
    handshake(&mut host, &mut [&mut alice, &mut bob]);

    assert_ne!(host.actor, alice.actor);
    assert_ne!(host.actor, bob.actor);
    assert_ne!(alice.actor, bob.actor);

    alice.queue(&[1, 2, 3]).unwrap();
    bob.queue(&[4, 5]).unwrap();

    let tick = alice.tick(0);
    deliver(&tick, &mut host);
    let tick = bob.tick(0);
    deliver(&tick, &mut host);

    let tick = host.tick(0);
    deliver(&tick, &mut alice);
    deliver(&tick, &mut bob);

    for peer in [&alice, &bob] {
        assert_eq!(peer.queue.len(), 2);
        let first = peer.queue.get(0).unwrap();
        assert_eq!(first.time, 0);
        assert_eq!(first.actor, alice.actor);
        assert_eq!(first.data, vec![1, 2, 3]);
        let second = peer.queue.get(1).unwrap();
        assert_eq!(second.time, 0);
        assert_eq!(second.actor, bob.actor);
        assert_eq!(second.data, vec![4, 5]);
    }
}

#[test]
fn ready_slots_drain_fully_each_tick() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2, 3]);
    let mut alice = Peer::new(Mode::Client);
    let mut bob = Peer::new(Mode::Client);
    alice.open(&[4]).unwrap();
    bob.open(&[5]).unwrap();
    alice.connect(1).unwrap();
    bob.connect(1).unwrap();
    handshake(&mut host, &mut [&mut alice, &mut bob]);

    for _ in 0..8 {
        host.queue(&[1]).unwrap();
    }
    let tick = host.tick(0);
    assert!(tick.is_ok());
    let n = host.queue.len();
    for slot in host.slots.iter().skip(1) {
        if slot.state == SlotState::Ready {
            assert_eq!(slot.out_index, n);
        }
    }
}

#[test]
fn large_updates_span_packets() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    for value in 0..10u8 {
        host.queue(&[value; 200]).unwrap();
    }
    let tick = host.tick(0);
    assert!(tick.packets.len() > 1);
    deliver(&tick, &mut client);

    assert_eq!(client.queue.len(), 10);
    for index in 0..10i64 {
        assert_eq!(client.queue.get(index).unwrap().data, vec![index as u8; 200]);
    }
}

#[test]
fn trail_heals_lost_packets() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    for value in 0..6u8 {
        host.queue(&[value]).unwrap();
    }
    let lost = host.tick(0);
    assert!(lost.is_ok());
    drop(lost);

    host.queue(&[6]).unwrap();
    let tick = host.tick(0);
    deliver(&tick, &mut client);

    assert_eq!(client.queue.len(), 7);
    for index in 0..7i64 {
        let entry = client.queue.get(index).unwrap();
        assert!(entry.ready, "index {index} not healed");
        assert_eq!(entry.data, vec![index as u8]);
    }
}

#[test]
fn trail_heals_the_client_to_host_direction() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    for value in 0..6u8 {
        client.queue(&[value]).unwrap();
    }
    let lost = client.tick(0);
    assert!(lost.is_ok());
    drop(lost);

    client.queue(&[6]).unwrap();
    let tick = client.tick(0);
    deliver(&tick, &mut host);
    let tick = host.tick(0);
    deliver(&tick, &mut client);

    assert_eq!(client.queue.len(), 7);
    for index in 0..7i64 {
        let entry = client.queue.get(index).unwrap();
        assert!(entry.ready, "index {index} not healed");
        assert_eq!(entry.actor, client.actor);
        assert_eq!(entry.data, vec![index as u8]);
    }
}

#[test]
fn client_heartbeats_are_consumed_silently() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    let tick = client.tick(10);
    assert!(!tick.packets.is_empty());
    deliver(&tick, &mut host);
    assert!(host.queue.is_empty());
    assert!(host.slots[1].queue.is_empty());
}

#[test]
fn client_time_follows_host_heartbeats() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);
    assert_eq!(client.time_mutual(), 0);

    let mut previous = client.time_mutual();
    for _ in 0..4 {
        let tick = host.tick(10);
        deliver(&tick, &mut client);
        assert!(client.time_mutual() >= previous);
        previous = client.time_mutual();
    }
    assert_eq!(host.time_mutual(), 40);
    assert_eq!(client.time_mutual(), 40);
}

#[test]
fn early_queued_messages_get_the_assigned_actor() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.queue(&[42]).unwrap();
    assert_eq!(client.slots[0].queue.get(0).unwrap().actor, UNDEFINED);

    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    let actor = client.actor;
    assert!(actor > 0);
    assert_eq!(client.slots[0].queue.get(0).unwrap().actor, actor);

    // The join leg already relayed the message through the host.
    assert_eq!(client.queue.len(), 1);
    assert_eq!(client.queue.get(0).unwrap().actor, actor);
    assert_eq!(client.queue.get(0).unwrap().data, vec![42]);
}

#[test]
fn negative_elapsed_time_is_rejected() {
    let mut host = host_with_slots(&[1, 2]);
    let before = host.time_local();
    let tick = host.tick(-1);
    assert_eq!(tick.status, ErrorSet::INVALID_TIME_ELAPSED);
    assert!(tick.packets.is_empty());
    assert_eq!(host.time_local(), before);
}

#[test]
fn time_overflow_keeps_the_peer_usable() {
    let mut host = host_with_slots(&[1, 2]);
    let tick = host.tick(i64::MAX);
    assert!(tick.is_ok());
    let tick = host.tick(1);
    assert_eq!(tick.status, ErrorSet::TIME_OVERFLOW);
    let tick = host.tick(0);
    assert!(tick.is_ok());
}

#[test]
fn probes_claim_slots_until_exhausted() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut alice = Peer::new(Mode::Client);
    let mut bob = Peer::new(Mode::Client);
    alice.open(&[4]).unwrap();
    bob.open(&[5]).unwrap();
    alice.connect(1).unwrap();
    bob.connect(1).unwrap();

    let tick = alice.tick(0);
    assert!(host.input(&tick.packets).is_ok());
    let tick = bob.tick(0);
    assert_eq!(host.input(&tick.packets), Err(ErrorSet::NO_FREE_SLOTS));
}

#[test]
fn duplicate_probes_do_not_claim_twice() {
    let mut host = host_with_slots(&[1, 2, 3]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[4]).unwrap();
    client.connect(1).unwrap();

    let tick = client.tick(0);
    host.input(&tick.packets).unwrap();
    let tick = client.tick(0);
    host.input(&tick.packets).unwrap();

    let claimed = host
        .slots
        .iter()
        .filter(|slot| slot.remote.id == 4)
        .count();
    assert_eq!(claimed, 1);
}

#[test]
fn host_rejects_misbehaving_clients() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    let actor = client.actor;
    let stamped =
        wire::encode_message(MessageMode::Application as u8, 0, 5, actor, &[1]).unwrap();
    let packets = packet::pack(3, 2, &[stamped]).unwrap();
    assert_eq!(host.input(&packets), Err(ErrorSet::INVALID_MESSAGE_TIME));

    let forged =
        wire::encode_message(MessageMode::Application as u8, 0, 0, actor + 1, &[1]).unwrap();
    let packets = packet::pack(3, 2, &[forged]).unwrap();
    assert_eq!(host.input(&packets), Err(ErrorSet::INVALID_MESSAGE_ACTOR));
}

#[test]
fn unknown_service_ids_are_reported() {
    init_tracing();
    let mut host = host_with_slots(&[1, 2]);
    let mut client = Peer::new(Mode::Client);
    client.open(&[3]).unwrap();
    client.connect(1).unwrap();
    handshake(&mut host, &mut [&mut client]);

    let chunk = wire::encode_message(
        MessageMode::Service as u8,
        UNDEFINED,
        0,
        client.actor,
        &[99],
    )
    .unwrap();
    let packets = packet::pack(3, 2, &[chunk]).unwrap();
    assert_eq!(host.input(&packets), Err(ErrorSet::UNKNOWN_SERVICE_ID));
}

#[test]
fn foreign_packets_are_ignored() {
    let mut host = host_with_slots(&[1, 2]);
    let packets = packet::pack(7, 9, &[]).unwrap();
    assert!(host.input(&packets).is_ok());
    assert!(host.slots.iter().all(|slot| slot.is_free()));
}

#[test]
fn connect_is_a_client_operation() {
    let mut host = Peer::new(Mode::Host);
    host.open(&[1]).unwrap();
    assert_eq!(host.connect(9), Err(ErrorSet::INVALID_MODE));
}

#[test]
fn queue_rejects_oversized_payloads() {
    let mut host = Peer::new(Mode::Host);
    host.open(&[1]).unwrap();
    let payload = vec![0u8; MAX_MESSAGE_DATA + 1];
    assert_eq!(host.queue(&payload), Err(ErrorSet::INVALID_MESSAGE_SIZE));
    let payload = vec![0u8; MAX_MESSAGE_DATA];
    assert!(host.queue(&payload).is_ok());
}

#[test]
fn client_without_slots_cannot_queue() {
    let mut client = Peer::new(Mode::Client);
    assert_eq!(client.queue(&[1]), Err(ErrorSet::INVALID_PEER));
}
