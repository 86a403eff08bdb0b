use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use relay_session::packet;
use relay_session::protocol::MessageMode;
use relay_session::session::{Mode, Peer};
use relay_session::slot::SlotState;
use relay_session::wire;

fn bench_pack(c: &mut Criterion) {
    let chunks: Vec<Vec<u8>> = (0..10)
        .map(|index| {
            wire::encode_message(MessageMode::Application as u8, index, 0, 0, &[0u8; 200]).unwrap()
        })
        .collect();
    c.bench_function("pack_ten_chunks", |b| {
        b.iter(|| packet::pack(0, 1, black_box(&chunks)).unwrap())
    });
}

fn bench_host_fan_out(c: &mut Criterion) {
    c.bench_function("host_fan_out_four_clients", |b| {
        let mut host = Peer::new(Mode::Host);
        host.open(&[1, 2, 3, 4, 5]).unwrap();
        for (index, slot) in host.slots.iter_mut().enumerate().skip(1) {
            slot.state = SlotState::Ready;
            slot.remote.id = 100 + index as i64;
            slot.actor = index as i64;
        }
        b.iter(|| {
            host.queue(&[1, 2, 3, 4]).unwrap();
            let tick = host.tick(1);
            assert!(tick.is_ok());
            black_box(tick.packets)
        });
    });
}

criterion_group!(benches, bench_pack, bench_host_fan_out);
criterion_main!(benches);
