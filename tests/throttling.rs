use std::collections::HashMap;

use chunkgate::world::WorldEvent;
use chunkgate::{
    ChunkPacket, ChunkPos, Decision, Deliver, DeliveryError, Limiter, Network, QueueOrder, RecipientId, Settings,
    World,
};

#[derive(Default)]
struct Recorder {
    delivered: Vec<(RecipientId, ChunkPacket)>,
}
impl Deliver<ChunkPacket> for Recorder {
    fn deliver(&mut self, recipient: RecipientId, packet: ChunkPacket) -> Result<(), DeliveryError> {
        self.delivered.push((recipient, packet));
        Ok(())
    }
}

fn chunk(x: i32, z: i32) -> ChunkPacket {
    ChunkPacket::new(ChunkPos::new(x, z), vec![x as u8, z as u8])
}

fn limiter(max_packets: usize, order: QueueOrder) -> Limiter<ChunkPacket> {
    Limiter::new(Settings {
        max_packets,
        order,
        ..Settings::default()
    })
}

#[test]
fn five_packets_with_a_budget_of_three() {
    let limiter = limiter(3, QueueOrder::Fifo);
    let r = RecipientId(1);
    let m: Vec<_> = (1..=5).map(|i| chunk(i, 0)).collect();

    let decisions: Vec<_> = m.iter().map(|p| limiter.on_outbound_message(r, p)).collect();
    assert_eq!(
        decisions,
        [Decision::Admit, Decision::Admit, Decision::Admit, Decision::Defer, Decision::Defer]
    );

    let mut out = Recorder::default();
    let report = limiter.drain_cycle(&mut out);
    assert_eq!(report.per_recipient, [(r, 2)]);
    assert_eq!(out.delivered, [(r, m[3].clone()), (r, m[4].clone())]);
    assert_eq!(limiter.queued(r), 0);
}

#[test]
fn zero_budget_in_config_runs_with_the_default() {
    let settings = Settings::from_json(r#"{"max-packets-per-tick": 0}"#).unwrap();
    let limiter = Limiter::<ChunkPacket>::new(settings);
    assert_eq!(limiter.max_packets(), 15);
    let r = RecipientId(1);
    let admitted = (0..20)
        .filter(|&x| limiter.on_outbound_message(r, &chunk(x, 0)) == Decision::Admit)
        .count();
    assert_eq!(admitted, 15);
}

#[test]
fn disconnect_with_packets_still_queued() {
    let limiter = limiter(1, QueueOrder::Fifo);
    let r = RecipientId(9);
    for x in 0..5 {
        limiter.on_outbound_message(r, &chunk(x, 0));
    }
    assert_eq!(limiter.queued(r), 4);

    limiter.on_recipient_gone(r);
    let mut out = Recorder::default();
    let report = limiter.drain_cycle(&mut out);
    assert!(out.delivered.iter().all(|(to, _)| *to != r));
    assert_eq!(report.redelivered, 0);
    assert!(limiter.state(r).is_none());

    // the same identity connecting again starts from nothing
    assert_eq!(limiter.on_outbound_message(r, &chunk(0, 0)), Decision::Admit);
    assert_eq!(limiter.queued(r), 0);
}

#[test]
fn proximity_redelivers_nearest_first() {
    let limiter = limiter(1, QueueOrder::Proximity);
    let r = RecipientId(1);
    limiter.on_recipient_moved(r, ChunkPos::new(10, 10));
    limiter.on_outbound_message(r, &chunk(10, 10));
    for (x, z) in [(0, 0), (12, 10), (10, 11), (20, 20)] {
        assert_eq!(limiter.on_outbound_message(r, &chunk(x, z)), Decision::Defer);
    }
    limiter.reload(&Settings {
        max_packets: 10,
        order: QueueOrder::Proximity,
        ..Settings::default()
    });
    let mut out = Recorder::default();
    limiter.drain_cycle(&mut out);
    let order: Vec<_> = out.delivered.iter().map(|(_, p)| (p.pos.x, p.pos.z)).collect();
    // equally far chunks keep the order they were deferred in
    assert_eq!(order, [(10, 11), (12, 10), (0, 0), (20, 20)]);
}

/// Runs the simulator through the limiter one tick at a time, checking the per-tick
/// budget as it goes, then lets the queues drain out.
fn simulate(order: QueueOrder, max_packets: usize, ticks: u32) -> (usize, usize, Vec<(RecipientId, ChunkPacket)>) {
    let limiter = limiter(max_packets, order);
    let mut world = World::with_speed(2.5);
    let mut produced = 0;
    let mut admitted = 0;
    let mut redelivered = vec![];
    let mut sent_in_tick: HashMap<RecipientId, usize> = HashMap::new();

    let mut route = |event: WorldEvent, sent_in_tick: &mut HashMap<RecipientId, usize>| match event {
        WorldEvent::Moved(id, pos) => limiter.on_recipient_moved(id, pos),
        WorldEvent::Packet(id, packet) => {
            produced += 1;
            if limiter.on_outbound_message(id, &packet) == Decision::Admit {
                admitted += 1;
                *sent_in_tick.entry(id).or_default() += 1;
            }
        }
        _ => {}
    };
    for id in 0..3 {
        world.login(RecipientId(id), "bot", 4, &mut |e| route(e, &mut sent_in_tick));
    }
    for tick in 1..=ticks {
        for (id, n) in sent_in_tick.drain() {
            assert!(n <= max_packets, "{id} got {n} packets in one tick");
        }
        let mut out = Recorder::default();
        limiter.drain_cycle(&mut out);
        for (id, _) in &out.delivered {
            *sent_in_tick.entry(*id).or_default() += 1;
        }
        redelivered.extend(out.delivered);
        world.tick_until(tick, &mut |e| route(e, &mut sent_in_tick));
    }
    loop {
        let mut out = Recorder::default();
        let report = limiter.drain_cycle(&mut out);
        for (_, n) in report.per_recipient {
            assert!(n <= max_packets);
        }
        if out.delivered.is_empty() {
            break;
        }
        redelivered.extend(out.delivered);
    }
    drop(route);
    (produced, admitted, redelivered)
}

#[test]
fn simulated_traffic_stays_within_budget_and_loses_nothing() {
    let (produced, admitted, redelivered) = simulate(QueueOrder::Fifo, 10, 200);
    assert!(produced > 3 * 81, "the bots should have wandered into new chunks");
    assert!(!redelivered.is_empty(), "the budget should have been exceeded");
    assert_eq!(admitted + redelivered.len(), produced);
}

#[test]
fn proximity_ordering_loses_nothing_either() {
    let (produced, admitted, redelivered) = simulate(QueueOrder::Proximity, 6, 200);
    assert_eq!(admitted + redelivered.len(), produced);
}

#[test]
fn network_refuses_departed_clients_during_drain() {
    let limiter = limiter(1, QueueOrder::Fifo);
    let network = Network::new();
    let alex = network.connect("alex");
    let sam = network.connect("sam");
    for x in 0..3 {
        for id in [alex, sam] {
            if limiter.on_outbound_message(id, &chunk(x, 0)) == Decision::Admit {
                network.transmit(id, &chunk(x, 0)).unwrap();
            }
        }
    }
    // alex's socket closes before the game notices
    network.disconnect(alex);
    let report = limiter.drain_cycle(&mut |to: RecipientId, p: ChunkPacket| network.transmit(to, &p));
    assert_eq!(report.failed, 1);
    assert_eq!(report.redelivered, 1);
    assert_eq!(network.stats(sam).unwrap().packets, 2);

    limiter.on_recipient_gone(alex);
    assert_eq!(limiter.queued(alex), 0);
    assert_eq!(limiter.queued(sam), 1);
}
