use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;

use crate::config::{QueueOrder, WhenFull};
use crate::types::{ChunkPos, Packet};

/// Per-recipient store of deferred packets.
///
/// Under [`QueueOrder::Proximity`] each entry is keyed by its squared distance to
/// the recipient's chunk *at the time it was inserted*, with the insertion sequence
/// as a tie breaker. When the recipient moves, [`OverflowQueue::recenter`] rebuilds
/// the keys against the new position. Packets without a coordinate go last.
#[derive(Debug)]
pub struct OverflowQueue<P> {
    inner: Mutex<Inner<P>>,
}
#[derive(Debug)]
struct Inner<P> {
    next_seq: u64,
    entries: Entries<P>,
}
#[derive(Debug)]
enum Entries<P> {
    Fifo(VecDeque<(u64, P)>),
    Proximity(BTreeMap<(u64, u64), P>),
}

fn proximity_key(packet: &impl Packet, center: ChunkPos) -> u64 {
    packet.chunk().map_or(u64::MAX, |pos| pos.distance_sq(center))
}

impl<P: Packet> OverflowQueue<P> {
    pub fn new(order: QueueOrder) -> Self {
        let entries = match order {
            QueueOrder::Fifo => Entries::Fifo(VecDeque::new()),
            QueueOrder::Proximity => Entries::Proximity(BTreeMap::new()),
        };
        Self { inner: Mutex::new(Inner { next_seq: 0, entries }) }
    }
    pub fn order(&self) -> QueueOrder {
        match self.inner.lock().entries {
            Entries::Fifo(_) => QueueOrder::Fifo,
            Entries::Proximity(_) => QueueOrder::Proximity,
        }
    }
    /// Queues `packet`. `center` is the recipient's current chunk and is ignored by FIFO queues.
    ///
    /// With a `bound`, a push onto a full queue sheds one packet and hands it back.
    pub fn push(&self, packet: P, center: ChunkPos, bound: Option<(usize, WhenFull)>) -> Option<P> {
        let mut inner = self.inner.lock();
        let mut shed = None;
        if let Some((cap, when_full)) = bound {
            if inner.len() >= cap {
                match when_full {
                    WhenFull::DropNewest => return Some(packet),
                    WhenFull::DropOldest => shed = inner.evict_oldest(),
                }
            }
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        match &mut inner.entries {
            Entries::Fifo(queue) => queue.push_back((seq, packet)),
            Entries::Proximity(map) => {
                map.insert((proximity_key(&packet, center), seq), packet);
            }
        }
        shed
    }
    pub fn pop_first(&self) -> Option<P> {
        match &mut self.inner.lock().entries {
            Entries::Fifo(queue) => queue.pop_front().map(|(_, p)| p),
            Entries::Proximity(map) => map.pop_first().map(|(_, p)| p),
        }
    }
    /// Pops the first packet only if `take` agrees to it. The queue stays locked while `take`
    /// runs, so a refused packet keeps its place.
    pub fn pop_first_if(&self, take: impl FnOnce(&P) -> bool) -> Option<P> {
        let mut inner = self.inner.lock();
        match &mut inner.entries {
            Entries::Fifo(queue) => {
                if !take(&queue.front()?.1) {
                    return None;
                }
                queue.pop_front().map(|(_, p)| p)
            }
            Entries::Proximity(map) => {
                let entry = map.first_entry()?;
                if !take(entry.get()) {
                    return None;
                }
                Some(entry.remove())
            }
        }
    }
    /// Recomputes every proximity key against `center`. Packets at equal distance keep their
    /// relative insertion order. No-op for FIFO queues.
    pub fn recenter(&self, center: ChunkPos) {
        let mut inner = self.inner.lock();
        if let Entries::Proximity(map) = &mut inner.entries {
            *map = core::mem::take(map)
                .into_iter()
                .map(|((_, seq), packet)| ((proximity_key(&packet, center), seq), packet))
                .collect();
        }
    }
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Drops every queued packet, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let n = inner.len();
        match &mut inner.entries {
            Entries::Fifo(queue) => queue.clear(),
            Entries::Proximity(map) => map.clear(),
        }
        n
    }
}
impl<P> Inner<P> {
    fn len(&self) -> usize {
        match &self.entries {
            Entries::Fifo(queue) => queue.len(),
            Entries::Proximity(map) => map.len(),
        }
    }
    fn evict_oldest(&mut self) -> Option<P> {
        match &mut self.entries {
            Entries::Fifo(queue) => queue.pop_front().map(|(_, p)| p),
            Entries::Proximity(map) => {
                // linear, but only reached when a cap is configured and hit
                let oldest = map.keys().min_by_key(|(_, seq)| *seq).copied()?;
                map.remove(&oldest)
            }
        }
    }
}
