use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering::*};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::prelude::*;

/// How arrivals are counted against the per-tick budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Counting {
    /// Every packet counts, including repeats of an identical packet.
    #[default]
    Every,
    /// Identical packets seen twice in one tick count once.
    Distinct,
}

#[derive(Debug)]
enum TickLedger<P> {
    Every(AtomicUsize),
    Distinct(Mutex<HashSet<P>>),
}
impl<P: Packet> TickLedger<P> {
    fn new(counting: Counting) -> Self {
        match counting {
            Counting::Every => Self::Every(AtomicUsize::new(0)),
            Counting::Distinct => Self::Distinct(Mutex::new(HashSet::new())),
        }
    }
    /// Returns the count for this tick including `packet`.
    fn record(&self, packet: &P) -> usize {
        match self {
            Self::Every(n) => n.fetch_add(1, AcqRel) + 1,
            Self::Distinct(seen) => {
                let mut seen = seen.lock();
                seen.insert(packet.clone());
                seen.len()
            }
        }
    }
    /// Records `packet` only if that keeps the count within `max`.
    fn try_record(&self, packet: &P, max: usize) -> Option<usize> {
        match self {
            Self::Every(n) => n
                .fetch_update(AcqRel, Acquire, |sent| (sent < max).then_some(sent + 1))
                .ok()
                .map(|sent| sent + 1),
            Self::Distinct(seen) => {
                let mut seen = seen.lock();
                if !seen.contains(packet) {
                    if seen.len() >= max {
                        return None;
                    }
                    seen.insert(packet.clone());
                }
                Some(seen.len())
            }
        }
    }
    fn reset(&self) {
        match self {
            Self::Every(n) => n.store(0, Release),
            Self::Distinct(seen) => seen.lock().clear(),
        }
    }
    fn count(&self) -> usize {
        match self {
            Self::Every(n) => n.load(Acquire),
            Self::Distinct(seen) => seen.lock().len(),
        }
    }
}

/// Everything the limiter knows about one recipient.
#[derive(Debug)]
pub struct RecipientState<P> {
    sent_this_tick: TickLedger<P>,
    overflow: OverflowQueue<P>,
    position: AtomicU64,
    retired: AtomicBool,
    shed: AtomicUsize,
}
impl<P: Packet> RecipientState<P> {
    fn new(order: QueueOrder, counting: Counting) -> Self {
        Self {
            sent_this_tick: TickLedger::new(counting),
            overflow: OverflowQueue::new(order),
            position: AtomicU64::new(ChunkPos::default().pack()),
            retired: AtomicBool::new(false),
            shed: AtomicUsize::new(0),
        }
    }
    pub(crate) fn record(&self, packet: &P) -> usize {
        self.sent_this_tick.record(packet)
    }
    /// Like [`record`](Self::record), but refuses instead of going over `max`.
    pub(crate) fn try_record(&self, packet: &P, max: usize) -> Option<usize> {
        self.sent_this_tick.try_record(packet, max)
    }
    pub(crate) fn reset_tick(&self) {
        self.sent_this_tick.reset()
    }
    pub fn sent_this_tick(&self) -> usize {
        self.sent_this_tick.count()
    }
    pub fn overflow(&self) -> &OverflowQueue<P> {
        &self.overflow
    }
    pub fn position(&self) -> ChunkPos {
        ChunkPos::unpack(self.position.load(Acquire))
    }
    /// Stores the new position, returning the previous one.
    pub(crate) fn set_position(&self, pos: ChunkPos) -> ChunkPos {
        ChunkPos::unpack(self.position.swap(pos.pack(), AcqRel))
    }
    pub fn is_retired(&self) -> bool {
        self.retired.load(Acquire)
    }
    pub(crate) fn note_shed(&self) {
        self.shed.fetch_add(1, Relaxed);
    }
    pub(crate) fn take_shed(&self) -> usize {
        self.shed.swap(0, Relaxed)
    }
    fn retire(&self) -> usize {
        self.retired.store(true, Release);
        self.overflow.clear()
    }
}

/// Recipient → state map. States are created on first use and retired on removal.
#[derive(Debug)]
pub struct StateRegistry<P> {
    states: RwLock<HashMap<RecipientId, Arc<RecipientState<P>>>>,
    order: QueueOrder,
    counting: Counting,
}
impl<P: Packet> StateRegistry<P> {
    pub fn new(order: QueueOrder, counting: Counting) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            order,
            counting,
        }
    }
    pub fn order(&self) -> QueueOrder {
        self.order
    }
    pub fn get(&self, id: RecipientId) -> Option<Arc<RecipientState<P>>> {
        self.states.read().get(&id).cloned()
    }
    pub fn get_or_create(&self, id: RecipientId) -> Arc<RecipientState<P>> {
        if let Some(state) = self.states.read().get(&id) {
            return state.clone();
        }
        self.states
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(RecipientState::new(self.order, self.counting)))
            .clone()
    }
    /// Calls `f` on a snapshot of the registry. The map is not locked while `f` runs, so
    /// recipients may be added or removed concurrently; removed ones show up as retired.
    pub fn for_each(&self, mut f: impl FnMut(RecipientId, &RecipientState<P>)) {
        let snapshot: Vec<_> = self.states.read().iter().map(|(id, s)| (*id, s.clone())).collect();
        for (id, state) in snapshot {
            f(id, &state);
        }
    }
    /// Forgets `id`, returning how many deferred packets were thrown away.
    /// `None` if the recipient was not tracked.
    pub fn remove(&self, id: RecipientId) -> Option<usize> {
        let state = self.states.write().remove(&id)?;
        Some(state.retire())
    }
    pub fn len(&self) -> usize {
        self.states.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
