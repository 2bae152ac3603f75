use std::sync::Arc;

use crate::config::LiveSettings;
use crate::prelude::*;
use crate::registry::{Counting, RecipientState, StateRegistry};

/// One throttling subsystem: the recipient registry plus the settings it runs under.
///
/// Shared between the threads producing packets (admission) and the drain scheduler,
/// usually behind an [`Arc`].
#[derive(Debug)]
pub struct Limiter<P> {
    pub(crate) registry: StateRegistry<P>,
    pub(crate) live: LiveSettings,
    tick: std::time::Duration,
}

impl<P: Packet> Limiter<P> {
    pub fn new(settings: Settings) -> Self {
        Self::with_counting(settings, Counting::Every)
    }
    pub fn with_counting(settings: Settings, counting: Counting) -> Self {
        Self {
            registry: StateRegistry::new(settings.order, counting),
            live: LiveSettings::new(&settings),
            tick: settings.tick,
        }
    }
    /// The settings currently in force.
    pub fn settings(&self) -> Settings {
        Settings {
            max_packets: self.live.max_packets(),
            debug: self.live.debug(),
            order: self.registry.order(),
            max_queued: self.live.bound().map(|(cap, _)| cap),
            when_full: self.live.when_full(),
            tick: self.tick,
        }
    }
    pub fn max_packets(&self) -> usize {
        self.live.max_packets()
    }
    /// Applies new settings. Takes effect from the next admission check and drain cycle.
    ///
    /// Queue ordering and tick length are fixed once running; changes to them are logged and ignored.
    pub fn reload(&self, settings: &Settings) {
        if settings.order != self.registry.order() {
            log::warn!(
                "`ordering` cannot change while running (keeping {:?}, restart to use {:?})",
                self.registry.order(),
                settings.order
            );
        }
        if settings.tick != self.tick {
            log::warn!(
                "`tick-millis` cannot change while running (keeping {}ms)",
                self.tick.as_millis()
            );
        }
        self.live.store(settings);
        log::info!(
            "reloaded: max {} packets per tick, debug {}",
            settings.max_packets,
            settings.debug
        );
    }
    /// The recipient disconnected. Anything still queued for it is dropped.
    pub fn on_recipient_gone(&self, recipient: RecipientId) {
        match self.registry.remove(recipient) {
            Some(0) => log::debug!("forgot {recipient}"),
            Some(dropped) => log::debug!("forgot {recipient}, dropping {dropped} queued packets"),
            None => {}
        }
    }
    /// The recipient now stands in chunk `pos`. Under proximity ordering its queue is
    /// re-sorted around the new chunk.
    pub fn on_recipient_moved(&self, recipient: RecipientId, pos: ChunkPos) {
        let state = self.registry.get_or_create(recipient);
        let old = state.set_position(pos);
        if old != pos && self.registry.order() == QueueOrder::Proximity && !state.overflow().is_empty() {
            state.overflow().recenter(pos);
            verbose!(self.live, trace, "re-sorted queue of {recipient} around {},{}", pos.x, pos.z);
        }
    }
    /// Packets currently deferred for `recipient`.
    pub fn queued(&self, recipient: RecipientId) -> usize {
        self.registry.get(recipient).map_or(0, |s| s.overflow().len())
    }
    pub fn total_queued(&self) -> usize {
        let mut total = 0;
        self.registry.for_each(|_, state| total += state.overflow().len());
        total
    }
    pub fn tracked_recipients(&self) -> usize {
        self.registry.len()
    }
    pub fn state(&self, recipient: RecipientId) -> Option<Arc<RecipientState<P>>> {
        self.registry.get(recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn chunk(x: i32, z: i32) -> ChunkPacket {
        ChunkPacket::new(ChunkPos::new(x, z), vec![])
    }

    #[test]
    fn settings_reflect_construction() {
        let settings = Settings {
            max_packets: 4,
            order: QueueOrder::Proximity,
            max_queued: Some(9),
            when_full: WhenFull::DropOldest,
            tick: Duration::from_millis(20),
            ..Settings::default()
        };
        let limiter = Limiter::<ChunkPacket>::new(settings.clone());
        assert_eq!(limiter.settings(), settings);
    }

    #[test]
    fn reload_keeps_fixed_settings() {
        let limiter = Limiter::<ChunkPacket>::new(Settings::default());
        limiter.reload(&Settings {
            max_packets: 2,
            debug: true,
            order: QueueOrder::Proximity,
            tick: Duration::from_secs(1),
            ..Settings::default()
        });
        let now = limiter.settings();
        assert_eq!(now.max_packets, 2);
        assert!(now.debug);
        assert_eq!(now.order, QueueOrder::Fifo);
        assert_eq!(now.tick, Settings::default().tick);
    }

    #[test]
    fn moving_resorts_a_proximity_queue() {
        let limiter = Limiter::new(Settings {
            max_packets: 1,
            order: QueueOrder::Proximity,
            ..Settings::default()
        });
        let me = RecipientId(1);
        limiter.on_outbound_message(me, &chunk(0, 0));
        limiter.on_outbound_message(me, &chunk(0, 0));
        limiter.on_outbound_message(me, &chunk(8, 0));
        limiter.on_recipient_moved(me, ChunkPos::new(8, 0));
        let state = limiter.state(me).unwrap();
        assert_eq!(state.overflow().pop_first(), Some(chunk(8, 0)));
        assert_eq!(state.overflow().pop_first(), Some(chunk(0, 0)));
    }

    #[test]
    fn gone_recipients_are_forgotten() {
        let limiter = Limiter::new(Settings { max_packets: 1, ..Settings::default() });
        let me = RecipientId(5);
        for x in 0..5 {
            limiter.on_outbound_message(me, &chunk(x, 0));
        }
        assert_eq!(limiter.queued(me), 4);
        assert_eq!(limiter.total_queued(), 4);
        limiter.on_recipient_gone(me);
        limiter.on_recipient_gone(me);
        assert_eq!(limiter.queued(me), 0);
        assert_eq!(limiter.tracked_recipients(), 0);
    }
}
