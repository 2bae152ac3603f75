//! Operator-facing configuration.
//!
//! The config file is JSON with kebab-case keys:
//!
//! ```json
//! {
//!     "max-packets-per-tick": 15,
//!     "debug": false,
//!     "ordering": "proximity",
//!     "max-queued-per-recipient": 4096,
//!     "when-full": "drop-oldest",
//!     "tick-millis": 50
//! }
//! ```
//!
//! Every key is optional. Nonsensical values are replaced by their default and a
//! warning is logged; they are never an error.
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering::Relaxed};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_MAX_PACKETS: usize = 15;
pub const DEFAULT_TICK: Duration = Duration::from_millis(50);

/// How deferred packets are ordered for redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueOrder {
    /// Redeliver in the order packets were deferred.
    #[default]
    Fifo,
    /// Redeliver the chunks closest to the recipient first.
    Proximity,
}

/// What a bounded overflow queue throws away when it is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WhenFull {
    /// Evict the packet that has been waiting longest.
    DropOldest,
    /// Refuse the packet being deferred.
    #[default]
    DropNewest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
struct RawConfig {
    max_packets_per_tick: i64,
    debug: bool,
    ordering: QueueOrder,
    max_queued_per_recipient: Option<u64>,
    when_full: WhenFull,
    tick_millis: u64,
}
impl Default for RawConfig {
    fn default() -> Self {
        Self {
            max_packets_per_tick: DEFAULT_MAX_PACKETS as i64,
            debug: false,
            ordering: QueueOrder::default(),
            max_queued_per_recipient: None,
            when_full: WhenFull::default(),
            tick_millis: DEFAULT_TICK.as_millis() as u64,
        }
    }
}

/// Validated settings. Construct with [`Settings::default`] and struct update syntax,
/// or load them from a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Packets a single recipient may receive per tick. Always at least 1.
    pub max_packets: usize,
    /// Promotes per-packet tracing to `info` level.
    pub debug: bool,
    pub order: QueueOrder,
    /// Per-recipient cap on deferred packets. `None` means unbounded.
    pub max_queued: Option<usize>,
    pub when_full: WhenFull,
    /// Interval between drain cycles.
    pub tick: Duration,
}
impl Default for Settings {
    fn default() -> Self {
        Self {
            max_packets: DEFAULT_MAX_PACKETS,
            debug: false,
            order: QueueOrder::Fifo,
            max_queued: None,
            when_full: WhenFull::DropNewest,
            tick: DEFAULT_TICK,
        }
    }
}
impl Settings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(text).map(Self::sanitize)
    }

    /// Reads the config at `path`. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("no config found at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path: path.to_owned(), source }),
        };
        Self::from_json(&text).map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }

    fn sanitize(raw: RawConfig) -> Self {
        let max_packets = match usize::try_from(raw.max_packets_per_tick) {
            Ok(n) if n >= 1 => n,
            _ => {
                log::warn!(
                    "Illegal value for option `max-packets-per-tick`: {}. Using default value of {}",
                    raw.max_packets_per_tick,
                    DEFAULT_MAX_PACKETS
                );
                DEFAULT_MAX_PACKETS
            }
        };
        let max_queued = match raw.max_queued_per_recipient {
            Some(0) => {
                log::warn!("Illegal value for option `max-queued-per-recipient`: 0. Leaving queues unbounded");
                None
            }
            Some(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
            None => None,
        };
        let tick = if raw.tick_millis == 0 {
            log::warn!(
                "Illegal value for option `tick-millis`: 0. Using default value of {}",
                DEFAULT_TICK.as_millis()
            );
            DEFAULT_TICK
        } else {
            Duration::from_millis(raw.tick_millis)
        };
        Self {
            max_packets,
            debug: raw.debug,
            order: raw.ordering,
            max_queued,
            when_full: raw.when_full,
            tick,
        }
    }
}

/// The reloadable part of [`Settings`], readable from the admission path without locking.
#[derive(Debug)]
pub(crate) struct LiveSettings {
    max_packets: AtomicUsize,
    debug: AtomicBool,
    // 0 is unbounded
    max_queued: AtomicUsize,
    when_full: AtomicU8,
}
impl LiveSettings {
    pub(crate) fn new(settings: &Settings) -> Self {
        let live = Self {
            max_packets: AtomicUsize::new(DEFAULT_MAX_PACKETS),
            debug: AtomicBool::new(false),
            max_queued: AtomicUsize::new(0),
            when_full: AtomicU8::new(0),
        };
        live.store(settings);
        live
    }
    pub(crate) fn store(&self, settings: &Settings) {
        self.max_packets.store(settings.max_packets.max(1), Relaxed);
        self.debug.store(settings.debug, Relaxed);
        self.max_queued.store(settings.max_queued.unwrap_or(0), Relaxed);
        self.when_full.store(
            match settings.when_full {
                WhenFull::DropNewest => 0,
                WhenFull::DropOldest => 1,
            },
            Relaxed,
        );
    }
    pub(crate) fn max_packets(&self) -> usize {
        self.max_packets.load(Relaxed)
    }
    pub(crate) fn debug(&self) -> bool {
        self.debug.load(Relaxed)
    }
    pub(crate) fn when_full(&self) -> WhenFull {
        match self.when_full.load(Relaxed) {
            0 => WhenFull::DropNewest,
            _ => WhenFull::DropOldest,
        }
    }
    pub(crate) fn bound(&self) -> Option<(usize, WhenFull)> {
        match self.max_queued.load(Relaxed) {
            0 => None,
            cap => Some((cap, self.when_full())),
        }
    }
}
