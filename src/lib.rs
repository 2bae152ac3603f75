//! Per-recipient packet throttling for a fixed-rate server loop.
//!
//! Every outbound chunk packet passes through [`Limiter::on_outbound_message`]. Once a
//! recipient has been sent `max-packets-per-tick` packets in the current tick, further
//! packets are deferred into that recipient's overflow queue instead of hitting the
//! network. A [`DrainScheduler`] runs once per tick, opens a fresh budget for every
//! recipient and redelivers up to that budget from each queue.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkgate::{ChunkPacket, ChunkPos, Decision, DeliveryError, DrainScheduler, Limiter, RecipientId, Settings};
//!
//! let settings = Settings::load("chunkgate.json")?;
//! let limiter = Arc::new(Limiter::<ChunkPacket>::new(settings.clone()));
//! let resend = |_to: RecipientId, _packet: ChunkPacket| -> Result<(), DeliveryError> {
//!     // hand the packet back to the transport
//!     Ok(())
//! };
//! let scheduler = DrainScheduler::spawn(limiter.clone(), resend, settings.tick)?;
//!
//! let packet = ChunkPacket::new(ChunkPos::new(0, 0), vec![]);
//! if limiter.on_outbound_message(RecipientId(1), &packet) == Decision::Admit {
//!     // send it now
//! }
//! scheduler.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Per-packet tracing. Logged at `info` when the `debug` option is on, at the given level otherwise.
macro_rules! verbose {
    ($live:expr, $level:ident, $($arg:tt)+) => {
        if $live.debug() {
            log::info!("[debug] {}", format_args!($($arg)+));
        } else {
            log::$level!($($arg)+);
        }
    };
}

mod admission;
mod collections;
pub mod config;
mod drain;
pub mod error;
mod limiter;
pub mod network;
pub mod registry;
pub mod types;
pub mod world;

pub use collections::{OverflowQueue, SlotMap};
pub use config::{QueueOrder, Settings, WhenFull};
pub use drain::{Deliver, DrainReport, DrainScheduler};
pub use error::{ConfigError, DeliveryError};
pub use limiter::Limiter;
pub use network::Network;
pub use registry::{Counting, RecipientState, StateRegistry};
pub use types::{ChunkPacket, ChunkPos, Decision, Packet, RecipientId};
pub use world::World;

mod prelude {
    pub(crate) use crate::collections::*;
    pub(crate) use crate::config::{QueueOrder, Settings, WhenFull};
    pub(crate) use crate::error::DeliveryError;
    pub(crate) use crate::types::*;
}
