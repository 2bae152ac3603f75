use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::limiter::Limiter;
use crate::prelude::*;

/// Puts a previously deferred packet on the wire.
pub trait Deliver<P> {
    fn deliver(&mut self, recipient: RecipientId, packet: P) -> Result<(), DeliveryError>;
}
impl<P, F> Deliver<P> for F
where
    F: FnMut(RecipientId, P) -> Result<(), DeliveryError>,
{
    fn deliver(&mut self, recipient: RecipientId, packet: P) -> Result<(), DeliveryError> {
        self(recipient, packet)
    }
}

/// What one drain cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Recipients visited.
    pub recipients: usize,
    pub redelivered: usize,
    pub failed: usize,
    /// Packets thrown away by bounded queues since the previous cycle.
    pub shed: usize,
    /// Redeliveries per recipient, only for recipients that got at least one.
    pub per_recipient: Vec<(RecipientId, usize)>,
}

impl<P: Packet> Limiter<P> {
    /// Runs one drain cycle: opens a fresh tick for every recipient, then redelivers up
    /// to `max-packets-per-tick` deferred packets per recipient.
    ///
    /// Redeliveries count against the new tick and share its budget with packets admitted
    /// while the cycle runs. A recipient whose budget is already spent keeps its queue
    /// until the next cycle. A failed delivery is logged and not retried.
    pub fn drain_cycle(&self, deliver: &mut impl Deliver<P>) -> DrainReport {
        let max_packets = self.live.max_packets();
        let mut report = DrainReport::default();

        // every ledger is reset before anything is resent
        self.registry.for_each(|_, state| state.reset_tick());

        self.registry.for_each(|recipient, state| {
            report.recipients += 1;
            let shed = state.take_shed();
            if shed != 0 {
                log::warn!("overflow queue for {recipient} is full, dropped {shed} packets");
                report.shed += shed;
            }
            let mut attempts = 0;
            let mut resent = 0;
            while attempts < max_packets && !state.is_retired() {
                // the slot is reserved before the packet leaves the queue, so admissions
                // racing this cycle share the same budget
                let Some(packet) = state
                    .overflow()
                    .pop_first_if(|packet| state.try_record(packet, max_packets).is_some())
                else {
                    break;
                };
                attempts += 1;
                let chunk = packet.chunk();
                verbose!(self.live, trace, "Resending packet for {chunk:?} to {recipient}");
                match deliver.deliver(recipient, packet) {
                    Ok(()) => resent += 1,
                    Err(DeliveryError::Disconnected(_)) => {
                        log::debug!("{recipient} went away mid-drain, packet for {chunk:?} dropped");
                        report.failed += 1;
                        break;
                    }
                    Err(e) => {
                        log::warn!("failed to resend packet for {chunk:?} to {recipient}: {e}");
                        report.failed += 1;
                    }
                }
            }
            if resent != 0 {
                verbose!(self.live, debug, "Resent {resent} packets to {recipient}");
                report.redelivered += resent;
                report.per_recipient.push((recipient, resent));
            }
        });
        report
    }
}

/// Background thread running [`Limiter::drain_cycle`] once per tick.
///
/// Cycles are scheduled at fixed offsets from the previous due time. If a cycle starts
/// a whole interval late, the lag is logged and the schedule restarts from now rather
/// than running the missed cycles back to back.
#[derive(Debug)]
pub struct DrainScheduler {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DrainScheduler {
    pub fn spawn<P, D>(limiter: Arc<Limiter<P>>, mut deliver: D, interval: Duration) -> std::io::Result<Self>
    where
        P: Packet,
        D: Deliver<P> + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = std::thread::Builder::new()
            .name("chunkgate-drain".into())
            .spawn(move || {
                let mut next_due = Instant::now() + interval;
                loop {
                    match stopped.recv_timeout(next_due.saturating_duration_since(Instant::now())) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let now = Instant::now();
                    let late = now.saturating_duration_since(next_due);
                    if late >= interval {
                        let missed = late.as_nanos() / interval.as_nanos();
                        log::warn!("drain cycle is {missed} ticks behind ({}ms), rescheduling from now", late.as_millis());
                        next_due = now;
                    }
                    let report = limiter.drain_cycle(&mut deliver);
                    if report.failed != 0 {
                        log::debug!("drain cycle: {} resent, {} failed", report.redelivered, report.failed);
                    }
                    next_due += interval;
                }
                log::debug!("drain scheduler stopped");
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
    /// Stops the thread after its current cycle and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }
    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("drain scheduler panicked");
            }
        }
    }
}
impl Drop for DrainScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
