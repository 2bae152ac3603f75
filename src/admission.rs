use crate::limiter::Limiter;
use crate::prelude::*;
use crate::registry::RecipientState;

impl<P: Packet> Limiter<P> {
    /// Decides whether `packet` may go out to `recipient` this tick.
    ///
    /// Called for every candidate packet before it reaches the network. On
    /// [`Decision::Defer`] a copy of the packet has been queued for redelivery and the
    /// caller must suppress the original send. Never blocks on other recipients.
    ///
    /// A packet deferred while its recipient is being forgotten is dropped with the
    /// rest of that recipient's queue.
    pub fn on_outbound_message(&self, recipient: RecipientId, packet: &P) -> Decision {
        let state = self.registry.get_or_create(recipient);
        let sent_in_tick = state.record(packet);
        if sent_in_tick <= self.live.max_packets() {
            return Decision::Admit;
        }
        verbose!(self.live, trace, "Cancelling chunk packet to {recipient} ({sent_in_tick} this tick)");
        self.defer(recipient, &state, packet);
        Decision::Defer
    }

    fn defer(&self, recipient: RecipientId, state: &RecipientState<P>, packet: &P) {
        if let Some(shed) = state.overflow().push(packet.clone(), state.position(), self.live.bound()) {
            state.note_shed();
            log::trace!("queue for {recipient} full, shed packet for {:?}", shed.chunk());
        }
        if state.is_retired() {
            let dropped = state.overflow().clear();
            log::trace!("{recipient} left while deferring, dropped {dropped} packets");
        }
    }
}
