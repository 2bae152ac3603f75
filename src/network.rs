//! In-process transport standing in for the game's connection layer.
//!
//! Hands out recipient ids from a slot map, the same way the server numbers its clients,
//! and keeps per-client traffic counters instead of writing to sockets.
use parking_lot::Mutex;

use crate::prelude::*;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub packets: u64,
    pub bytes: u64,
}

#[derive(Debug)]
struct Client {
    name: String,
    stats: TrafficStats,
}

#[derive(Debug, Default)]
pub struct Network {
    clients: Mutex<SlotMap<Client>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn connect(&self, name: impl Into<String>) -> RecipientId {
        let name = name.into();
        let idx = self.clients.lock().insert(Client {
            name: name.clone(),
            stats: TrafficStats::default(),
        });
        log::debug!("{name} connected as {idx}");
        RecipientId(idx as u64)
    }
    /// Returns false if `id` was not connected.
    pub fn disconnect(&self, id: RecipientId) -> bool {
        match self.clients.lock().release(id.0 as usize) {
            Some(client) => {
                log::debug!(
                    "{} disconnected after {} packets ({}kb)",
                    client.name,
                    client.stats.packets,
                    client.stats.bytes / 1024
                );
                true
            }
            None => false,
        }
    }
    pub fn is_connected(&self, id: RecipientId) -> bool {
        self.clients.lock().contains(id.0 as usize)
    }
    pub fn name(&self, id: RecipientId) -> Option<String> {
        self.clients.lock().get(id.0 as usize).map(|c| c.name.clone())
    }
    pub fn transmit(&self, id: RecipientId, packet: &ChunkPacket) -> Result<(), DeliveryError> {
        let mut clients = self.clients.lock();
        let client = clients.get(id.0 as usize).ok_or(DeliveryError::Disconnected(id))?;
        client.stats.packets += 1;
        client.stats.bytes += packet.payload.len() as u64;
        log::trace!("Forwarding chunk {},{} to {} {}b", packet.pos.x, packet.pos.z, client.name, packet.payload.len());
        Ok(())
    }
    pub fn stats(&self, id: RecipientId) -> Option<TrafficStats> {
        self.clients.lock().get(id.0 as usize).map(|c| c.stats.clone())
    }
    pub fn connected(&self) -> usize {
        self.clients.lock().len()
    }
    /// Traffic summed over every connected client.
    pub fn totals(&self) -> TrafficStats {
        self.clients.lock().iter().fold(TrafficStats::default(), |mut total, (_, c)| {
            total.packets += c.stats.packets;
            total.bytes += c.stats.bytes;
            total
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(bytes: usize) -> ChunkPacket {
        ChunkPacket::new(ChunkPos::new(0, 0), vec![0u8; bytes])
    }

    #[test]
    fn transmit_counts_per_client() {
        let network = Network::new();
        let alex = network.connect("alex");
        let sam = network.connect("sam");
        network.transmit(alex, &chunk(100)).unwrap();
        network.transmit(alex, &chunk(50)).unwrap();
        network.transmit(sam, &chunk(1)).unwrap();
        assert_eq!(network.stats(alex), Some(TrafficStats { packets: 2, bytes: 150 }));
        assert_eq!(network.totals(), TrafficStats { packets: 3, bytes: 151 });
        assert_eq!(network.name(sam).as_deref(), Some("sam"));
    }

    #[test]
    fn transmit_to_a_departed_client_fails() {
        let network = Network::new();
        let alex = network.connect("alex");
        assert!(network.disconnect(alex));
        assert!(!network.disconnect(alex));
        assert!(matches!(
            network.transmit(alex, &chunk(1)),
            Err(DeliveryError::Disconnected(id)) if id == alex
        ));
    }

    #[test]
    fn reconnect_reuses_the_slot_with_fresh_stats() {
        let network = Network::new();
        let alex = network.connect("alex");
        network.transmit(alex, &chunk(10)).unwrap();
        network.disconnect(alex);
        let sam = network.connect("sam");
        assert_eq!(sam, alex);
        assert_eq!(network.stats(sam), Some(TrafficStats::default()));
        assert_eq!(network.connected(), 1);
    }
}
