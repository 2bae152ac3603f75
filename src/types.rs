use std::hash::Hash;
use std::sync::Arc;

/// Stable handle for a connected client. Released slots can hand the same id to a new connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecipientId(pub u64);

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}
impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
    /// Chunk containing the block column at `(x, z)`.
    pub fn containing(x: f64, z: f64) -> Self {
        Self::new((x / 16.0).floor() as i32, (z / 16.0).floor() as i32)
    }
    /// Squared distance between two chunks, saturating at `u64::MAX`.
    pub fn distance_sq(self, other: ChunkPos) -> u64 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dz = (self.z as i64 - other.z as i64).unsigned_abs();
        (dx * dx).saturating_add(dz * dz)
    }
    pub(crate) fn pack(self) -> u64 {
        (self.x as u32 as u64) << 32 | self.z as u32 as u64
    }
    pub(crate) fn unpack(packed: u64) -> Self {
        Self::new((packed >> 32) as u32 as i32, packed as u32 as i32)
    }
}

/// An outbound message the limiter can count, hold and hand back unchanged.
///
/// The only thing ever read out of a packet is its chunk coordinate, and only
/// when the overflow queue orders by proximity.
pub trait Packet: Clone + Eq + Hash + Send + Sync + 'static {
    fn chunk(&self) -> Option<ChunkPos>;
}

/// A full chunk column sent to a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkPacket {
    pub pos: ChunkPos,
    pub payload: Arc<[u8]>,
}
impl ChunkPacket {
    pub fn new(pos: ChunkPos, payload: impl Into<Arc<[u8]>>) -> Self {
        Self { pos, payload: payload.into() }
    }
}
impl Packet for ChunkPacket {
    fn chunk(&self) -> Option<ChunkPos> {
        Some(self.pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Let the packet through to the network now.
    Admit,
    /// The packet has been queued; the caller must suppress the original send.
    Defer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_squared_euclidean() {
        assert_eq!(ChunkPos::new(0, 0).distance_sq(ChunkPos::new(3, 4)), 25);
        assert_eq!(ChunkPos::new(-2, 5).distance_sq(ChunkPos::new(-2, 5)), 0);
    }

    #[test]
    fn distance_does_not_overflow_at_extremes() {
        let far = ChunkPos::new(i32::MIN, 0).distance_sq(ChunkPos::new(i32::MAX, 0));
        assert_eq!(far, (u32::MAX as u64).pow(2));
        let corner = ChunkPos::new(i32::MIN, i32::MIN).distance_sq(ChunkPos::new(i32::MAX, i32::MAX));
        assert_eq!(corner, u64::MAX);
    }

    #[test]
    fn pack_preserves_negative_coordinates() {
        for pos in [ChunkPos::new(-1, 7), ChunkPos::new(i32::MIN, i32::MAX), ChunkPos::new(0, -30)] {
            assert_eq!(ChunkPos::unpack(pos.pack()), pos);
        }
    }

    #[test]
    fn containing_floors_negative_blocks() {
        assert_eq!(ChunkPos::containing(-0.5, 15.9), ChunkPos::new(-1, 0));
        assert_eq!(ChunkPos::containing(16.0, -16.0), ChunkPos::new(1, -1));
    }
}
