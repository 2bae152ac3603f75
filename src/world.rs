use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::prelude::*;

// A world of players wandering over an endless flat map. It exists to produce the
// bursty chunk traffic a real server makes: a full view square when someone joins,
// and a fresh edge of chunks every time someone crosses a chunk border.
//
// Nothing here knows about throttling. Every packet goes out through the `emit`
// callback and it is up to the caller what happens to it.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Joined(RecipientId),
    Moved(RecipientId, ChunkPos),
    Packet(RecipientId, ChunkPacket),
    Left(RecipientId),
}

#[derive(Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct Heightmaps {
    motion_blocking: fastnbt::LongArray,
}

#[derive(Debug, Clone)]
struct Player {
    id: RecipientId,
    name: String,
    position: (f64, f64),
    view_distance: u8,
    loaded: HashSet<ChunkPos>,
}
impl Player {
    fn chunk(&self) -> ChunkPos {
        ChunkPos::containing(self.position.0, self.position.1)
    }
}

#[derive(Debug, Default)]
pub struct World {
    players: Vec<Player>,
    payloads: HashMap<ChunkPos, Arc<[u8]>>,
    tick: u32,
    speed: f64,
}

/// Blocks per tick, about a sprint-flying player.
const DEFAULT_SPEED: f64 = 1.2;
/// Ticks between changes of direction.
const WANDER_PERIOD: u32 = 100;

impl World {
    pub fn new() -> Self {
        Self::with_speed(DEFAULT_SPEED)
    }
    pub fn with_speed(speed: f64) -> Self {
        Self {
            speed,
            ..Self::default()
        }
    }
    pub fn next_tick(&self) -> u32 {
        self.tick + 1
    }
    pub fn current_tick(&self) -> u32 {
        self.tick
    }
    pub fn players(&self) -> impl Iterator<Item = (RecipientId, &str)> + '_ {
        self.players.iter().map(|p| (p.id, p.name.as_str()))
    }
    pub fn player_chunk(&self, id: RecipientId) -> Option<ChunkPos> {
        self.players.iter().find(|p| p.id == id).map(Player::chunk)
    }
    /// Spawns a player at the origin and streams its whole view square, nearest ring first.
    pub fn login(&mut self, id: RecipientId, name: &str, view_distance: u8, emit: &mut impl FnMut(WorldEvent)) {
        let mut player = Player {
            id,
            name: name.to_owned(),
            position: (8.0, 8.0),
            view_distance,
            loaded: HashSet::new(),
        };
        emit(WorldEvent::Joined(id));
        emit(WorldEvent::Moved(id, player.chunk()));
        let center = player.chunk();
        for layer in 0..=view_distance as i32 {
            for pos in ring(center, layer) {
                self.load_chunk(&mut player, pos, emit);
            }
        }
        log::debug!("{name} joined with view distance {view_distance}");
        self.players.retain(|p| p.id != id);
        self.players.push(player);
    }
    pub fn logout(&mut self, id: RecipientId, emit: &mut impl FnMut(WorldEvent)) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        let left = self.players.len() != before;
        if left {
            emit(WorldEvent::Left(id));
        }
        left
    }
    pub fn tick_until(&mut self, tickn: u32, emit: &mut impl FnMut(WorldEvent)) {
        while self.tick < tickn {
            self.tick(emit);
            self.tick += 1;
        }
    }
    fn tick(&mut self, emit: &mut impl FnMut(WorldEvent)) {
        let mut players = core::mem::take(&mut self.players);
        for player in &mut players {
            self.walk(player, emit);
        }
        self.players = players;
    }
    fn walk(&mut self, player: &mut Player, emit: &mut impl FnMut(WorldEvent)) {
        // every player wanders off in its own direction, turning now and then
        let leg = (self.tick / WANDER_PERIOD) as u64;
        let degrees = player.id.0.wrapping_mul(37).wrapping_add(leg.wrapping_mul(91)) % 360;
        let heading = (degrees as f64).to_radians();
        let old_chunk = player.chunk();
        player.position.0 += heading.cos() * self.speed;
        player.position.1 += heading.sin() * self.speed;
        let chunk = player.chunk();
        if chunk == old_chunk {
            return;
        }
        emit(WorldEvent::Moved(player.id, chunk));
        let view_distance = player.view_distance as i32;
        player.loaded.retain(|pos| {
            (pos.x - chunk.x).abs() <= view_distance && (pos.z - chunk.z).abs() <= view_distance
        });
        for x in -view_distance..=view_distance {
            for z in -view_distance..=view_distance {
                let pos = ChunkPos::new(chunk.x + x, chunk.z + z);
                if !player.loaded.contains(&pos) {
                    self.load_chunk(player, pos, emit);
                }
            }
        }
    }
    fn load_chunk(&mut self, player: &mut Player, pos: ChunkPos, emit: &mut impl FnMut(WorldEvent)) {
        if !player.loaded.insert(pos) {
            return;
        }
        let payload = self.payloads.entry(pos).or_insert_with(|| heightmap(pos)).clone();
        emit(WorldEvent::Packet(player.id, ChunkPacket { pos, payload }));
    }
    /// Payloads are cached per chunk for as long as the world lives.
    pub fn cached_chunks(&self) -> usize {
        self.payloads.len()
    }
}

/// The chunks at Chebyshev distance `layer` from `center`.
fn ring(center: ChunkPos, layer: i32) -> Vec<ChunkPos> {
    if layer == 0 {
        return vec![center];
    }
    let mut out = Vec::with_capacity(8 * layer as usize);
    for x in -layer..=layer {
        out.push(ChunkPos::new(center.x + x, center.z + layer));
        out.push(ChunkPos::new(center.x + x, center.z - layer));
    }
    for z in 1 - layer..layer {
        out.push(ChunkPos::new(center.x + layer, center.z + z));
        out.push(ChunkPos::new(center.x - layer, center.z + z));
    }
    out
}

fn heightmap(pos: ChunkPos) -> Arc<[u8]> {
    // 256 nine-bit heights packed seven to a long
    let seed = (pos.x as i64).wrapping_mul(31) ^ (pos.z as i64).wrapping_mul(17);
    let heights = (0..((256 / (64 / 9)) + 1)).map(|i| seed.wrapping_mul(i + 1)).collect();
    let mut buf = Vec::<u8>::with_capacity(320);
    if let Err(e) = fastnbt::to_writer(&mut buf, &Heightmaps {
        motion_blocking: fastnbt::LongArray::new(heights),
    }) {
        log::error!("unable to encode heightmap for {},{}: {e}", pos.x, pos.z);
        buf.clear();
    }
    buf.into()
}
