/// Dense storage with stable indices. Released slots are threaded onto a free list
/// and handed out again by later inserts, most recently released first.
#[derive(Debug)]
pub struct SlotMap<T> {
    head: u32,
    len: usize,
    entries: Vec<Slot<T>>,
}
#[derive(Debug)]
enum Slot<T> {
    Occupied(T),
    Vacant { next_free: u32 },
}
const NONE: u32 = u32::MAX;

impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self {
            head: NONE,
            len: 0,
            entries: vec![],
        }
    }
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn get(&mut self, i: usize) -> Option<&mut T> {
        match self.entries.get_mut(i) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }
    pub fn contains(&self, i: usize) -> bool {
        matches!(self.entries.get(i), Some(Slot::Occupied(_)))
    }
    pub fn next_idx(&self) -> usize {
        if self.head == NONE {
            self.entries.len()
        } else {
            self.head as usize
        }
    }
    pub fn insert(&mut self, value: T) -> usize {
        self.len += 1;
        if self.head == NONE {
            self.entries.push(Slot::Occupied(value));
            return self.entries.len() - 1;
        }
        let id = self.head as usize;
        match core::mem::replace(&mut self.entries[id], Slot::Occupied(value)) {
            Slot::Vacant { next_free } => self.head = next_free,
            Slot::Occupied(_) => unreachable!("free list points at an occupied slot"),
        }
        id
    }
    pub fn release(&mut self, i: usize) -> Option<T> {
        let slot = self.entries.get_mut(i)?;
        if let Slot::Vacant { .. } = slot {
            return None;
        }
        let Slot::Occupied(v) = core::mem::replace(slot, Slot::Vacant { next_free: self.head }) else {
            unreachable!()
        };
        self.head = i as u32;
        self.len -= 1;
        Some(v)
    }
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied(v) => Some((i, v)),
            Slot::Vacant { .. } => None,
        })
    }
}
impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        Self::new()
    }
}
