mod overflow;
mod slotmap;

pub use overflow::OverflowQueue;
pub use slotmap::SlotMap;
