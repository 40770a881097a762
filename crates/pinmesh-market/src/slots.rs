//! Slot table helpers.
//!
//! The pool is a fixed-size array of optional records indexed by small
//! integers; an index either holds one active [`PinSlot`] or is free. The
//! helpers here are pure functions over that table so the coordinator can
//! evaluate them under a single lock acquisition.

use crate::epoch::EpochClock;
use crate::types::{ContentDigest, PinSlot, NUM_SLOTS};

pub type SlotTable = [Option<PinSlot>; NUM_SLOTS];

pub fn empty_table() -> SlotTable {
    Default::default()
}

/// First index (ascending) that is free or holds an expired slot. The scan
/// order is fixed so slot assignment is deterministic for a given call
/// sequence.
pub fn find_available_index(
    table: &SlotTable,
    clock: &EpochClock,
    current_tick: u64,
    epochs_to_live: u32,
) -> Option<usize> {
    table.iter().position(|entry| match entry {
        None => true,
        Some(slot) => clock.is_expired(slot.created_tick, current_tick, epochs_to_live),
    })
}

/// True when an active, unexpired slot already holds this digest.
pub fn has_duplicate_digest(
    table: &SlotTable,
    digest: &ContentDigest,
    clock: &EpochClock,
    current_tick: u64,
    epochs_to_live: u32,
) -> bool {
    table.iter().flatten().any(|slot| {
        slot.content_digest == *digest
            && !clock.is_expired(slot.created_tick, current_tick, epochs_to_live)
    })
}

pub fn occupied_count(table: &SlotTable) -> usize {
    table.iter().flatten().count()
}
