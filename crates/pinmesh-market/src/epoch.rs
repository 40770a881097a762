use crate::types::EPOCH_LENGTH;

/// Derives epoch numbers from the host's monotonic tick counter.
///
/// Pure: holds only the tick recorded at coordinator start. Slot age is
/// measured in whole epochs so expiry never depends on a stored absolute
/// deadline.
#[derive(Debug, Clone, Copy)]
pub struct EpochClock {
    start_tick: u64,
}

impl EpochClock {
    pub fn new(start_tick: u64) -> Self {
        Self { start_tick }
    }

    pub fn start_tick(&self) -> u64 {
        self.start_tick
    }

    pub fn epoch_at(&self, tick: u64) -> u64 {
        tick.saturating_sub(self.start_tick) / EPOCH_LENGTH
    }

    /// Expiration predicate: true once `epochs_to_live` whole epochs separate
    /// the creation epoch from the current one. Evaluated on read; never
    /// stored.
    pub fn is_expired(&self, created_tick: u64, current_tick: u64, epochs_to_live: u32) -> bool {
        self.epoch_at(current_tick)
            .saturating_sub(self.epoch_at(created_tick))
            >= epochs_to_live as u64
    }
}
