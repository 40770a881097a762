use pinmesh_economics::TokenAmount;
use serde::{Deserialize, Serialize};

/// Tunable marketplace parameters.
///
/// Mutated only through admin operations; changes apply to subsequent
/// operations only. Existing slots keep their escrow and already-registered
/// pinners keep the stake held at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceParams {
    /// Non-refundable platform fee charged per pin request.
    pub pin_fee: TokenAmount,
    /// Non-refundable registration fee charged when a pinner joins.
    pub join_fee: TokenAmount,
    /// Minimum redundancy units per request.
    pub min_units: u32,
    /// Floor for the offered price per unit.
    pub min_price_per_unit: TokenAmount,
    /// Refundable stake a pinner posts at registration.
    pub pinner_stake: TokenAmount,
    /// Slot lifetime in epochs before it becomes reclaimable.
    pub epochs_to_live: u32,
    /// Flag count at which a pinner is deactivated and its stake forfeited.
    pub flag_threshold: u32,
}

impl Default for ServiceParams {
    fn default() -> Self {
        Self {
            pin_fee: TokenAmount::from_base_units(5),
            join_fee: TokenAmount::from_base_units(20),
            min_units: 1,
            min_price_per_unit: TokenAmount::from_base_units(1),
            pinner_stake: TokenAmount::from_base_units(1000),
            epochs_to_live: 2,
            flag_threshold: 5,
        }
    }
}
