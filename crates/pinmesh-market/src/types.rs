use pinmesh_economics::{AccountAddress, TokenAmount};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed size of the reusable request pool. The pool never grows: this bound
/// is what keeps storage and enumeration cost constant regardless of volume.
pub const NUM_SLOTS: usize = 10;

/// Epoch length in host ticks. A compile-time constant so expiration windows
/// stay predictable across configuration changes.
pub const EPOCH_LENGTH: u64 = 12;

/// Fixed-size fingerprint of a content identifier.
///
/// Slots store the digest instead of the identifier itself, bounding the
/// persisted footprint regardless of identifier length; the full identifier
/// travels only on the discovery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn from_cid(cid: &str) -> Self {
        Self(*blake3::hash(cid.as_bytes()).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// One active pin request occupying a pool index.
///
/// A `PinSlot` exists in the pool if and only if the request is active;
/// expiration is a derived predicate over `created_tick`, never a stored flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSlot {
    pub publisher: AccountAddress,
    pub content_digest: ContentDigest,
    pub price_per_unit: TokenAmount,
    pub units: u32,
    pub units_remaining: u32,
    pub escrow_balance: TokenAmount,
    pub created_tick: u64,
    /// Pinners that have already claimed a unit, in claim order.
    pub claims: Vec<AccountAddress>,
}

impl PinSlot {
    pub fn has_claimed(&self, pinner: &AccountAddress) -> bool {
        self.claims.contains(pinner)
    }
}

/// A registered service provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pinner {
    pub address: AccountAddress,
    /// Peer identity of the provider's pinning daemon.
    pub node_id: String,
    /// Dialable multiaddr for content transfer.
    pub multiaddr: String,
    /// Advertised price floor; discovery metadata, not enforced on claims.
    pub min_price: TokenAmount,
    pub joined_at: i64,
    pub pins_completed: u64,
    pub flags: u32,
    pub staked: TokenAmount,
    pub active: bool,
}

/// Sparse view of the slot table: (index, slot) for every occupied index.
pub type SlotView = Vec<(usize, PinSlot)>;
