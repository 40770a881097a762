//! Fund accounting for the pinmesh marketplace.
//!
//! - [`BalanceManager`]: per-account balances on a pluggable storage backend
//! - [`EscrowLedger`]: the market account, escrow pool, and platform fee counter
//! - [`storage::MemoryStorage`]: in-memory backend with snapshot transactions

pub mod balance;
pub mod escrow;
pub mod storage;
pub mod types;

pub use balance::BalanceManager;
pub use escrow::EscrowLedger;
pub use storage::{LedgerStorage, MemoryStorage};
pub use types::{AccountAddress, TokenAmount};
