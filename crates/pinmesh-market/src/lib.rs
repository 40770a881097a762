//! Decentralized pinning marketplace coordinator.
//!
//! Publishers escrow payment for content replication across a fixed pool of
//! ten reusable request slots. Registered pinners claim units of a request
//! and are paid per claim out of the slot's escrow. Slots expire lazily after
//! a configurable number of epochs, and a flag-based reputation system
//! forfeits the stake of misbehaving pinners to their flaggers.
//!
//! All fund movement flows through [`pinmesh_economics::EscrowLedger`]; the
//! coordinator holds the slot table, the pinner registry, the admin set, and
//! the event bus.

pub mod admin;
pub mod config;
pub mod coordinator;
pub mod epoch;
pub mod error;
pub mod events;
pub mod pinner;
pub mod reputation;
pub mod slots;
pub mod types;

pub use admin::AdminRegistry;
pub use config::ServiceParams;
pub use coordinator::{MarketCoordinator, MarketStats};
pub use epoch::EpochClock;
pub use error::{MarketError, Result};
pub use events::{EventBus, MarketEvent};
pub use pinner::PinnerRegistry;
pub use reputation::{FlagOutcome, Forfeiture, ReputationSystem};
pub use slots::SlotTable;
pub use types::{ContentDigest, PinSlot, Pinner, SlotView, EPOCH_LENGTH, NUM_SLOTS};
