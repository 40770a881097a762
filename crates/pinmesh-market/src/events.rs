//! Discovery channel for pinning daemons and dashboards.
//!
//! The event stream is append-only, best-effort, and non-authoritative: the
//! coordinator never reads it back. Rich metadata that is deliberately not
//! persisted in the slot table (full content identifiers, gateway strings)
//! travels only here.

use chrono::{DateTime, Utc};
use pinmesh_economics::{AccountAddress, TokenAmount};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Events buffered per subscriber before old events are dropped.
const EVENT_BUFFER: usize = 256;

/// Events emitted by the marketplace coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MarketEvent {
    /// A new pin request occupies a slot. Carries the full content
    /// identifier, filename, and gateway, which the slot itself never stores.
    PinRequested {
        slot_index: usize,
        cid: String,
        filename: String,
        gateway: String,
        price_per_unit: TokenAmount,
        units: u32,
        publisher: AccountAddress,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A slot returned to the pool, for any exit reason (filled, cancelled,
    /// expired, force-cleared).
    SlotFreed {
        slot_index: usize,
        content_digest: String,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A pinner claimed one unit of a request and was paid.
    PinClaimed {
        slot_index: usize,
        content_digest: String,
        pinner: AccountAddress,
        amount_paid: TokenAmount,
        units_remaining: u32,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A pinner registered with the marketplace.
    PinnerJoined {
        pinner: AccountAddress,
        node_id: String,
        multiaddr: String,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A pinner left or was removed.
    PinnerLeft {
        pinner: AccountAddress,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A non-performance flag was recorded against a pinner.
    PinnerFlagged {
        pinner: AccountAddress,
        flagger: AccountAddress,
        flag_count: u32,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// A pinner reached the flag threshold; its stake was distributed.
    StakeForfeited {
        pinner: AccountAddress,
        distributed: TokenAmount,
        flagger_count: usize,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },

    /// Accumulated platform fees were withdrawn by an admin.
    FeesWithdrawn {
        recipient: AccountAddress,
        amount: TokenAmount,
        #[serde(with = "chrono::serde::ts_seconds")]
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    /// Event name for stream consumers.
    pub fn event_type(&self) -> &'static str {
        match self {
            MarketEvent::PinRequested { .. } => "pin.requested",
            MarketEvent::SlotFreed { .. } => "slot.freed",
            MarketEvent::PinClaimed { .. } => "pin.claimed",
            MarketEvent::PinnerJoined { .. } => "pinner.joined",
            MarketEvent::PinnerLeft { .. } => "pinner.left",
            MarketEvent::PinnerFlagged { .. } => "pinner.flagged",
            MarketEvent::StakeForfeited { .. } => "stake.forfeited",
            MarketEvent::FeesWithdrawn { .. } => "fees.withdrawn",
        }
    }
}

/// Broadcast bus for marketplace events.
///
/// Dropping events when no subscriber listens is expected: the stream is a
/// discovery aid, not a source of truth.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MarketEvent>,
    emitted: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            sender,
            emitted: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: MarketEvent) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
        match self.sender.send(event.clone()) {
            Ok(subscribers) => {
                debug!(
                    event_type = event.event_type(),
                    subscribers, "Event emitted"
                );
            }
            Err(_) => {
                debug!(
                    event_type = event.event_type(),
                    "Event emitted but no subscribers listening"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn total_emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
