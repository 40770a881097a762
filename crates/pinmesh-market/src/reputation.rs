//! Flag-based reputation with stake forfeiture.
//!
//! Registered pinners flag peers for non-performance. Each (flagger, pinner)
//! pair counts once. When a pinner's flag count reaches the configured
//! threshold, its stake is split evenly across everyone who flagged it, any
//! indivisible remainder is booked as a platform fee, and the pinner is
//! deactivated. The record stays in the registry so the history is visible.

use crate::error::{MarketError, Result};
use crate::pinner::PinnerRegistry;
use pinmesh_economics::{AccountAddress, EscrowLedger, TokenAmount};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Stake payout details when a flag crosses the threshold.
#[derive(Debug, Clone)]
pub struct Forfeiture {
    pub distributed: TokenAmount,
    pub share: TokenAmount,
    pub flagger_count: usize,
}

/// Result of recording a flag.
#[derive(Debug, Clone)]
pub struct FlagOutcome {
    pub flags: u32,
    pub forfeiture: Option<Forfeiture>,
}

pub struct ReputationSystem {
    registry: Arc<PinnerRegistry>,
    ledger: Arc<EscrowLedger>,
    /// Every (flagger, pinner) pair recorded, for duplicate rejection.
    flag_records: Arc<RwLock<HashSet<(AccountAddress, AccountAddress)>>>,
    /// Flaggers per pinner, in flag order. Cleared on forfeiture.
    flaggers: Arc<RwLock<HashMap<AccountAddress, Vec<AccountAddress>>>>,
}

impl ReputationSystem {
    pub fn new(registry: Arc<PinnerRegistry>, ledger: Arc<EscrowLedger>) -> Self {
        Self {
            registry,
            ledger,
            flag_records: Arc::new(RwLock::new(HashSet::new())),
            flaggers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Record a flag from `caller` against `target`.
    ///
    /// Reaching `flag_threshold` distributes the target's stake across all of
    /// its flaggers before any registry mutation, so a failed payout leaves
    /// the flag unrecorded and the target untouched.
    pub async fn flag(
        &self,
        caller: AccountAddress,
        target: AccountAddress,
        flag_threshold: u32,
    ) -> Result<FlagOutcome> {
        if caller == target {
            return Err(MarketError::CannotFlagSelf);
        }
        if !self.registry.is_registered(&caller).await {
            return Err(MarketError::NotRegistered(caller.to_string()));
        }
        let pinner = self
            .registry
            .get(&target)
            .await
            .ok_or_else(|| MarketError::NotRegistered(target.to_string()))?;

        {
            let records = self.flag_records.read().await;
            if records.contains(&(caller, target)) {
                return Err(MarketError::AlreadyFlagged {
                    flagger: caller.to_string(),
                    pinner: target.to_string(),
                });
            }
        }

        let new_count = pinner.flags + 1;

        if new_count >= flag_threshold && pinner.active {
            let mut recipients = {
                let flaggers = self.flaggers.read().await;
                flaggers.get(&target).cloned().unwrap_or_default()
            };
            recipients.push(caller);

            let (share, remainder) = pinner.staked.split_evenly(recipients.len() as u64);

            if !pinner.staked.is_zero() {
                self.ledger
                    .distribute(&recipients, share, remainder)
                    .await
                    .map_err(|e| {
                        warn!(pinner = %target, error = %e, "Stake distribution failed");
                        MarketError::Ledger(e.to_string())
                    })?;
            }

            self.registry.apply_forfeiture(&target, new_count).await?;

            {
                let mut records = self.flag_records.write().await;
                records.retain(|(_, flagged)| *flagged != target);
            }
            self.flaggers.write().await.remove(&target);

            info!(
                pinner = %target,
                flags = new_count,
                distributed = %pinner.staked,
                flaggers = recipients.len(),
                "⚖️ Stake forfeited"
            );

            return Ok(FlagOutcome {
                flags: new_count,
                forfeiture: Some(Forfeiture {
                    distributed: pinner.staked,
                    share,
                    flagger_count: recipients.len(),
                }),
            });
        }

        self.registry.set_flag_count(&target, new_count).await?;
        self.flag_records.write().await.insert((caller, target));
        self.flaggers
            .write()
            .await
            .entry(target)
            .or_default()
            .push(caller);

        info!(pinner = %target, flagger = %caller, flags = new_count, "🚩 Pinner flagged");

        Ok(FlagOutcome {
            flags: new_count,
            forfeiture: None,
        })
    }

    pub async fn flaggers_of(&self, target: &AccountAddress) -> Vec<AccountAddress> {
        self.flaggers
            .read()
            .await
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn has_flagged(&self, flagger: &AccountAddress, target: &AccountAddress) -> bool {
        self.flag_records
            .read()
            .await
            .contains(&(*flagger, *target))
    }
}
