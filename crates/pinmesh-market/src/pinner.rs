//! Pinner lifecycle management.
//!
//! Registration debits the join fee (non-refundable, booked as a platform
//! fee) plus the stake (refundable) from the caller. Stakes sit in the market
//! account until the pinner leaves, is removed, or forfeits through the
//! reputation system.

use crate::config::ServiceParams;
use crate::error::{MarketError, Result};
use crate::types::Pinner;
use pinmesh_economics::{AccountAddress, EscrowLedger, TokenAmount};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct PinnerRegistry {
    ledger: Arc<EscrowLedger>,
    pinners: Arc<RwLock<HashMap<AccountAddress, Pinner>>>,
}

impl PinnerRegistry {
    pub fn new(ledger: Arc<EscrowLedger>) -> Self {
        Self {
            ledger,
            pinners: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new pinner, debiting `join_fee + pinner_stake`.
    pub async fn join(
        &self,
        caller: AccountAddress,
        node_id: String,
        multiaddr: String,
        min_price: TokenAmount,
        params: &ServiceParams,
    ) -> Result<Pinner> {
        {
            let pinners = self.pinners.read().await;
            if pinners.contains_key(&caller) {
                return Err(MarketError::AlreadyRegistered(caller.to_string()));
            }
        }

        let total = params
            .join_fee
            .checked_add(params.pinner_stake)
            .ok_or(MarketError::AmountOverflow)?;

        let available = self
            .ledger
            .balances()
            .balance_of(caller)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;
        if available < total {
            return Err(MarketError::InsufficientFunds {
                required: total.to_string(),
                available: available.to_string(),
            });
        }

        self.ledger
            .deposit_from(caller, total)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;
        self.ledger
            .record_fee(params.join_fee)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;

        let pinner = Pinner {
            address: caller,
            node_id: node_id.clone(),
            multiaddr,
            min_price,
            joined_at: chrono::Utc::now().timestamp(),
            pins_completed: 0,
            flags: 0,
            staked: params.pinner_stake,
            active: true,
        };

        self.pinners.write().await.insert(caller, pinner.clone());

        info!(
            pinner = %caller,
            node_id = %node_id,
            staked = %params.pinner_stake,
            "🔧 Pinner registered"
        );

        Ok(pinner)
    }

    /// Update any subset of a pinner's mutable fields. Caller-only.
    pub async fn update(
        &self,
        caller: AccountAddress,
        node_id: Option<String>,
        multiaddr: Option<String>,
        min_price: Option<TokenAmount>,
        active: Option<bool>,
    ) -> Result<Pinner> {
        let mut pinners = self.pinners.write().await;
        let pinner = pinners
            .get_mut(&caller)
            .ok_or_else(|| MarketError::NotRegistered(caller.to_string()))?;

        if let Some(node_id) = node_id {
            pinner.node_id = node_id;
        }
        if let Some(multiaddr) = multiaddr {
            pinner.multiaddr = multiaddr;
        }
        if let Some(min_price) = min_price {
            pinner.min_price = min_price;
        }
        if let Some(active) = active {
            pinner.active = active;
        }

        Ok(pinner.clone())
    }

    /// Deregister the caller. Refunds the stake only while the pinner is
    /// still active; a deactivated pinner's stake was already distributed.
    pub async fn leave(&self, caller: AccountAddress) -> Result<TokenAmount> {
        let pinner = {
            let pinners = self.pinners.read().await;
            pinners
                .get(&caller)
                .cloned()
                .ok_or_else(|| MarketError::NotRegistered(caller.to_string()))?
        };

        let refund = if pinner.active {
            pinner.staked
        } else {
            TokenAmount::ZERO
        };

        if !refund.is_zero() {
            self.ledger
                .pay_out(caller, refund)
                .await
                .map_err(|e| MarketError::Ledger(e.to_string()))?;
        }

        self.pinners.write().await.remove(&caller);

        info!(pinner = %caller, refund = %refund, "🚪 Pinner left");
        Ok(refund)
    }

    /// Administrative removal. Not punitive: the current stake is always
    /// refunded (it is zero if already forfeited).
    pub async fn remove(&self, pinner_addr: AccountAddress) -> Result<TokenAmount> {
        let pinner = {
            let pinners = self.pinners.read().await;
            pinners
                .get(&pinner_addr)
                .cloned()
                .ok_or_else(|| MarketError::NotRegistered(pinner_addr.to_string()))?
        };

        if !pinner.staked.is_zero() {
            self.ledger
                .pay_out(pinner_addr, pinner.staked)
                .await
                .map_err(|e| MarketError::Ledger(e.to_string()))?;
        }

        self.pinners.write().await.remove(&pinner_addr);

        info!(pinner = %pinner_addr, refund = %pinner.staked, "🚪 Pinner removed by admin");
        Ok(pinner.staked)
    }

    pub async fn get(&self, address: &AccountAddress) -> Option<Pinner> {
        self.pinners.read().await.get(address).cloned()
    }

    pub async fn is_registered(&self, address: &AccountAddress) -> bool {
        self.pinners.read().await.contains_key(address)
    }

    pub async fn count(&self) -> usize {
        self.pinners.read().await.len()
    }

    /// Reject callers that are unknown or deactivated.
    pub async fn require_active(&self, address: &AccountAddress) -> Result<()> {
        let pinners = self.pinners.read().await;
        let pinner = pinners
            .get(address)
            .ok_or_else(|| MarketError::NotRegistered(address.to_string()))?;
        if !pinner.active {
            return Err(MarketError::PinnerInactive(address.to_string()));
        }
        Ok(())
    }

    /// Bump the completed-claim counter after a successful collect.
    pub async fn record_claim(&self, address: &AccountAddress) -> Result<()> {
        let mut pinners = self.pinners.write().await;
        let pinner = pinners
            .get_mut(address)
            .ok_or_else(|| MarketError::NotRegistered(address.to_string()))?;
        pinner.pins_completed += 1;
        Ok(())
    }

    pub(crate) async fn set_flag_count(&self, address: &AccountAddress, flags: u32) -> Result<()> {
        let mut pinners = self.pinners.write().await;
        let pinner = pinners
            .get_mut(address)
            .ok_or_else(|| MarketError::NotRegistered(address.to_string()))?;
        pinner.flags = flags;
        Ok(())
    }

    /// Deactivate a pinner and zero its stake after forfeiture.
    pub(crate) async fn apply_forfeiture(
        &self,
        address: &AccountAddress,
        flags: u32,
    ) -> Result<()> {
        let mut pinners = self.pinners.write().await;
        let pinner = pinners
            .get_mut(address)
            .ok_or_else(|| MarketError::NotRegistered(address.to_string()))?;
        pinner.flags = flags;
        pinner.active = false;
        pinner.staked = TokenAmount::ZERO;
        Ok(())
    }
}
