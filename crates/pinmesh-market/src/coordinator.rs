//! Marketplace coordinator.
//!
//! Single entry point for every marketplace operation. The host invokes
//! operations one at a time, so each method validates everything it can
//! before the first balance movement and applies state changes only after
//! the fallible ledger step has succeeded.

use crate::admin::AdminRegistry;
use crate::config::ServiceParams;
use crate::epoch::EpochClock;
use crate::error::{MarketError, Result};
use crate::events::{EventBus, MarketEvent};
use crate::pinner::PinnerRegistry;
use crate::reputation::{FlagOutcome, ReputationSystem};
use crate::slots::{self, SlotTable};
use crate::types::{ContentDigest, Pinner, PinSlot, SlotView, NUM_SLOTS};
use chrono::Utc;
use pinmesh_economics::{AccountAddress, EscrowLedger, TokenAmount};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Point-in-time snapshot of marketplace state.
#[derive(Debug, Clone)]
pub struct MarketStats {
    pub occupied_slots: usize,
    pub pinner_count: usize,
    pub fees_collected: TokenAmount,
    pub total_held: TokenAmount,
    pub current_tick: u64,
    pub current_epoch: u64,
    pub events_emitted: u64,
}

pub struct MarketCoordinator {
    params: Arc<RwLock<ServiceParams>>,
    clock: EpochClock,
    tick: Arc<RwLock<u64>>,
    slots: Arc<RwLock<SlotTable>>,
    registry: Arc<PinnerRegistry>,
    reputation: Arc<ReputationSystem>,
    ledger: Arc<EscrowLedger>,
    admins: Arc<AdminRegistry>,
    events: EventBus,
}

impl MarketCoordinator {
    pub fn new(
        params: ServiceParams,
        initial_admin: AccountAddress,
        ledger: Arc<EscrowLedger>,
    ) -> Self {
        let registry = Arc::new(PinnerRegistry::new(ledger.clone()));
        let reputation = Arc::new(ReputationSystem::new(registry.clone(), ledger.clone()));
        Self {
            params: Arc::new(RwLock::new(params)),
            clock: EpochClock::new(0),
            tick: Arc::new(RwLock::new(0)),
            slots: Arc::new(RwLock::new(slots::empty_table())),
            registry,
            reputation,
            ledger,
            admins: Arc::new(AdminRegistry::new(initial_admin)),
            events: EventBus::new(),
        }
    }

    // ========== Clock ==========

    pub async fn current_tick(&self) -> u64 {
        *self.tick.read().await
    }

    pub async fn current_epoch(&self) -> u64 {
        self.clock.epoch_at(*self.tick.read().await)
    }

    /// Advance the host tick counter. Expiration is evaluated lazily on the
    /// operations that read slots, so this touches no slot state.
    pub async fn advance_ticks(&self, ticks: u64) -> u64 {
        let mut tick = self.tick.write().await;
        *tick += ticks;
        debug!(tick = *tick, epoch = self.clock.epoch_at(*tick), "Tick advanced");
        *tick
    }

    // ========== Pin lifecycle ==========

    /// Publish a pin request, escrowing `price_per_unit * units` plus the
    /// platform fee. Returns the slot index assigned to the request.
    /// `filename` and `gateway` are discovery metadata and travel only on
    /// the event channel.
    pub async fn create_pin(
        &self,
        publisher: AccountAddress,
        cid: &str,
        filename: &str,
        gateway: &str,
        price_per_unit: TokenAmount,
        units: u32,
    ) -> Result<usize> {
        let params = self.params.read().await.clone();
        let current_tick = *self.tick.read().await;

        if cid.trim().is_empty() {
            return Err(MarketError::InvalidContentId(
                "content identifier is empty".to_string(),
            ));
        }
        if units < params.min_units || units as usize > NUM_SLOTS {
            return Err(MarketError::QuantityOutOfRange {
                got: units,
                min: params.min_units,
                max: NUM_SLOTS as u32,
            });
        }
        if price_per_unit < params.min_price_per_unit {
            return Err(MarketError::PriceTooLow {
                got: price_per_unit.to_string(),
                min: params.min_price_per_unit.to_string(),
            });
        }

        let escrow = price_per_unit
            .checked_mul(units as u64)
            .ok_or(MarketError::AmountOverflow)?;
        let total = escrow
            .checked_add(params.pin_fee)
            .ok_or(MarketError::AmountOverflow)?;

        let digest = ContentDigest::from_cid(cid);

        let mut table = self.slots.write().await;

        if slots::has_duplicate_digest(
            &table,
            &digest,
            &self.clock,
            current_tick,
            params.epochs_to_live,
        ) {
            return Err(MarketError::DuplicateContent(digest.to_hex()));
        }

        let index = slots::find_available_index(
            &table,
            &self.clock,
            current_tick,
            params.epochs_to_live,
        )
        .ok_or(MarketError::NoSlotsAvailable)?;

        let available = self
            .ledger
            .balances()
            .balance_of(publisher)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;
        if available < total {
            return Err(MarketError::InsufficientFunds {
                required: total.to_string(),
                available: available.to_string(),
            });
        }

        // Lazily reclaim an expired occupant: its remaining escrow goes back
        // to its publisher in the same ledger transaction as the new debit.
        let evicted = table[index].take();
        let refund = evicted.as_ref().and_then(|expired| {
            if expired.escrow_balance.is_zero() {
                None
            } else {
                Some((expired.publisher, expired.escrow_balance))
            }
        });

        self.ledger
            .settle_request(publisher, total, params.pin_fee, refund)
            .await
            .map_err(|e| {
                // Put the occupant back so a failed intake changes nothing.
                table[index] = evicted.clone();
                MarketError::Ledger(e.to_string())
            })?;

        if let Some(expired) = evicted {
            info!(
                slot_index = index,
                publisher = %expired.publisher,
                refunded = %expired.escrow_balance,
                "↩️ Expired slot reclaimed"
            );
            self.events.emit(MarketEvent::SlotFreed {
                slot_index: index,
                content_digest: expired.content_digest.to_hex(),
                timestamp: Utc::now(),
            });
        }

        table[index] = Some(PinSlot {
            publisher,
            content_digest: digest,
            price_per_unit,
            units,
            units_remaining: units,
            escrow_balance: escrow,
            created_tick: current_tick,
            claims: Vec::new(),
        });

        info!(
            slot_index = index,
            publisher = %publisher,
            digest = %digest,
            escrow = %escrow,
            units,
            "📝 Pin request created"
        );

        self.events.emit(MarketEvent::PinRequested {
            slot_index: index,
            cid: cid.to_string(),
            filename: filename.to_string(),
            gateway: gateway.to_string(),
            price_per_unit,
            units,
            publisher,
            timestamp: Utc::now(),
        });

        Ok(index)
    }

    /// Claim one unit of a pin request as a registered, active pinner.
    /// Pays `price_per_unit` out of the slot's escrow. Returns the amount
    /// paid.
    pub async fn collect_pin(
        &self,
        caller: AccountAddress,
        slot_index: usize,
    ) -> Result<TokenAmount> {
        self.registry.require_active(&caller).await?;

        let params = self.params.read().await.clone();
        let current_tick = *self.tick.read().await;

        let mut table = self.slots.write().await;
        let slot = table
            .get_mut(slot_index)
            .and_then(|entry| entry.as_mut())
            .ok_or(MarketError::InvalidSlot(slot_index))?;

        if self
            .clock
            .is_expired(slot.created_tick, current_tick, params.epochs_to_live)
        {
            return Err(MarketError::SlotExpired(slot_index));
        }
        if slot.has_claimed(&caller) {
            return Err(MarketError::AlreadyClaimed {
                slot_index,
                pinner: caller.to_string(),
            });
        }

        let amount = slot.price_per_unit;
        self.ledger
            .pay_out(caller, amount)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;

        slot.units_remaining -= 1;
        slot.escrow_balance = slot.escrow_balance.saturating_sub(amount);
        slot.claims.push(caller);
        let units_remaining = slot.units_remaining;
        let digest = slot.content_digest;

        self.registry.record_claim(&caller).await?;

        info!(
            slot_index,
            pinner = %caller,
            paid = %amount,
            units_remaining,
            "✅ Pin claimed"
        );

        self.events.emit(MarketEvent::PinClaimed {
            slot_index,
            content_digest: digest.to_hex(),
            pinner: caller,
            amount_paid: amount,
            units_remaining,
            timestamp: Utc::now(),
        });

        // Fully claimed: the request is complete and the slot frees early.
        if units_remaining == 0 {
            table[slot_index] = None;
            self.events.emit(MarketEvent::SlotFreed {
                slot_index,
                content_digest: digest.to_hex(),
                timestamp: Utc::now(),
            });
        }

        Ok(amount)
    }

    /// Cancel a pin request. Publisher-only; refunds the remaining escrow
    /// regardless of how many units were already claimed.
    pub async fn cancel_pin(
        &self,
        caller: AccountAddress,
        slot_index: usize,
    ) -> Result<TokenAmount> {
        let mut table = self.slots.write().await;
        let slot = table
            .get(slot_index)
            .and_then(|entry| entry.as_ref())
            .ok_or(MarketError::InvalidSlot(slot_index))?;

        if slot.publisher != caller {
            return Err(MarketError::NotSlotPublisher {
                slot_index,
                publisher: slot.publisher.to_string(),
            });
        }

        let refund = slot.escrow_balance;
        let digest = slot.content_digest;

        if !refund.is_zero() {
            self.ledger
                .pay_out(caller, refund)
                .await
                .map_err(|e| MarketError::Ledger(e.to_string()))?;
        }

        table[slot_index] = None;

        info!(slot_index, publisher = %caller, refunded = %refund, "↩️ Pin cancelled");
        self.events.emit(MarketEvent::SlotFreed {
            slot_index,
            content_digest: digest.to_hex(),
            timestamp: Utc::now(),
        });

        Ok(refund)
    }

    /// Reclaim an expired slot, refunding its remaining escrow to the
    /// original publisher. Permissionless: anyone may trigger the cleanup.
    /// Calling it twice returns `InvalidSlot` the second time, so the refund
    /// cannot double-pay.
    pub async fn clear_expired_slot(&self, slot_index: usize) -> Result<TokenAmount> {
        let params = self.params.read().await.clone();
        let current_tick = *self.tick.read().await;

        let mut table = self.slots.write().await;
        let slot = table
            .get(slot_index)
            .and_then(|entry| entry.as_ref())
            .ok_or(MarketError::InvalidSlot(slot_index))?;

        if !self
            .clock
            .is_expired(slot.created_tick, current_tick, params.epochs_to_live)
        {
            return Err(MarketError::SlotNotExpired(slot_index));
        }

        let refund = slot.escrow_balance;
        let publisher = slot.publisher;
        let digest = slot.content_digest;

        if !refund.is_zero() {
            self.ledger
                .pay_out(publisher, refund)
                .await
                .map_err(|e| MarketError::Ledger(e.to_string()))?;
        }

        table[slot_index] = None;

        info!(slot_index, publisher = %publisher, refunded = %refund, "↩️ Expired slot cleared");
        self.events.emit(MarketEvent::SlotFreed {
            slot_index,
            content_digest: digest.to_hex(),
            timestamp: Utc::now(),
        });

        Ok(refund)
    }

    /// Admin override: clear any occupied slot, expired or not, refunding
    /// the remaining escrow to its publisher.
    pub async fn force_clear_slot(
        &self,
        caller: AccountAddress,
        slot_index: usize,
    ) -> Result<TokenAmount> {
        self.admins.require_admin(&caller).await?;

        let mut table = self.slots.write().await;
        let slot = table
            .get(slot_index)
            .and_then(|entry| entry.as_ref())
            .ok_or(MarketError::InvalidSlot(slot_index))?;

        let refund = slot.escrow_balance;
        let publisher = slot.publisher;
        let digest = slot.content_digest;

        if !refund.is_zero() {
            self.ledger
                .pay_out(publisher, refund)
                .await
                .map_err(|e| MarketError::Ledger(e.to_string()))?;
        }

        table[slot_index] = None;

        info!(slot_index, admin = %caller, refunded = %refund, "↩️ Slot force-cleared");
        self.events.emit(MarketEvent::SlotFreed {
            slot_index,
            content_digest: digest.to_hex(),
            timestamp: Utc::now(),
        });

        Ok(refund)
    }

    // ========== Pinner lifecycle ==========

    pub async fn join_as_pinner(
        &self,
        caller: AccountAddress,
        node_id: String,
        multiaddr: String,
        min_price: TokenAmount,
    ) -> Result<Pinner> {
        let params = self.params.read().await.clone();
        let pinner = self
            .registry
            .join(caller, node_id, multiaddr, min_price, &params)
            .await?;

        self.events.emit(MarketEvent::PinnerJoined {
            pinner: caller,
            node_id: pinner.node_id.clone(),
            multiaddr: pinner.multiaddr.clone(),
            timestamp: Utc::now(),
        });

        Ok(pinner)
    }

    pub async fn update_pinner(
        &self,
        caller: AccountAddress,
        node_id: Option<String>,
        multiaddr: Option<String>,
        min_price: Option<TokenAmount>,
        active: Option<bool>,
    ) -> Result<Pinner> {
        self.registry
            .update(caller, node_id, multiaddr, min_price, active)
            .await
    }

    pub async fn leave_as_pinner(&self, caller: AccountAddress) -> Result<TokenAmount> {
        let refund = self.registry.leave(caller).await?;
        self.events.emit(MarketEvent::PinnerLeft {
            pinner: caller,
            timestamp: Utc::now(),
        });
        Ok(refund)
    }

    pub async fn remove_pinner(
        &self,
        caller: AccountAddress,
        pinner: AccountAddress,
    ) -> Result<TokenAmount> {
        self.admins.require_admin(&caller).await?;
        let refund = self.registry.remove(pinner).await?;
        self.events.emit(MarketEvent::PinnerLeft {
            pinner,
            timestamp: Utc::now(),
        });
        Ok(refund)
    }

    /// Flag a pinner for non-performance. At the configured threshold the
    /// target's stake is distributed across its flaggers and the target is
    /// deactivated.
    pub async fn flag_pinner(
        &self,
        caller: AccountAddress,
        target: AccountAddress,
    ) -> Result<FlagOutcome> {
        let threshold = self.params.read().await.flag_threshold;
        let outcome = self.reputation.flag(caller, target, threshold).await?;

        self.events.emit(MarketEvent::PinnerFlagged {
            pinner: target,
            flagger: caller,
            flag_count: outcome.flags,
            timestamp: Utc::now(),
        });
        if let Some(forfeiture) = &outcome.forfeiture {
            self.events.emit(MarketEvent::StakeForfeited {
                pinner: target,
                distributed: forfeiture.distributed,
                flagger_count: forfeiture.flagger_count,
                timestamp: Utc::now(),
            });
        }

        Ok(outcome)
    }

    // ========== Administration ==========

    pub async fn add_admin(
        &self,
        caller: AccountAddress,
        new_admin: AccountAddress,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.admins.add_admin(new_admin).await
    }

    pub async fn remove_admin(
        &self,
        caller: AccountAddress,
        admin: AccountAddress,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.admins.remove_admin(admin).await
    }

    pub async fn update_pin_fee(
        &self,
        caller: AccountAddress,
        pin_fee: TokenAmount,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.params.write().await.pin_fee = pin_fee;
        info!(pin_fee = %pin_fee, "⚙️ Pin fee updated");
        Ok(())
    }

    pub async fn update_join_fee(
        &self,
        caller: AccountAddress,
        join_fee: TokenAmount,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.params.write().await.join_fee = join_fee;
        info!(join_fee = %join_fee, "⚙️ Join fee updated");
        Ok(())
    }

    /// Zero would let requests escrow nothing; rejected.
    pub async fn update_min_units(&self, caller: AccountAddress, min_units: u32) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        if min_units == 0 {
            return Err(MarketError::InvalidAmount(
                "min_units must be greater than zero".to_string(),
            ));
        }
        self.params.write().await.min_units = min_units;
        info!(min_units, "⚙️ Minimum units updated");
        Ok(())
    }

    pub async fn update_min_price_per_unit(
        &self,
        caller: AccountAddress,
        min_price: TokenAmount,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.params.write().await.min_price_per_unit = min_price;
        info!(min_price = %min_price, "⚙️ Minimum price updated");
        Ok(())
    }

    /// Applies to registrations made after the change; existing pinners keep
    /// the stake they posted.
    pub async fn update_pinner_stake(
        &self,
        caller: AccountAddress,
        stake: TokenAmount,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.params.write().await.pinner_stake = stake;
        info!(stake = %stake, "⚙️ Pinner stake updated");
        Ok(())
    }

    /// Applies to all slots immediately, since expiry is derived on read.
    /// Zero would make every slot born expired; rejected.
    pub async fn update_epochs_to_live(
        &self,
        caller: AccountAddress,
        epochs_to_live: u32,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        if epochs_to_live == 0 {
            return Err(MarketError::InvalidAmount(
                "epochs_to_live must be greater than zero".to_string(),
            ));
        }
        self.params.write().await.epochs_to_live = epochs_to_live;
        info!(epochs_to_live, "⚙️ Epochs-to-live updated");
        Ok(())
    }

    pub async fn update_flag_threshold(
        &self,
        caller: AccountAddress,
        flag_threshold: u32,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.params.write().await.flag_threshold = flag_threshold;
        info!(flag_threshold, "⚙️ Flag threshold updated");
        Ok(())
    }

    /// Withdraw accumulated platform fees. Bounded by the fee counter;
    /// escrow and stakes are structurally out of reach.
    pub async fn withdraw_fees(
        &self,
        caller: AccountAddress,
        recipient: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        self.admins.require_admin(&caller).await?;
        self.ledger
            .withdraw_fees(recipient, amount)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;

        self.events.emit(MarketEvent::FeesWithdrawn {
            recipient,
            amount,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Donate funds to the market account. The donation backs neither escrow
    /// nor fees and is never paid back out.
    pub async fn fund_contract(
        &self,
        caller: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Err(MarketError::InvalidAmount(
                "cannot fund with zero".to_string(),
            ));
        }
        self.ledger
            .deposit_from(caller, amount)
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))?;
        info!(donor = %caller, amount = %amount, "💰 Market account funded");
        Ok(())
    }

    // ========== Queries ==========

    pub async fn get_slot(&self, slot_index: usize) -> Option<PinSlot> {
        self.slots
            .read()
            .await
            .get(slot_index)
            .and_then(|entry| entry.clone())
    }

    pub async fn get_all_slots(&self) -> SlotView {
        self.slots
            .read()
            .await
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.clone().map(|slot| (i, slot)))
            .collect()
    }

    pub async fn has_available_slot(&self) -> bool {
        let params = self.params.read().await.clone();
        let current_tick = *self.tick.read().await;
        let table = self.slots.read().await;
        slots::find_available_index(&table, &self.clock, current_tick, params.epochs_to_live)
            .is_some()
    }

    pub async fn is_slot_expired(&self, slot_index: usize) -> Result<bool> {
        let params = self.params.read().await.clone();
        let current_tick = *self.tick.read().await;
        let table = self.slots.read().await;
        let slot = table
            .get(slot_index)
            .and_then(|entry| entry.as_ref())
            .ok_or(MarketError::InvalidSlot(slot_index))?;
        Ok(self
            .clock
            .is_expired(slot.created_tick, current_tick, params.epochs_to_live))
    }

    pub async fn get_pinner(&self, address: &AccountAddress) -> Option<Pinner> {
        self.registry.get(address).await
    }

    pub async fn is_pinner(&self, address: &AccountAddress) -> bool {
        self.registry.is_registered(address).await
    }

    pub async fn pinner_count(&self) -> usize {
        self.registry.count().await
    }

    pub async fn is_admin(&self, address: &AccountAddress) -> bool {
        self.admins.is_admin(address).await
    }

    pub async fn admins(&self) -> Vec<AccountAddress> {
        self.admins.admins().await
    }

    pub async fn fees_collected(&self) -> TokenAmount {
        self.ledger.fees_collected().await
    }

    pub async fn total_held(&self) -> Result<TokenAmount> {
        self.ledger
            .total_held()
            .await
            .map_err(|e| MarketError::Ledger(e.to_string()))
    }

    pub async fn params(&self) -> ServiceParams {
        self.params.read().await.clone()
    }

    pub async fn pin_fee(&self) -> TokenAmount {
        self.params.read().await.pin_fee
    }

    pub async fn join_fee(&self) -> TokenAmount {
        self.params.read().await.join_fee
    }

    pub async fn min_units(&self) -> u32 {
        self.params.read().await.min_units
    }

    pub async fn min_price_per_unit(&self) -> TokenAmount {
        self.params.read().await.min_price_per_unit
    }

    pub async fn pinner_stake(&self) -> TokenAmount {
        self.params.read().await.pinner_stake
    }

    pub async fn epochs_to_live(&self) -> u32 {
        self.params.read().await.epochs_to_live
    }

    pub async fn flag_threshold(&self) -> u32 {
        self.params.read().await.flag_threshold
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn stats(&self) -> Result<MarketStats> {
        let current_tick = *self.tick.read().await;
        Ok(MarketStats {
            occupied_slots: slots::occupied_count(&*self.slots.read().await),
            pinner_count: self.registry.count().await,
            fees_collected: self.ledger.fees_collected().await,
            total_held: self.total_held().await?,
            current_tick,
            current_epoch: self.clock.epoch_at(current_tick),
            events_emitted: self.events.total_emitted(),
        })
    }
}
