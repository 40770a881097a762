use crate::balance::BalanceManager;
use crate::types::{AccountAddress, TokenAmount};
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Fund accounting for the marketplace.
///
/// All coordinator-held funds live in the reserved market account. Two
/// disjoint pools are tracked: escrow (the active slots' balances, implicit)
/// and the explicit platform fee counter. Fee withdrawal is bounded by the
/// counter and therefore can never draw on escrowed funds.
pub struct EscrowLedger {
    balances: Arc<BalanceManager>,
    market: AccountAddress,
    fees: Arc<RwLock<TokenAmount>>,
}

impl EscrowLedger {
    pub fn new(balances: Arc<BalanceManager>) -> Self {
        Self {
            balances,
            market: AccountAddress::market(),
            fees: Arc::new(RwLock::new(TokenAmount::ZERO)),
        }
    }

    pub fn balances(&self) -> &Arc<BalanceManager> {
        &self.balances
    }

    pub fn market_account(&self) -> AccountAddress {
        self.market
    }

    /// Move funds from a payer into the market account.
    pub async fn deposit_from(&self, payer: AccountAddress, amount: TokenAmount) -> Result<()> {
        self.balances.transfer(payer, self.market, amount).await
    }

    /// Pay funds out of the market account.
    pub async fn pay_out(&self, payee: AccountAddress, amount: TokenAmount) -> Result<()> {
        self.balances.transfer(self.market, payee, amount).await
    }

    /// Record a non-refundable platform fee. The funds themselves must
    /// already sit in the market account; this only moves them between pools.
    pub async fn record_fee(&self, amount: TokenAmount) -> Result<()> {
        let mut fees = self.fees.write().await;
        *fees = fees
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Fee counter overflow"))?;
        Ok(())
    }

    pub async fn fees_collected(&self) -> TokenAmount {
        *self.fees.read().await
    }

    /// Withdraw accumulated platform fees. Bounded by the fee counter;
    /// escrowed funds are structurally out of reach.
    pub async fn withdraw_fees(
        &self,
        recipient: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        let mut fees = self.fees.write().await;
        let remaining = match fees.checked_sub(amount) {
            Some(remaining) => remaining,
            None => bail!(
                "Insufficient fees: collected {}, requested {}",
                *fees,
                amount
            ),
        };

        self.balances.transfer(self.market, recipient, amount).await?;
        *fees = remaining;

        info!(
            recipient = %recipient,
            amount = %amount,
            fees_remaining = %remaining,
            "🏦 Platform fees withdrawn"
        );
        Ok(())
    }

    /// Escrow intake for a new request: debit the payer for `total` (escrow
    /// plus fee), book `fee`, and refund an evicted occupant if one is given,
    /// all inside one storage transaction.
    pub async fn settle_request(
        &self,
        payer: AccountAddress,
        total: TokenAmount,
        fee: TokenAmount,
        refund: Option<(AccountAddress, TokenAmount)>,
    ) -> Result<()> {
        {
            let fees = self.fees.read().await;
            if fees.checked_add(fee).is_none() {
                bail!("Fee counter overflow");
            }
        }

        let storage = self.balances.storage();
        storage.begin_transaction().await?;

        let result: Result<()> = async {
            self.balances.debit(payer, total).await?;
            self.balances.credit(self.market, total).await?;
            if let Some((occupant, amount)) = refund {
                self.balances.debit(self.market, amount).await?;
                self.balances.credit(occupant, amount).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                storage.commit_transaction().await?;
                self.record_fee(fee).await?;
                info!(payer = %payer, escrowed = %total, fee = %fee, "💰 Request escrowed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "❌ Escrow intake rolled back");
                storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    /// Atomic multi-party payout: every recipient receives `share` from the
    /// market account, and `remainder` is credited to the fee counter. Runs
    /// inside one storage transaction so a mid-distribution failure leaves
    /// nobody paid.
    pub async fn distribute(
        &self,
        recipients: &[AccountAddress],
        share: TokenAmount,
        remainder: TokenAmount,
    ) -> Result<()> {
        let total = share
            .checked_mul(recipients.len() as u64)
            .ok_or_else(|| anyhow::anyhow!("Distribution overflow"))?;

        {
            // Validate the remainder fits before touching any balance.
            let fees = self.fees.read().await;
            if fees.checked_add(remainder).is_none() {
                bail!("Fee counter overflow");
            }
        }

        let storage = self.balances.storage();
        storage.begin_transaction().await?;

        let result: Result<()> = async {
            self.balances.debit(self.market, total).await?;
            for recipient in recipients {
                self.balances.credit(*recipient, share).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                storage.commit_transaction().await?;
                self.record_fee(remainder).await?;
                info!(
                    recipients = recipients.len(),
                    share = %share,
                    remainder = %remainder,
                    "⚖️ Stake distributed"
                );
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "❌ Distribution rolled back");
                storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    /// Total funds held by the market account (escrow + fees + stakes).
    pub async fn total_held(&self) -> Result<TokenAmount> {
        self.balances.balance_of(self.market).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn ledger() -> EscrowLedger {
        EscrowLedger::new(Arc::new(BalanceManager::new(Arc::new(MemoryStorage::new()))))
    }

    #[tokio::test]
    async fn test_deposit_and_payout() {
        let ledger = ledger();
        let payer = AccountAddress::from_bytes([1u8; 32]);
        let payee = AccountAddress::from_bytes([2u8; 32]);

        ledger
            .balances()
            .credit(payer, TokenAmount::from_base_units(100))
            .await
            .unwrap();

        ledger
            .deposit_from(payer, TokenAmount::from_base_units(60))
            .await
            .unwrap();
        assert_eq!(
            ledger.total_held().await.unwrap(),
            TokenAmount::from_base_units(60)
        );

        ledger
            .pay_out(payee, TokenAmount::from_base_units(25))
            .await
            .unwrap();
        assert_eq!(
            ledger.total_held().await.unwrap(),
            TokenAmount::from_base_units(35)
        );
    }

    #[tokio::test]
    async fn test_withdraw_fees_bounded_by_counter() {
        let ledger = ledger();
        let payer = AccountAddress::from_bytes([1u8; 32]);
        let recipient = AccountAddress::from_bytes([2u8; 32]);

        ledger
            .balances()
            .credit(payer, TokenAmount::from_base_units(100))
            .await
            .unwrap();
        ledger
            .deposit_from(payer, TokenAmount::from_base_units(100))
            .await
            .unwrap();
        ledger.record_fee(TokenAmount::from_base_units(10)).await.unwrap();

        // Escrowed funds are out of reach even though the account holds 100.
        assert!(ledger
            .withdraw_fees(recipient, TokenAmount::from_base_units(11))
            .await
            .is_err());

        ledger
            .withdraw_fees(recipient, TokenAmount::from_base_units(10))
            .await
            .unwrap();
        assert_eq!(ledger.fees_collected().await, TokenAmount::ZERO);
        assert_eq!(
            ledger.balances().balance_of(recipient).await.unwrap(),
            TokenAmount::from_base_units(10)
        );
    }

    #[tokio::test]
    async fn test_settle_request_refunds_occupant_atomically() {
        let ledger = ledger();
        let payer = AccountAddress::from_bytes([1u8; 32]);
        let occupant = AccountAddress::from_bytes([2u8; 32]);

        // The market already holds the occupant's 30 of escrow.
        ledger
            .balances()
            .credit(ledger.market_account(), TokenAmount::from_base_units(30))
            .await
            .unwrap();
        ledger
            .balances()
            .credit(payer, TokenAmount::from_base_units(55))
            .await
            .unwrap();

        ledger
            .settle_request(
                payer,
                TokenAmount::from_base_units(55),
                TokenAmount::from_base_units(5),
                Some((occupant, TokenAmount::from_base_units(30))),
            )
            .await
            .unwrap();

        assert_eq!(ledger.balances().balance_of(payer).await.unwrap(), TokenAmount::ZERO);
        assert_eq!(
            ledger.balances().balance_of(occupant).await.unwrap(),
            TokenAmount::from_base_units(30)
        );
        assert_eq!(
            ledger.total_held().await.unwrap(),
            TokenAmount::from_base_units(55)
        );
        assert_eq!(
            ledger.fees_collected().await,
            TokenAmount::from_base_units(5)
        );
    }

    #[tokio::test]
    async fn test_settle_request_rolls_back_on_poor_payer() {
        let ledger = ledger();
        let payer = AccountAddress::from_bytes([1u8; 32]);
        let occupant = AccountAddress::from_bytes([2u8; 32]);

        ledger
            .balances()
            .credit(ledger.market_account(), TokenAmount::from_base_units(30))
            .await
            .unwrap();

        let result = ledger
            .settle_request(
                payer,
                TokenAmount::from_base_units(55),
                TokenAmount::from_base_units(5),
                Some((occupant, TokenAmount::from_base_units(30))),
            )
            .await;
        assert!(result.is_err());

        // Nothing moved, nothing booked.
        assert_eq!(
            ledger.balances().balance_of(occupant).await.unwrap(),
            TokenAmount::ZERO
        );
        assert_eq!(
            ledger.total_held().await.unwrap(),
            TokenAmount::from_base_units(30)
        );
        assert_eq!(ledger.fees_collected().await, TokenAmount::ZERO);
    }

    #[tokio::test]
    async fn test_distribute_pays_every_recipient() {
        let ledger = ledger();
        let payer = AccountAddress::from_bytes([1u8; 32]);

        ledger
            .balances()
            .credit(payer, TokenAmount::from_base_units(10))
            .await
            .unwrap();
        ledger
            .deposit_from(payer, TokenAmount::from_base_units(10))
            .await
            .unwrap();

        let recipients: Vec<AccountAddress> =
            (1u8..=3).map(|i| AccountAddress::from_bytes([i + 10; 32])).collect();

        ledger
            .distribute(
                &recipients,
                TokenAmount::from_base_units(3),
                TokenAmount::from_base_units(1),
            )
            .await
            .unwrap();

        for recipient in &recipients {
            assert_eq!(
                ledger.balances().balance_of(*recipient).await.unwrap(),
                TokenAmount::from_base_units(3)
            );
        }
        assert_eq!(
            ledger.fees_collected().await,
            TokenAmount::from_base_units(1)
        );
        assert_eq!(
            ledger.total_held().await.unwrap(),
            TokenAmount::from_base_units(1)
        );
    }

    #[tokio::test]
    async fn test_distribute_rolls_back_on_shortfall() {
        let ledger = ledger();
        let recipients = vec![AccountAddress::from_bytes([9u8; 32])];

        // Market account is empty: the debit must fail and nothing is paid.
        let result = ledger
            .distribute(&recipients, TokenAmount::from_base_units(5), TokenAmount::ZERO)
            .await;
        assert!(result.is_err());
        assert_eq!(
            ledger
                .balances()
                .balance_of(recipients[0])
                .await
                .unwrap(),
            TokenAmount::ZERO
        );
        assert_eq!(ledger.fees_collected().await, TokenAmount::ZERO);
    }
}
