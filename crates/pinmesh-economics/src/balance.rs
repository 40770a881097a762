use crate::storage::LedgerStorage;
use crate::types::{AccountAddress, TokenAmount};
use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::info;

/// Account balance bookkeeping on top of a [`LedgerStorage`] backend.
///
/// `credit` and `debit` are single-account primitives; `transfer` wraps the
/// debit/credit pair in a storage transaction so a mid-flight failure cannot
/// leave one side applied.
pub struct BalanceManager {
    storage: Arc<dyn LedgerStorage>,
}

impl BalanceManager {
    pub fn new(storage: Arc<dyn LedgerStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn LedgerStorage> {
        &self.storage
    }

    pub async fn balance_of(&self, address: AccountAddress) -> Result<TokenAmount> {
        self.storage.get_balance(address).await
    }

    pub async fn credit(&self, address: AccountAddress, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let current = self.storage.get_balance(address).await?;
        let new_balance = current
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("Balance overflow for {}", address))?;

        self.storage.set_balance(address, new_balance).await?;

        info!(
            address = %address,
            amount = %amount,
            balance_after = %new_balance,
            "💰 Balance credited"
        );
        Ok(())
    }

    pub async fn debit(&self, address: AccountAddress, amount: TokenAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }

        let current = self.storage.get_balance(address).await?;
        let new_balance = current.checked_sub(amount).ok_or_else(|| {
            anyhow::anyhow!(
                "Insufficient balance for {}: has {}, needs {}",
                address,
                current,
                amount
            )
        })?;

        self.storage.set_balance(address, new_balance).await?;

        info!(
            address = %address,
            amount = %amount,
            balance_after = %new_balance,
            "💸 Balance debited"
        );
        Ok(())
    }

    pub async fn transfer(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        amount: TokenAmount,
    ) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if from == to {
            bail!("Cannot transfer to same address");
        }

        self.storage.begin_transaction().await?;

        match self.transfer_internal(from, to, amount).await {
            Ok(tx_hash) => {
                self.storage.commit_transaction().await?;
                info!(
                    from = %from,
                    to = %to,
                    amount = %amount,
                    tx_hash = %tx_hash,
                    "✅ Transfer committed"
                );
                Ok(())
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn transfer_internal(
        &self,
        from: AccountAddress,
        to: AccountAddress,
        amount: TokenAmount,
    ) -> Result<String> {
        self.debit(from, amount).await?;
        self.credit(to, amount).await?;

        let mut tx_data = Vec::with_capacity(80);
        tx_data.extend_from_slice(from.as_bytes());
        tx_data.extend_from_slice(to.as_bytes());
        tx_data.extend_from_slice(&amount.to_base_units().to_le_bytes());
        tx_data.extend_from_slice(&chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0).to_le_bytes());

        Ok(hex::encode(blake3::hash(&tx_data).as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn manager() -> BalanceManager {
        BalanceManager::new(Arc::new(MemoryStorage::new()))
    }

    #[tokio::test]
    async fn test_credit_and_debit() {
        let manager = manager();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        manager
            .credit(addr, TokenAmount::from_base_units(100))
            .await
            .unwrap();
        manager
            .debit(addr, TokenAmount::from_base_units(30))
            .await
            .unwrap();

        assert_eq!(
            manager.balance_of(addr).await.unwrap(),
            TokenAmount::from_base_units(70)
        );
    }

    #[tokio::test]
    async fn test_debit_insufficient_balance() {
        let manager = manager();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        let result = manager.debit(addr, TokenAmount::from_base_units(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let manager = manager();
        let from = AccountAddress::from_bytes([1u8; 32]);
        let to = AccountAddress::from_bytes([2u8; 32]);

        manager
            .credit(from, TokenAmount::from_base_units(100))
            .await
            .unwrap();
        manager
            .transfer(from, to, TokenAmount::from_base_units(40))
            .await
            .unwrap();

        assert_eq!(
            manager.balance_of(from).await.unwrap(),
            TokenAmount::from_base_units(60)
        );
        assert_eq!(
            manager.balance_of(to).await.unwrap(),
            TokenAmount::from_base_units(40)
        );
    }

    #[tokio::test]
    async fn test_transfer_insufficient_funds_leaves_state_unchanged() {
        let manager = manager();
        let from = AccountAddress::from_bytes([1u8; 32]);
        let to = AccountAddress::from_bytes([2u8; 32]);

        manager
            .credit(from, TokenAmount::from_base_units(10))
            .await
            .unwrap();

        let result = manager
            .transfer(from, to, TokenAmount::from_base_units(11))
            .await;
        assert!(result.is_err());

        assert_eq!(
            manager.balance_of(from).await.unwrap(),
            TokenAmount::from_base_units(10)
        );
        assert_eq!(manager.balance_of(to).await.unwrap(), TokenAmount::ZERO);
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let manager = manager();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        manager
            .credit(addr, TokenAmount::from_base_units(10))
            .await
            .unwrap();
        assert!(manager
            .transfer(addr, addr, TokenAmount::from_base_units(1))
            .await
            .is_err());
    }
}
