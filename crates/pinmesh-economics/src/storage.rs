use crate::types::{AccountAddress, TokenAmount};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

type BalanceMap = HashMap<AccountAddress, TokenAmount>;

/// Backing store for account balances.
///
/// Transactions are snapshot-based: `begin_transaction` captures the current
/// balance map, `rollback_transaction` restores it, `commit_transaction`
/// discards it. The host serializes coordinator invocations, so at most one
/// transaction is open at a time.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_balance(&self, address: AccountAddress) -> Result<TokenAmount>;
    async fn set_balance(&self, address: AccountAddress, balance: TokenAmount) -> Result<()>;
    async fn get_all_accounts(&self) -> Result<Vec<AccountAddress>>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

/// In-memory balance store used by tests and single-process deployments.
pub struct MemoryStorage {
    balances: Arc<RwLock<BalanceMap>>,
    snapshot: Arc<RwLock<Option<BalanceMap>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn get_balance(&self, address: AccountAddress) -> Result<TokenAmount> {
        let balances = self.balances.read().await;
        Ok(balances.get(&address).copied().unwrap_or(TokenAmount::ZERO))
    }

    async fn set_balance(&self, address: AccountAddress, balance: TokenAmount) -> Result<()> {
        let mut balances = self.balances.write().await;
        if balance.is_zero() {
            balances.remove(&address);
        } else {
            balances.insert(address, balance);
        }
        Ok(())
    }

    async fn get_all_accounts(&self) -> Result<Vec<AccountAddress>> {
        let balances = self.balances.read().await;
        Ok(balances.keys().copied().collect())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let balances = self.balances.read().await;
        let mut snapshot = self.snapshot.write().await;
        *snapshot = Some(balances.clone());

        debug!(
            accounts = balances.len(),
            "📝 Ledger transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        *snapshot = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        if let Some(backup) = snapshot.take() {
            let mut balances = self.balances.write().await;
            *balances = backup;
            info!("↩️ Ledger transaction rolled back");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get_balance() {
        let storage = MemoryStorage::new();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        assert_eq!(storage.get_balance(addr).await.unwrap(), TokenAmount::ZERO);

        storage
            .set_balance(addr, TokenAmount::from_base_units(100))
            .await
            .unwrap();
        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            TokenAmount::from_base_units(100)
        );
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let storage = MemoryStorage::new();
        let addr = AccountAddress::from_bytes([1u8; 32]);

        storage
            .set_balance(addr, TokenAmount::from_base_units(50))
            .await
            .unwrap();

        storage.begin_transaction().await.unwrap();
        storage
            .set_balance(addr, TokenAmount::from_base_units(999))
            .await
            .unwrap();
        storage.rollback_transaction().await.unwrap();

        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            TokenAmount::from_base_units(50)
        );
    }

    #[tokio::test]
    async fn test_commit_discards_snapshot() {
        let storage = MemoryStorage::new();
        let addr = AccountAddress::from_bytes([2u8; 32]);

        storage.begin_transaction().await.unwrap();
        storage
            .set_balance(addr, TokenAmount::from_base_units(7))
            .await
            .unwrap();
        storage.commit_transaction().await.unwrap();

        // Rollback after commit is a no-op.
        storage.rollback_transaction().await.unwrap();
        assert_eq!(
            storage.get_balance(addr).await.unwrap(),
            TokenAmount::from_base_units(7)
        );
    }
}
