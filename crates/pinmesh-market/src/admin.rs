//! Admin set with a protected initial entry.
//!
//! The first admin is fixed at construction and can never be removed, so the
//! marketplace cannot be left without an administrator.

use crate::error::{MarketError, Result};
use pinmesh_economics::AccountAddress;
use tokio::sync::RwLock;
use tracing::info;

pub struct AdminRegistry {
    // admins[0] is the initial admin.
    admins: RwLock<Vec<AccountAddress>>,
}

impl AdminRegistry {
    pub fn new(initial_admin: AccountAddress) -> Self {
        Self {
            admins: RwLock::new(vec![initial_admin]),
        }
    }

    pub async fn is_admin(&self, address: &AccountAddress) -> bool {
        self.admins.read().await.contains(address)
    }

    pub async fn require_admin(&self, caller: &AccountAddress) -> Result<()> {
        if !self.is_admin(caller).await {
            return Err(MarketError::NotAdmin(caller.to_string()));
        }
        Ok(())
    }

    pub async fn add_admin(&self, new_admin: AccountAddress) -> Result<()> {
        let mut admins = self.admins.write().await;
        if admins.contains(&new_admin) {
            return Err(MarketError::AdminExists(new_admin.to_string()));
        }
        admins.push(new_admin);
        info!(admin = %new_admin, "🔑 Admin added");
        Ok(())
    }

    pub async fn remove_admin(&self, admin: AccountAddress) -> Result<()> {
        let mut admins = self.admins.write().await;
        if admins.first() == Some(&admin) {
            return Err(MarketError::CannotRemoveInitialAdmin);
        }
        let position = admins
            .iter()
            .position(|a| *a == admin)
            .ok_or_else(|| MarketError::AdminNotFound(admin.to_string()))?;
        admins.remove(position);
        info!(admin = %admin, "🔑 Admin removed");
        Ok(())
    }

    pub async fn admins(&self) -> Vec<AccountAddress> {
        self.admins.read().await.clone()
    }
}
