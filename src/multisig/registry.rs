//! Wallet registry
//!
//! Creates and stores multisig wallet definitions.

use crate::multisig::error::MultisigError;
use crate::multisig::wallet::{MultisigConfig, MultisigWallet};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct RegistryInner {
    /// Wallets by id
    wallets: HashMap<String, MultisigWallet>,
    /// Wallet id by derived address
    by_address: HashMap<String, String>,
    /// Wallet ids in creation order
    order: Vec<String>,
}

/// Registry of multisig wallets
#[derive(Debug, Default)]
pub struct WalletRegistry {
    inner: RwLock<RegistryInner>,
}

impl WalletRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted wallets
    ///
    /// Wallets are re-ordered by creation time.
    pub fn from_wallets(mut wallets: Vec<MultisigWallet>) -> Self {
        wallets.sort_by_key(|w| w.created_at);

        let mut inner = RegistryInner::default();
        for wallet in wallets {
            inner.by_address.insert(wallet.address.clone(), wallet.id.clone());
            inner.order.push(wallet.id.clone());
            inner.wallets.insert(wallet.id.clone(), wallet);
        }

        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Create a new multisig wallet
    ///
    /// A configuration whose address is already registered returns the
    /// existing wallet unchanged.
    pub async fn create_wallet(
        &self,
        name: &str,
        members: Vec<String>,
        threshold: usize,
    ) -> Result<MultisigWallet, MultisigError> {
        let config = MultisigConfig::new(name, members, threshold)?;
        let address = config.derive_address();

        let mut inner = self.inner.write().await;

        if let Some(existing) = inner
            .by_address
            .get(&address)
            .and_then(|id| inner.wallets.get(id))
        {
            log::info!(
                "Wallet configuration {} already registered as {}",
                address,
                existing.id
            );
            return Ok(existing.clone());
        }

        let wallet = MultisigWallet::new(config);
        inner.by_address.insert(address, wallet.id.clone());
        inner.order.push(wallet.id.clone());
        inner.wallets.insert(wallet.id.clone(), wallet.clone());

        log::info!(
            "Created {} wallet '{}' ({}) at {}",
            wallet.description(),
            wallet.name,
            wallet.id,
            wallet.address
        );

        Ok(wallet)
    }

    /// Get a wallet by id
    pub async fn get_wallet(&self, wallet_id: &str) -> Result<MultisigWallet, MultisigError> {
        self.inner
            .read()
            .await
            .wallets
            .get(wallet_id)
            .cloned()
            .ok_or_else(|| MultisigError::WalletNotFound(wallet_id.to_string()))
    }

    /// Get a wallet by its derived address
    pub async fn get_by_address(&self, address: &str) -> Result<MultisigWallet, MultisigError> {
        let inner = self.inner.read().await;
        inner
            .by_address
            .get(address)
            .and_then(|id| inner.wallets.get(id))
            .cloned()
            .ok_or_else(|| MultisigError::WalletNotFound(address.to_string()))
    }

    /// List all wallets, oldest first
    pub async fn list_wallets(&self) -> Vec<MultisigWallet> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.wallets.get(id))
            .cloned()
            .collect()
    }

    /// Record the advisory balance reported for a wallet
    pub async fn set_cached_balance(
        &self,
        wallet_id: &str,
        balance: u64,
    ) -> Result<(), MultisigError> {
        let mut inner = self.inner.write().await;
        let wallet = inner
            .wallets
            .get_mut(wallet_id)
            .ok_or_else(|| MultisigError::WalletNotFound(wallet_id.to_string()))?;
        wallet.cached_balance = Some(balance);
        Ok(())
    }

    /// Get wallet count
    pub async fn wallet_count(&self) -> usize {
        self.inner.read().await.wallets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn members(n: usize) -> Vec<String> {
        (0..n).map(|_| KeyPair::generate().address()).collect()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let registry = WalletRegistry::new();
        let wallet = registry.create_wallet("Ops", members(3), 2).await.unwrap();

        assert_eq!(registry.get_wallet(&wallet.id).await.unwrap(), wallet);
        assert_eq!(registry.get_by_address(&wallet.address).await.unwrap(), wallet);
        assert!(matches!(
            registry.get_wallet("missing").await,
            Err(MultisigError::WalletNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_same_config_returns_existing() {
        let registry = WalletRegistry::new();
        let m = members(3);

        let first = registry.create_wallet("Ops", m.clone(), 2).await.unwrap();
        let second = registry.create_wallet("Other", m, 2).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Ops");
        assert_eq!(registry.wallet_count().await, 1);
    }

    #[tokio::test]
    async fn test_concatenation_equal_member_sets_stay_distinct() {
        let registry = WalletRegistry::new();
        let first = registry
            .create_wallet("A", vec!["1".repeat(32), "2".repeat(33)], 2)
            .await
            .unwrap();
        let requested = vec![format!("{}2", "1".repeat(32)), "2".repeat(32)];
        let second = registry
            .create_wallet("B", requested.clone(), 2)
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.address, second.address);
        for member in &requested {
            assert!(second.is_member(member));
        }
        assert_eq!(registry.wallet_count().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_creates_nothing() {
        let registry = WalletRegistry::new();
        assert!(registry.create_wallet("Ops", members(2), 3).await.is_err());
        assert_eq!(registry.wallet_count().await, 0);
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let registry = WalletRegistry::new();
        let a = registry.create_wallet("A", members(2), 1).await.unwrap();
        let b = registry.create_wallet("B", members(2), 2).await.unwrap();
        let c = registry.create_wallet("C", members(3), 2).await.unwrap();

        let ids: Vec<String> = registry.list_wallets().await.into_iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn test_cached_balance() {
        let registry = WalletRegistry::new();
        let wallet = registry.create_wallet("A", members(2), 1).await.unwrap();
        assert_eq!(wallet.cached_balance, None);

        registry.set_cached_balance(&wallet.id, 1_500).await.unwrap();
        assert_eq!(
            registry.get_wallet(&wallet.id).await.unwrap().cached_balance,
            Some(1_500)
        );
    }
}
