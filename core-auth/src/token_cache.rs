//! In-memory Token Cache
//!
//! Holds the single cached credential (account plus token set) used by the
//! bundled broker for silent acquisition. Nothing is written to disk; the
//! cache lives as long as the broker.
//!
//! ## Security Features
//!
//! - Tokens are never logged or exposed in error messages
//! - Clearing drops the refresh token immediately
//! - With [`CacheBehavior::Disabled`] nothing is retained at all
//!
//! ## Example
//!
//! ```
//! use core_auth::token_cache::TokenCache;
//! use core_auth::{Account, AccountId, OAuthTokens};
//! use core_runtime::config::CacheBehavior;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = TokenCache::new(CacheBehavior::InMemory);
//! let account = Account::new(AccountId::new("oid-1"), "ada@contoso.com");
//! let tokens = OAuthTokens::new("at".to_string(), Some("rt".to_string()), 3600, vec![]);
//!
//! cache.store(account.clone(), tokens).await;
//! assert_eq!(cache.account().await, Some(account));
//!
//! cache.clear().await;
//! assert!(cache.account().await.is_none());
//! # }
//! ```

use crate::types::{Account, OAuthTokens};
use core_runtime::config::CacheBehavior;
use tokio::sync::RwLock;
use tracing::debug;

/// An account together with the tokens last issued for it.
#[derive(Debug, Clone)]
pub struct CachedCredential {
    pub account: Account,
    pub tokens: OAuthTokens,
}

/// Single-slot credential cache.
#[derive(Debug)]
pub struct TokenCache {
    behavior: CacheBehavior,
    slot: RwLock<Option<CachedCredential>>,
}

impl TokenCache {
    pub fn new(behavior: CacheBehavior) -> Self {
        Self {
            behavior,
            slot: RwLock::new(None),
        }
    }

    pub fn behavior(&self) -> CacheBehavior {
        self.behavior
    }

    /// Replace the cached credential. A no-op when caching is disabled.
    pub async fn store(&self, account: Account, tokens: OAuthTokens) {
        if self.behavior == CacheBehavior::Disabled {
            debug!("Token cache disabled, not storing credential");
            return;
        }

        debug!(account_id = %account.id, "Caching credential");
        *self.slot.write().await = Some(CachedCredential { account, tokens });
    }

    /// Replace only the token set, keeping the account.
    pub async fn update_tokens(&self, tokens: OAuthTokens) {
        if let Some(credential) = self.slot.write().await.as_mut() {
            credential.tokens = tokens;
        }
    }

    pub async fn account(&self) -> Option<Account> {
        self.slot.read().await.as_ref().map(|c| c.account.clone())
    }

    pub async fn credential(&self) -> Option<CachedCredential> {
        self.slot.read().await.clone()
    }

    /// Drop the cached credential. Returns the account that was held.
    pub async fn clear(&self) -> Option<Account> {
        let removed = self.slot.write().await.take();
        if let Some(credential) = &removed {
            debug!(account_id = %credential.account.id, "Cleared cached credential");
        }
        removed.map(|c| c.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountId;

    fn tokens(access: &str) -> OAuthTokens {
        OAuthTokens::new(
            access.to_string(),
            Some("rt".to_string()),
            3600,
            vec!["Files.Read".to_string()],
        )
    }

    #[tokio::test]
    async fn test_store_and_update() {
        let cache = TokenCache::new(CacheBehavior::InMemory);
        let account = Account::new(AccountId::new("a"), "a@contoso.com");

        cache.store(account.clone(), tokens("first")).await;
        cache.update_tokens(tokens("second")).await;

        let credential = cache.credential().await.unwrap();
        assert_eq!(credential.account, account);
        assert_eq!(credential.tokens.access_token, "second");
    }

    #[tokio::test]
    async fn test_update_without_credential_is_noop() {
        let cache = TokenCache::new(CacheBehavior::InMemory);
        cache.update_tokens(tokens("orphan")).await;
        assert!(cache.credential().await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_keeps_nothing() {
        let cache = TokenCache::new(CacheBehavior::Disabled);
        cache
            .store(Account::new(AccountId::new("a"), "a"), tokens("t"))
            .await;
        assert!(cache.account().await.is_none());
        assert!(cache.clear().await.is_none());
    }

    #[tokio::test]
    async fn test_clear_returns_account() {
        let cache = TokenCache::new(CacheBehavior::InMemory);
        let account = Account::new(AccountId::new("a"), "a");
        cache.store(account.clone(), tokens("t")).await;

        assert_eq!(cache.clear().await, Some(account));
        assert!(cache.clear().await.is_none());
    }
}
