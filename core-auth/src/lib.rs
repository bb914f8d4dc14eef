//! # Authentication Module
//!
//! Single-account identity client for the Microsoft identity platform.
//!
//! ## Overview
//!
//! [`IdentityClient`] owns the signed-in account and hands out access
//! tokens. It talks to the identity provider only through the
//! [`IdentityBroker`] trait, so a host can plug in its platform SDK. The
//! bundled [`OAuthBroker`] implements the broker over OAuth 2.0
//! authorization code + PKCE with an in-memory token cache.
//!
//! ## Features
//!
//! - Interactive sign-in and token acquisition through a host presenter
//! - Silent token acquisition from cached material, refreshed once on expiry
//! - Account-change detection when the provider reports a different account
//! - Auth state event emission on the core event bus

pub mod broker;
pub mod client;
pub mod error;
pub mod oauth;
pub mod token_cache;
pub mod types;

pub use broker::{IdentityBroker, OAuthBroker};
pub use client::IdentityClient;
pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use types::{
    Account, AccountId, AccountLoad, AuthOutcome, AuthRequest, ClientState, OAuthTokens, Prompt,
    TokenResult, MAX_TOKEN_LIFETIME_SECS,
};
