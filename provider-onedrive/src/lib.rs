//! # OneDrive Provider
//!
//! Microsoft Graph client for the signed-in user's profile and drive.
//!
//! ## Overview
//!
//! This module provides:
//! - [`GraphClient::fetch_profile`], one authenticated `GET /me?$expand=drive`
//! - Typed Graph resources ([`UserProfile`], [`Drive`], [`Quota`])
//! - [`OneDriveError`] separating HTTP failures from transport failures

pub mod client;
pub mod error;
pub mod types;

pub use client::GraphClient;
pub use error::{OneDriveError, Result};
pub use types::{Drive, Identity, IdentitySet, Quota, UserProfile};
