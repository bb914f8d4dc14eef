//! Interactive Authorization Abstraction
//!
//! The identity broker cannot show UI by itself. Hosts hand it an
//! [`AuthorizationPresenter`] that opens the authorization page (system
//! browser, custom tab, embedded web view) and reports where the provider
//! redirected once the user finished.

use async_trait::async_trait;

use crate::error::Result;

/// Result of presenting an authorization page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterOutcome {
    /// The provider redirected to the registered redirect URI.
    ///
    /// Carries the full redirect URL including its query string.
    Redirected(String),
    /// The user closed or backed out of the authorization page.
    Cancelled,
}

/// Presents an authorization URL to the user.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::presenter::{AuthorizationPresenter, PresenterOutcome};
///
/// async fn authorize(presenter: &dyn AuthorizationPresenter, url: &str) {
///     match presenter.present(url, "http://localhost:8400/callback").await {
///         Ok(PresenterOutcome::Redirected(redirect)) => println!("{redirect}"),
///         Ok(PresenterOutcome::Cancelled) => println!("cancelled"),
///         Err(e) => eprintln!("{e}"),
///     }
/// }
/// ```
#[async_trait]
pub trait AuthorizationPresenter: Send + Sync {
    /// Show `authorize_url` and wait until the provider redirects to
    /// `redirect_uri` or the user cancels.
    async fn present(&self, authorize_url: &str, redirect_uri: &str) -> Result<PresenterOutcome>;
}
