//! Desktop host capabilities (macOS, Windows, Linux).
//!
//! - [`ReqwestHttpClient`]: `HttpClient` over `reqwest`
//! - [`LoopbackPresenter`]: `AuthorizationPresenter` that receives the
//!   provider redirect on a loopback listener
//!
//! `core-runtime` picks both up automatically with its `desktop-shims`
//! feature.
//!
//! ```ignore
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let presenter = Arc::new(LoopbackPresenter::new());
//! ```

mod http;
mod presenter;

pub use http::{ReqwestHttpClient, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use presenter::{LoopbackPresenter, CONNECTION_TIMEOUT, DEFAULT_REDIRECT_TIMEOUT};
