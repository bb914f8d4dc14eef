//! # Host Bridge Traits
//!
//! What the session core needs from the application hosting it. Each trait
//! is implemented once per platform; `bridge-desktop` carries the desktop
//! versions.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`HttpClient`] | Send token and Graph requests |
//! | [`AuthorizationPresenter`] | Show the provider's sign-in page and return its redirect |
//! | [`UiSurface`] | Buttons and text fields, touched only on the UI thread |
//! | [`LoggerSink`] | Receive the core's log events |
//!
//! Every trait but [`UiSurface`] is `Send + Sync`. Failures are reported as
//! [`BridgeError`]; transport problems use `Network` or `Timeout` so the
//! core can tell them apart from a response it did not like.

pub mod error;
pub mod http;
pub mod logger;
pub mod presenter;
pub mod ui;

pub use error::BridgeError;
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use presenter::{AuthorizationPresenter, PresenterOutcome};
pub use ui::{ControlState, UiSurface};
