//! # Core Runtime
//!
//! Shared plumbing for the session crates:
//!
//! - [`config`]: the identity client resource, Graph settings and the
//!   injected host capabilities, assembled into an `AppConfig`
//! - [`events`]: the broadcast bus auth and API events travel on
//! - [`logging`]: `tracing` subscriber setup and host log forwarding

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
