//! Workspace placeholder crate.
//!
//! Exposes the `desktop-shims` feature so host applications can depend on
//! `graph-session-workspace` and get the session controller wired with the
//! desktop bridges without listing each workspace crate.

#[cfg(feature = "desktop-shims")]
pub use core_service;
