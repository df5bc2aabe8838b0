//! Windows projection layer for VaultFS.
//!
//! Bridges the ProjFS callback protocol - synchronous, kernel-driven,
//! bounded-latency - onto the asynchronous logical filesystem from
//! `vaultfs-core`. The `projfs` module owns everything that touches the
//! platform API and only builds on Windows; the remaining modules hold the
//! callback-side state machines and are compiled and tested everywhere.

pub mod bridge;
pub mod error;
pub mod notify;
pub mod pending;
pub mod resolve;
pub mod session;

#[cfg(windows)]
pub mod projfs;

pub use bridge::AsyncBridge;
pub use error::{ProviderError, ProviderResult};

#[cfg(windows)]
pub use projfs::provider::VirtualizationHost;
