//! # VaultFS Core
//!
//! The platform-independent core for VaultFS - a virtual filesystem provider
//! that projects a content-addressed object store and an asynchronous logical
//! filesystem into a read-only directory tree.
//!
//! ## Overview
//!
//! The on-disk object store keeps immutable blobs keyed by hex hash. VaultFS
//! exposes those blobs, plus dynamically assembled namespaces supplied by a
//! host application (chat transcripts, type indexes, invitation artifacts,
//! ...), as ordinary files and directories. The Windows projection layer
//! lives in `vaultfs-windows`; this crate provides everything that does not
//! touch the platform:
//!
//! - [`types`]: canonical paths, entry metadata, directory listings
//! - [`traits`]: the [`traits::LogicalFileSystem`] interface the host implements
//! - [`cache`]: the tiered TTL cache that turns async fetches into sync hits
//! - [`store`]: the direct-disk reader for the content-addressed store
//! - [`config`]: mount configuration
//! - [`error`]: error taxonomy
//! - [`stats`]: provider and cache counters

pub mod cache;
pub mod config;
pub mod error;
pub mod stats;
pub mod store;
pub mod traits;
pub mod types;

pub use cache::ContentCache;
pub use config::MountConfig;
pub use error::{Result, VaultError};
pub use store::ObjectStore;
pub use traits::LogicalFileSystem;
pub use types::{DirListing, FileContent, FileInfo, VaultPath};
