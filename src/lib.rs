//! Enumerate hostnames and IP addresses across cloud accounts, DNS providers
//! and state files, and emit one deduplicated asset list.
//!
//! # Module Structure
//!
//! - [`config`] - Provider configuration file and per-block settings
//! - [`resource`] - Canonical resource model and the dedup store
//! - [`provider`] - Provider contract, registry and bundled backends
//! - [`inventory`] - Builds providers from configuration blocks
//! - [`runner`] - Drives providers and streams results to the output
//! - [`output`] - Output modes and the stdout/file writer

pub mod config;
pub mod http;
pub mod inventory;
pub mod output;
pub mod provider;
pub mod resource;
pub mod runner;

/// Version injected at compile time via CLOUDLIST_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("CLOUDLIST_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};
