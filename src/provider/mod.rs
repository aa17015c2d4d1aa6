//! Provider abstraction layer
//!
//! A provider is one backend integration configured for one account or
//! profile. Backends differ wildly in their native object models; all of
//! them answer the same [`Provider`] contract and return canonical
//! [`Resource`](crate::resource::Resource) records.
//!
//! # Architecture
//!
//! - [`registry`] - Maps provider names to async constructors
//! - [`gcp`] - Google Cloud compute, load balancer and Cloud DNS assets
//! - [`digitalocean`] - DigitalOcean droplets
//! - [`terraform`] - Addresses and host names recorded in Terraform state
//!
//! # Example
//!
//! ```ignore
//! use cloudlist::provider::ProviderRegistry;
//!
//! async fn list(block: cloudlist::config::ConfigBlock) -> anyhow::Result<()> {
//!     let provider = ProviderRegistry::builtin().construct(block).await?;
//!     let batch = provider.resources().await?;
//!     println!("{} records", batch.len());
//!     Ok(())
//! }
//! ```

pub mod digitalocean;
pub mod gcp;
pub mod registry;
pub mod terraform;

pub use registry::{Constructor, ProviderRegistry};

use crate::config::ConfigError;
use crate::resource::ResourceBatch;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors a backend can report while being constructed or enumerated
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("enumeration timed out after {0:?}")]
    Timeout(Duration),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Decode(err.to_string())
    }
}

/// The contract every backend satisfies
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend type, e.g. "gcp"
    fn name(&self) -> &str;

    /// Label distinguishing several instances of the same backend
    fn id(&self) -> &str;

    /// Sub-resource categories this instance will fetch
    fn services(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Enumerate every asset visible to this instance.
    ///
    /// Called once per provider lifetime; failures are returned, never panicked.
    async fn resources(&self) -> Result<ResourceBatch, ProviderError>;
}

/// Pick which of a backend's sub-fetchers run.
///
/// Requested names are matched case-sensitively. When nothing is requested,
/// or nothing requested is supported, every supported service runs.
pub fn select_services(requested: &[String], supported: &[&'static str]) -> Vec<&'static str> {
    let selected: Vec<&'static str> = supported
        .iter()
        .copied()
        .filter(|s| requested.iter().any(|r| r == s))
        .collect();

    if selected.is_empty() {
        supported.to_vec()
    } else {
        selected
    }
}
