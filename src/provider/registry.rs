//! Provider Registry - Map provider names to constructors
//!
//! The registry is the closed dispatch table used by the inventory builder.
//! It is built once at startup; embedders and tests may register more
//! backends before the run starts.

use super::{digitalocean, gcp, terraform, Provider, ProviderError};
use crate::config::ConfigBlock;
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

pub type ConstructFuture = BoxFuture<'static, Result<Box<dyn Provider>, ProviderError>>;

/// Type-erased async constructor taking one configuration block
pub type Constructor = Arc<dyn Fn(ConfigBlock) -> ConstructFuture + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every bundled backend
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(gcp::NAME, gcp::GcpProvider::from_config);
        registry.register(digitalocean::NAME, digitalocean::DigitalOceanProvider::from_config);
        registry.register(terraform::NAME, terraform::TerraformProvider::from_config);
        registry
    }

    /// Register a constructor under a provider name, replacing any previous one
    pub fn register<F, Fut, P>(&mut self, name: &str, ctor: F)
    where
        F: Fn(ConfigBlock) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, ProviderError>> + Send + 'static,
        P: Provider + 'static,
    {
        let erased: Constructor = Arc::new(move |block: ConfigBlock| -> ConstructFuture {
            let pending = ctor(block);
            Box::pin(async move {
                let provider = pending.await?;
                Ok(Box::new(provider) as Box<dyn Provider>)
            })
        });
        self.constructors.insert(name.to_ascii_lowercase(), erased);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Construct the provider a block selects.
    ///
    /// An unrecognized name is reported as a construction failure.
    pub async fn construct(&self, block: ConfigBlock) -> Result<Box<dyn Provider>, ProviderError> {
        let name = block.provider().unwrap_or_default().to_ascii_lowercase();
        let Some(ctor) = self.constructors.get(&name) else {
            return Err(ProviderError::UnknownProvider(name));
        };
        tracing::debug!("constructing provider {} [{}]", name, block.label());
        ctor(block).await
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceBatch;
    use async_trait::async_trait;

    struct Fixed {
        id: String,
    }

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn id(&self) -> &str {
            &self.id
        }

        async fn resources(&self) -> Result<ResourceBatch, ProviderError> {
            Ok(ResourceBatch::new())
        }
    }

    async fn fixed(block: ConfigBlock) -> Result<Fixed, ProviderError> {
        Ok(Fixed {
            id: block.label().to_string(),
        })
    }

    #[test]
    fn test_builtin_names() {
        let registry = ProviderRegistry::builtin();
        assert_eq!(registry.names(), vec!["digitalocean", "gcp", "terraform"]);
        assert!(registry.contains("GCP"));
        assert!(!registry.contains("aws"));
    }

    #[test]
    fn test_registered_constructor_is_used() {
        let mut registry = ProviderRegistry::new();
        registry.register("fixed", fixed);

        let block: ConfigBlock = [("provider", "Fixed"), ("id", "one")].into_iter().collect();
        let provider = tokio_test::block_on(registry.construct(block)).unwrap();
        assert_eq!(provider.name(), "fixed");
        assert_eq!(provider.id(), "one");
    }

    #[test]
    fn test_unknown_provider_is_an_error() {
        let registry = ProviderRegistry::new();
        let block: ConfigBlock = [("provider", "nope")].into_iter().collect();
        let err = tokio_test::block_on(registry.construct(block)).err().unwrap();
        assert!(matches!(err, ProviderError::UnknownProvider(name) if name == "nope"));
    }
}
