//! Inventory Builder
//!
//! Turns configuration blocks into live providers. A block that fails to
//! construct is logged and skipped; it never stops the other blocks.

use crate::config::ConfigBlock;
use crate::provider::{Provider, ProviderRegistry};

/// The successfully constructed providers for one run, in configuration order
#[derive(Default)]
pub struct Inventory {
    providers: Vec<Box<dyn Provider>>,
}

impl Inventory {
    /// Construct a provider for every block that names one
    pub async fn build(registry: &ProviderRegistry, blocks: Vec<ConfigBlock>) -> Self {
        let mut providers = Vec::new();

        for block in blocks {
            let Some(name) = block.provider().map(str::to_string) else {
                tracing::debug!("Skipping configuration block without a provider key");
                continue;
            };
            let label = block.label().to_string();

            match registry.construct(block).await {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    tracing::warn!("Could not initialise provider {} [{}]: {}", name, label, e);
                }
            }
        }

        Self { providers }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Provider> {
        self.providers.iter().map(|p| p.as_ref())
    }
}

impl From<Vec<Box<dyn Provider>>> for Inventory {
    fn from(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }
}
