//! Orchestration pipeline
//!
//! Selects configuration blocks, builds the inventory, enumerates providers
//! one after another and streams newly admitted resources to the output.
//! Provider failures are logged and skipped; only output errors and an
//! empty inventory end the run early.

use crate::config::{ConfigBlock, SERVICES_KEY};
use crate::inventory::Inventory;
use crate::output::{Renderer, Tally};
use crate::provider::{Provider, ProviderError, ProviderRegistry};
use crate::resource::{DedupStore, ResourceBatch};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::time::Duration;

/// Provider, id and service filters supplied on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    pub providers: Vec<String>,
    pub ids: Vec<String>,
    pub services: Vec<String>,
}

impl Filters {
    /// Whether a block survives the provider and id filters (case-insensitive)
    pub fn matches(&self, block: &ConfigBlock) -> bool {
        if !self.providers.is_empty() {
            let Some(provider) = block.provider() else {
                return false;
            };
            if !self.providers.iter().any(|p| p.eq_ignore_ascii_case(provider)) {
                return false;
            }
        }
        if !self.ids.is_empty()
            && !self
                .ids
                .iter()
                .any(|id| id.eq_ignore_ascii_case(block.label()))
        {
            return false;
        }
        true
    }

    /// Drop blocks that don't match and apply the service filter to the rest
    pub fn apply(&self, blocks: Vec<ConfigBlock>) -> Vec<ConfigBlock> {
        blocks
            .into_iter()
            .filter(|block| self.matches(block))
            .map(|mut block| {
                if !self.services.is_empty() {
                    block.set(SERVICES_KEY, self.services.join(","));
                }
                block
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub filters: Filters,
    pub renderer: Renderer,
    /// Budget for one provider's enumeration; `None` waits indefinitely
    pub timeout: Option<Duration>,
    /// Suppress per-provider summaries on standard error
    pub silent: bool,
}

/// Outcome of enumerating one provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReport {
    pub provider: String,
    pub id: String,
    pub hosts: usize,
    pub ips: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<ProviderReport>,
    /// Single-field records retained by the dedup store over the whole run
    pub retained: usize,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.error.is_some()).count()
    }
}

pub struct Runner {
    registry: ProviderRegistry,
    options: RunOptions,
}

impl Runner {
    pub fn new(registry: ProviderRegistry, options: RunOptions) -> Self {
        Self { registry, options }
    }

    /// Filter the configuration, build the inventory and enumerate it
    pub async fn run<W: Write>(
        &self,
        blocks: Vec<ConfigBlock>,
        out: &mut W,
    ) -> Result<RunSummary> {
        let selected = self.options.filters.apply(blocks);
        if selected.is_empty() {
            bail!("no provider configuration matched the given filters");
        }
        tracing::info!("{} provider block(s) selected", selected.len());

        let inventory = Inventory::build(&self.registry, selected).await;
        if inventory.is_empty() {
            bail!("none of the configured providers could be initialised");
        }

        self.enumerate(&inventory, out).await
    }

    /// Enumerate every provider in order into one dedup store
    pub async fn enumerate<W: Write>(
        &self,
        inventory: &Inventory,
        out: &mut W,
    ) -> Result<RunSummary> {
        let store = DedupStore::new();
        let mut summary = RunSummary::default();

        for provider in inventory.iter() {
            let report = match self.fetch(provider).await {
                Ok(batch) => {
                    let tally = self.emit(&store, &batch, out)?;
                    ProviderReport {
                        provider: provider.name().to_string(),
                        id: provider.id().to_string(),
                        hosts: tally.hosts,
                        ips: tally.ips,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Could not get resources for provider {} [{}]: {}",
                        provider.name(),
                        provider.id(),
                        e
                    );
                    ProviderReport {
                        provider: provider.name().to_string(),
                        id: provider.id().to_string(),
                        hosts: 0,
                        ips: 0,
                        error: Some(e.to_string()),
                    }
                }
            };

            self.report(&report);
            summary.reports.push(report);
        }

        out.flush().context("failed to flush output")?;
        summary.retained = store.len();
        Ok(summary)
    }

    async fn fetch(&self, provider: &dyn Provider) -> Result<ResourceBatch, ProviderError> {
        tracing::debug!(
            "Enumerating {} [{}] services={:?}",
            provider.name(),
            provider.id(),
            provider.services()
        );
        match self.options.timeout {
            Some(budget) => tokio::time::timeout(budget, provider.resources())
                .await
                .map_err(|_| ProviderError::Timeout(budget))?,
            None => provider.resources().await,
        }
    }

    /// Merge a batch into the store and write what it newly contributed
    fn emit<W: Write>(
        &self,
        store: &DedupStore,
        batch: &ResourceBatch,
        out: &mut W,
    ) -> Result<Tally> {
        let renderer = &self.options.renderer;

        let mut tally = Tally::default();
        for resource in batch {
            tally.add(renderer.tally(resource));
        }

        for admission in store.merge(batch) {
            for line in renderer.render(&admission).context("failed to render resource")? {
                writeln!(out, "{line}").context("failed to write output")?;
            }
        }

        Ok(tally)
    }

    fn report(&self, report: &ProviderReport) {
        let label = if report.id.is_empty() {
            report.provider.clone()
        } else {
            format!("{} [{}]", report.provider, report.id)
        };

        let message = match (&report.error, report.hosts + report.ips) {
            (Some(_), _) => return,
            (None, 0) => format!("No results found for {label}"),
            (None, _) => format!(
                "Found {} hosts and {} IPs from {label}",
                report.hosts, report.ips
            ),
        };

        tracing::info!("{}", message);
        if !self.options.silent {
            eprintln!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(pairs: &[(&str, &str)]) -> ConfigBlock {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_provider_filter_is_case_insensitive() {
        let filters = Filters {
            providers: vec!["AWS".to_string()],
            ..Filters::default()
        };
        assert!(filters.matches(&block(&[("provider", "aws")])));
        assert!(!filters.matches(&block(&[("provider", "gcp")])));
        assert!(!filters.matches(&block(&[("id", "no-provider")])));
    }

    #[test]
    fn test_id_filter_uses_label() {
        let filters = Filters {
            ids: vec!["Staging".to_string()],
            ..Filters::default()
        };
        assert!(filters.matches(&block(&[("provider", "aws"), ("profile", "staging")])));
        assert!(!filters.matches(&block(&[("provider", "aws"), ("id", "prod")])));
    }

    #[test]
    fn test_no_filters_keeps_everything() {
        let blocks = vec![block(&[("provider", "aws")]), block(&[("id", "x")])];
        assert_eq!(Filters::default().apply(blocks.clone()), blocks);
    }

    #[test]
    fn test_service_filter_overrides_block_services() {
        let filters = Filters {
            services: vec!["dns".to_string(), "compute".to_string()],
            ..Filters::default()
        };
        let applied = filters.apply(vec![block(&[("provider", "gcp"), ("services", "compute")])]);
        assert_eq!(applied[0].services(), vec!["dns", "compute"]);
    }
}
