//! DigitalOcean provider
//!
//! Lists the public and private addresses of every droplet in an account.

use crate::config::{ConfigBlock, ConfigError};
use crate::http::{with_query, HttpClient};
use crate::provider::{select_services, Provider, ProviderError};
use crate::resource::{IdentityField, Resource, ResourceBatch};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

pub const NAME: &str = "digitalocean";

pub const SERVICE_DROPLET: &str = "droplet";

pub const SUPPORTED_SERVICES: &[&str] = &[SERVICE_DROPLET];

const DEFAULT_BASE_URL: &str = "https://api.digitalocean.com";

const PAGE_SIZE: &str = "200";

/// Validated settings for one DigitalOcean account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalOceanConfig {
    pub id: String,
    pub token: String,
    pub base_url: Url,
    pub services: Vec<&'static str>,
}

impl DigitalOceanConfig {
    pub fn from_block(block: &ConfigBlock) -> Result<Self, ConfigError> {
        let token = block.require("digitalocean_token")?.to_string();
        let raw_base = block.get("base_url").unwrap_or(DEFAULT_BASE_URL);
        let base_url = Url::parse(raw_base).map_err(|e| ConfigError::InvalidValue {
            key: "base_url".to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            id: block.label().to_string(),
            token,
            base_url,
            services: select_services(&block.services(), SUPPORTED_SERVICES),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DropletPage {
    #[serde(default)]
    droplets: Vec<Droplet>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    pages: Pages,
}

#[derive(Debug, Default, Deserialize)]
struct Pages {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Droplet {
    #[serde(default)]
    networks: Networks,
}

#[derive(Debug, Default, Deserialize)]
struct Networks {
    #[serde(default)]
    v4: Vec<NetworkAddress>,
    #[serde(default)]
    v6: Vec<NetworkAddress>,
}

#[derive(Debug, Deserialize)]
struct NetworkAddress {
    ip_address: String,
    #[serde(rename = "type")]
    kind: String,
}

pub struct DigitalOceanProvider {
    id: String,
    token: String,
    base_url: Url,
    http: HttpClient,
    services: Vec<&'static str>,
}

impl DigitalOceanProvider {
    pub async fn from_config(block: ConfigBlock) -> Result<Self, ProviderError> {
        let config = DigitalOceanConfig::from_block(&block)?;
        Ok(Self {
            id: config.id,
            token: config.token,
            base_url: config.base_url,
            http: HttpClient::new()?,
            services: config.services,
        })
    }

    fn droplets_url(&self) -> Result<String, ProviderError> {
        let url = self
            .base_url
            .join("v2/droplets")
            .map_err(|e| ProviderError::Decode(format!("invalid droplets URL: {e}")))?;
        Ok(with_query(url.as_str(), "per_page", PAGE_SIZE))
    }

    async fn droplets(&self) -> Result<ResourceBatch, ProviderError> {
        let mut batch = ResourceBatch::new();
        let mut next = Some(self.droplets_url()?);

        while let Some(url) = next {
            let response = self.http.get_json(&url, &self.token).await?;
            let page: DropletPage = serde_json::from_value(response)?;
            for droplet in &page.droplets {
                batch.extend(droplet_resources(droplet, &self.id));
            }
            next = same_origin_link(&self.base_url, page.links.pages.next)?;
        }

        Ok(batch)
    }
}

/// Accept a pagination link only if it stays on the API origin the token was issued for
fn same_origin_link(base: &Url, link: Option<String>) -> Result<Option<String>, ProviderError> {
    let Some(link) = link else {
        return Ok(None);
    };
    let url = Url::parse(&link)
        .map_err(|e| ProviderError::Decode(format!("invalid next page link: {e}")))?;
    if url.origin() != base.origin() {
        tracing::warn!(
            "Refusing to follow next page link to {}",
            url.origin().ascii_serialization()
        );
        return Err(ProviderError::Decode(format!(
            "next page link leaves {}",
            base.origin().ascii_serialization()
        )));
    }
    Ok(Some(link))
}

#[async_trait]
impl Provider for DigitalOceanProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn services(&self) -> Vec<&'static str> {
        self.services.clone()
    }

    async fn resources(&self) -> Result<ResourceBatch, ProviderError> {
        let mut batch = ResourceBatch::new();
        if self.services.contains(&SERVICE_DROPLET) {
            batch.merge(self.droplets().await?);
        }
        Ok(batch)
    }
}

fn droplet_resources(droplet: &Droplet, id: &str) -> Vec<Resource> {
    let v4 = droplet.networks.v4.iter().map(|a| {
        let field = if a.kind == "public" {
            IdentityField::PublicIpv4
        } else {
            IdentityField::PrivateIpv4
        };
        (field, a.ip_address.as_str())
    });
    let v6 = droplet.networks.v6.iter().map(|a| {
        let field = if a.kind == "public" {
            IdentityField::PublicIpv6
        } else {
            IdentityField::PrivateIpv6
        };
        (field, a.ip_address.as_str())
    });

    v4.chain(v6)
        .filter(|(_, ip)| !ip.is_empty())
        .map(|(field, ip)| Resource::single(NAME, id, field, ip).with_service(SERVICE_DROPLET))
        .collect()
}
