//! Google Cloud provider
//!
//! Lists compute instance addresses, forwarding rule addresses and Cloud DNS
//! record sets for one project.
//!
//! # Module Structure
//!
//! - [`auth`] - Service account key or Application Default Credentials
//! - [`client`] - Authenticated REST client with pagination

pub mod auth;
pub mod client;

use crate::config::{ConfigBlock, ConfigError};
use crate::provider::{select_services, Provider, ProviderError};
use crate::resource::{IdentityField, Resource, ResourceBatch};
use async_trait::async_trait;
use client::GcpClient;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use std::path::PathBuf;
use url::Url;

pub const NAME: &str = "gcp";

pub const SERVICE_COMPUTE: &str = "compute";
pub const SERVICE_FORWARDING_RULES: &str = "forwarding-rules";
pub const SERVICE_DNS: &str = "dns";

pub const SUPPORTED_SERVICES: &[&str] =
    &[SERVICE_COMPUTE, SERVICE_FORWARDING_RULES, SERVICE_DNS];

/// Managed zones whose record sets are fetched at the same time
const DNS_ZONE_CONCURRENCY: usize = 4;

/// Validated settings for one GCP project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpConfig {
    pub id: String,
    pub project_id: String,
    pub service_account_key: Option<PathBuf>,
    /// Pre-issued access token, used instead of the key file or ADC
    pub access_token: Option<String>,
    /// Single endpoint serving both the Compute and DNS APIs
    pub base_url: Option<String>,
    pub services: Vec<&'static str>,
}

impl GcpConfig {
    pub fn from_block(block: &ConfigBlock) -> Result<Self, ProviderError> {
        let project_id = match block.get("project_id") {
            Some(project) => project.to_string(),
            None => auth::default_project().ok_or_else(|| ConfigError::MissingKey {
                provider: NAME.to_string(),
                key: "project_id".to_string(),
            })?,
        };

        let base_url = match block.get("base_url") {
            Some(raw) => {
                Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
                    key: "base_url".to_string(),
                    reason: e.to_string(),
                })?;
                Some(raw.to_string())
            }
            None => None,
        };

        Ok(Self {
            id: block.label().to_string(),
            project_id,
            service_account_key: block.get("service_account_key").map(PathBuf::from),
            access_token: block.get("access_token").map(str::to_string),
            base_url,
            services: select_services(&block.services(), SUPPORTED_SERVICES),
        })
    }
}

pub struct GcpProvider {
    id: String,
    client: GcpClient,
    services: Vec<&'static str>,
}

impl GcpProvider {
    pub async fn from_config(block: ConfigBlock) -> Result<Self, ProviderError> {
        let config = GcpConfig::from_block(&block)?;
        let credentials = match &config.access_token {
            Some(token) => auth::GcpCredentials::from_access_token(token.as_str()),
            None => auth::GcpCredentials::new(config.service_account_key.as_deref()).await?,
        };
        // Fail construction rather than enumeration when credentials are unusable
        credentials.get_token().await?;

        tracing::info!("Using GCP project: {} [{}]", config.project_id, config.id);

        Ok(Self {
            id: config.id,
            client: GcpClient::new(credentials, &config.project_id, config.base_url.as_deref())?,
            services: config.services,
        })
    }

    async fn instances(&self) -> Result<ResourceBatch, ProviderError> {
        let instances = self.client.list_aggregated("instances").await?;
        tracing::debug!("gcp: {} instances", instances.len());
        Ok(instances
            .iter()
            .flat_map(|i| instance_resources(i, &self.id))
            .collect())
    }

    async fn forwarding_rules(&self) -> Result<ResourceBatch, ProviderError> {
        let mut rules = self.client.list_aggregated("forwardingRules").await?;
        rules.extend(
            self.client
                .list_all(&self.client.compute_url("global/forwardingRules"), "items")
                .await?,
        );
        tracing::debug!("gcp: {} forwarding rules", rules.len());
        Ok(rules
            .iter()
            .flat_map(|r| forwarding_rule_resources(r, &self.id))
            .collect())
    }

    async fn dns(&self) -> Result<ResourceBatch, ProviderError> {
        let zones = self
            .client
            .list_all(&self.client.dns_url("managedZones"), "managedZones")
            .await?;

        // Zones are fetched concurrently; `buffered` keeps results in zone order
        let per_zone: Vec<ResourceBatch> = stream::iter(zones)
            .map(|zone| async move { self.zone_records(zone).await })
            .buffered(DNS_ZONE_CONCURRENCY)
            .try_collect()
            .await?;

        let mut batch = ResourceBatch::new();
        for zone_batch in per_zone {
            batch.merge(zone_batch);
        }
        Ok(batch)
    }

    async fn zone_records(&self, zone: Value) -> Result<ResourceBatch, ProviderError> {
        let Some(name) = str_field(&zone, "name") else {
            return Ok(ResourceBatch::new());
        };
        let public = str_field(&zone, "visibility") != Some("private");
        let url = self.client.dns_url(&format!("managedZones/{name}/rrsets"));

        let record_sets = self.client.list_all(&url, "rrsets").await.map_err(|e| {
            tracing::debug!("Failed to list record sets for zone {}: {}", name, e);
            e
        })?;
        Ok(record_sets
            .iter()
            .flat_map(|rs| record_set_resources(rs, public, &self.id))
            .collect())
    }
}

#[async_trait]
impl Provider for GcpProvider {
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
        for service in &self.services {
            let found = match *service {
                SERVICE_COMPUTE => self.instances().await?,
                SERVICE_FORWARDING_RULES => self.forwarding_rules().await?,
                SERVICE_DNS => self.dns().await?,
                _ => continue,
            };
            batch.merge(found);
        }
        Ok(batch)
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// One record per address on every network interface of an instance
pub fn instance_resources(instance: &Value, id: &str) -> Vec<Resource> {
    let mut out = Vec::new();

    for nic in array_field(instance, "networkInterfaces") {
        let mut entity = Resource::new(NAME, id).with_service(SERVICE_COMPUTE);

        if let Some(ip) = str_field(nic, "networkIP") {
            entity.set_field(IdentityField::PrivateIpv4, ip);
        }
        if let Some(ip) = str_field(nic, "ipv6Address") {
            entity.set_field(IdentityField::PrivateIpv6, ip);
        }
        if let Some(ip) = array_field(nic, "accessConfigs")
            .iter()
            .find_map(|c| str_field(c, "natIP"))
        {
            entity.set_field(IdentityField::PublicIpv4, ip);
            entity.public = true;
        }
        if let Some(ip) = array_field(nic, "ipv6AccessConfigs")
            .iter()
            .find_map(|c| str_field(c, "externalIpv6"))
        {
            entity.set_field(IdentityField::PublicIpv6, ip);
            entity.public = true;
        }

        out.extend(entity.decompose());
    }

    out
}

/// The address a forwarding rule listens on
pub fn forwarding_rule_resources(rule: &Value, id: &str) -> Vec<Resource> {
    let Some(address) = str_field(rule, "IPAddress") else {
        return Vec::new();
    };
    let external = str_field(rule, "loadBalancingScheme")
        .map(|s| s.starts_with("EXTERNAL"))
        .unwrap_or(false);

    let field = match (address.contains(':'), external) {
        (false, true) => IdentityField::PublicIpv4,
        (false, false) => IdentityField::PrivateIpv4,
        (true, true) => IdentityField::PublicIpv6,
        (true, false) => IdentityField::PrivateIpv6,
    };
    // IPv6 forwarding rules report a range such as "2600:1900::1/96"
    let address = address.split('/').next().unwrap_or(address);

    vec![Resource::single(NAME, id, field, address).with_service(SERVICE_FORWARDING_RULES)]
}

/// Host name and addresses of an A, AAAA or CNAME record set
pub fn record_set_resources(record_set: &Value, public: bool, id: &str) -> Vec<Resource> {
    let Some(name) = str_field(record_set, "name") else {
        return Vec::new();
    };
    let address_field = match str_field(record_set, "type") {
        Some("A") if public => Some(IdentityField::PublicIpv4),
        Some("A") => Some(IdentityField::PrivateIpv4),
        Some("AAAA") if public => Some(IdentityField::PublicIpv6),
        Some("AAAA") => Some(IdentityField::PrivateIpv6),
        Some("CNAME") => None,
        _ => return Vec::new(),
    };

    let host = name.trim_end_matches('.');
    let mut out = vec![Resource::single(NAME, id, IdentityField::DnsName, host)
        .with_public(public)
        .with_service(SERVICE_DNS)];

    if let Some(field) = address_field {
        for data in array_field(record_set, "rrdatas").iter().filter_map(|v| v.as_str()) {
            out.push(Resource::single(NAME, id, field, data).with_service(SERVICE_DNS));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_reads_project_and_defaults_services() {
        let block: ConfigBlock = [("provider", "gcp"), ("project_id", "my-project")]
            .into_iter()
            .collect();
        let config = GcpConfig::from_block(&block).unwrap();
        assert_eq!(config.project_id, "my-project");
        assert_eq!(config.services, SUPPORTED_SERVICES.to_vec());
    }

    #[test]
    fn test_config_restricts_services() {
        let block: ConfigBlock = [
            ("provider", "gcp"),
            ("project_id", "my-project"),
            ("services", "dns"),
        ]
        .into_iter()
        .collect();
        assert_eq!(GcpConfig::from_block(&block).unwrap().services, vec![SERVICE_DNS]);
    }

    #[test]
    fn test_config_accepts_token_and_endpoint() {
        let block: ConfigBlock = [
            ("provider", "gcp"),
            ("project_id", "my-project"),
            ("access_token", "ya29.token"),
            ("base_url", "http://127.0.0.1:8080"),
        ]
        .into_iter()
        .collect();
        let config = GcpConfig::from_block(&block).unwrap();
        assert_eq!(config.access_token.as_deref(), Some("ya29.token"));
        assert_eq!(config.base_url.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        let block: ConfigBlock = [
            ("provider", "gcp"),
            ("project_id", "my-project"),
            ("base_url", "::not a url"),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            GcpConfig::from_block(&block),
            Err(ProviderError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_instance_resources() {
        let instance = json!({
            "name": "web-1",
            "networkInterfaces": [{
                "networkIP": "10.128.0.2",
                "accessConfigs": [{ "natIP": "34.70.1.2" }],
                "ipv6AccessConfigs": [{ "externalIpv6": "2600:1900:4000::1" }]
            }]
        });
        let records = instance_resources(&instance, "prod");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].public_ipv4, "34.70.1.2");
        assert_eq!(records[1].private_ipv4, "10.128.0.2");
        assert_eq!(records[2].public_ipv6, "2600:1900:4000::1");
        assert!(records.iter().all(|r| r.service == "compute" && r.profile == "prod"));
    }

    #[test]
    fn test_instance_without_interfaces() {
        assert!(instance_resources(&json!({"name": "x"}), "").is_empty());
    }

    #[test]
    fn test_forwarding_rule_scheme_sets_visibility() {
        let external = json!({"IPAddress": "35.1.1.1", "loadBalancingScheme": "EXTERNAL_MANAGED"});
        let internal = json!({"IPAddress": "10.0.0.9", "loadBalancingScheme": "INTERNAL"});
        assert_eq!(forwarding_rule_resources(&external, "")[0].public_ipv4, "35.1.1.1");
        assert_eq!(forwarding_rule_resources(&internal, "")[0].private_ipv4, "10.0.0.9");
    }

    #[test]
    fn test_forwarding_rule_ipv6_range() {
        let rule = json!({"IPAddress": "2600:1901::5/96", "loadBalancingScheme": "EXTERNAL"});
        assert_eq!(forwarding_rule_resources(&rule, "")[0].public_ipv6, "2600:1901::5");
    }

    #[test]
    fn test_record_set_resources() {
        let a = json!({"name": "www.example.com.", "type": "A", "rrdatas": ["1.2.3.4", "1.2.3.5"]});
        let records = record_set_resources(&a, true, "prod");
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].dns_name, "www.example.com");
        assert_eq!(records[2].public_ipv4, "1.2.3.5");

        let private = record_set_resources(&a, false, "prod");
        assert!(!private[0].public);
        assert_eq!(private[1].private_ipv4, "1.2.3.4");

        let mx = json!({"name": "example.com.", "type": "MX", "rrdatas": ["10 mail.example.com."]});
        assert!(record_set_resources(&mx, true, "").is_empty());
    }
}
