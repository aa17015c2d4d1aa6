//! Terraform state provider
//!
//! Reads a Terraform state file and reports every IP address and host name
//! recorded in resource attributes. No network calls are made.

use crate::config::ConfigBlock;
use crate::provider::{select_services, Provider, ProviderError};
use crate::resource::{IdentityField, Resource, ResourceBatch};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;

pub const NAME: &str = "terraform";

pub const SERVICE_STATE: &str = "state";

pub const SUPPORTED_SERVICES: &[&str] = &[SERVICE_STATE];

/// Attribute names whose string values are host names
const DNS_ATTRIBUTES: &[&str] = &[
    "dns_name",
    "fqdn",
    "hostname",
    "domain_name",
    "public_dns",
    "private_dns",
];

/// Validated settings for one state file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformConfig {
    pub id: String,
    pub state_file: PathBuf,
    pub services: Vec<&'static str>,
}

impl TerraformConfig {
    pub fn from_block(block: &ConfigBlock) -> Result<Self, ProviderError> {
        Ok(Self {
            id: block.label().to_string(),
            state_file: PathBuf::from(block.require("tf_state_file")?),
            services: select_services(&block.services(), SUPPORTED_SERVICES),
        })
    }
}

#[derive(Debug, Deserialize)]
struct State {
    #[serde(default)]
    resources: Vec<StateResource>,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    instances: Vec<StateInstance>,
}

#[derive(Debug, Deserialize)]
struct StateInstance {
    #[serde(default)]
    attributes: Value,
}

pub struct TerraformProvider {
    id: String,
    state_file: PathBuf,
    services: Vec<&'static str>,
}

impl TerraformProvider {
    pub async fn from_config(block: ConfigBlock) -> Result<Self, ProviderError> {
        let config = TerraformConfig::from_block(&block)?;
        if !tokio::fs::try_exists(&config.state_file).await.unwrap_or(false) {
            return Err(ProviderError::Io(format!(
                "state file {} does not exist",
                config.state_file.display()
            )));
        }

        Ok(Self {
            id: config.id,
            state_file: config.state_file,
            services: config.services,
        })
    }
}

#[async_trait]
impl Provider for TerraformProvider {
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
        let content = tokio::fs::read_to_string(&self.state_file)
            .await
            .map_err(|e| {
                ProviderError::Io(format!("failed to read {}: {e}", self.state_file.display()))
            })?;
        parse_state(&content, &self.id)
    }
}

/// Extract addresses and host names from Terraform state JSON
pub fn parse_state(content: &str, id: &str) -> Result<ResourceBatch, ProviderError> {
    let state: State = serde_json::from_str(content)?;
    let mut batch = ResourceBatch::new();
    // The same address usually appears in several attributes of one instance
    let mut seen = HashSet::new();

    for resource in &state.resources {
        for instance in &resource.instances {
            let mut found = Vec::new();
            collect_values(&instance.attributes, None, &mut found);

            for (field, value) in found {
                if !seen.insert(value.clone()) {
                    continue;
                }
                batch.push(Resource::single(NAME, id, field, &value).with_service(&resource.kind));
            }
        }
    }

    Ok(batch)
}

fn collect_values(value: &Value, key: Option<&str>, found: &mut Vec<(IdentityField, String)>) {
    match value {
        Value::String(s) => {
            if let Some(field) = classify(s, key) {
                found.push((field, s.clone()));
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_values(item, key, found);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                collect_values(v, Some(k), found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn classify(value: &str, key: Option<&str>) -> Option<IdentityField> {
    if let Ok(ip) = value.parse::<IpAddr>() {
        return match ip {
            IpAddr::V4(v4) if v4.is_unspecified() || v4.is_loopback() => None,
            IpAddr::V6(v6) if v6.is_unspecified() || v6.is_loopback() => None,
            IpAddr::V4(v4) if is_private_v4(v4) => Some(IdentityField::PrivateIpv4),
            IpAddr::V4(_) => Some(IdentityField::PublicIpv4),
            IpAddr::V6(v6) if is_private_v6(v6) => Some(IdentityField::PrivateIpv6),
            IpAddr::V6(_) => Some(IdentityField::PublicIpv6),
        };
    }

    let key = key?;
    if DNS_ATTRIBUTES.contains(&key) && looks_like_host(value) {
        return Some(IdentityField::DnsName);
    }
    None
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 shared address space
    ip.is_private() || ip.is_link_local() || (a == 100 && (64..128).contains(&b))
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

fn looks_like_host(value: &str) -> bool {
    let host = value.trim_end_matches('.');
    host.contains('.')
        && !host.starts_with('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '*')
}
