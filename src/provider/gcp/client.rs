//! GCP Client
//!
//! Authenticated REST client for the Compute Engine and Cloud DNS APIs,
//! with `nextPageToken` pagination.

use super::auth::GcpCredentials;
use crate::http::{with_query, HttpClient};
use crate::provider::ProviderError;
use serde_json::Value;

const COMPUTE_BASE: &str = "https://compute.googleapis.com";
const DNS_BASE: &str = "https://dns.googleapis.com";

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    credentials: GcpCredentials,
    http: HttpClient,
    compute_base: String,
    dns_base: String,
    pub project_id: String,
}

impl GcpClient {
    /// Client for the public Google APIs, or for a single endpoint serving
    /// both `/compute/v1` and `/dns/v1` when `base_url` is given
    pub fn new(
        credentials: GcpCredentials,
        project_id: &str,
        base_url: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let (compute_base, dns_base) = match base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                (base.to_string(), base.to_string())
            }
            None => (COMPUTE_BASE.to_string(), DNS_BASE.to_string()),
        };

        Ok(Self {
            credentials,
            http: HttpClient::new()?,
            compute_base,
            dns_base,
            project_id: project_id.to_string(),
        })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value, ProviderError> {
        let token = self.credentials.get_token().await?;
        self.http.get_json(url, &token).await
    }

    /// Fetch every page of a list endpoint and collect the items under `items_key`
    pub async fn list_all(&self, url: &str, items_key: &str) -> Result<Vec<Value>, ProviderError> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = match page_token.as_deref() {
                Some(token) => with_query(url, "pageToken", token),
                None => url.to_string(),
            };
            let response = self.get(&page_url).await?;

            if let Some(items) = response.get(items_key).and_then(|v| v.as_array()) {
                all_items.extend(items.iter().cloned());
            }

            page_token = next_page_token(&response);
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }

    /// Fetch every page of an aggregated (all zones/regions) endpoint
    pub async fn list_aggregated(&self, resource: &str) -> Result<Vec<Value>, ProviderError> {
        let url = self.compute_url(&format!("aggregated/{resource}"));
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page_url = match page_token.as_deref() {
                Some(token) => with_query(&url, "pageToken", token),
                None => url.clone(),
            };
            let response = self.get(&page_url).await?;
            all_items.extend(flatten_aggregated_response(&response));

            page_token = next_page_token(&response);
            if page_token.is_none() {
                break;
            }
        }

        Ok(all_items)
    }

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/{}",
            self.compute_base, self.project_id, path
        )
    }

    /// Build Cloud DNS API URL
    pub fn dns_url(&self, path: &str) -> String {
        format!("{}/dns/v1/projects/{}/{}", self.dns_base, self.project_id, path)
    }
}

fn next_page_token(response: &Value) -> Option<String> {
    response
        .get("nextPageToken")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Aggregated responses group items by scope:
/// `{ "items": { "zones/us-central1-a": { "instances": [...] }, ... } }`
/// Flatten them into one list, skipping scopes that only carry a warning.
pub fn flatten_aggregated_response(response: &Value) -> Vec<Value> {
    let Some(scopes) = response.get("items").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut all_items = Vec::new();
    for scope in scopes.values() {
        let Some(obj) = scope.as_object() else {
            continue;
        };
        for (key, value) in obj {
            if key == "warning" {
                continue;
            }
            if let Some(arr) = value.as_array() {
                all_items.extend(arr.iter().cloned());
            }
        }
    }
    all_items
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_aggregated_response() {
        let response = json!({
            "items": {
                "zones/us-central1-a": { "instances": [{"name": "a"}, {"name": "b"}] },
                "zones/europe-west1-b": { "warning": { "code": "NO_RESULTS_ON_PAGE" } },
                "zones/asia-east1-a": { "instances": [{"name": "c"}] }
            }
        });
        let items = flatten_aggregated_response(&response);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_urls_follow_base_override() {
        let credentials = GcpCredentials::from_access_token("t");
        let client = GcpClient::new(credentials.clone(), "my-project", None).unwrap();
        assert_eq!(
            client.compute_url("aggregated/instances"),
            "https://compute.googleapis.com/compute/v1/projects/my-project/aggregated/instances"
        );
        assert_eq!(
            client.dns_url("managedZones"),
            "https://dns.googleapis.com/dns/v1/projects/my-project/managedZones"
        );

        let local = GcpClient::new(credentials, "my-project", Some("http://127.0.0.1:9/")).unwrap();
        assert_eq!(
            local.dns_url("managedZones"),
            "http://127.0.0.1:9/dns/v1/projects/my-project/managedZones"
        );
    }

    #[test]
    fn test_flatten_without_items() {
        assert!(flatten_aggregated_response(&json!({})).is_empty());
    }

    #[test]
    fn test_next_page_token() {
        assert_eq!(
            next_page_token(&json!({"nextPageToken": "abc"})),
            Some("abc".to_string())
        );
        assert_eq!(next_page_token(&json!({"nextPageToken": ""})), None);
        assert_eq!(next_page_token(&json!({})), None);
    }
}
