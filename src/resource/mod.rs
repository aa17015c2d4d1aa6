//! Canonical resource model
//!
//! Every backend translates its native objects into [`Resource`] records.
//! A record describes one identifying fact about an asset: a host name or
//! an IP address, tied to the provider and profile that reported it.
//!
//! # Architecture
//!
//! - [`Resource`] - The normalized record, serialized as one JSON object
//! - [`IdentityField`] - The five fields that give a record its identity
//! - [`ResourceBatch`] - Ordered records returned by one provider call
//! - [`dedup`] - Run-scoped at-most-once admission by identifying value

pub mod dedup;

pub use dedup::{Admission, DedupStore};

use serde::{Deserialize, Serialize};

/// A normalized asset record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Whether the asset is reachable from outside its network
    pub public: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dns_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_ipv4: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_ipv6: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_ipv4: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_ipv6: String,
    /// Backend name, e.g. "gcp"
    pub provider: String,
    /// Profile or id of the configuration block that produced the record
    #[serde(default, rename = "id", skip_serializing_if = "String::is_empty")]
    pub profile: String,
    /// Backend sub-category, e.g. "dns" or "compute"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
}

/// The fields that identify a resource, in admission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    DnsName,
    PublicIpv4,
    PrivateIpv4,
    PublicIpv6,
    PrivateIpv6,
}

impl IdentityField {
    /// All identifying fields in the order the dedup store inspects them
    pub const ALL: [IdentityField; 5] = [
        IdentityField::DnsName,
        IdentityField::PublicIpv4,
        IdentityField::PrivateIpv4,
        IdentityField::PublicIpv6,
        IdentityField::PrivateIpv6,
    ];

    /// Order used by the plain-text renderers: host first, public before private
    pub const RENDER_ORDER: [IdentityField; 5] = [
        IdentityField::DnsName,
        IdentityField::PublicIpv4,
        IdentityField::PublicIpv6,
        IdentityField::PrivateIpv4,
        IdentityField::PrivateIpv6,
    ];

    pub fn get(self, resource: &Resource) -> &str {
        match self {
            Self::DnsName => &resource.dns_name,
            Self::PublicIpv4 => &resource.public_ipv4,
            Self::PrivateIpv4 => &resource.private_ipv4,
            Self::PublicIpv6 => &resource.public_ipv6,
            Self::PrivateIpv6 => &resource.private_ipv6,
        }
    }

    fn slot(self, resource: &mut Resource) -> &mut String {
        match self {
            Self::DnsName => &mut resource.dns_name,
            Self::PublicIpv4 => &mut resource.public_ipv4,
            Self::PrivateIpv4 => &mut resource.private_ipv4,
            Self::PublicIpv6 => &mut resource.public_ipv6,
            Self::PrivateIpv6 => &mut resource.private_ipv6,
        }
    }

    pub fn is_ip(self) -> bool {
        !matches!(self, Self::DnsName)
    }

    pub fn is_private(self) -> bool {
        matches!(self, Self::PrivateIpv4 | Self::PrivateIpv6)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DnsName => "dns_name",
            Self::PublicIpv4 => "public_ipv4",
            Self::PrivateIpv4 => "private_ipv4",
            Self::PublicIpv6 => "public_ipv6",
            Self::PrivateIpv6 => "private_ipv6",
        }
    }
}

impl Resource {
    /// Create an empty record owned by a provider instance
    pub fn new(provider: &str, profile: &str) -> Self {
        Self {
            provider: provider.to_string(),
            profile: profile.to_string(),
            ..Self::default()
        }
    }

    /// Build a record carrying exactly one identifying value.
    ///
    /// `public` is derived from the field: host names and public addresses
    /// are public, private addresses are not.
    pub fn single(provider: &str, profile: &str, field: IdentityField, value: &str) -> Self {
        let mut resource = Self::new(provider, profile);
        resource.public = !field.is_private();
        *field.slot(&mut resource) = value.to_string();
        resource
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = service.to_string();
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn with_field(mut self, field: IdentityField, value: impl Into<String>) -> Self {
        *field.slot(&mut self) = value.into();
        self
    }

    pub fn field(&self, field: IdentityField) -> &str {
        field.get(self)
    }

    pub fn set_field(&mut self, field: IdentityField, value: impl Into<String>) {
        *field.slot(self) = value.into();
    }

    pub fn clear_field(&mut self, field: IdentityField) {
        field.slot(self).clear();
    }

    /// Identifying fields that hold a value, in admission order
    pub fn populated_fields(&self) -> impl Iterator<Item = IdentityField> + '_ {
        IdentityField::ALL
            .into_iter()
            .filter(move |f| !f.get(self).is_empty())
    }

    /// True when no identifying field holds a value
    pub fn is_empty(&self) -> bool {
        self.populated_fields().next().is_none()
    }

    /// Split one upstream entity into one record per populated identifying field.
    ///
    /// The split records keep provider, profile and service. Host names keep
    /// the original `public` flag, addresses take it from their field.
    pub fn decompose(&self) -> Vec<Resource> {
        self.populated_fields()
            .map(|field| {
                let mut single =
                    Self::single(&self.provider, &self.profile, field, field.get(self));
                single.service = self.service.clone();
                if field == IdentityField::DnsName {
                    single.public = self.public;
                }
                single
            })
            .collect()
    }
}

/// Ordered records produced by one provider call or by merging several
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceBatch {
    items: Vec<Resource>,
}

impl ResourceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; records without any identifying value are dropped
    pub fn push(&mut self, resource: Resource) {
        if resource.is_empty() {
            return;
        }
        self.items.push(resource);
    }

    /// Append all records of another batch, keeping their order
    pub fn merge(&mut self, other: ResourceBatch) {
        self.items.extend(other.items);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Resource> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Resource> {
        self.items
    }
}

impl Extend<Resource> for ResourceBatch {
    fn extend<T: IntoIterator<Item = Resource>>(&mut self, iter: T) {
        for resource in iter {
            self.push(resource);
        }
    }
}

impl FromIterator<Resource> for ResourceBatch {
    fn from_iter<T: IntoIterator<Item = Resource>>(iter: T) -> Self {
        let mut batch = Self::new();
        batch.extend(iter);
        batch
    }
}

impl From<Vec<Resource>> for ResourceBatch {
    fn from(items: Vec<Resource>) -> Self {
        items.into_iter().collect()
    }
}

impl IntoIterator for ResourceBatch {
    type Item = Resource;
    type IntoIter = std::vec::IntoIter<Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResourceBatch {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
