//! Deduplication Store
//!
//! Admits resources by identifying value rather than by whole-record
//! equality. Backends regularly rediscover the same address or host name
//! through different resource kinds, so every value is retained once per run
//! no matter which provider or batch reported it first.

use super::{IdentityField, Resource, ResourceBatch};
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Outcome of admitting one resource that contributed at least one new value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// The record exactly as the provider returned it
    pub original: Resource,
    /// The original restricted to the identifying fields seen for the first time
    pub novel: Resource,
    /// Single-field records retained by the store for this admission
    pub derived: Vec<Resource>,
}

#[derive(Debug, Default)]
struct StoreState {
    seen: HashSet<String>,
    retained: Vec<Resource>,
}

/// Run-scoped record of every identifying value admitted so far.
///
/// Admission is atomic per call, so one store can be shared between
/// workers that enumerate concurrently.
#[derive(Debug, Default)]
pub struct DedupStore {
    state: Mutex<StoreState>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one resource, returning true if any of its values was new
    pub fn admit(&self, resource: &Resource) -> bool {
        self.admit_novel(resource).is_some()
    }

    /// Admit one resource and describe what it contributed.
    ///
    /// Each populated identifying field whose value has not been seen yields
    /// a derived single-field record that the store retains. Returns `None`
    /// when every value on the resource was already known.
    pub fn admit_novel(&self, resource: &Resource) -> Option<Admission> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut novel = resource.clone();
        let mut derived = Vec::new();

        for field in IdentityField::ALL {
            let value = field.get(resource);
            if value.is_empty() {
                continue;
            }
            if !state.seen.insert(value.to_string()) {
                novel.clear_field(field);
                continue;
            }
            derived.push(Resource::single(
                &resource.provider,
                &resource.profile,
                field,
                value,
            ));
        }

        if derived.is_empty() {
            return None;
        }

        state.retained.extend(derived.iter().cloned());
        Some(Admission {
            original: resource.clone(),
            novel,
            derived,
        })
    }

    /// Admit every record of a batch in order, keeping those that added a value
    pub fn merge(&self, batch: &ResourceBatch) -> Vec<Admission> {
        batch.iter().filter_map(|r| self.admit_novel(r)).collect()
    }

    /// Whether an identifying value has been admitted
    pub fn contains(&self, value: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.seen.contains(value)
    }

    /// Number of retained single-field records
    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.retained.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of retained records in admission order
    pub fn resources(&self) -> ResourceBatch {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.retained.iter().cloned().collect()
    }
}
