//! Data structures rebuilt on every reconciliation pass.
//!
//! Nothing here is persisted.  The collector fills a [`RunningIndex`]
//! from the runtime's container list, the detector turns index entries
//! into [`UpdatePlan`]s, and the orchestrator consumes those plans one
//! container at a time.

use std::collections::HashMap;

use bollard::models::{ContainerConfig, EndpointSettings, HostConfig};
use indexmap::IndexMap;

/// Raw container entry as reported by the runtime's list call.
#[derive(Debug, Clone, Default)]
pub struct ContainerSummary {
    pub id: String,
    pub names: Vec<String>,
    pub image: String,
    pub labels: HashMap<String, String>,
}

/// Raw image entry as reported by the runtime's image list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: String,
    pub repo_tags: Vec<String>,
}

/// A container discovered during this pass.
///
/// Its full runtime configuration is not stored here; the orchestrator
/// fetches a [`Snapshot`] right before it acts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: String,
    /// Primary alias with the leading `/` stripped.
    pub name: String,
    /// Image reference exactly as the container was declared with.
    pub image: String,
    pub labels: HashMap<String, String>,
}

impl ContainerRecord {
    pub fn from_summary(summary: ContainerSummary) -> Self {
        let name = summary
            .names
            .first()
            .and_then(|n| display_name(n))
            .unwrap_or_else(|| summary.id.clone());
        Self {
            id: summary.id,
            name,
            image: summary.image,
            labels: summary.labels,
        }
    }
}

/// Normalizes a runtime alias such as `/web` into `web`.
///
/// Only the first path segment survives, so linked aliases like
/// `/web/db` also map to `web`.
pub fn display_name(raw: &str) -> Option<String> {
    raw.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Canonical form of a declared image reference.
///
/// A reference without tag or digest means `:latest`. A colon only
/// counts as a tag separator in the last path component, so registry
/// ports (`host:5000/app`) are not mistaken for tags.
pub fn normalize_reference(reference: &str) -> String {
    if is_pinned(reference) {
        return reference.to_string();
    }
    let last = reference.rsplit('/').next().unwrap_or(reference);
    if last.contains(':') {
        reference.to_string()
    } else {
        format!("{}:latest", reference)
    }
}

/// A digest-pinned reference always resolves to the same image.
pub fn is_pinned(reference: &str) -> bool {
    reference.contains('@')
}

/// Image reference → containers currently running it, in discovery order.
///
/// Inserting under an existing key appends; nothing is ever overwritten.
#[derive(Debug, Clone, Default)]
pub struct RunningIndex {
    entries: IndexMap<String, Vec<ContainerRecord>>,
}

impl RunningIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files `record` under the normalized form of its own declared image.
    pub fn insert(&mut self, record: ContainerRecord) {
        let key = normalize_reference(&record.image);
        self.entries.entry(key).or_default().push(record);
    }

    pub fn get(&self, reference: &str) -> Option<&[ContainerRecord]> {
        self.entries.get(reference).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ContainerRecord])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn container_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// Everything the collector learned about the runtime in one pass.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub running: RunningIndex,
    /// Tag → image identity, for tags that have running containers.
    pub current: HashMap<String, String>,
}

impl Inventory {
    pub fn current_id(&self, reference: &str) -> Option<&str> {
        self.current.get(reference).map(String::as_str)
    }
}

/// A reference whose tag moved to a new image identity.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub reference: String,
    pub previous_id: String,
    pub new_id: String,
    pub containers: Vec<ContainerRecord>,
}

impl UpdatePlan {
    pub fn is_actionable(&self) -> bool {
        self.previous_id != self.new_id
    }
}

/// Everything needed to recreate an equivalent container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub config: ContainerConfig,
    pub host_config: Option<HostConfig>,
    pub networks: HashMap<String, EndpointSettings>,
}

/// What happened to one container of an [`UpdatePlan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOutcome {
    Recreated { new_id: String },
    ExternallyManaged,
    DryRun,
    /// The pass was cancelled before this container was reached.
    Cancelled,
}
