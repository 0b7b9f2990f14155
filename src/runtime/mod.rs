use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::types::{ContainerSummary, ImageRecord, Snapshot};

pub mod docker;
#[cfg(test)]
pub mod fake;

pub use docker::DockerRuntime;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Operations the reconciler needs from a container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Lists containers; stopped ones only when `all` is set.
    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Lists images, optionally only those matching `reference`.
    async fn list_images(&self, reference: Option<&str>) -> Result<Vec<ImageRecord>>;

    /// Pulls `reference` and returns once the transfer has completed.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    async fn inspect_container(&self, id: &str) -> Result<Snapshot>;

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()>;

    async fn rename_container(&self, id: &str, name: &str) -> Result<()>;

    /// Force-removes a container, running or not.
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Creates a container named `name` from `snapshot`, returning its ID.
    async fn create_container(&self, name: &str, snapshot: &Snapshot) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;
}
