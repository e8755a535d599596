use crate::error::RuntimeError;
use crate::types::{ContainerRecord, ProxySpec, RuntimeEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

pub mod docker;
pub use docker::DockerRuntime;

#[cfg(test)]
pub mod fake;

/// The narrow slice of a container engine the supervisor relies on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers.  Records may carry summary data only.
    async fn list_containers(&self, include_stopped: bool)
        -> Result<Vec<ContainerRecord>, RuntimeError>;

    /// Full detail for one container, including environment and network info.
    async fn inspect(&self, id: &str) -> Result<ContainerRecord, RuntimeError>;

    /// Forcibly remove a container, running or not.
    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Create and start a container, returning its id.
    async fn create_and_start(&self, spec: &ProxySpec) -> Result<String, RuntimeError>;

    /// Run a command inside a running container without waiting for it.
    async fn exec_detached(&self, id: &str, cmd: Vec<String>) -> Result<(), RuntimeError>;

    /// Stream container lifecycle events into `event_tx` until the stream
    /// ends or the receiver goes away.
    async fn monitor(&self, event_tx: mpsc::Sender<RuntimeEvent>) -> Result<(), RuntimeError>;
}
