//! Error types for each layer of the supervisor.

use std::path::PathBuf;
use thiserror::Error;

/// Failures talking to the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime could not be reached or its event stream broke.
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),

    /// An id no longer resolves, typically removed between list and inspect.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The runtime answered but refused the operation.
    #[error("runtime rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
}

/// Failures while producing the proxy configuration.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("failed to enumerate containers: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("failed to read template {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The template is malformed or failed to render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("failed to write configuration {path}: {source}")]
    ConfigWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures managing the proxy container.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to remove stale proxy: {0}")]
    Cleanup(#[source] RuntimeError),

    #[error("failed to start proxy: {0}")]
    Start(#[source] RuntimeError),

    #[error("failed to reload proxy: {0}")]
    Reload(#[source] RuntimeError),

    #[error("failed to reload proxy: no proxy has been started")]
    NotStarted,
}

/// Terminal cause of a supervisor run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A termination signal was received.  Not an operational failure.
    #[error("interrupted by {0}")]
    Interrupted(String),

    /// Termination signals could not be observed, so the run cannot be
    /// stopped cleanly.
    #[error("failed to listen for shutdown signals: {0}")]
    SignalHandler(#[source] std::io::Error),

    #[error("configuration synthesis failed: {0}")]
    Synthesis(#[from] SynthError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("event stream failed: {0}")]
    EventStream(#[source] RuntimeError),

    #[error("event stream closed")]
    EventStreamClosed,
}

impl SupervisorError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, SupervisorError::Interrupted(_))
    }
}
