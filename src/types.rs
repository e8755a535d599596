//! Data structures shared by the supervisor components.
//!
//! Container records are a runtime-agnostic view of what the container
//! engine reports; routing entries are what the synthesizer derives from
//! them and hands to the configuration template.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Transport protocol tag carried by an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// A port exposed by a container.  Host and container side are assumed
/// equal; no remapping is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExposedPort {
    pub port: u16,
    pub protocol: Protocol,
}

impl ExposedPort {
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }
}

impl FromStr for ExposedPort {
    type Err = String;

    /// Parses the engine's `80/tcp` notation.  A bare number is taken as tcp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (port, proto) = s.split_once('/').unwrap_or((s, "tcp"));
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{}': {}", s, e))?;
        let protocol = match proto {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            other => return Err(format!("unsupported protocol '{}' in '{}'", other, s)),
        };
        Ok(Self { port, protocol })
    }
}

/// Lifecycle status as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
    Removed,
}

/// Read-only snapshot of one container.
///
/// `list_containers` may return records with only `id`, `name` and
/// `status` populated; `inspect` fills in environment and network data.
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub env: HashMap<String, String>,
    pub ip_address: Option<String>,
    /// Sorted by port, then protocol.
    pub ports: Vec<ExposedPort>,
    pub status: ContainerStatus,
}

impl ContainerRecord {
    /// Summary record as returned by a listing.
    pub fn summary(id: impl Into<String>, name: impl Into<String>, status: ContainerStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            env: HashMap::new(),
            ip_address: None,
            ports: Vec::new(),
            status,
        }
    }

    /// Whether the environment carries `key` with exactly `value`.
    pub fn has_env(&self, key: &str, value: &str) -> bool {
        self.env.get(key).is_some_and(|v| v == value)
    }
}

/// One port's worth of proxy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingEntry {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    /// Upstream addresses in enumeration order.
    pub backends: Vec<String>,
}

/// A lifecycle event from the runtime's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEvent {
    pub status: String,
    pub id: Option<String>,
    pub name: Option<String>,
}

impl RuntimeEvent {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            id: None,
            name: None,
        }
    }

    /// Only start and stop transitions can change the routing table.
    pub fn triggers_refresh(&self) -> bool {
        matches!(self.status.as_str(), "start" | "stop")
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let who = self
            .name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unknown>");
        write!(f, "{} {}", self.status, who)
    }
}

/// Identity of the running proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyHandle {
    pub id: String,
}

/// Everything needed to create and start the proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// `host_path:container_path` bind mounts.
    pub binds: Vec<String>,
    pub ports: Vec<u16>,
}
