use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::types::{ContainerRecord, ContainerStatus, ExposedPort, ProxySpec, RuntimeEvent};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::models::{
    ContainerInspectResponse, ContainerStateStatusEnum, ContainerSummary, HostConfig, PortBinding,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon at `docker_host`, or the local defaults when
    /// none is given, and verify it answers.
    pub async fn connect(docker_host: Option<&str>) -> Result<Self, RuntimeError> {
        let docker = match docker_host {
            Some(host) => Self::connect_to_host(host)?,
            // This handles unix socket on Linux.
            None => Docker::connect_with_local_defaults()
                .map_err(|e| RuntimeError::Unavailable(e.to_string()))?,
        };

        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("daemon is not responding: {}", e)))?;

        debug!("Connected to Docker daemon");
        Ok(Self { docker })
    }

    fn connect_to_host(host: &str) -> Result<Docker, RuntimeError> {
        let docker = if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)
        } else {
            return Err(RuntimeError::Unavailable(format!(
                "invalid docker_host '{}': expected unix:// or tcp://",
                host
            )));
        };
        docker.map_err(|e| RuntimeError::Unavailable(format!("{}: {}", host, e)))
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let opts = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(opts))
            .await
            .map_err(|e| runtime_error("list containers", "", e))?;

        Ok(containers.iter().filter_map(record_from_summary).collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerRecord, RuntimeError> {
        let detail = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| runtime_error("inspect container", id, e))?;
        Ok(record_from_inspect(id, detail))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| runtime_error("remove container", id, e))
    }

    async fn create_and_start(&self, spec: &ProxySpec) -> Result<String, RuntimeError> {
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for port in &spec.ports {
            let key = format!("{}/tcp", port);
            port_bindings.insert(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(port.to_string()),
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        // The proxy shares the host network so it can reach container
        // addresses directly and bind host-facing ports.
        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            port_bindings: Some(port_bindings),
            privileged: Some(true),
            network_mode: Some("host".to_string()),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        // A 404 here means the image is missing, not the container.
        let response = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError { message, .. } => RuntimeError::Rejected {
                    operation: "create container",
                    message,
                },
                other => RuntimeError::Unavailable(format!("create container: {}", other)),
            })?;
        for warning in &response.warnings {
            warn!("Docker warning creating {}: {}", spec.name, warning);
        }
        info!("Created container {} ({})", spec.name, response.id);

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| runtime_error("start container", &response.id, e))?;
        info!("Started container {} ({})", spec.name, response.id);

        Ok(response.id)
    }

    async fn exec_detached(&self, id: &str, cmd: Vec<String>) -> Result<(), RuntimeError> {
        let exec = self
            .docker
            .create_exec(
                id,
                CreateExecOptions {
                    cmd: Some(cmd),
                    attach_stdout: Some(false),
                    attach_stderr: Some(false),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| runtime_error("create exec", id, e))?;

        self.docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| runtime_error("start exec", id, e))?;

        debug!("Started detached exec {} in {}", exec.id, id);
        Ok(())
    }

    async fn monitor(&self, event_tx: mpsc::Sender<RuntimeEvent>) -> Result<(), RuntimeError> {
        let opts = EventsOptions::<String> {
            filters: [("type", ["container"].as_slice())]
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
            ..Default::default()
        };

        let mut stream = self.docker.events(Some(opts));

        info!("Listening for Docker events...");
        while let Some(msg) = stream.next().await {
            let event = msg.map_err(|e| RuntimeError::Unavailable(format!("event stream: {}", e)))?;

            let (id, name) = match event.actor {
                Some(actor) => {
                    let name = actor.attributes.and_then(|mut a| a.remove("name"));
                    (actor.id, name)
                }
                None => (None, None),
            };
            let event = RuntimeEvent {
                status: event.action.unwrap_or_default(),
                id,
                name,
            };

            if event_tx.send(event).await.is_err() {
                debug!("Event receiver dropped, stopping Docker monitor");
                return Ok(());
            }
        }

        warn!("Docker event stream ended");
        Ok(())
    }
}

fn runtime_error(operation: &'static str, target: &str, err: BollardError) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::ContainerNotFound(target.to_string()),
        BollardError::DockerResponseServerError { message, .. } => {
            RuntimeError::Rejected { operation, message }
        }
        other => RuntimeError::Unavailable(format!("{}: {}", operation, other)),
    }
}

fn status_from_str(state: &str) -> ContainerStatus {
    match state {
        "created" => ContainerStatus::Created,
        "exited" | "dead" => ContainerStatus::Stopped,
        "removing" => ContainerStatus::Removed,
        _ => ContainerStatus::Running,
    }
}

fn record_from_summary(summary: &ContainerSummary) -> Option<ContainerRecord> {
    let id = summary.id.clone()?;
    let name = summary
        .names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());
    let status = summary
        .state
        .as_deref()
        .map(status_from_str)
        .unwrap_or(ContainerStatus::Running);
    Some(ContainerRecord::summary(id, name, status))
}

fn record_from_inspect(id: &str, detail: ContainerInspectResponse) -> ContainerRecord {
    let id = detail.id.unwrap_or_else(|| id.to_string());
    let name = detail
        .name
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.clone());

    let status = match detail.state.and_then(|s| s.status) {
        Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
        Some(ContainerStateStatusEnum::EXITED) | Some(ContainerStateStatusEnum::DEAD) => {
            ContainerStatus::Stopped
        }
        Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Removed,
        _ => ContainerStatus::Running,
    };

    let mut env = HashMap::new();
    let mut exposed: Vec<String> = Vec::new();
    if let Some(config) = detail.config {
        for entry in config.env.unwrap_or_default() {
            let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
            env.insert(key.to_string(), value.to_string());
        }
        exposed.extend(config.exposed_ports.unwrap_or_default().into_keys());
    }

    let mut ip_address = None;
    if let Some(settings) = detail.network_settings {
        ip_address = settings.ip_address.filter(|ip| !ip.is_empty());
        if ip_address.is_none() {
            // User-defined networks leave the top-level address empty.
            let mut networks: Vec<_> = settings.networks.unwrap_or_default().into_iter().collect();
            networks.sort_by(|a, b| a.0.cmp(&b.0));
            ip_address = networks
                .into_iter()
                .filter_map(|(_, net)| net.ip_address)
                .find(|ip| !ip.is_empty());
        }
        if let Some(ports) = settings.ports {
            if !ports.is_empty() {
                exposed = ports.into_keys().collect();
            }
        }
    }

    let mut ports: Vec<ExposedPort> = exposed
        .iter()
        .filter_map(|p| match p.parse::<ExposedPort>() {
            Ok(port) => Some(port),
            Err(e) => {
                warn!("Ignoring port on {}: {}", name, e);
                None
            }
        })
        .collect();
    ports.sort();
    ports.dedup();

    ContainerRecord {
        id,
        name,
        env,
        ip_address,
        ports,
        status,
    }
}
