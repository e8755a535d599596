//! Lifecycle of the HAProxy container: cleanup, first start, soft reload.
//!
//! The reload relies on HAProxy's own socket handover: a new worker is
//! launched with `-sf <old pid>`, takes over the listeners and tells the
//! old worker to finish its connections and exit.

use std::path::PathBuf;

use log::{info, warn};

use crate::config::Config;
use crate::error::{ProxyError, RuntimeError};
use crate::runtime::ContainerRuntime;
use crate::types::{ProxyHandle, ProxySpec};

pub struct ProxyManager {
    name: String,
    image: String,
    host_dir: PathBuf,
    mount_dir: String,
    config_path: String,
    pid_file: String,
    ports: Vec<u16>,
    handle: Option<ProxyHandle>,
}

impl ProxyManager {
    pub fn new(config: &Config) -> Self {
        Self {
            name: config.proxy_name.clone(),
            image: config.proxy_image.clone(),
            host_dir: config.output_dir.clone(),
            mount_dir: config.proxy_config_dir.clone(),
            config_path: config.proxy_config_path(),
            pid_file: config.pid_file.clone(),
            ports: config.listen_ports.clone(),
            handle: None,
        }
    }

    pub fn handle(&self) -> Option<&ProxyHandle> {
        self.handle.as_ref()
    }

    /// Command line the proxy container starts with.
    pub fn start_command(&self) -> Vec<String> {
        vec![
            "haproxy".into(),
            "-f".into(),
            self.config_path.clone(),
            "-p".into(),
            self.pid_file.clone(),
        ]
    }

    /// Command executed inside the proxy to hand over to a fresh worker.
    pub fn reload_command(&self) -> Vec<String> {
        vec![
            "sh".into(),
            "-c".into(),
            format!(
                "haproxy -f {cfg} -p {pid} -sf $(cat {pid})",
                cfg = self.config_path,
                pid = self.pid_file
            ),
        ]
    }

    fn spec(&self) -> ProxySpec {
        ProxySpec {
            name: self.name.clone(),
            image: self.image.clone(),
            cmd: self.start_command(),
            binds: vec![format!("{}:{}", self.host_dir.display(), self.mount_dir)],
            ports: self.ports.clone(),
        }
    }

    /// Remove any container left over under the proxy's name.
    pub async fn ensure_clean(&self, runtime: &dyn ContainerRuntime) -> Result<(), ProxyError> {
        let containers = runtime
            .list_containers(true)
            .await
            .map_err(ProxyError::Cleanup)?;

        for container in containers.iter().filter(|c| c.name == self.name) {
            info!("Removing stale proxy container {}", container.id);
            match runtime.remove_container(&container.id).await {
                Ok(()) => {}
                Err(RuntimeError::ContainerNotFound(id)) => {
                    warn!("Stale proxy {} already gone", id);
                }
                Err(e) => return Err(ProxyError::Cleanup(e)),
            }
        }
        Ok(())
    }

    /// Create and start the proxy.  The rendered configuration must
    /// already be in place.
    pub async fn start(
        &mut self,
        runtime: &dyn ContainerRuntime,
    ) -> Result<ProxyHandle, ProxyError> {
        let id = runtime
            .create_and_start(&self.spec())
            .await
            .map_err(ProxyError::Start)?;
        info!("Proxy {} running as {}", self.name, id);
        let handle = ProxyHandle { id };
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Trigger a graceful reload of the running proxy.  Not retried: a
    /// retry could race another reload already in flight.
    pub async fn reload(&self, runtime: &dyn ContainerRuntime) -> Result<(), ProxyError> {
        let handle = self.handle().ok_or(ProxyError::NotStarted)?;
        runtime
            .exec_detached(&handle.id, self.reload_command())
            .await
            .map_err(ProxyError::Reload)?;
        info!("Reloaded proxy {}", handle.id);
        Ok(())
    }
}
