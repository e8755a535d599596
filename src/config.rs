use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_host: Option<String>,
    /// `KEY=VALUE` environment entry that opts a container in.
    pub marker: String,
    pub template_path: PathBuf,
    pub output_dir: PathBuf,
    pub config_file: String,
    pub proxy_name: String,
    pub proxy_image: String,
    pub proxy_config_dir: String,
    pub pid_file: String,
    pub listen_ports: Vec<u16>,
    pub proxy_mode: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_host: None,
            marker: "FORWARD=YES".into(),
            template_path: "templates/haproxy.cfg.j2".into(),
            output_dir: "output".into(),
            config_file: "haproxy.cfg".into(),
            proxy_name: "haproxy".into(),
            proxy_image: "haproxy".into(),
            proxy_config_dir: "/usr/local/etc/haproxy".into(),
            pid_file: "/var/run/haproxy.pid".into(),
            listen_ports: vec![80, 8080],
            proxy_mode: "tcp".into(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("hapsync.toml"))
            .merge(Json::file("hapsync.json"))
            .merge(Env::prefixed("HAPSYNC_"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if !config.marker.contains('=') {
            anyhow::bail!("Invalid marker '{}': expected KEY=VALUE", config.marker);
        }
        if config.listen_ports.is_empty() {
            anyhow::bail!("listen_ports must name at least one port");
        }

        // Bind mounts need an absolute host path
        if config.output_dir.is_relative() {
            config.output_dir = std::env::current_dir()?.join(&config.output_dir);
        }

        Ok(config)
    }

    /// The marker split into key and value.
    pub fn marker_pair(&self) -> (&str, &str) {
        self.marker.split_once('=').unwrap_or((self.marker.as_str(), ""))
    }

    /// Host path of the rendered configuration.
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.config_file)
    }

    /// Path of the rendered configuration as seen inside the proxy.
    pub fn proxy_config_path(&self) -> String {
        Path::new(&self.proxy_config_dir)
            .join(&self.config_file)
            .to_string_lossy()
            .into_owned()
    }
}
