//! Config synthesis: container records in, proxy configuration file out.

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{RuntimeError, SynthError};
use crate::render;
use crate::runtime::ContainerRuntime;
use crate::types::{ContainerRecord, ContainerStatus, RoutingEntry};

/// Derive routing entries from `records`.
///
/// Records without the marker are skipped.  The n-th port of a container
/// (in its sorted port order) is named `name-n`, the first just `name`.
/// A port already claimed by an earlier container gains this container's
/// address as another backend instead of a new entry.
pub fn synthesize(
    records: &[ContainerRecord],
    marker: (&str, &str),
    protocol: &str,
) -> Vec<RoutingEntry> {
    let (key, value) = marker;
    let mut entries: Vec<RoutingEntry> = Vec::new();

    for record in records.iter().filter(|r| r.has_env(key, value)) {
        let Some(host) = record.ip_address.as_deref() else {
            warn!("Skipping {}: no network address", record.name);
            continue;
        };
        info!("Forwarding {}", record.name);

        for (count, port) in record.ports.iter().enumerate() {
            match entries.iter_mut().find(|e| e.port == port.port) {
                Some(existing) => {
                    if !existing.backends.iter().any(|b| b == host) {
                        existing.backends.push(host.to_string());
                    }
                }
                None => {
                    let name = if count == 0 {
                        record.name.clone()
                    } else {
                        format!("{}-{}", record.name, count)
                    };
                    entries.push(RoutingEntry {
                        name,
                        port: port.port,
                        protocol: protocol.to_string(),
                        backends: vec![host.to_string()],
                    });
                }
            }
        }
    }

    entries
}

/// Inspect every running container, skipping ones that disappear
/// between listing and inspection.
pub async fn collect(runtime: &dyn ContainerRuntime) -> Result<Vec<ContainerRecord>, SynthError> {
    let summaries = runtime.list_containers(false).await?;
    let mut records = Vec::with_capacity(summaries.len());
    for summary in summaries {
        match runtime.inspect(&summary.id).await {
            Ok(record) if record.status == ContainerStatus::Running => records.push(record),
            Ok(record) => debug!("Container {} is no longer running", record.name),
            Err(RuntimeError::ContainerNotFound(id)) => {
                warn!("Container {} ({}) vanished before inspection", summary.name, id);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}

/// Produces the proxy configuration file from the live container set.
pub struct Synthesizer {
    marker_key: String,
    marker_value: String,
    protocol: String,
    template_path: PathBuf,
    target_path: PathBuf,
}

impl Synthesizer {
    pub fn new(config: &Config) -> Self {
        let (key, value) = config.marker_pair();
        Self {
            marker_key: key.to_string(),
            marker_value: value.to_string(),
            protocol: config.proxy_mode.clone(),
            template_path: config.template_path.clone(),
            target_path: config.output_path(),
        }
    }

    /// Re-scan the runtime and rewrite the configuration file.
    pub async fn refresh(
        &self,
        runtime: &dyn ContainerRuntime,
    ) -> Result<Vec<RoutingEntry>, SynthError> {
        let records = collect(runtime).await?;
        let marker = (self.marker_key.as_str(), self.marker_value.as_str());
        let entries = synthesize(&records, marker, &self.protocol);
        // Re-read each pass so template edits land on the next reload.
        let template = render::load_template(&self.template_path)?;
        let output = render::render(&template, &entries)?;
        render::write_atomic(&self.target_path, &output)?;
        debug!(
            "Wrote {} routing entries to {}",
            entries.len(),
            self.target_path.display()
        );
        Ok(entries)
    }
}
