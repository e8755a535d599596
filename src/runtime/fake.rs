//! In-memory runtime used by the unit tests.

use super::ContainerRuntime;
use crate::error::RuntimeError;
use crate::types::{ContainerRecord, ContainerStatus, ExposedPort, ProxySpec, RuntimeEvent};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};

#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<ContainerRecord>>,
    /// Ids that appear in listings but fail to inspect.
    vanished: Mutex<HashSet<String>>,
    events: Mutex<Vec<RuntimeEvent>>,
    /// Keep the event stream open after the scripted events are sent.
    hold_stream: bool,
    /// Events pushed by the test after the scripted ones.
    feed: Mutex<Option<mpsc::Receiver<RuntimeEvent>>>,
    /// End the event stream with an error instead of closing it.
    fail_stream: bool,
    /// When set, each exec waits for a permit before returning.
    exec_gate: Option<Arc<Semaphore>>,
    reject_remove: bool,
    pub created: Mutex<Vec<ProxySpec>>,
    pub execs: Mutex<Vec<(String, Vec<String>)>>,
    pub removed: Mutex<Vec<String>>,
    pub lists: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(mut self, events: &[&str]) -> Self {
        self.events = Mutex::new(events.iter().map(|s| RuntimeEvent::new(*s)).collect());
        self
    }

    pub fn holding_stream(mut self) -> Self {
        self.hold_stream = true;
        self
    }

    /// Events sent on the returned sender reach the supervisor in order.
    pub fn with_event_feed(mut self) -> (Self, mpsc::Sender<RuntimeEvent>) {
        let (tx, rx) = mpsc::channel(16);
        self.feed = Mutex::new(Some(rx));
        (self, tx)
    }

    pub fn failing_monitor(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    /// Block every exec until a permit is added to the returned semaphore.
    pub fn gating_exec(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.exec_gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn rejecting_removal(mut self) -> Self {
        self.reject_remove = true;
        self
    }

    /// Add a running container; returns its id.
    pub fn add(&self, name: &str, ip: &str, ports: &[u16], eligible: bool) -> String {
        let mut containers = self.containers.lock().unwrap();
        let id = format!("id-{}", containers.len());
        let mut record = ContainerRecord::summary(&id, name, ContainerStatus::Running);
        record.ip_address = Some(ip.to_string());
        record.ports = ports.iter().copied().map(ExposedPort::tcp).collect();
        if eligible {
            record.env.insert("FORWARD".into(), "YES".into());
        }
        containers.push(record);
        id
    }

    pub fn add_stopped(&self, name: &str) -> String {
        let mut containers = self.containers.lock().unwrap();
        let id = format!("id-{}", containers.len());
        containers.push(ContainerRecord::summary(&id, name, ContainerStatus::Stopped));
        id
    }

    pub fn vanish(&self, id: &str) {
        self.vanished.lock().unwrap().insert(id.to_string());
    }

    /// Drop a container entirely, as if removed out from under us.
    pub fn delete(&self, id: &str) {
        self.containers.lock().unwrap().retain(|c| c.id != id);
    }

    pub fn exec_count(&self) -> usize {
        self.execs.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(
        &self,
        include_stopped: bool,
    ) -> Result<Vec<ContainerRecord>, RuntimeError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| include_stopped || c.status == ContainerStatus::Running)
            .map(|c| ContainerRecord::summary(&c.id, &c.name, c.status))
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerRecord, RuntimeError> {
        if self.vanished.lock().unwrap().contains(id) {
            return Err(RuntimeError::ContainerNotFound(id.to_string()));
        }
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_string()))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        if self.reject_remove {
            return Err(RuntimeError::Rejected {
                operation: "remove container",
                message: "removal in progress".into(),
            });
        }
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|c| c.id != id);
        if containers.len() == before {
            return Err(RuntimeError::ContainerNotFound(id.to_string()));
        }
        self.removed.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn create_and_start(&self, spec: &ProxySpec) -> Result<String, RuntimeError> {
        self.created.lock().unwrap().push(spec.clone());
        let mut containers = self.containers.lock().unwrap();
        let id = format!("id-{}", containers.len());
        containers.push(ContainerRecord::summary(&id, &spec.name, ContainerStatus::Running));
        Ok(id)
    }

    async fn exec_detached(&self, id: &str, cmd: Vec<String>) -> Result<(), RuntimeError> {
        self.execs.lock().unwrap().push((id.to_string(), cmd));
        if let Some(gate) = &self.exec_gate {
            gate.acquire().await.expect("exec gate closed").forget();
        }
        let running = self
            .containers
            .lock()
            .unwrap()
            .iter()
            .any(|c| c.id == id && c.status == ContainerStatus::Running);
        if running {
            Ok(())
        } else {
            Err(RuntimeError::ContainerNotFound(id.to_string()))
        }
    }

    async fn monitor(&self, event_tx: mpsc::Sender<RuntimeEvent>) -> Result<(), RuntimeError> {
        let events = std::mem::take(&mut *self.events.lock().unwrap());
        for event in events {
            if event_tx.send(event).await.is_err() {
                return Ok(());
            }
        }
        let feed = self.feed.lock().unwrap().take();
        if let Some(mut feed) = feed {
            while let Some(event) = feed.recv().await {
                if event_tx.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
        if self.fail_stream {
            return Err(RuntimeError::Unavailable("event stream: connection reset".into()));
        }
        if self.hold_stream {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}
