//! The control loop tying runtime events to config synthesis and reloads.
//!
//! [`Supervisor::run`] starts three tasks: the runtime monitor, the event
//! consumer and the shutdown waiter.  All of them report into one
//! completion channel and the first value received ends the run.
//!
//! Refreshes are serialized.  The consumer handles one event at a time,
//! and before refreshing it drains whatever is already queued, so a burst
//! of start/stop events costs a single synthesis and reload.  Events that
//! arrive while a reload is running are picked up afterwards as one
//! trailing refresh.

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::error::SupervisorError;
use crate::proxy::ProxyManager;
use crate::runtime::ContainerRuntime;
use crate::synth::Synthesizer;
use crate::types::RuntimeEvent;

const EVENT_BUFFER: usize = 128;

pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    synthesizer: Synthesizer,
    proxy: ProxyManager,
}

impl Supervisor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        synthesizer: Synthesizer,
        proxy: ProxyManager,
    ) -> Self {
        Self {
            runtime,
            synthesizer,
            proxy,
        }
    }

    /// Remove any stale proxy, render the initial configuration and start
    /// a fresh proxy on it.
    pub async fn bootstrap(&mut self) -> Result<(), SupervisorError> {
        self.proxy.ensure_clean(self.runtime.as_ref()).await?;
        let entries = self.synthesizer.refresh(self.runtime.as_ref()).await?;
        info!("Initial configuration has {} routing entries", entries.len());
        self.proxy.start(self.runtime.as_ref()).await?;
        Ok(())
    }

    /// Supervise until a shutdown signal or the first failure.  Always
    /// returns the terminal cause; [`SupervisorError::is_shutdown`] tells
    /// a signal apart from an operational error.  A `shutdown` future that
    /// fails ends the run as an error, not as a shutdown.
    pub async fn run<F>(self, shutdown: F) -> SupervisorError
    where
        F: Future<Output = std::io::Result<String>> + Send + 'static,
    {
        let (done_tx, mut done_rx) = mpsc::channel::<SupervisorError>(3);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let monitor_handle = {
            let runtime = Arc::clone(&self.runtime);
            let done = done_tx.clone();
            tokio::spawn(async move {
                // Hold our own sender so a failure is reported before the
                // consumer can observe the stream closing.
                if let Err(e) = runtime.monitor(event_tx.clone()).await {
                    error!("Runtime event monitor failed: {}", e);
                    let _ = done.send(SupervisorError::EventStream(e)).await;
                }
                drop(event_tx);
            })
        };

        let signal_handle = {
            let done = done_tx.clone();
            tokio::spawn(async move {
                let cause = match shutdown.await {
                    Ok(signal) => SupervisorError::Interrupted(signal),
                    Err(e) => {
                        error!("Unable to listen for shutdown signal: {}", e);
                        SupervisorError::SignalHandler(e)
                    }
                };
                let _ = done.send(cause).await;
            })
        };

        let consumer_handle = tokio::spawn(async move {
            let cause = self.consume(event_rx).await;
            let _ = done_tx.send(cause).await;
        });

        let cause = done_rx
            .recv()
            .await
            .unwrap_or(SupervisorError::EventStreamClosed);

        monitor_handle.abort();
        signal_handle.abort();
        consumer_handle.abort();
        cause
    }

    async fn consume(self, mut events: mpsc::Receiver<RuntimeEvent>) -> SupervisorError {
        while let Some(event) = events.recv().await {
            info!("Received event: {}", event);
            if !event.triggers_refresh() {
                debug!("Ignoring event: {}", event);
                continue;
            }

            let coalesced = drain_pending(&mut events);
            if coalesced > 0 {
                info!("Coalesced {} queued events into one refresh", coalesced);
            }

            if let Err(e) = self.refresh().await {
                return e;
            }
        }
        SupervisorError::EventStreamClosed
    }

    async fn refresh(&self) -> Result<(), SupervisorError> {
        let entries = self.synthesizer.refresh(self.runtime.as_ref()).await?;
        info!("Configuration regenerated with {} routing entries", entries.len());
        self.proxy.reload(self.runtime.as_ref()).await?;
        Ok(())
    }
}

/// Take every event already queued, returning how many would have
/// triggered a refresh of their own.
fn drain_pending(events: &mut mpsc::Receiver<RuntimeEvent>) -> usize {
    let mut relevant = 0;
    while let Ok(event) = events.try_recv() {
        info!("Received event: {}", event);
        if event.triggers_refresh() {
            relevant += 1;
        }
    }
    relevant
}
