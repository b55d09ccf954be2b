//! Central role task and handle

use std::time::Duration;

use async_trait::async_trait;
use gattlink_core::{
    AdapterState, CentralAdapter, CentralCoordinator, CentralEvent, CentralEventReceiver,
    CentralState, ConnectedSession, DeviceId, DiscoveredDevice, LinkConfig, LinkDelegate,
    LinkError, Result,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::task::{Role, RoleTask};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum CentralCommand {
    StartScan(Reply<Result<()>>),
    StopScan(Reply<Result<()>>),
    Connect(DeviceId, Reply<Result<()>>),
    Disconnect(Reply<Result<()>>),
    Write(Vec<u8>, Reply<Result<()>>),
    ReadRssi(Reply<Result<()>>),
    ListDiscovered(Reply<Vec<DiscoveredDevice>>),
    Snapshot(Reply<CentralSnapshot>),
    Shutdown,
}

/// Point-in-time view of the central coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CentralSnapshot {
    pub state: CentralState,
    pub adapter_state: AdapterState,
    pub pending: Option<DeviceId>,
    pub session: Option<ConnectedSession>,
}

// ----------------------------------------------------------------------------
// Central Task
// ----------------------------------------------------------------------------

/// Owns one central adapter and its coordinator
pub struct CentralTask<A: CentralAdapter> {
    coordinator: CentralCoordinator<A>,
    commands: Option<mpsc::Receiver<CentralCommand>>,
    events: Option<CentralEventReceiver>,
    discovery_timeout: Option<Duration>,
    running: bool,
}

impl<A: CentralAdapter + 'static> CentralTask<A> {
    /// Build the task and the handle used to drive it
    ///
    /// The adapter is moved into the task, so no second coordinator can be
    /// built on top of it.
    pub fn new(
        config: LinkConfig,
        mut adapter: A,
        delegate: Box<dyn LinkDelegate>,
    ) -> Result<(Self, CentralHandle)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        adapter.attach_events(event_tx)?;

        let (command_tx, command_rx) = mpsc::channel(config.mailbox_size);
        let discovery_timeout = config.discovery_timeout();
        let task = Self {
            coordinator: CentralCoordinator::new(config, adapter, delegate),
            commands: Some(command_rx),
            events: Some(event_rx),
            discovery_timeout,
            running: false,
        };
        Ok((task, CentralHandle { sender: command_tx }))
    }

    /// Spawn the task onto the current tokio runtime
    pub fn spawn(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Main loop: handle commands, adapter events and the discovery timer
    async fn run_internal(&mut self) -> Result<()> {
        let mut commands = self.commands.take().ok_or_else(|| LinkError::InvalidConfiguration {
            reason: "central task started twice".to_string(),
        })?;
        let mut events = self.events.take().ok_or_else(|| LinkError::InvalidConfiguration {
            reason: "central task started twice".to_string(),
        })?;

        info!("Central task starting");

        // The adapter's current state is the first state change the coordinator sees
        let initial = self.coordinator.adapter().state();
        self.coordinator
            .handle_event(CentralEvent::StateChanged(initial));

        let mut last_state = self.coordinator.state();
        let mut deadline = self.arm_deadline(None, None, last_state);
        self.running = true;

        while self.running {
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.process_command(command),
                        None => {
                            info!("All central handles dropped, shutting down");
                            break;
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.coordinator.handle_event(event),
                        None => {
                            warn!("Central adapter event channel closed");
                            break;
                        }
                    }
                }

                _ = timer => {
                    self.coordinator.discovery_timed_out();
                }
            }

            let state = self.coordinator.state();
            deadline = self.arm_deadline(deadline, Some(last_state), state);
            last_state = state;
        }

        self.teardown();
        info!("Central task stopped");
        Ok(())
    }

    /// Re-arm on every entry into a discovery state, disarm outside of them
    fn arm_deadline(
        &self,
        current: Option<Instant>,
        previous: Option<CentralState>,
        state: CentralState,
    ) -> Option<Instant> {
        if !state.is_discovering() {
            return None;
        }
        if previous == Some(state) && current.is_some() {
            return current;
        }
        self.discovery_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout))
    }

    fn process_command(&mut self, command: CentralCommand) {
        match command {
            CentralCommand::StartScan(reply) => {
                let _ = reply.send(self.coordinator.start_scan());
            }
            CentralCommand::StopScan(reply) => {
                let _ = reply.send(self.coordinator.stop_scan());
            }
            CentralCommand::Connect(peripheral, reply) => {
                let _ = reply.send(self.coordinator.connect(&peripheral));
            }
            CentralCommand::Disconnect(reply) => {
                let _ = reply.send(self.coordinator.disconnect());
            }
            CentralCommand::Write(payload, reply) => {
                let _ = reply.send(self.coordinator.write(&payload));
            }
            CentralCommand::ReadRssi(reply) => {
                let _ = reply.send(self.coordinator.read_rssi());
            }
            CentralCommand::ListDiscovered(reply) => {
                let _ = reply.send(self.coordinator.list_discovered_devices());
            }
            CentralCommand::Snapshot(reply) => {
                let _ = reply.send(CentralSnapshot {
                    state: self.coordinator.state(),
                    adapter_state: self.coordinator.adapter_state(),
                    pending: self.coordinator.pending_connection().cloned(),
                    session: self.coordinator.session().cloned(),
                });
            }
            CentralCommand::Shutdown => {
                debug!("Central shutdown requested");
                self.running = false;
            }
        }
    }

    /// Release the radio before the adapter is dropped
    fn teardown(&mut self) {
        if let Err(e) = self.coordinator.stop_scan() {
            debug!("Stop scan during shutdown reported: {}", e);
        }
        match self.coordinator.disconnect() {
            Ok(()) | Err(LinkError::NotConnected) => {}
            Err(e) => warn!("Disconnect during shutdown failed: {}", e),
        }
    }
}

#[async_trait]
impl<A: CentralAdapter + 'static> RoleTask for CentralTask<A> {
    async fn run(&mut self) -> Result<()> {
        self.run_internal().await
    }

    fn role(&self) -> Role {
        Role::Central
    }
}

// ----------------------------------------------------------------------------
// Central Handle
// ----------------------------------------------------------------------------

/// Cloneable handle onto a running [`CentralTask`]
///
/// Operations return once the request has been issued to the adapter; their
/// completion is observed through the delegate.
#[derive(Debug, Clone)]
pub struct CentralHandle {
    sender: mpsc::Sender<CentralCommand>,
}

impl CentralHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> CentralCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        response.await.map_err(|_| LinkError::ChannelClosed)
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.request(CentralCommand::StartScan).await?
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.request(CentralCommand::StopScan).await?
    }

    pub async fn connect(&self, peripheral: DeviceId) -> Result<()> {
        self.request(|reply| CentralCommand::Connect(peripheral, reply))
            .await?
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(CentralCommand::Disconnect).await?
    }

    /// Write to the connected characteristic
    pub async fn write(&self, payload: impl Into<Vec<u8>>) -> Result<()> {
        let payload = payload.into();
        self.request(|reply| CentralCommand::Write(payload, reply))
            .await?
    }

    pub async fn read_rssi(&self) -> Result<()> {
        self.request(CentralCommand::ReadRssi).await?
    }

    /// Current scan session, ascending by signal strength
    pub async fn list_discovered_devices(&self) -> Result<Vec<DiscoveredDevice>> {
        self.request(CentralCommand::ListDiscovered).await
    }

    pub async fn current_connection_state(&self) -> Result<CentralState> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn snapshot(&self) -> Result<CentralSnapshot> {
        self.request(CentralCommand::Snapshot).await
    }

    /// Stop the task; the current scan and connection are torn down
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CentralCommand::Shutdown)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }
}
