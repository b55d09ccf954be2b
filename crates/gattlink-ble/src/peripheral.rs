//! Peripheral role task and handle

use async_trait::async_trait;
use gattlink_core::{
    AdapterState, CentralId, LinkConfig, LinkDelegate, LinkError, PeripheralAdapter,
    PeripheralAdvertiser, PeripheralEvent, PeripheralEventReceiver, PeripheralState, Result,
    ValueProducer,
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::task::{Role, RoleTask};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum PeripheralCommand {
    StartAdvertising(Reply<Result<()>>),
    StopAdvertising(Reply<Result<()>>),
    Notify(Vec<u8>, Reply<Result<usize>>),
    Snapshot(Reply<PeripheralSnapshot>),
    Shutdown,
}

/// Point-in-time view of the peripheral advertiser
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeripheralSnapshot {
    pub state: PeripheralState,
    pub adapter_state: AdapterState,
    pub subscribers: Vec<CentralId>,
}

// ----------------------------------------------------------------------------
// Peripheral Task
// ----------------------------------------------------------------------------

/// Owns one peripheral adapter and its advertiser
pub struct PeripheralTask<A: PeripheralAdapter> {
    advertiser: PeripheralAdvertiser<A>,
    commands: Option<mpsc::Receiver<PeripheralCommand>>,
    events: Option<PeripheralEventReceiver>,
    running: bool,
}

impl<A: PeripheralAdapter + 'static> PeripheralTask<A> {
    pub fn new(
        config: LinkConfig,
        mut adapter: A,
        delegate: Box<dyn LinkDelegate>,
    ) -> Result<(Self, PeripheralHandle)> {
        config.validate()?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        adapter.attach_events(event_tx)?;

        let (command_tx, command_rx) = mpsc::channel(config.mailbox_size);
        let task = Self {
            advertiser: PeripheralAdvertiser::new(config, adapter, delegate),
            commands: Some(command_rx),
            events: Some(event_rx),
            running: false,
        };
        Ok((task, PeripheralHandle { sender: command_tx }))
    }

    /// Replace the greeting with an application payload source
    pub fn with_value_producer(mut self, producer: impl ValueProducer + 'static) -> Self {
        self.advertiser = self.advertiser.with_value_producer(producer);
        self
    }

    pub fn spawn(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run_internal(&mut self) -> Result<()> {
        let mut commands = self.commands.take().ok_or_else(|| LinkError::InvalidConfiguration {
            reason: "peripheral task started twice".to_string(),
        })?;
        let mut events = self.events.take().ok_or_else(|| LinkError::InvalidConfiguration {
            reason: "peripheral task started twice".to_string(),
        })?;

        info!("Peripheral task starting");

        let initial = self.advertiser.adapter().state();
        self.advertiser
            .handle_event(PeripheralEvent::StateChanged(initial));
        self.running = true;

        while self.running {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.process_command(command),
                        None => {
                            info!("All peripheral handles dropped, shutting down");
                            break;
                        }
                    }
                }

                event = events.recv() => {
                    match event {
                        Some(event) => self.advertiser.handle_event(event),
                        None => {
                            warn!("Peripheral adapter event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        if let Err(e) = self.advertiser.stop_advertising() {
            debug!("Stop advertising during shutdown reported: {}", e);
        }
        info!("Peripheral task stopped");
        Ok(())
    }

    fn process_command(&mut self, command: PeripheralCommand) {
        match command {
            PeripheralCommand::StartAdvertising(reply) => {
                let _ = reply.send(self.advertiser.start_advertising());
            }
            PeripheralCommand::StopAdvertising(reply) => {
                let _ = reply.send(self.advertiser.stop_advertising());
            }
            PeripheralCommand::Notify(payload, reply) => {
                let _ = reply.send(self.advertiser.notify_subscribers(&payload));
            }
            PeripheralCommand::Snapshot(reply) => {
                let _ = reply.send(PeripheralSnapshot {
                    state: self.advertiser.state(),
                    adapter_state: self.advertiser.adapter_state(),
                    subscribers: self.advertiser.subscribers().to_vec(),
                });
            }
            PeripheralCommand::Shutdown => {
                debug!("Peripheral shutdown requested");
                self.running = false;
            }
        }
    }
}

#[async_trait]
impl<A: PeripheralAdapter + 'static> RoleTask for PeripheralTask<A> {
    async fn run(&mut self) -> Result<()> {
        self.run_internal().await
    }

    fn role(&self) -> Role {
        Role::Peripheral
    }
}

// ----------------------------------------------------------------------------
// Peripheral Handle
// ----------------------------------------------------------------------------

/// Cloneable handle onto a running [`PeripheralTask`]
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    sender: mpsc::Sender<PeripheralCommand>,
}

impl PeripheralHandle {
    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> PeripheralCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| LinkError::ChannelClosed)?;
        response.await.map_err(|_| LinkError::ChannelClosed)
    }

    pub async fn start_advertising(&self) -> Result<()> {
        self.request(PeripheralCommand::StartAdvertising).await?
    }

    pub async fn stop_advertising(&self) -> Result<()> {
        self.request(PeripheralCommand::StopAdvertising).await?
    }

    /// Push `payload` to every subscriber; returns how many were targeted
    pub async fn notify_subscribers(&self, payload: impl Into<Vec<u8>>) -> Result<usize> {
        let payload = payload.into();
        self.request(|reply| PeripheralCommand::Notify(payload, reply))
            .await?
    }

    pub async fn subscribers(&self) -> Result<Vec<CentralId>> {
        Ok(self.snapshot().await?.subscribers)
    }

    pub async fn current_state(&self) -> Result<PeripheralState> {
        Ok(self.snapshot().await?.state)
    }

    pub async fn snapshot(&self) -> Result<PeripheralSnapshot> {
        self.request(PeripheralCommand::Snapshot).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PeripheralCommand::Shutdown)
            .await
            .map_err(|_| LinkError::ChannelClosed)
    }
}
