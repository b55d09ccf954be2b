//! Central backend on top of btleplug
//!
//! btleplug is async while [`CentralAdapter`] requests are not, so every
//! request is spawned onto the runtime and its outcome comes back as a
//! [`CentralEvent`]. A background pump translates btleplug's adapter events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent as BtleEvent, CentralState as RadioState, CharPropFlags,
    Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use gattlink_core::{
    AdapterState, CentralAdapter, CentralEvent, CentralEventSender, CharacteristicProperties,
    DeviceId, DiscoveredDevice, LinkError, RemoteCharacteristic, Result, ServiceHandle,
    WriteMode,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BackendError;

type Registry = Arc<Mutex<HashMap<DeviceId, Peripheral>>>;
type ConnectedTable = Arc<Mutex<Vec<(DiscoveredDevice, Vec<Uuid>)>>>;
type SharedState = Arc<Mutex<AdapterState>>;

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Devices are keyed by their Bluetooth address
fn device_id_of(peripheral: &Peripheral) -> DeviceId {
    DeviceId::new(peripheral.address().to_string())
}

/// Keep `task` alongside the still-running ones
fn track(tasks: &mut Vec<JoinHandle<()>>, task: JoinHandle<()>) {
    tasks.retain(|running| !running.is_finished());
    tasks.push(task);
}

fn adapter_state_of(state: RadioState) -> AdapterState {
    match state {
        RadioState::PoweredOn => AdapterState::PoweredOn,
        RadioState::PoweredOff => AdapterState::PoweredOff,
        RadioState::Unknown => AdapterState::Unknown,
    }
}

fn properties_of(flags: CharPropFlags) -> CharacteristicProperties {
    CharacteristicProperties {
        read: flags.contains(CharPropFlags::READ),
        write: flags.contains(CharPropFlags::WRITE),
        write_without_response: flags.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE),
        notify: flags.contains(CharPropFlags::NOTIFY),
        indicate: flags.contains(CharPropFlags::INDICATE),
    }
}

// ----------------------------------------------------------------------------
// btleplug Central
// ----------------------------------------------------------------------------

/// Central adapter driving the first system Bluetooth adapter
pub struct BtleplugCentral {
    adapter: Adapter,
    sender: Option<CentralEventSender>,
    /// Peripherals seen by the event pump, by identifier
    peripherals: Registry,
    /// Devices currently connected to this host with their advertised services
    connected: ConnectedTable,
    /// Last radio state reported by the platform
    state: SharedState,
    tasks: Vec<JoinHandle<()>>,
}

impl BtleplugCentral {
    /// Acquire the first adapter reported by the platform
    pub async fn new() -> std::result::Result<Self, BackendError> {
        let manager = Manager::new()
            .await
            .map_err(|e| BackendError::ManagerUnavailable(e.to_string()))?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| BackendError::ManagerUnavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or(BackendError::AdapterNotAvailable)?;

        let state = match adapter.adapter_state().await {
            Ok(state) => adapter_state_of(state),
            Err(e) => {
                warn!("Failed to query BLE adapter state: {}", e);
                AdapterState::Unknown
            }
        };
        info!("BLE adapter initialized ({:?})", state);

        Ok(Self {
            adapter,
            sender: None,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
            connected: Arc::new(Mutex::new(Vec::new())),
            state: Arc::new(Mutex::new(state)),
            tasks: Vec::new(),
        })
    }

    fn sender(&self) -> Result<CentralEventSender> {
        self.sender.clone().ok_or(LinkError::ChannelClosed)
    }

    fn peripheral(&self, id: &DeviceId) -> Result<Peripheral> {
        lock(&self.peripherals)
            .get(id)
            .cloned()
            .ok_or_else(|| LinkError::UnknownDevice { device: id.clone() })
    }

    fn characteristic(
        peripheral: &Peripheral,
        remote: &RemoteCharacteristic,
    ) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == remote.uuid && c.service_uuid == remote.service_uuid)
            .ok_or_else(|| {
                LinkError::platform("characteristic lookup", "characteristic no longer cached")
            })
    }

    fn track(&mut self, task: JoinHandle<()>) {
        track(&mut self.tasks, task);
    }

    /// Run `request` in the background, reporting a failure as a platform error
    fn spawn_request<F>(&mut self, operation: &'static str, request: F) -> Result<()>
    where
        F: std::future::Future<Output = btleplug::Result<()>> + Send + 'static,
    {
        let sender = self.sender()?;
        self.track(tokio::spawn(async move {
            if let Err(e) = request.await {
                warn!("BLE {} failed: {}", operation, e);
                let _ = sender.send(CentralEvent::PlatformError {
                    operation: operation.to_string(),
                    reason: e.to_string(),
                });
            }
        }));
        Ok(())
    }
}

impl Drop for BtleplugCentral {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl CentralAdapter for BtleplugCentral {
    fn attach_events(&mut self, sender: CentralEventSender) -> Result<()> {
        self.sender = Some(sender.clone());
        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let connected = self.connected.clone();
        let state = self.state.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = pump_events(adapter, sender.clone(), peripherals, connected, state).await
            {
                error!("BLE event pump stopped: {}", e);
                let _ = sender.send(CentralEvent::PlatformError {
                    operation: "event stream".to_string(),
                    reason: e.to_string(),
                });
            }
        }));
        Ok(())
    }

    fn state(&self) -> AdapterState {
        *lock(&self.state)
    }

    fn start_scan(&mut self, services: &[Uuid]) -> Result<()> {
        let adapter = self.adapter.clone();
        let filter = ScanFilter {
            services: services.to_vec(),
        };
        self.spawn_request("start scan", async move { adapter.start_scan(filter).await })
    }

    fn stop_scan(&mut self) -> Result<()> {
        let adapter = self.adapter.clone();
        self.spawn_request("stop scan", async move { adapter.stop_scan().await })
    }

    fn retrieve_connected(&mut self, services: &[Uuid]) -> Result<Vec<DiscoveredDevice>> {
        Ok(lock(&self.connected)
            .iter()
            .filter(|(_, advertised)| {
                services.is_empty() || advertised.iter().any(|uuid| services.contains(uuid))
            })
            .map(|(device, _)| device.clone())
            .collect())
    }

    fn connect(&mut self, peripheral: &DeviceId) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        let sender = self.sender()?;
        let id = peripheral.clone();
        self.track(tokio::spawn(async move {
            let event = match device.connect().await {
                Ok(()) => CentralEvent::Connected { peripheral: id },
                Err(e) => CentralEvent::ConnectFailed {
                    peripheral: id,
                    reason: e.to_string(),
                },
            };
            let _ = sender.send(event);
        }));
        Ok(())
    }

    fn disconnect(&mut self, peripheral: &DeviceId) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        self.spawn_request("disconnect", async move { device.disconnect().await })
    }

    fn discover_services(&mut self, peripheral: &DeviceId, services: &[Uuid]) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        let sender = self.sender()?;
        let id = peripheral.clone();
        let filter = services.to_vec();
        self.track(tokio::spawn(async move {
            let result = device
                .discover_services()
                .await
                .map(|()| {
                    device
                        .services()
                        .into_iter()
                        .filter(|service| filter.is_empty() || filter.contains(&service.uuid))
                        .map(|service| ServiceHandle {
                            uuid: service.uuid,
                            primary: service.primary,
                        })
                        .collect()
                })
                .map_err(|e| e.to_string());
            let _ = sender.send(CentralEvent::ServicesDiscovered {
                peripheral: id,
                result,
            });
        }));
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        peripheral: &DeviceId,
        service: &ServiceHandle,
        characteristics: &[Uuid],
    ) -> Result<()> {
        // btleplug resolves characteristics together with services
        let device = self.peripheral(peripheral)?;
        let found = device
            .services()
            .into_iter()
            .find(|s| s.uuid == service.uuid)
            .map(|s| {
                s.characteristics
                    .into_iter()
                    .filter(|c| characteristics.is_empty() || characteristics.contains(&c.uuid))
                    .map(|c| RemoteCharacteristic {
                        uuid: c.uuid,
                        service_uuid: c.service_uuid,
                        properties: properties_of(c.properties),
                    })
                    .collect()
            })
            .ok_or_else(|| "service no longer cached".to_string());

        self.sender()?
            .send(CentralEvent::CharacteristicsDiscovered {
                peripheral: peripheral.clone(),
                service: service.clone(),
                result: found,
            })
            .map_err(|_| LinkError::ChannelClosed)
    }

    fn set_notify(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        enabled: bool,
    ) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        let target = Self::characteristic(&device, characteristic)?;
        if !enabled {
            return self.spawn_request("unsubscribe", async move {
                device.unsubscribe(&target).await
            });
        }

        let sender = self.sender()?;
        let id = peripheral.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = device.subscribe(&target).await {
                let _ = sender.send(CentralEvent::PlatformError {
                    operation: "subscribe".to_string(),
                    reason: e.to_string(),
                });
                return;
            }
            let mut notifications = match device.notifications().await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = sender.send(CentralEvent::PlatformError {
                        operation: "notification stream".to_string(),
                        reason: e.to_string(),
                    });
                    return;
                }
            };
            while let Some(notification) = notifications.next().await {
                let event = CentralEvent::ValueUpdated {
                    peripheral: id.clone(),
                    characteristic: notification.uuid,
                    value: notification.value,
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification stream for {} ended", id);
        }));
        Ok(())
    }

    fn write(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        let target = Self::characteristic(&device, characteristic)?;
        let data = data.to_vec();

        if mode == WriteMode::WithoutResponse {
            return self.spawn_request("write", async move {
                device
                    .write(&target, &data, WriteType::WithoutResponse)
                    .await
            });
        }

        let sender = self.sender()?;
        let id = peripheral.clone();
        self.track(tokio::spawn(async move {
            let result = device
                .write(&target, &data, WriteType::WithResponse)
                .await
                .map_err(|e| e.to_string());
            let _ = sender.send(CentralEvent::WriteCompleted {
                peripheral: id,
                characteristic: target.uuid,
                result,
            });
        }));
        Ok(())
    }

    fn read_rssi(&mut self, peripheral: &DeviceId) -> Result<()> {
        let device = self.peripheral(peripheral)?;
        let sender = self.sender()?;
        let id = peripheral.clone();
        self.track(tokio::spawn(async move {
            let result = match device.properties().await {
                Ok(Some(properties)) => properties
                    .rssi
                    .ok_or_else(|| "RSSI unavailable".to_string()),
                Ok(None) => Err("peripheral properties unavailable".to_string()),
                Err(e) => Err(e.to_string()),
            };
            let _ = sender.send(CentralEvent::RssiRead {
                peripheral: id,
                result,
            });
        }));
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Event Pump
// ----------------------------------------------------------------------------

async fn pump_events(
    adapter: Adapter,
    sender: CentralEventSender,
    peripherals: Registry,
    connected: ConnectedTable,
    state: SharedState,
) -> std::result::Result<(), BackendError> {
    let mut events = adapter
        .events()
        .await
        .map_err(|e| BackendError::EventStreamFailed(e.to_string()))?;

    while let Some(event) = events.next().await {
        match event {
            BtleEvent::DeviceDiscovered(id) | BtleEvent::DeviceUpdated(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let Ok(Some(properties)) = peripheral.properties().await else {
                    continue;
                };
                let device_id = device_id_of(&peripheral);
                lock(&peripherals).insert(device_id.clone(), peripheral);

                let device =
                    DiscoveredDevice::new(device_id, properties.local_name, properties.rssi);
                if sender
                    .send(CentralEvent::DeviceDiscovered { device })
                    .is_err()
                {
                    break;
                }
            }
            BtleEvent::DeviceConnected(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let properties = peripheral.properties().await.ok().flatten();
                let device_id = device_id_of(&peripheral);
                let (name, services) = properties
                    .map(|p| (p.local_name, p.services))
                    .unwrap_or_default();
                lock(&peripherals).insert(device_id.clone(), peripheral);

                let mut table = lock(&connected);
                table.retain(|(device, _)| device.id != device_id);
                table.push((DiscoveredDevice::new(device_id, name, None), services));
            }
            BtleEvent::DeviceDisconnected(id) => {
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                let device_id = device_id_of(&peripheral);
                lock(&connected).retain(|(device, _)| device.id != device_id);
                if sender
                    .send(CentralEvent::Disconnected {
                        peripheral: device_id,
                        reason: None,
                    })
                    .is_err()
                {
                    break;
                }
            }
            BtleEvent::StateUpdate(radio) => {
                let update = adapter_state_of(radio);
                *lock(&state) = update;
                info!("BLE adapter state changed to {:?}", update);
                if sender.send(CentralEvent::StateChanged(update)).is_err() {
                    break;
                }
            }
            _ => {}
        }
    }

    debug!("BLE event stream ended");
    Ok(())
}
