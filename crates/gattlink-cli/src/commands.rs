//! Command handlers for the gattlink CLI

use std::time::Duration;

use gattlink_ble::{CentralHandle, CentralTask, PeripheralHandle, PeripheralTask};
use gattlink_core::{
    sim::CentralController, CentralAdapter, ChannelDelegate, DeviceId, DiscoveredDevice,
    LinkError, LinkEvent, LinkEventReceiver, PeripheralAdapter,
};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::cli::{Backend, Cli, Commands};
use crate::config::CliAppConfig;
use crate::demo;
use crate::error::{CliError, Result};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the configured backend
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        let backend = config.cli.backend;
        info!("Using {} backend", backend);

        match cli.command {
            Commands::Scan {
                duration_secs,
                json,
            } => {
                let duration =
                    Duration::from_secs(duration_secs.unwrap_or(config.cli.scan_duration_secs));
                match backend {
                    Backend::Sim => {
                        let (adapter, _controller) = demo::central(&config.link);
                        Self::handle_scan(adapter, &config, duration, json).await
                    }
                    #[cfg(feature = "btleplug")]
                    Backend::Btleplug => {
                        let adapter = gattlink_ble::BtleplugCentral::new().await?;
                        Self::handle_scan(adapter, &config, duration, json).await
                    }
                    #[cfg(not(feature = "btleplug"))]
                    Backend::Btleplug => Err(not_compiled()),
                }
            }
            Commands::Connect {
                id,
                send,
                listen_secs,
            } => {
                let target = ConnectTarget {
                    peripheral: DeviceId::new(id),
                    send,
                    listen: Duration::from_secs(listen_secs.unwrap_or(config.cli.listen_secs)),
                };
                match backend {
                    Backend::Sim => {
                        let (adapter, controller) = demo::central(&config.link);
                        Self::handle_connect(adapter, Some(controller), &config, target).await
                    }
                    #[cfg(feature = "btleplug")]
                    Backend::Btleplug => {
                        let adapter = gattlink_ble::BtleplugCentral::new().await?;
                        Self::handle_connect(adapter, None, &config, target).await
                    }
                    #[cfg(not(feature = "btleplug"))]
                    Backend::Btleplug => Err(not_compiled()),
                }
            }
            Commands::Advertise { duration_secs } => {
                let duration = Duration::from_secs(
                    duration_secs.unwrap_or(config.cli.advertise_duration_secs),
                );
                match backend {
                    Backend::Sim => {
                        let (adapter, controller) = demo::peripheral();
                        let script = demo::remote_central(controller, &config.link);
                        let result = Self::handle_advertise(adapter, &config, duration).await;
                        script.abort();
                        result
                    }
                    Backend::Btleplug => {
                        let adapter = gattlink_ble::UnsupportedPeripheral::new();
                        Self::handle_advertise(adapter, &config, duration).await
                    }
                }
            }
            Commands::Config => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }

    /// Scan for `duration`, then print the session's device list
    async fn handle_scan<A: CentralAdapter + 'static>(
        adapter: A,
        config: &CliAppConfig,
        duration: Duration,
        json: bool,
    ) -> Result<()> {
        let (delegate, mut events) = ChannelDelegate::channel();
        let (task, handle) = CentralTask::new(config.link.clone(), adapter, Box::new(delegate))?;
        let join = task.spawn();

        info!("Scanning for {}s...", duration.as_secs());
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
                event = events.recv() => match event {
                    Some(LinkEvent::DeviceDiscovered { device, signal_strength }) => {
                        info!(
                            "Discovered {} ({}) at {}",
                            device.id,
                            device.display_name(),
                            format_rssi(signal_strength)
                        );
                    }
                    Some(LinkEvent::Error(e)) => warn!("{}", e),
                    Some(event) => debug!("Link event: {:?}", event),
                    None => break,
                },
            }
        }

        let devices = handle.list_discovered_devices().await?;
        shutdown_central(&handle, join).await;

        if json {
            println!("{}", serde_json::to_string_pretty(&devices)?);
        } else {
            print_devices(&devices);
        }
        Ok(())
    }

    /// Wait for the target to be discovered, connect, exchange data, disconnect
    async fn handle_connect<A: CentralAdapter + 'static>(
        adapter: A,
        demo: Option<CentralController>,
        config: &CliAppConfig,
        target: ConnectTarget,
    ) -> Result<()> {
        let (delegate, mut events) = ChannelDelegate::channel();
        let (task, handle) = CentralTask::new(config.link.clone(), adapter, Box::new(delegate))?;
        let join = task.spawn();

        let outcome = Self::establish(&handle, &mut events, config, &target.peripheral).await;
        if let Err(e) = outcome {
            shutdown_central(&handle, join).await;
            return Err(e);
        }
        println!("Connected to {}", target.peripheral);

        if let Some(controller) = &demo {
            demo::greet(controller, &config.link, &target.peripheral);
        }
        if let Some(text) = &target.send {
            handle.write(text.as_bytes()).await?;
            println!("Sent {} bytes", text.len());
        }
        handle.read_rssi().await?;

        let deadline = Instant::now() + target.listen;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(LinkEvent::DataReceived { payload }) => {
                        println!("Received: {}", format_payload(&payload));
                    }
                    Some(LinkEvent::SignalStrength { rssi, .. }) => println!("RSSI: {} dBm", rssi),
                    Some(LinkEvent::Disconnected { peripheral }) => {
                        println!("Disconnected from {}", peripheral);
                        break;
                    }
                    Some(LinkEvent::Error(e)) => warn!("{}", e),
                    Some(event) => debug!("Link event: {:?}", event),
                    None => break,
                },
            }
        }

        match handle.disconnect().await {
            Ok(()) | Err(LinkError::NotConnected) => {}
            Err(e) => warn!("Disconnect failed: {}", e),
        }
        shutdown_central(&handle, join).await;
        Ok(())
    }

    async fn establish(
        handle: &CentralHandle,
        events: &mut LinkEventReceiver,
        config: &CliAppConfig,
        peripheral: &DeviceId,
    ) -> Result<()> {
        // The target may already be in the list from the scan started at power-on
        let known = handle
            .list_discovered_devices()
            .await?
            .iter()
            .any(|device| &device.id == peripheral);
        let mut requested = false;
        if known {
            handle.connect(peripheral.clone()).await?;
            requested = true;
        }

        let timeout = Duration::from_secs(config.cli.connect_timeout_secs);
        let deadline = Instant::now() + timeout;
        loop {
            let event = tokio::select! {
                _ = sleep_until(deadline) => {
                    return Err(CliError::Timeout(format!(
                        "no connection to {} within {}s",
                        peripheral,
                        timeout.as_secs()
                    )));
                }
                event = events.recv() => event.ok_or(LinkError::ChannelClosed)?,
            };

            match event {
                LinkEvent::DeviceDiscovered { device, .. }
                    if !requested && &device.id == peripheral =>
                {
                    info!("Found {}, connecting", peripheral);
                    handle.connect(peripheral.clone()).await?;
                    requested = true;
                }
                LinkEvent::ConnectionEstablished { peripheral: connected }
                    if &connected == peripheral =>
                {
                    return Ok(());
                }
                LinkEvent::Error(e) if is_fatal_for_attempt(&e) => {
                    return Err(CliError::Connection {
                        peripheral: peripheral.to_string(),
                        reason: e.to_string(),
                    });
                }
                LinkEvent::Error(e) => warn!("{}", e),
                other => debug!("Link event: {:?}", other),
            }
        }
    }

    /// Publish and advertise for `duration`, printing subscriber activity
    async fn handle_advertise<A: PeripheralAdapter + 'static>(
        adapter: A,
        config: &CliAppConfig,
        duration: Duration,
    ) -> Result<()> {
        let (delegate, mut events) = ChannelDelegate::channel();
        let (task, handle) =
            PeripheralTask::new(config.link.clone(), adapter, Box::new(delegate))?;
        let join = task.spawn();

        info!(
            "Advertising as {:?} for {}s...",
            config.link.local_name,
            duration.as_secs()
        );
        let deadline = Instant::now() + duration;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Some(LinkEvent::PeripheralStateChanged(state)) => println!("Peripheral {}", state),
                    Some(LinkEvent::Subscribed { central }) => println!("{} subscribed", central),
                    Some(LinkEvent::Unsubscribed { central }) => println!("{} unsubscribed", central),
                    Some(LinkEvent::DataReceived { payload }) => {
                        println!("Received: {}", format_payload(&payload));
                    }
                    Some(LinkEvent::Error(e)) => warn!("{}", e),
                    Some(event) => debug!("Link event: {:?}", event),
                    None => break,
                },
            }
        }

        shutdown_peripheral(&handle, join).await;
        Ok(())
    }
}

struct ConnectTarget {
    peripheral: DeviceId,
    send: Option<String>,
    listen: Duration,
}

#[cfg(not(feature = "btleplug"))]
fn not_compiled() -> CliError {
    gattlink_ble::BackendError::NotCompiled {
        backend: "btleplug",
        feature: "btleplug",
    }
    .into()
}

/// Errors that end the current connection attempt
fn is_fatal_for_attempt(error: &LinkError) -> bool {
    matches!(
        error,
        LinkError::ConnectionFailed { .. }
            | LinkError::ConnectionLost { .. }
            | LinkError::NoMatchingService { .. }
            | LinkError::NoMatchingCharacteristic { .. }
            | LinkError::DiscoveryTimeout { .. }
            | LinkError::AdapterNotReady { .. }
    )
}

async fn shutdown_central(
    handle: &CentralHandle,
    join: tokio::task::JoinHandle<gattlink_core::Result<()>>,
) {
    if let Err(e) = handle.shutdown().await {
        debug!("Central task already stopped: {}", e);
    }
    match join.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Central task failed: {}", e),
        Err(e) => warn!("Central task panicked: {}", e),
    }
}

async fn shutdown_peripheral(
    handle: &PeripheralHandle,
    join: tokio::task::JoinHandle<gattlink_core::Result<()>>,
) {
    if let Err(e) = handle.shutdown().await {
        debug!("Peripheral task already stopped: {}", e);
    }
    match join.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Peripheral task failed: {}", e),
        Err(e) => warn!("Peripheral task panicked: {}", e),
    }
}

fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(rssi) => format!("{} dBm", rssi),
        None => "already connected".to_string(),
    }
}

fn print_devices(devices: &[DiscoveredDevice]) {
    if devices.is_empty() {
        println!("No devices found");
        return;
    }
    println!("{:<24} {:<20} {:>10}", "ID", "NAME", "RSSI");
    for device in devices {
        let rssi = device
            .signal_strength
            .map(|rssi| rssi.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<20} {:>10}",
            device.id.as_str(),
            device.display_name(),
            rssi
        );
    }
}

/// Printable text as-is, anything else as hex
pub fn format_payload(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if !text.chars().any(|c| c.is_control() && c != '\n') => text.to_string(),
        _ => format!("0x{}", hex::encode(payload)),
    }
}
