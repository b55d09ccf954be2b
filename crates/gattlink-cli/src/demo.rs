//! Simulated radio environment for the `sim` backend
//!
//! Three serial-style peripherals sit around the central at -50, -80 and
//! -60 dBm, so a scan shows the proximity gate and the signal ordering. The
//! peripheral side gets a scripted remote central that subscribes, writes and
//! leaves again.

use std::time::Duration;

use gattlink_core::{
    sim::{
        CentralController, PeripheralController, SimulatedCentral, SimulatedDevice,
        SimulatedPeripheral, SimulatedService,
    },
    AdapterState, CentralId, CharacteristicProperties, DeviceId, LinkConfig,
};
use tokio::task::JoinHandle;
use tracing::debug;

fn serial_properties() -> CharacteristicProperties {
    CharacteristicProperties {
        read: true,
        write: true,
        notify: true,
        ..Default::default()
    }
}

/// Powered-on central adapter surrounded by the demo peripherals
pub fn central(config: &LinkConfig) -> (SimulatedCentral, CentralController) {
    let (adapter, controller) = SimulatedCentral::new(AdapterState::PoweredOn);
    let service = SimulatedService::new(config.service_uuid)
        .with_characteristic(config.characteristic_uuid, serial_properties());

    for (id, name, rssi) in [
        ("D1", "HMSoft", -50),
        ("D2", "Weak Sensor", -80),
        ("D3", "HMSoft-2", -60),
    ] {
        controller.add_device(
            SimulatedDevice::new(id, Some(rssi))
                .with_name(name)
                .with_service(service.clone()),
        );
    }
    (adapter, controller)
}

/// Play the remote peripheral's part once the link is ready
pub fn greet(controller: &CentralController, config: &LinkConfig, peripheral: &DeviceId) {
    controller.notify(
        peripheral,
        config.characteristic_uuid,
        config.greeting.as_bytes(),
    );
}

/// Powered-on peripheral adapter
pub fn peripheral() -> (SimulatedPeripheral, PeripheralController) {
    SimulatedPeripheral::new(AdapterState::PoweredOn)
}

/// Script a remote central against the simulated peripheral
pub fn remote_central(controller: PeripheralController, config: &LinkConfig) -> JoinHandle<()> {
    let characteristic = config.characteristic_uuid;
    tokio::spawn(async move {
        let central = CentralId::new("demo-central");

        tokio::time::sleep(Duration::from_millis(500)).await;
        debug!("Demo central subscribing");
        controller.subscribe(central.clone(), characteristic);

        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.write(vec![(
            central.clone(),
            characteristic,
            Some(b"Hello from demo-central".to_vec()),
        )]);
        controller.read(central.clone(), characteristic, 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        debug!("Demo central unsubscribing");
        controller.unsubscribe(central, characteristic);
    })
}
