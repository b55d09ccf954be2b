//! Central Coordinator Tests
//!
//! Drives the coordinator through the simulated central adapter: scan
//! filtering and ordering, connection lifecycle, discovery failures and
//! adapter power changes.

use gattlink_core::{
    sim::{
        drain_central, AdapterCall, CentralController, RecordingDelegate, SimulatedCentral,
        SimulatedDevice, SimulatedService,
    },
    AdapterState, CentralAdapter, CentralCoordinator, CentralEvent, CentralEventReceiver,
    CentralState, CharacteristicProperties, DeviceId, LinkConfig, LinkError, LinkEvent,
    ServiceHandle, WriteMode, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID,
};
use gattlink_core::protocol::uuid_from_u16;
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

struct Harness {
    coordinator: CentralCoordinator<SimulatedCentral>,
    events: CentralEventReceiver,
    controller: CentralController,
    delegate: RecordingDelegate,
}

impl Harness {
    fn new(config: LinkConfig) -> Self {
        let (mut adapter, controller) = SimulatedCentral::new(AdapterState::Unknown);
        let (sender, events) = mpsc::unbounded_channel();
        adapter.attach_events(sender).unwrap();
        let delegate = RecordingDelegate::new();
        let coordinator = CentralCoordinator::new(config, adapter, Box::new(delegate.clone()));
        Self {
            coordinator,
            events,
            controller,
            delegate,
        }
    }

    fn with_devices(devices: Vec<SimulatedDevice>) -> Self {
        let harness = Self::new(LinkConfig::default());
        for device in devices {
            harness.controller.add_device(device);
        }
        harness
    }

    fn pump(&mut self) {
        drain_central(&mut self.coordinator, &mut self.events);
    }

    fn set_state(&mut self, state: AdapterState) {
        self.controller.set_state(state);
        self.pump();
    }

    fn connect(&mut self, id: &str) {
        self.coordinator.connect(&DeviceId::new(id)).unwrap();
        self.pump();
    }

    fn listed(&self) -> Vec<DeviceId> {
        self.coordinator
            .list_discovered_devices()
            .into_iter()
            .map(|device| device.id)
            .collect()
    }

    fn central_states(&self) -> Vec<CentralState> {
        self.delegate
            .events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::CentralStateChanged(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

fn serial_properties() -> CharacteristicProperties {
    CharacteristicProperties {
        read: true,
        write: true,
        notify: true,
        ..Default::default()
    }
}

fn serial_device(id: &str, rssi: i16) -> SimulatedDevice {
    SimulatedDevice::new(id, Some(rssi))
        .with_name("HMSoft")
        .with_service(
            SimulatedService::new(DEFAULT_SERVICE_UUID)
                .with_characteristic(DEFAULT_CHARACTERISTIC_UUID, serial_properties()),
        )
}

fn ids(ids: &[&str]) -> Vec<DeviceId> {
    ids.iter().map(|id| DeviceId::new(*id)).collect()
}

fn ready_harness() -> Harness {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.connect("D1");
    assert_eq!(harness.coordinator.state(), CentralState::Ready);
    harness
}

// ----------------------------------------------------------------------------
// Scanning
// ----------------------------------------------------------------------------

#[test]
fn test_scan_filters_weak_devices_and_orders_by_signal() {
    let mut harness = Harness::with_devices(vec![
        serial_device("D1", -50),
        serial_device("D2", -80),
        serial_device("D3", -60),
    ]);
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
    assert_eq!(harness.delegate.discovered(), ids(&["D1", "D3"]));
    assert_eq!(harness.listed(), ids(&["D3", "D1"]));
    assert!(harness.controller.is_scanning());
}

#[test]
fn test_threshold_is_strict() {
    let mut harness = Harness::with_devices(vec![
        serial_device("at-threshold", -70),
        serial_device("just-above", -69),
    ]);
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.delegate.discovered(), ids(&["just-above"]));
}

#[test]
fn test_configurable_threshold() {
    let mut harness = Harness::new(LinkConfig::default().with_rssi_threshold(-90));
    harness.controller.add_device(serial_device("far", -85));
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.delegate.discovered(), ids(&["far"]));
}

#[test]
fn test_rediscovery_is_deduplicated() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);

    harness.controller.readvertise(&DeviceId::new("D1"), Some(-40));
    harness.controller.readvertise(&DeviceId::new("D1"), Some(-55));
    harness.pump();

    assert_eq!(harness.delegate.discovered(), ids(&["D1"]));
    let listed = harness.coordinator.list_discovered_devices();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].signal_strength, Some(-50));
}

#[test]
fn test_advertisement_without_rssi_is_dropped() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);

    harness.controller.add_device(SimulatedDevice::new("silent", None));
    harness.controller.readvertise(&DeviceId::new("silent"), None);
    harness.pump();

    assert_eq!(harness.delegate.discovered(), ids(&["D1"]));
}

#[test]
fn test_scan_requires_powered_on() {
    let mut harness = Harness::new(LinkConfig::default());
    harness.set_state(AdapterState::PoweredOff);

    let result = harness.coordinator.start_scan();
    assert_eq!(
        result,
        Err(LinkError::AdapterNotReady {
            state: AdapterState::PoweredOff
        })
    );
    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(!harness
        .controller
        .calls()
        .iter()
        .any(|call| matches!(call, AdapterCall::StartScan(_))));
}

#[test]
fn test_scan_uses_service_filter() {
    let mut harness = Harness::new(LinkConfig::default());
    harness.set_state(AdapterState::PoweredOn);

    let calls = harness.controller.calls();
    assert!(calls.contains(&AdapterCall::StartScan(vec![DEFAULT_SERVICE_UUID])));
    assert!(calls.contains(&AdapterCall::RetrieveConnected(vec![DEFAULT_SERVICE_UUID])));
}

#[test]
fn test_retrieval_failure_keeps_scan_running() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.controller.set_retrieve_failing(true);
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
    assert!(harness.controller.is_scanning());
    assert_eq!(harness.listed(), ids(&["D1"]));
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::Platform { .. }]
    ));

    harness.coordinator.stop_scan().unwrap();
    assert_eq!(harness.coordinator.start_scan(), Ok(()));
    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
}

#[test]
fn test_already_connected_devices_bypass_proximity_gate() {
    let mut harness = Harness::with_devices(vec![
        serial_device("D1", -50),
        serial_device("bonded", -95).already_connected(),
    ]);
    harness.set_state(AdapterState::PoweredOn);

    let retrieved = harness
        .delegate
        .events()
        .into_iter()
        .find_map(|event| match event {
            LinkEvent::DeviceDiscovered {
                device,
                signal_strength,
            } if device.id.as_str() == "bonded" => Some(signal_strength),
            _ => None,
        });
    assert_eq!(retrieved, Some(None));

    // Unknown strength sorts as 0 dBm
    assert_eq!(harness.listed(), ids(&["D1", "bonded"]));
}

#[test]
fn test_stop_scan_is_idempotent_and_keeps_list() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);

    assert!(harness.coordinator.stop_scan().is_ok());
    assert!(harness.coordinator.stop_scan().is_ok());

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(!harness.controller.is_scanning());
    assert_eq!(harness.listed(), ids(&["D1"]));

    // Advertisements after stopping are not recorded
    harness.controller.add_device(serial_device("late", -30));
    harness.controller.readvertise(&DeviceId::new("late"), Some(-30));
    harness.pump();
    assert_eq!(harness.listed(), ids(&["D1"]));
}

#[test]
fn test_new_scan_session_clears_list() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.coordinator.stop_scan().unwrap();

    harness.controller.set_auto_respond(false);
    harness.coordinator.start_scan().unwrap();
    harness.pump();

    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
    assert!(harness.listed().is_empty());
}

// ----------------------------------------------------------------------------
// Connection Lifecycle
// ----------------------------------------------------------------------------

#[test]
fn test_connect_reaches_ready_exactly_once() {
    let mut harness = ready_harness();

    assert_eq!(harness.delegate.established(), ids(&["D1"]));
    assert_eq!(
        harness.central_states(),
        vec![
            CentralState::Scanning,
            CentralState::Connecting,
            CentralState::ServiceDiscovery,
            CentralState::CharacteristicDiscovery,
            CentralState::Ready,
        ]
    );

    let session = harness.coordinator.session().cloned().unwrap();
    assert_eq!(session.peripheral, DeviceId::new("D1"));
    assert_eq!(session.characteristic.uuid, DEFAULT_CHARACTERISTIC_UUID);
    assert_eq!(session.write_mode, WriteMode::WithResponse);
    assert!(harness.coordinator.pending_connection().is_none());

    assert!(harness.controller.calls().contains(&AdapterCall::SetNotify {
        peripheral: DeviceId::new("D1"),
        characteristic: DEFAULT_CHARACTERISTIC_UUID,
        enabled: true,
    }));

    // Late duplicates from the platform do not establish a second time
    harness.controller.emit(CentralEvent::Connected {
        peripheral: DeviceId::new("D1"),
    });
    harness.pump();
    assert_eq!(harness.delegate.established().len(), 1);
}

#[test]
fn test_connect_stops_active_scan() {
    let harness = ready_harness();

    let calls = harness.controller.calls();
    let stop = calls.iter().position(|call| call == &AdapterCall::StopScan);
    let connect = calls
        .iter()
        .position(|call| call == &AdapterCall::Connect(DeviceId::new("D1")));
    assert!(stop.is_some() && connect.is_some());
    assert!(stop < connect);
    assert!(!harness.controller.is_scanning());
}

#[test]
fn test_write_mode_without_response() {
    let unacked = CharacteristicProperties {
        write_without_response: true,
        notify: true,
        ..Default::default()
    };
    let mut harness = Harness::with_devices(vec![SimulatedDevice::new("D1", Some(-40))
        .with_service(
            SimulatedService::new(DEFAULT_SERVICE_UUID)
                .with_characteristic(DEFAULT_CHARACTERISTIC_UUID, unacked),
        )]);
    harness.set_state(AdapterState::PoweredOn);
    harness.connect("D1");

    assert_eq!(
        harness.coordinator.session().map(|s| s.write_mode),
        Some(WriteMode::WithoutResponse)
    );

    harness.coordinator.write(b"ping").unwrap();
    assert!(harness.controller.calls().contains(&AdapterCall::Write {
        peripheral: DeviceId::new("D1"),
        data: b"ping".to_vec(),
        mode: WriteMode::WithoutResponse,
    }));
}

#[test]
fn test_connect_requires_discovered_device() {
    let mut harness = Harness::with_devices(vec![serial_device("D2", -80)]);
    harness.set_state(AdapterState::PoweredOn);

    let result = harness.coordinator.connect(&DeviceId::new("D2"));
    assert_eq!(
        result,
        Err(LinkError::UnknownDevice {
            device: DeviceId::new("D2")
        })
    );
    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
}

#[test]
fn test_single_pending_connection() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50), serial_device("D3", -60)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_auto_respond(false);

    harness.coordinator.connect(&DeviceId::new("D1")).unwrap();
    assert_eq!(harness.coordinator.state(), CentralState::Connecting);

    let second = harness.coordinator.connect(&DeviceId::new("D3"));
    assert_eq!(
        second,
        Err(LinkError::ConnectionInProgress {
            peripheral: DeviceId::new("D1")
        })
    );
    assert_eq!(
        harness.coordinator.pending_connection(),
        Some(&DeviceId::new("D1"))
    );
}

#[test]
fn test_already_connected_rejections() {
    let mut harness = ready_harness();

    assert_eq!(
        harness.coordinator.connect(&DeviceId::new("D1")),
        Err(LinkError::AlreadyConnected {
            peripheral: DeviceId::new("D1")
        })
    );
    assert!(matches!(
        harness.coordinator.start_scan(),
        Err(LinkError::AlreadyConnected { .. })
    ));
}

#[test]
fn test_connect_failure_returns_to_idle() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_auto_respond(false);
    harness.coordinator.connect(&DeviceId::new("D1")).unwrap();

    harness.controller.emit(CentralEvent::ConnectFailed {
        peripheral: DeviceId::new("D1"),
        reason: "timeout".to_string(),
    });
    harness.pump();

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(harness.coordinator.pending_connection().is_none());
    assert_eq!(
        harness.delegate.errors(),
        vec![LinkError::ConnectionFailed {
            peripheral: DeviceId::new("D1"),
            reason: "timeout".to_string(),
        }]
    );
}

#[test]
fn test_reconnect_after_remote_disconnect() {
    let mut harness = ready_harness();

    harness.controller.drop_link(&DeviceId::new("D1"), "supervision timeout");
    harness.pump();

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(harness.coordinator.session().is_none());
    assert!(harness.delegate.events().contains(&LinkEvent::Disconnected {
        peripheral: DeviceId::new("D1")
    }));
    assert!(matches!(
        harness.delegate.errors().last(),
        Some(LinkError::ConnectionLost { .. })
    ));

    // The session list survives, so the same device can be reconnected
    harness.connect("D1");
    assert_eq!(harness.coordinator.state(), CentralState::Ready);
    assert_eq!(harness.delegate.established().len(), 2);
}

#[test]
fn test_local_disconnect() {
    let mut harness = ready_harness();

    harness.coordinator.disconnect().unwrap();
    harness.pump();

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(harness
        .controller
        .calls()
        .contains(&AdapterCall::Disconnect(DeviceId::new("D1"))));
    assert!(harness.delegate.errors().is_empty());
    assert_eq!(harness.coordinator.disconnect(), Err(LinkError::NotConnected));
}

// ----------------------------------------------------------------------------
// Data Exchange
// ----------------------------------------------------------------------------

#[test]
fn test_notifications_surface_as_data() {
    let mut harness = ready_harness();
    let d1 = DeviceId::new("D1");

    harness.controller.notify(&d1, DEFAULT_CHARACTERISTIC_UUID, b"Hello, World!");
    harness.controller.notify(&d1, uuid_from_u16(0x2A37), b"other");
    harness.controller.notify(&DeviceId::new("D9"), DEFAULT_CHARACTERISTIC_UUID, b"stranger");
    harness.pump();

    assert_eq!(harness.delegate.received(), vec![b"Hello, World!".to_vec()]);
}

#[test]
fn test_write_requires_ready() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.coordinator.write(b"x"), Err(LinkError::NotConnected));
    assert_eq!(harness.coordinator.read_rssi(), Err(LinkError::NotConnected));
}

#[test]
fn test_acknowledged_write_and_failure() {
    let mut harness = ready_harness();

    harness.coordinator.write(b"ping").unwrap();
    harness.pump();
    assert!(harness.delegate.errors().is_empty());

    harness.controller.emit(CentralEvent::WriteCompleted {
        peripheral: DeviceId::new("D1"),
        characteristic: DEFAULT_CHARACTERISTIC_UUID,
        result: Err("insufficient authentication".to_string()),
    });
    harness.pump();
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::Platform { .. }]
    ));
}

#[test]
fn test_read_rssi_reports_signal_strength() {
    let mut harness = ready_harness();

    harness.coordinator.read_rssi().unwrap();
    harness.pump();

    assert!(harness.delegate.events().contains(&LinkEvent::SignalStrength {
        peripheral: DeviceId::new("D1"),
        rssi: -50,
    }));
}

// ----------------------------------------------------------------------------
// Discovery Failures
// ----------------------------------------------------------------------------

#[test]
fn test_missing_service_is_reported() {
    let mut harness = Harness::with_devices(vec![SimulatedDevice::new("D1", Some(-40))
        .with_service(SimulatedService::new(uuid_from_u16(0x180D)))]);
    harness.set_state(AdapterState::PoweredOn);

    // Scan filter hides it, so list it through a forced advertisement
    harness.controller.readvertise(&DeviceId::new("D1"), Some(-40));
    harness.pump();
    harness.connect("D1");

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert_eq!(
        harness.delegate.errors(),
        vec![LinkError::NoMatchingService {
            peripheral: DeviceId::new("D1"),
            uuid: DEFAULT_SERVICE_UUID,
        }]
    );
    assert!(harness
        .controller
        .calls()
        .contains(&AdapterCall::Disconnect(DeviceId::new("D1"))));
    assert!(harness.delegate.established().is_empty());
}

#[test]
fn test_missing_characteristic_is_reported() {
    let mut harness = Harness::with_devices(vec![SimulatedDevice::new("D1", Some(-40))
        .with_service(
            SimulatedService::new(DEFAULT_SERVICE_UUID)
                .with_characteristic(uuid_from_u16(0xFFE2), serial_properties()),
        )]);
    harness.set_state(AdapterState::PoweredOn);
    harness.connect("D1");

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert_eq!(
        harness.delegate.errors(),
        vec![LinkError::NoMatchingCharacteristic {
            peripheral: DeviceId::new("D1"),
            uuid: DEFAULT_CHARACTERISTIC_UUID,
        }]
    );
}

#[test]
fn test_discovery_waits_for_every_matching_service() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_auto_respond(false);
    let d1 = DeviceId::new("D1");
    let service = ServiceHandle {
        uuid: DEFAULT_SERVICE_UUID,
        primary: true,
    };

    harness.coordinator.connect(&d1).unwrap();
    harness.controller.emit(CentralEvent::Connected {
        peripheral: d1.clone(),
    });
    harness.controller.emit(CentralEvent::ServicesDiscovered {
        peripheral: d1.clone(),
        result: Ok(vec![service.clone(), service.clone()]),
    });
    harness.controller.emit(CentralEvent::CharacteristicsDiscovered {
        peripheral: d1.clone(),
        service: service.clone(),
        result: Ok(Vec::new()),
    });
    harness.pump();

    // One service answered empty; the other is still outstanding
    assert_eq!(harness.coordinator.state(), CentralState::CharacteristicDiscovery);
    assert!(harness.delegate.errors().is_empty());

    harness.controller.emit(CentralEvent::CharacteristicsDiscovered {
        peripheral: d1,
        service,
        result: Ok(Vec::new()),
    });
    harness.pump();
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::NoMatchingCharacteristic { .. }]
    ));
}

#[test]
fn test_discovery_timeout() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_auto_respond(false);
    let d1 = DeviceId::new("D1");

    harness.coordinator.connect(&d1).unwrap();
    harness.controller.emit(CentralEvent::Connected {
        peripheral: d1.clone(),
    });
    harness.pump();
    assert!(harness.coordinator.state().is_discovering());

    harness.coordinator.discovery_timed_out();

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert_eq!(
        harness.delegate.errors(),
        vec![LinkError::DiscoveryTimeout {
            peripheral: d1.clone(),
            duration_ms: 10_000,
        }]
    );
    assert!(harness.controller.calls().contains(&AdapterCall::Disconnect(d1)));

    // A late timer outside discovery does nothing
    harness.coordinator.discovery_timed_out();
    assert_eq!(harness.delegate.errors().len(), 1);
}

#[test]
fn test_stale_discovery_results_are_ignored() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);

    harness.controller.emit(CentralEvent::ServicesDiscovered {
        peripheral: DeviceId::new("D1"),
        result: Ok(vec![ServiceHandle {
            uuid: DEFAULT_SERVICE_UUID,
            primary: true,
        }]),
    });
    harness.controller.emit(CentralEvent::Connected {
        peripheral: DeviceId::new("D1"),
    });
    harness.pump();

    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
    assert!(harness.delegate.established().is_empty());
}

#[test]
fn test_platform_request_failure_is_synchronous() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_failing(true);

    let result = harness.coordinator.connect(&DeviceId::new("D1"));
    assert!(matches!(result, Err(LinkError::Platform { .. })));
    assert!(harness.coordinator.pending_connection().is_none());
    assert_eq!(harness.coordinator.state(), CentralState::Idle);
}

// ----------------------------------------------------------------------------
// Adapter Power Changes
// ----------------------------------------------------------------------------

#[test]
fn test_power_loss_while_ready_clears_session() {
    let mut harness = ready_harness();

    harness.set_state(AdapterState::PoweredOff);

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(harness.coordinator.session().is_none());
    assert!(harness.coordinator.connected_peripheral().is_none());
    assert!(harness.listed().is_empty());
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::ConnectionLost { .. }]
    ));
    assert!(harness.delegate.events().contains(&LinkEvent::Disconnected {
        peripheral: DeviceId::new("D1")
    }));
}

#[test]
fn test_power_loss_while_connecting_clears_pending() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.controller.set_auto_respond(false);
    harness.coordinator.connect(&DeviceId::new("D1")).unwrap();

    harness.set_state(AdapterState::Resetting);

    assert_eq!(harness.coordinator.state(), CentralState::Idle);
    assert!(harness.coordinator.pending_connection().is_none());

    // A completion for the abandoned attempt is ignored
    harness.controller.emit(CentralEvent::Connected {
        peripheral: DeviceId::new("D1"),
    });
    harness.pump();
    assert_eq!(harness.coordinator.state(), CentralState::Idle);
}

#[test]
fn test_power_cycle_restarts_scan() {
    let mut harness = Harness::with_devices(vec![serial_device("D1", -50)]);
    harness.set_state(AdapterState::PoweredOn);
    harness.set_state(AdapterState::PoweredOff);
    assert!(!harness.controller.is_scanning());
    assert_eq!(harness.coordinator.state(), CentralState::Idle);

    harness.set_state(AdapterState::PoweredOn);
    assert_eq!(harness.coordinator.state(), CentralState::Scanning);
    assert_eq!(harness.delegate.discovered(), ids(&["D1", "D1"]));
    assert_eq!(harness.listed(), ids(&["D1"]));
}

#[test]
fn test_unauthorized_adapter_rejects_connect() {
    let mut harness = Harness::new(LinkConfig::default());
    harness.set_state(AdapterState::Unauthorized);

    assert_eq!(
        harness.coordinator.connect(&DeviceId::new("D1")),
        Err(LinkError::AdapterNotReady {
            state: AdapterState::Unauthorized
        })
    );
}
