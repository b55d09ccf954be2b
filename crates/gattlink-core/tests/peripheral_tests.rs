//! Peripheral Advertiser Tests
//!
//! Publication on power-on, subscription pushes, write batches, reads and the
//! advertising controls, driven through the simulated peripheral adapter.

use gattlink_core::{
    sim::{
        drain_peripheral, AdapterCall, PeripheralController, RecordingDelegate,
        SimulatedPeripheral,
    },
    AdapterState, AdvertisementData, AttResult, AttributePermissions, CentralId,
    CharacteristicProperties, LinkConfig, LinkError, LinkEvent, PeripheralAdapter,
    PeripheralAdvertiser, PeripheralEvent, PeripheralEventReceiver, PeripheralState,
    DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID,
};
use gattlink_core::protocol::uuid_from_u16;
use tokio::sync::mpsc;

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

struct Harness {
    advertiser: PeripheralAdvertiser<SimulatedPeripheral>,
    events: PeripheralEventReceiver,
    controller: PeripheralController,
    delegate: RecordingDelegate,
}

impl Harness {
    fn new() -> Self {
        Self::build(|advertiser| advertiser)
    }

    fn build(
        customize: impl FnOnce(
            PeripheralAdvertiser<SimulatedPeripheral>,
        ) -> PeripheralAdvertiser<SimulatedPeripheral>,
    ) -> Self {
        let (mut adapter, controller) = SimulatedPeripheral::new(AdapterState::Unknown);
        let (sender, events) = mpsc::unbounded_channel();
        adapter.attach_events(sender).unwrap();
        let delegate = RecordingDelegate::new();
        let advertiser = customize(PeripheralAdvertiser::new(
            LinkConfig::default(),
            adapter,
            Box::new(delegate.clone()),
        ));
        Self {
            advertiser,
            events,
            controller,
            delegate,
        }
    }

    fn powered_on() -> Self {
        let mut harness = Self::new();
        harness.set_state(AdapterState::PoweredOn);
        harness
    }

    fn pump(&mut self) {
        drain_peripheral(&mut self.advertiser, &mut self.events);
    }

    fn set_state(&mut self, state: AdapterState) {
        self.controller.set_state(state);
        self.pump();
    }

    fn subscribe(&mut self, central: &str) {
        self.controller.subscribe(central, DEFAULT_CHARACTERISTIC_UUID);
        self.pump();
    }
}

fn central(id: &str) -> CentralId {
    CentralId::new(id)
}

// ----------------------------------------------------------------------------
// Publication
// ----------------------------------------------------------------------------

#[test]
fn test_power_on_publishes_and_advertises() {
    let harness = Harness::powered_on();

    assert_eq!(
        harness.advertiser.state(),
        PeripheralState::Published { advertising: true }
    );
    assert!(harness.controller.is_advertising());

    let calls = harness.controller.calls();
    let Some(AdapterCall::PublishService(service)) = calls.first() else {
        panic!("expected a publish call first, got {:?}", calls);
    };
    assert_eq!(service.uuid, DEFAULT_SERVICE_UUID);
    assert!(service.primary);
    assert_eq!(service.characteristics.len(), 1);

    let characteristic = &service.characteristics[0];
    assert_eq!(characteristic.uuid, DEFAULT_CHARACTERISTIC_UUID);
    assert_eq!(
        characteristic.properties,
        CharacteristicProperties {
            read: true,
            write: true,
            notify: true,
            ..Default::default()
        }
    );
    assert_eq!(
        characteristic.permissions,
        AttributePermissions {
            readable: true,
            writeable: true
        }
    );

    assert_eq!(
        calls.get(1),
        Some(&AdapterCall::StartAdvertising(AdvertisementData {
            local_name: Some("gattlink".to_string()),
            service_uuids: vec![DEFAULT_SERVICE_UUID],
        }))
    );
}

#[test]
fn test_unpowered_adapter_stays_unpublished() {
    let mut harness = Harness::new();
    harness.set_state(AdapterState::Unsupported);

    assert_eq!(harness.advertiser.state(), PeripheralState::Unpublished);
    assert!(harness.controller.calls().is_empty());
    assert_eq!(
        harness.advertiser.start_advertising(),
        Err(LinkError::AdapterNotReady {
            state: AdapterState::Unsupported
        })
    );
}

#[test]
fn test_power_loss_makes_advertiser_inert() {
    let mut harness = Harness::powered_on();
    harness.subscribe("C1");
    harness.controller.clear_calls();

    harness.set_state(AdapterState::PoweredOff);
    assert_eq!(harness.advertiser.state(), PeripheralState::Unpublished);
    assert!(harness.advertiser.subscribers().is_empty());

    harness.subscribe("C2");
    assert!(harness.controller.updates().is_empty());
    assert!(harness.advertiser.subscribers().is_empty());
}

#[test]
fn test_power_cycle_republishes() {
    let mut harness = Harness::powered_on();
    harness.set_state(AdapterState::Resetting);
    harness.set_state(AdapterState::PoweredOn);

    let publishes = harness
        .controller
        .calls()
        .into_iter()
        .filter(|call| matches!(call, AdapterCall::PublishService(_)))
        .count();
    assert_eq!(publishes, 2);
    assert_eq!(
        harness.advertiser.state(),
        PeripheralState::Published { advertising: true }
    );
}

#[test]
fn test_publish_failure_is_reported() {
    let mut harness = Harness::new();
    harness.controller.set_failing(true);
    harness.set_state(AdapterState::PoweredOn);

    assert_eq!(harness.advertiser.state(), PeripheralState::Unpublished);
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::Platform { .. }]
    ));
}

#[test]
fn test_rejected_service_stops_advertising() {
    let mut harness = Harness::new();
    harness.controller.set_auto_respond(false);
    harness.set_state(AdapterState::PoweredOn);
    assert!(harness.controller.is_advertising());

    harness.controller.emit(PeripheralEvent::ServiceAdded {
        service: DEFAULT_SERVICE_UUID,
        result: Err("duplicate service".to_string()),
    });
    harness.pump();

    assert_eq!(harness.advertiser.state(), PeripheralState::Unpublished);
    assert!(!harness.controller.is_advertising());
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::Platform { .. }]
    ));
}

#[test]
fn test_async_advertising_failure() {
    let mut harness = Harness::powered_on();

    harness.controller.emit(PeripheralEvent::AdvertisingStarted {
        result: Err("too many advertisers".to_string()),
    });
    harness.pump();

    assert_eq!(
        harness.advertiser.state(),
        PeripheralState::Published { advertising: false }
    );
    assert!(matches!(
        harness.delegate.errors().as_slice(),
        [LinkError::Platform { .. }]
    ));
}

#[test]
fn test_stop_and_resume_advertising() {
    let mut harness = Harness::powered_on();
    harness.subscribe("C1");

    harness.advertiser.stop_advertising().unwrap();
    harness.advertiser.stop_advertising().unwrap();
    assert_eq!(
        harness.advertiser.state(),
        PeripheralState::Published { advertising: false }
    );
    assert!(!harness.controller.is_advertising());
    assert_eq!(harness.advertiser.subscribers(), &[central("C1")]);

    harness.advertiser.start_advertising().unwrap();
    assert!(harness.controller.is_advertising());
    assert_eq!(
        harness.advertiser.state(),
        PeripheralState::Published { advertising: true }
    );
}

// ----------------------------------------------------------------------------
// Subscriptions
// ----------------------------------------------------------------------------

#[test]
fn test_subscribe_pushes_greeting_to_subscriber_only() {
    let mut harness = Harness::powered_on();
    harness.subscribe("C1");

    assert_eq!(
        harness.controller.updates(),
        vec![AdapterCall::UpdateValue {
            characteristic: DEFAULT_CHARACTERISTIC_UUID,
            value: b"Hello, World!".to_vec(),
            subscribers: Some(vec![central("C1")]),
        }]
    );
    assert_eq!(harness.advertiser.subscribers(), &[central("C1")]);
    assert!(harness.delegate.events().contains(&LinkEvent::Subscribed {
        central: central("C1")
    }));
}

#[test]
fn test_subscription_to_other_characteristic_is_ignored() {
    let mut harness = Harness::powered_on();
    harness.controller.subscribe("C1", uuid_from_u16(0x2A37));
    harness.pump();

    assert!(harness.controller.updates().is_empty());
    assert!(harness.advertiser.subscribers().is_empty());
}

#[test]
fn test_unsubscribe() {
    let mut harness = Harness::powered_on();
    harness.subscribe("C1");
    harness.subscribe("C2");

    harness.controller.unsubscribe("C1", DEFAULT_CHARACTERISTIC_UUID);
    harness.controller.unsubscribe("C9", DEFAULT_CHARACTERISTIC_UUID);
    harness.pump();

    assert_eq!(harness.advertiser.subscribers(), &[central("C2")]);
    let unsubscribed: Vec<_> = harness
        .delegate
        .events()
        .into_iter()
        .filter(|event| matches!(event, LinkEvent::Unsubscribed { .. }))
        .collect();
    assert_eq!(
        unsubscribed,
        vec![LinkEvent::Unsubscribed {
            central: central("C1")
        }]
    );
}

#[test]
fn test_notify_subscribers() {
    let mut harness = Harness::powered_on();
    assert_eq!(harness.advertiser.notify_subscribers(b"nobody"), Ok(0));
    assert!(harness.controller.updates().is_empty());

    harness.subscribe("C1");
    harness.subscribe("C2");
    harness.controller.clear_calls();

    assert_eq!(harness.advertiser.notify_subscribers(b"broadcast"), Ok(2));
    assert_eq!(
        harness.controller.updates(),
        vec![AdapterCall::UpdateValue {
            characteristic: DEFAULT_CHARACTERISTIC_UUID,
            value: b"broadcast".to_vec(),
            subscribers: None,
        }]
    );
}

#[test]
fn test_notify_requires_publication() {
    let mut harness = Harness::new();
    harness.set_state(AdapterState::PoweredOff);

    assert_eq!(
        harness.advertiser.notify_subscribers(b"x"),
        Err(LinkError::AdapterNotReady {
            state: AdapterState::PoweredOff
        })
    );
}

#[test]
fn test_custom_value_producer() {
    let mut counter = 0u8;
    let mut harness = Harness::build(|advertiser| {
        advertiser.with_value_producer(move || {
            counter += 1;
            vec![counter]
        })
    });
    harness.set_state(AdapterState::PoweredOn);
    harness.subscribe("C1");
    harness.subscribe("C2");

    let values: Vec<Vec<u8>> = harness
        .controller
        .updates()
        .into_iter()
        .filter_map(|call| match call {
            AdapterCall::UpdateValue { value, .. } => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![vec![1], vec![2]]);
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

#[test]
fn test_write_batch_delivers_matching_and_acknowledges_all() {
    let mut harness = Harness::powered_on();
    harness.controller.clear_calls();

    let ids = harness.controller.write(vec![
        (central("C1"), DEFAULT_CHARACTERISTIC_UUID, Some(b"abc".to_vec())),
        (central("C1"), uuid_from_u16(0x2A37), Some(b"zzz".to_vec())),
    ]);
    harness.pump();

    assert_eq!(harness.delegate.received(), vec![b"abc".to_vec()]);
    assert_eq!(
        harness.controller.responses(),
        ids.iter()
            .map(|id| AdapterCall::Respond {
                request: *id,
                result: AttResult::Success,
                value: None,
            })
            .collect::<Vec<_>>()
    );
}

#[test]
fn test_empty_write_is_acknowledged_not_delivered() {
    let mut harness = Harness::powered_on();

    let ids = harness
        .controller
        .write(vec![(central("C1"), DEFAULT_CHARACTERISTIC_UUID, None)]);
    harness.pump();

    assert!(harness.delegate.received().is_empty());
    assert_eq!(harness.controller.responses().len(), ids.len());
}

#[test]
fn test_reads_are_served_from_producer() {
    let mut harness = Harness::powered_on();

    let whole = harness.controller.read("C1", DEFAULT_CHARACTERISTIC_UUID, 0);
    let tail = harness.controller.read("C1", DEFAULT_CHARACTERISTIC_UUID, 7);
    let beyond = harness.controller.read("C1", DEFAULT_CHARACTERISTIC_UUID, 100);
    let other = harness.controller.read("C1", uuid_from_u16(0x2A37), 0);
    harness.pump();

    assert_eq!(
        harness.controller.responses(),
        vec![
            AdapterCall::Respond {
                request: whole,
                result: AttResult::Success,
                value: Some(b"Hello, World!".to_vec()),
            },
            AdapterCall::Respond {
                request: tail,
                result: AttResult::Success,
                value: Some(b"World!".to_vec()),
            },
            AdapterCall::Respond {
                request: beyond,
                result: AttResult::InvalidOffset,
                value: None,
            },
            AdapterCall::Respond {
                request: other,
                result: AttResult::Success,
                value: None,
            },
        ]
    );
}
