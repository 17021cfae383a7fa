//! End-to-end lifecycle of a battery entity across registry, channel and bus

use std::sync::Arc;

use parking_lot::Mutex;
use ucs_core::memory::{MemoryDevice, MemoryEntityLocal};
use ucs_core::*;

type Notification = (String, Option<EntityKey>, UseCaseEvent);

const UPDATE: UseCaseEvent = UseCaseEvent("battery-UseCaseSupportUpdate");

fn battery_registry(
    bus: &Arc<LocalEventBus>,
    local: Arc<MemoryEntityLocal>,
) -> (Arc<CapabilityRegistry>, Arc<Mutex<Vec<Notification>>>) {
    let notifications: Arc<Mutex<Vec<Notification>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = notifications.clone();
    let callback: EntityEventCallback = Arc::new(
        move |ski: &str,
              _device: Option<Arc<dyn DeviceRemote>>,
              entity: Option<Arc<dyn EntityRemote>>,
              event: UseCaseEvent| {
            sink.lock()
                .push((ski.to_string(), entity.and_then(|e| e.key()), event));
        },
    );

    let descriptor = UseCaseDescriptor::new(
        UseCaseActor::Cem,
        UseCaseName::VisualizationOfAggregatedBatteryData,
        "1.0.1",
        "release",
    )
    .with_scenario(ScenarioSpec::new(1).mandatory())
    .with_scenario(ScenarioSpec::new(2))
    .with_scenario(ScenarioSpec::new(3))
    .with_scenario(ScenarioSpec::new(4))
    .with_valid_actor_types([UseCaseActor::BatterySystem])
    .with_valid_entity_types([EntityType::Battery])
    .with_update_event(UPDATE)
    .with_event_callback(Some(callback));

    let registry = CapabilityRegistry::new(local, descriptor, bus.as_ref());
    (registry, notifications)
}

#[test]
fn test_battery_connects_and_disconnects() {
    let bus = LocalEventBus::new();
    let local = MemoryEntityLocal::new("cem", [1]);
    let (registry, notifications) = battery_registry(&bus, local.clone());
    registry.register();
    assert_eq!(local.published_use_cases()[0].scenarios, vec![1, 2, 3, 4]);

    let device = MemoryDevice::new("battery-ski", "battery");
    let entity: Arc<dyn EntityRemote> = device.add_entity([1], EntityType::Battery);

    bus.publish(
        &EventPayload::new(EventType::DeviceChange, ElementChange::Add).with_device(device.clone()),
    );
    bus.publish(
        &EventPayload::new(EventType::EntityChange, ElementChange::Add).with_entity(entity.clone()),
    );
    assert!(registry.is_compatible_entity_type(Some(&entity)));

    registry.update_remote_entity_scenarios(&entity, &[2, 4]);
    assert_eq!(registry.scenarios_for(&entity), vec![2, 4]);
    assert_eq!(notifications.lock().len(), 1);

    bus.publish(
        &EventPayload::new(EventType::DeviceChange, ElementChange::Remove)
            .with_device(device.clone()),
    );

    assert!(registry.remote_entities_scenarios().is_empty());
    let notifications = notifications.lock();
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[1], ("battery-ski".to_string(), None, UPDATE));
}

#[test]
fn test_battery_reported_through_use_case_data() {
    let bus = LocalEventBus::new();
    let local = MemoryEntityLocal::new("cem", [1]);
    let (registry, notifications) = battery_registry(&bus, local);

    let device = MemoryDevice::new("battery-ski", "battery");
    let entity: Arc<dyn EntityRemote> = device.add_entity([1, 1], EntityType::Battery);
    let inverter: Arc<dyn EntityRemote> = device.add_entity([2], EntityType::Inverter);

    let infos: Vec<UseCaseInformation> = serde_json::from_value(serde_json::json!([
        {
            "address": [1, 1],
            "actor": "batterySystem",
            "useCaseSupport": [{
                "useCaseName": "visualizationOfAggregatedBatteryData",
                "useCaseAvailable": true,
                "scenarioSupport": [4, 2]
            }]
        },
        {
            "address": [2],
            "actor": "batterySystem",
            "useCaseSupport": [{
                "useCaseName": "visualizationOfAggregatedBatteryData",
                "scenarioSupport": [1]
            }]
        }
    ]))
    .unwrap();

    bus.publish(
        &EventPayload::new(EventType::DataChange, ElementChange::Update)
            .with_device(device.clone())
            .with_function(FunctionType::NodeManagementUseCaseData)
            .with_data(EventData::UseCaseData(infos)),
    );

    assert_eq!(registry.scenarios_for(&entity), vec![4, 2]);
    assert!(registry.scenarios_for(&inverter).is_empty());
    assert_eq!(notifications.lock().len(), 1);

    // A second handle of the same entity resolves to the same record
    let again = device.entity(&EntityAddress::new([1, 1])).unwrap();
    assert!(registry.is_scenario_available(&again, 2));

    bus.publish(
        &EventPayload::new(EventType::EntityChange, ElementChange::Remove).with_entity(again),
    );
    assert!(registry.remote_entities_scenarios().is_empty());
    assert_eq!(notifications.lock().len(), 2);
}

#[test]
fn test_channel_follows_battery_lifecycle() {
    let bus = LocalEventBus::new();
    let local = MemoryEntityLocal::new("cem", [1]);
    let local_measurement = local.add_feature(FeatureType::Measurement, Role::Client);

    let device = MemoryDevice::new("battery-ski", "battery");
    let battery = device.add_entity([1], EntityType::Battery);
    let remote_measurement = battery.add_feature(FeatureType::Measurement, Role::Server);
    remote_measurement.set_operation(FunctionType::MeasurementListData, Operations::read_only());

    let local_handle: Arc<dyn EntityLocal> = local.clone();
    let remote_handle: Arc<dyn EntityRemote> = battery.clone();
    let channel = FeatureChannel::open(
        FeatureType::Measurement,
        Some(&local_handle),
        Some(&remote_handle),
        bus.as_ref(),
    )
    .unwrap();

    channel.subscribe().unwrap();
    bus.publish(
        &EventPayload::new(EventType::SubscriptionChange, ElementChange::Add).with_data(
            EventData::Subscription(FeatureLink {
                client: local_measurement.address(),
                server: remote_measurement.address(),
            }),
        ),
    );
    assert!(channel.has_subscription());

    let counter = channel
        .request_data(FunctionType::MeasurementListData, None, None)
        .unwrap();
    let answered: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
    let slot = answered.clone();
    channel
        .add_response_callback(counter, move |msg| *slot.lock() = msg.data.clone())
        .unwrap();

    bus.deliver_response(&ResponseMessage {
        msg_counter_reference: counter,
        source: remote_measurement.address(),
        destination: local_measurement.address(),
        function: Some(FunctionType::MeasurementListData),
        data: Some(serde_json::json!({ "measurementData": [] })),
        result: None,
    });
    assert!(answered.lock().is_some());

    bus.publish(
        &EventPayload::new(EventType::EntityChange, ElementChange::Remove)
            .with_entity(remote_handle),
    );
    assert!(!channel.has_subscription());
}
