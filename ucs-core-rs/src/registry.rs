//! Capability registry of a use case
//!
//! Tracks, for one use case instance, which compatible remote entities
//! currently support which scenarios. The table is fed by use case support
//! data reported by remote devices and pruned when entities or devices
//! disconnect. Every change raises a single notification through the
//! descriptor's event callback.
//!
//! The table is a plain list guarded by one lock and scanned linearly; use
//! case tables hold single digits to low tens of entities. Records are keyed
//! by [`EntityKey`], so two handles of the same logical entity map to the same
//! record.
//!
//! The notification callback runs with the lock released and may call any
//! read operation of the registry. Calling back into a write operation
//! (`update_remote_entity_scenarios`, `remove_*`) from the callback is the
//! caller's responsibility and can recurse without bound.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tracing::{debug, info};

use crate::events::{EventBus, EventData, EventHandler, EventPayload};
use crate::lifecycle;
use crate::spine::{DeviceRemote, EntityLocal, EntityRemote};
use crate::types::*;

/// Callback raised towards application code on capability changes:
/// `(ski, device, entity, event)`. `entity` is `None` for device-wide changes.
pub type EntityEventCallback = Arc<
    dyn Fn(&str, Option<Arc<dyn DeviceRemote>>, Option<Arc<dyn EntityRemote>>, UseCaseEvent)
        + Send
        + Sync,
>;

/// Identity and requirements of a use case
#[derive(Clone)]
pub struct UseCaseDescriptor {
    pub actor: UseCaseActor,
    pub name: UseCaseName,
    pub version: String,
    pub sub_version: String,
    pub scenarios: Vec<ScenarioSpec>,
    /// Remote actor types this use case may bind to
    pub valid_actor_types: Vec<UseCaseActor>,
    /// Remote entity types this use case may bind to
    pub valid_entity_types: Vec<EntityType>,
    /// Event tag passed to the callback on capability changes
    pub update_event: UseCaseEvent,
    pub event_callback: Option<EntityEventCallback>,
}

impl UseCaseDescriptor {
    pub fn new(
        actor: UseCaseActor,
        name: UseCaseName,
        version: impl Into<String>,
        sub_version: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            name,
            version: version.into(),
            sub_version: sub_version.into(),
            scenarios: Vec::new(),
            valid_actor_types: Vec::new(),
            valid_entity_types: Vec::new(),
            update_event: UseCaseEvent("UseCaseSupportUpdate"),
            event_callback: None,
        }
    }

    pub fn with_scenario(mut self, scenario: ScenarioSpec) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_valid_actor_types(mut self, actors: impl Into<Vec<UseCaseActor>>) -> Self {
        self.valid_actor_types = actors.into();
        self
    }

    pub fn with_valid_entity_types(mut self, entity_types: impl Into<Vec<EntityType>>) -> Self {
        self.valid_entity_types = entity_types.into();
        self
    }

    pub fn with_update_event(mut self, event: UseCaseEvent) -> Self {
        self.update_event = event;
        self
    }

    pub fn with_event_callback(mut self, callback: Option<EntityEventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    /// Filter addressing this use case in published support data
    pub fn filter(&self) -> UseCaseFilter {
        UseCaseFilter {
            actor: self.actor,
            use_case_name: self.name,
        }
    }

    /// Identifiers of all declared scenarios, in declaration order
    pub fn scenario_ids(&self) -> Vec<ScenarioId> {
        self.scenarios.iter().map(|s| s.scenario).collect()
    }

    /// Remote server features a scenario requires, if the scenario is declared
    pub fn required_server_features(&self, scenario: ScenarioId) -> Option<&[FeatureType]> {
        self.scenarios
            .iter()
            .find(|s| s.scenario == scenario)
            .map(|s| s.server_features.as_slice())
    }
}

impl fmt::Debug for UseCaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseDescriptor")
            .field("actor", &self.actor)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("sub_version", &self.sub_version)
            .field("scenarios", &self.scenarios)
            .field("valid_actor_types", &self.valid_actor_types)
            .field("valid_entity_types", &self.valid_entity_types)
            .field("update_event", &self.update_event)
            .field("event_callback", &self.event_callback.is_some())
            .finish()
    }
}

/// Scenarios one compatible remote entity currently supports
#[derive(Debug, Clone)]
pub struct RemoteEntityScenarios {
    pub entity: Arc<dyn EntityRemote>,
    pub scenarios: Vec<ScenarioId>,
    key: EntityKey,
}

impl RemoteEntityScenarios {
    /// Structural key of the entity
    pub fn key(&self) -> &EntityKey {
        &self.key
    }
}

impl Serialize for RemoteEntityScenarios {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("RemoteEntityScenarios", 2)?;
        state.serialize_field("Entity", &self.key)?;
        state.serialize_field("Scenarios", &self.scenarios)?;
        state.end()
    }
}

/// Per use case table of compatible remote entities and their scenarios
pub struct CapabilityRegistry {
    local_entity: Arc<dyn EntityLocal>,
    descriptor: UseCaseDescriptor,
    table: Mutex<Vec<RemoteEntityScenarios>>,
    registered: Mutex<bool>,
}

impl CapabilityRegistry {
    /// Create the registry and subscribe it to the bus
    pub fn new(
        local_entity: Arc<dyn EntityLocal>,
        descriptor: UseCaseDescriptor,
        bus: &dyn EventBus,
    ) -> Arc<Self> {
        let registry = Arc::new(Self {
            local_entity,
            descriptor,
            table: Mutex::new(Vec::new()),
            registered: Mutex::new(false),
        });

        bus.subscribe(Arc::downgrade(&registry) as Weak<dyn EventHandler>);
        registry
    }

    pub fn descriptor(&self) -> &UseCaseDescriptor {
        &self.descriptor
    }

    pub fn local_entity(&self) -> &Arc<dyn EntityLocal> {
        &self.local_entity
    }

    /// Publish all declared scenarios as supported by the local entity
    ///
    /// Repeated calls publish once until `unregister` is called.
    pub fn register(&self) {
        let mut registered = self.registered.lock();
        if *registered {
            debug!("Registry: {:?} already registered", self.descriptor.name);
            return;
        }

        let scenarios = self.descriptor.scenario_ids();
        self.local_entity.add_use_case_support(
            self.descriptor.actor,
            self.descriptor.name,
            &self.descriptor.version,
            &self.descriptor.sub_version,
            true,
            &scenarios,
        );
        *registered = true;

        info!(
            "Registry: registered {:?} as {:?} with scenarios {:?}",
            self.descriptor.name, self.descriptor.actor, scenarios
        );
    }

    /// Retract published support for this (actor, use case)
    pub fn unregister(&self) {
        let mut registered = self.registered.lock();
        self.local_entity
            .remove_use_case_supports(&[self.descriptor.filter()]);
        *registered = false;

        info!("Registry: unregistered {:?}", self.descriptor.name);
    }

    /// Toggle the coarse availability flag of the published support
    pub fn set_availability(&self, available: bool) {
        self.local_entity
            .set_use_case_availability(self.descriptor.filter(), available);
        debug!(
            "Registry: {:?} availability set to {}",
            self.descriptor.name, available
        );
    }

    /// Admission gate: the entity is present and of a valid entity type
    pub fn is_compatible_entity_type(&self, entity: Option<&Arc<dyn EntityRemote>>) -> bool {
        match entity {
            Some(entity) => self
                .descriptor
                .valid_entity_types
                .contains(&entity.entity_type()),
            None => false,
        }
    }

    /// Snapshot of the current table
    pub fn remote_entities_scenarios(&self) -> Vec<RemoteEntityScenarios> {
        self.table.lock().clone()
    }

    /// Scenarios known for the entity, empty if the entity is not tracked
    pub fn scenarios_for(&self, entity: &Arc<dyn EntityRemote>) -> Vec<ScenarioId> {
        let Some(key) = entity.key() else {
            return Vec::new();
        };

        self.table
            .lock()
            .iter()
            .find(|r| r.key == key)
            .map(|r| r.scenarios.clone())
            .unwrap_or_default()
    }

    pub fn is_scenario_available(
        &self,
        entity: &Arc<dyn EntityRemote>,
        scenario: ScenarioId,
    ) -> bool {
        self.scenarios_for(entity).contains(&scenario)
    }

    /// Set the scenarios a remote entity reports supporting
    ///
    /// Inserts a record for an unseen entity, replaces the scenario set in
    /// place when it differs, and notifies once on either change.
    pub fn update_remote_entity_scenarios(
        &self,
        entity: &Arc<dyn EntityRemote>,
        scenarios: &[ScenarioId],
    ) {
        let Some(key) = entity.key() else {
            debug!("Registry: ignoring scenarios of entity without device address");
            return;
        };

        let mut incoming: Vec<ScenarioId> = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if !incoming.contains(scenario) {
                incoming.push(*scenario);
            }
        }

        let changed = {
            let mut table = self.table.lock();
            match table.iter_mut().find(|r| r.key == key) {
                None => {
                    debug!("Registry: {} added with scenarios {:?}", key, incoming);
                    table.push(RemoteEntityScenarios {
                        entity: entity.clone(),
                        scenarios: incoming,
                        key,
                    });
                    true
                }
                Some(record) if !same_scenarios(&record.scenarios, &incoming) => {
                    debug!(
                        "Registry: {} scenarios {:?} -> {:?}",
                        key, record.scenarios, incoming
                    );
                    record.scenarios = incoming;
                    true
                }
                Some(_) => false,
            }
        };

        if changed {
            self.notify(entity.device(), Some(entity.clone()));
        }
    }

    /// Drop the record of a single entity
    pub fn remove_entity(&self, entity: &Arc<dyn EntityRemote>) {
        let Some(key) = entity.key() else {
            return;
        };

        let removed = {
            let mut table = self.table.lock();
            match table.iter().position(|r| r.key == key) {
                Some(index) => {
                    table.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!("Registry: {} removed", key);
            self.notify(entity.device(), Some(entity.clone()));
        }
    }

    /// Drop every record belonging to a device, notifying once for the device
    pub fn remove_all_entities_of_device(&self, device: &Arc<dyn DeviceRemote>) {
        let Some(address) = device.address() else {
            return;
        };

        let removed = {
            let mut table = self.table.lock();
            let indices: Vec<usize> = table
                .iter()
                .enumerate()
                .filter(|(_, r)| r.key.device == address)
                .map(|(i, _)| i)
                .collect();

            for index in indices.iter().rev() {
                table.remove(*index);
            }
            indices.len()
        };

        if removed > 0 {
            debug!("Registry: {} entities of device {} removed", removed, address);
            self.notify(device.clone(), None);
        }
    }

    /// Fold a device's reported use case support into the table
    fn apply_use_case_data(&self, device: &Arc<dyn DeviceRemote>, infos: &[UseCaseInformation]) {
        for info in infos {
            let Some(actor) = info.actor else { continue };
            if !self.descriptor.valid_actor_types.contains(&actor) {
                continue;
            }
            let Some(address) = &info.address else { continue };

            for support in &info.use_case_support {
                if support.use_case_name != Some(self.descriptor.name) {
                    continue;
                }
                if support.use_case_available == Some(false) {
                    debug!(
                        "Registry: {:?} reported unavailable at {}",
                        self.descriptor.name, address
                    );
                    continue;
                }

                let entity = device.entity(address);
                if !self.is_compatible_entity_type(entity.as_ref()) {
                    continue;
                }
                let Some(entity) = entity else { continue };

                let scenarios: Vec<ScenarioId> = support
                    .scenario_support
                    .iter()
                    .copied()
                    .filter(|s| self.has_required_server_features(&entity, *s))
                    .collect();

                self.update_remote_entity_scenarios(&entity, &scenarios);
            }
        }
    }

    /// Undeclared scenarios carry no requirements
    fn has_required_server_features(
        &self,
        entity: &Arc<dyn EntityRemote>,
        scenario: ScenarioId,
    ) -> bool {
        match self.descriptor.required_server_features(scenario) {
            Some(features) => features
                .iter()
                .all(|f| entity.feature_of_type_and_role(*f, Role::Server).is_some()),
            None => true,
        }
    }

    fn notify(&self, device: Arc<dyn DeviceRemote>, entity: Option<Arc<dyn EntityRemote>>) {
        if let Some(callback) = &self.descriptor.event_callback {
            let ski = device.ski();
            callback(&ski, Some(device), entity, self.descriptor.update_event);
        }
    }
}

impl EventHandler for CapabilityRegistry {
    fn handle_event(&self, payload: &EventPayload) {
        if lifecycle::is_device_disconnected(payload) {
            if let Some(device) = &payload.device {
                self.remove_all_entities_of_device(device);
            }
            return;
        }

        if lifecycle::is_entity_removed(payload) {
            if let Some(entity) = &payload.entity {
                self.remove_entity(entity);
            }
            return;
        }

        if lifecycle::is_use_case_data_update(payload) {
            if let (Some(device), Some(EventData::UseCaseData(infos))) =
                (&payload.device, &payload.data)
            {
                self.apply_use_case_data(device, infos);
            }
        }
    }
}

/// Order-independent comparison of two scenario lists
fn same_scenarios(a: &[ScenarioId], b: &[ScenarioId]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ElementChange, EventType, LocalEventBus};
    use crate::memory::{MemoryDevice, MemoryEntityLocal};

    type Notification = (String, Option<EntityKey>, &'static str);

    struct Fixture {
        bus: Arc<LocalEventBus>,
        local: Arc<MemoryEntityLocal>,
        registry: Arc<CapabilityRegistry>,
        notifications: Arc<Mutex<Vec<Notification>>>,
    }

    fn fixture() -> Fixture {
        let bus = LocalEventBus::new();
        let local = MemoryEntityLocal::new("local", [1]);
        let notifications: Arc<Mutex<Vec<Notification>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = notifications.clone();
        let callback: EntityEventCallback = Arc::new(
            move |ski: &str,
                  _device: Option<Arc<dyn DeviceRemote>>,
                  entity: Option<Arc<dyn EntityRemote>>,
                  event: UseCaseEvent| {
                sink.lock()
                    .push((ski.to_string(), entity.and_then(|e| e.key()), event.0));
            },
        );

        let descriptor = UseCaseDescriptor::new(
            UseCaseActor::Cem,
            UseCaseName::VisualizationOfAggregatedBatteryData,
            "1.0.1",
            "RC1",
        )
        .with_scenario(
            ScenarioSpec::new(1)
                .mandatory()
                .with_server_features([FeatureType::Measurement]),
        )
        .with_scenario(ScenarioSpec::new(2).with_server_features([FeatureType::Measurement]))
        .with_scenario(ScenarioSpec::new(3))
        .with_scenario(
            ScenarioSpec::new(4)
                .mandatory()
                .with_server_features([FeatureType::ElectricalConnection]),
        )
        .with_valid_actor_types([UseCaseActor::BatterySystem])
        .with_valid_entity_types([EntityType::BatterySystem])
        .with_update_event(UseCaseEvent("vabd-UseCaseSupportUpdate"))
        .with_event_callback(Some(callback));

        let registry = CapabilityRegistry::new(local.clone(), descriptor, bus.as_ref());

        Fixture {
            bus,
            local,
            registry,
            notifications,
        }
    }

    fn battery(device: &Arc<MemoryDevice>, address: &[u32]) -> Arc<dyn EntityRemote> {
        device.add_entity(address.to_vec(), EntityType::BatterySystem)
    }

    #[test]
    fn test_register_publishes_once() {
        let f = fixture();
        f.registry.register();
        f.registry.register();

        let published = f.local.published_use_cases();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].scenarios, vec![1, 2, 3, 4]);
        assert!(published[0].available);
        assert_eq!(published[0].version, "1.0.1");
        assert_eq!(published[0].sub_version, "RC1");

        f.registry.set_availability(false);
        assert!(!f.local.published_use_cases()[0].available);

        f.registry.unregister();
        assert!(f.local.published_use_cases().is_empty());

        f.registry.register();
        assert_eq!(f.local.published_use_cases().len(), 1);
    }

    #[test]
    fn test_is_compatible_entity_type() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);
        let ev: Arc<dyn EntityRemote> = device.add_entity([2], EntityType::EV);

        assert!(!f.registry.is_compatible_entity_type(None));
        assert!(f.registry.is_compatible_entity_type(Some(&entity)));
        assert!(!f.registry.is_compatible_entity_type(Some(&ev)));
    }

    #[test]
    fn test_unknown_entity_has_no_scenarios() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);

        assert!(f.registry.scenarios_for(&entity).is_empty());
        assert!(!f.registry.is_scenario_available(&entity, 1));
    }

    #[test]
    fn test_update_is_idempotent() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1, 1]);

        f.registry.update_remote_entity_scenarios(&entity, &[1, 2, 3]);
        f.registry.update_remote_entity_scenarios(&entity, &[1, 2, 3]);

        let table = f.registry.remote_entities_scenarios();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].scenarios, vec![1, 2, 3]);
        assert_eq!(f.notifications.lock().len(), 1);

        let (ski, key, event) = f.notifications.lock()[0].clone();
        assert_eq!(ski, "ski");
        assert_eq!(key, entity.key());
        assert_eq!(event, "vabd-UseCaseSupportUpdate");
    }

    #[test]
    fn test_update_matches_structural_address() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let first = battery(&device, &[1]);

        // A second handle for the same logical entity
        let other_device = MemoryDevice::new("ski", "remote");
        let second = battery(&other_device, &[1]);

        f.registry.update_remote_entity_scenarios(&first, &[1]);
        f.registry.update_remote_entity_scenarios(&second, &[1]);

        assert_eq!(f.registry.remote_entities_scenarios().len(), 1);
        assert_eq!(f.registry.scenarios_for(&second), vec![1]);
        assert_eq!(f.notifications.lock().len(), 1);
    }

    #[test]
    fn test_update_order_independent_and_in_place() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let a = battery(&device, &[1]);
        let b = battery(&device, &[2]);

        f.registry.update_remote_entity_scenarios(&a, &[1, 2]);
        f.registry.update_remote_entity_scenarios(&b, &[3]);
        f.registry.update_remote_entity_scenarios(&a, &[2, 1]);
        assert_eq!(f.notifications.lock().len(), 2);

        f.registry.update_remote_entity_scenarios(&a, &[4]);
        assert_eq!(f.notifications.lock().len(), 3);

        let table = f.registry.remote_entities_scenarios();
        assert_eq!(table[0].key(), &a.key().unwrap());
        assert_eq!(table[0].scenarios, vec![4]);
        assert_eq!(table[1].scenarios, vec![3]);
    }

    #[test]
    fn test_update_drops_duplicate_scenarios() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);

        f.registry.update_remote_entity_scenarios(&entity, &[2, 2, 4]);
        assert_eq!(f.registry.scenarios_for(&entity), vec![2, 4]);
    }

    #[test]
    fn test_entity_without_device_address_is_ignored() {
        let f = fixture();
        let device = MemoryDevice::without_address("ski");
        let entity = battery(&device, &[1]);

        f.registry.update_remote_entity_scenarios(&entity, &[1]);
        assert!(f.registry.remote_entities_scenarios().is_empty());
        assert!(f.notifications.lock().is_empty());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);

        f.registry.update_remote_entity_scenarios(&entity, &[1]);
        let snapshot = f.registry.remote_entities_scenarios();
        f.registry.remove_entity(&entity);

        assert_eq!(snapshot.len(), 1);
        assert!(f.registry.remote_entities_scenarios().is_empty());
    }

    #[test]
    fn test_concurrent_reads_during_updates() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entities: Vec<Arc<dyn EntityRemote>> =
            (1..=4).map(|address| battery(&device, &[address])).collect();
        let other = MemoryDevice::new("other-ski", "other");
        let removed = battery(&other, &[1]);
        let registry = &f.registry;
        let bus = &f.bus;

        std::thread::scope(|scope| {
            for entity in &entities {
                scope.spawn(move || {
                    for round in 0..50 {
                        registry.update_remote_entity_scenarios(entity, &[1, 2]);
                        if round % 2 == 0 {
                            registry.remove_entity(entity);
                        }
                    }
                    registry.update_remote_entity_scenarios(entity, &[2, 1]);
                });
            }

            let removed = removed.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    registry.update_remote_entity_scenarios(&removed, &[1]);
                    bus.publish(
                        &EventPayload::new(EventType::EntityChange, ElementChange::Remove)
                            .with_entity(removed.clone()),
                    );
                }
            });

            for _ in 0..2 {
                scope.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = registry.remote_entities_scenarios();
                        let mut keys: Vec<_> = snapshot.iter().map(|r| r.key.clone()).collect();
                        keys.sort_by_key(|k| k.to_string());
                        keys.dedup();
                        assert_eq!(keys.len(), snapshot.len());
                        assert!(snapshot.iter().all(|r| r.scenarios.len() <= 2));
                    }
                });
            }
        });

        let table = f.registry.remote_entities_scenarios();
        assert_eq!(table.len(), 4);
        for entity in &entities {
            let mut scenarios = f.registry.scenarios_for(entity);
            scenarios.sort_unstable();
            assert_eq!(scenarios, vec![1, 2]);
        }
        assert!(f.registry.scenarios_for(&removed).is_empty());
    }

    #[test]
    fn test_remove_unknown_entity_is_noop() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);

        f.registry.remove_entity(&entity);
        assert!(f.notifications.lock().is_empty());
    }

    #[test]
    fn test_remove_all_entities_of_device() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let other = MemoryDevice::new("other-ski", "other");
        for address in [[1u32], [2], [3]] {
            let entity = battery(&device, &address);
            f.registry.update_remote_entity_scenarios(&entity, &[1]);
        }
        let kept = battery(&other, &[1]);
        f.registry.update_remote_entity_scenarios(&kept, &[2]);
        f.notifications.lock().clear();

        let handle: Arc<dyn DeviceRemote> = device.clone();
        f.registry.remove_all_entities_of_device(&handle);

        let table = f.registry.remote_entities_scenarios();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].key(), &kept.key().unwrap());

        let notifications = f.notifications.lock().clone();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "ski");
        assert_eq!(notifications[0].1, None);

        // Nothing left for the device: no further notification
        f.registry.remove_all_entities_of_device(&handle);
        assert_eq!(f.notifications.lock().len(), 1);
    }

    #[test]
    fn test_use_case_data_event() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = device.add_entity([1], EntityType::BatterySystem);
        entity.add_feature(FeatureType::Measurement, Role::Server);

        let infos = vec![UseCaseInformation {
            address: Some(EntityAddress::new([1])),
            actor: Some(UseCaseActor::BatterySystem),
            use_case_support: vec![UseCaseSupport {
                use_case_name: Some(UseCaseName::VisualizationOfAggregatedBatteryData),
                use_case_version: Some("1.0.1".to_string()),
                use_case_available: Some(true),
                scenario_support: vec![1, 2, 4, 9],
            }],
        }];
        f.bus.publish(
            &EventPayload::new(EventType::DataChange, ElementChange::Update)
                .with_device(device.clone())
                .with_data(EventData::UseCaseData(infos)),
        );

        // Scenario 4 needs an ElectricalConnection server the entity lacks
        let handle: Arc<dyn EntityRemote> = entity.clone();
        assert_eq!(f.registry.scenarios_for(&handle), vec![1, 2, 9]);
        assert_eq!(f.notifications.lock().len(), 1);
    }

    #[test]
    fn test_use_case_data_for_other_actor_is_ignored() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        device.add_entity([1], EntityType::BatterySystem);

        let infos = vec![UseCaseInformation {
            address: Some(EntityAddress::new([1])),
            actor: Some(UseCaseActor::Inverter),
            use_case_support: vec![UseCaseSupport {
                use_case_name: Some(UseCaseName::VisualizationOfAggregatedBatteryData),
                scenario_support: vec![3],
                ..Default::default()
            }],
        }];
        f.bus.publish(
            &EventPayload::new(EventType::DataChange, ElementChange::Update)
                .with_device(device.clone())
                .with_data(EventData::UseCaseData(infos)),
        );

        assert!(f.registry.remote_entities_scenarios().is_empty());
    }

    #[test]
    fn test_entity_removed_event() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);
        f.registry.update_remote_entity_scenarios(&entity, &[3]);

        f.bus.publish(
            &EventPayload::new(EventType::EntityChange, ElementChange::Remove)
                .with_entity(entity.clone()),
        );

        assert!(f.registry.remote_entities_scenarios().is_empty());
        let notifications = f.notifications.lock().clone();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[1].1, entity.key());
    }

    #[test]
    fn test_callback_may_read_registry() {
        let bus = LocalEventBus::new();
        let local = MemoryEntityLocal::new("local", [1]);
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Weak<CapabilityRegistry>>>> = Arc::new(Mutex::new(None));

        let (sink, reader) = (seen.clone(), slot.clone());
        let callback: EntityEventCallback = Arc::new(
            move |_: &str,
                  _: Option<Arc<dyn DeviceRemote>>,
                  _: Option<Arc<dyn EntityRemote>>,
                  _: UseCaseEvent| {
                let registry = reader.lock().as_ref().and_then(|w| w.upgrade());
                if let Some(registry) = registry {
                    sink.lock().push(registry.remote_entities_scenarios().len());
                }
            },
        );

        let descriptor = UseCaseDescriptor::new(
            UseCaseActor::Cem,
            UseCaseName::VisualizationOfAggregatedBatteryData,
            "1.0.1",
            "RC1",
        )
        .with_valid_entity_types([EntityType::BatterySystem])
        .with_event_callback(Some(callback));
        let registry = CapabilityRegistry::new(local, descriptor, bus.as_ref());
        *slot.lock() = Some(Arc::downgrade(&registry));

        let device = MemoryDevice::new("ski", "remote");
        let entity = battery(&device, &[1]);
        registry.update_remote_entity_scenarios(&entity, &[1]);

        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn test_serialize_record() {
        let f = fixture();
        let device = MemoryDevice::new("ski", "test");
        let entity = battery(&device, &[1, 1]);
        f.registry.update_remote_entity_scenarios(&entity, &[1, 2, 3]);

        let table = f.registry.remote_entities_scenarios();
        let json = serde_json::to_string(&table[0]).unwrap();
        assert_eq!(
            json,
            r#"{"Entity":{"Device":"test","Entity":[1,1]},"Scenarios":[1,2,3]}"#
        );
    }
}
