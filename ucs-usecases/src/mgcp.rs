//! Monitoring of Grid Connection Point, monitoring appliance side
//!
//! | Scenario | Value | Feature |
//! |----------|-------|---------|
//! | 1 | Power limitation factor | DeviceConfiguration |
//! | 2 | Momentary power | Measurement |
//! | 3 | Total feed-in energy | Measurement |
//! | 4 | Total consumed energy | Measurement |
//! | 5 | Current per phase | Measurement |
//! | 6 | Voltage per phase | Measurement |
//! | 7 | Frequency | Measurement |

use std::sync::{Arc, Weak};

use tracing::debug;
use ucs_core::lifecycle;
use ucs_core::{
    CapabilityRegistry, ElementChange, EntityEventCallback, EntityLocal, EntityRemote,
    EntityType, EventBus, EventHandler, EventPayload, EventType, FeatureType, FunctionType,
    Result, ScenarioSpec, UseCaseActor, UseCaseDescriptor, UseCaseError, UseCaseEvent,
    UseCaseName,
};

use crate::model::{
    key_value_number, measurement_value, measurement_values, KeyName, ManufacturerData,
    MeasurementFilter, MeasurementType, ScopeType,
};
use crate::usecase::{FeatureInterest, UseCaseBase};

pub const USE_CASE_SUPPORT_UPDATE: UseCaseEvent = UseCaseEvent("mgcp-UseCaseSupportUpdate");
pub const DATA_UPDATE_POWER_LIMITATION_FACTOR: UseCaseEvent =
    UseCaseEvent("mgcp-DataUpdatePowerLimitationFactor");
pub const DATA_UPDATE_POWER: UseCaseEvent = UseCaseEvent("mgcp-DataUpdatePower");
pub const DATA_UPDATE_ENERGY_FEED_IN: UseCaseEvent = UseCaseEvent("mgcp-DataUpdateEnergyFeedIn");
pub const DATA_UPDATE_ENERGY_CONSUMED: UseCaseEvent = UseCaseEvent("mgcp-DataUpdateEnergyConsumed");
pub const DATA_UPDATE_CURRENT_PER_PHASE: UseCaseEvent =
    UseCaseEvent("mgcp-DataUpdateCurrentPerPhase");
pub const DATA_UPDATE_VOLTAGE_PER_PHASE: UseCaseEvent =
    UseCaseEvent("mgcp-DataUpdateVoltagePerPhase");
pub const DATA_UPDATE_FREQUENCY: UseCaseEvent = UseCaseEvent("mgcp-DataUpdateFrequency");

const POWER: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Power, ScopeType::AcPowerTotal);
const ENERGY_FEED_IN: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Energy, ScopeType::GridFeedIn);
const ENERGY_CONSUMED: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Energy, ScopeType::GridConsumption);
const CURRENT_PER_PHASE: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Current, ScopeType::AcCurrent);
const VOLTAGE_PER_PHASE: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Voltage, ScopeType::AcVoltage);
const FREQUENCY: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Frequency, ScopeType::AcFrequency);

const CLIENT_FEATURES: [FeatureType; 4] = [
    FeatureType::DeviceClassification,
    FeatureType::DeviceConfiguration,
    FeatureType::ElectricalConnection,
    FeatureType::Measurement,
];

const INTERESTS: [FeatureInterest; 3] = [
    FeatureInterest {
        feature_type: FeatureType::DeviceConfiguration,
        description: Some(FunctionType::DeviceConfigurationKeyValueDescriptionListData),
    },
    FeatureInterest {
        feature_type: FeatureType::ElectricalConnection,
        description: Some(FunctionType::ElectricalConnectionDescriptionListData),
    },
    FeatureInterest {
        feature_type: FeatureType::Measurement,
        description: Some(FunctionType::MeasurementDescriptionListData),
    },
];

/// Descriptor of the use case
pub fn descriptor(event_callback: Option<EntityEventCallback>) -> UseCaseDescriptor {
    let measurement = [FeatureType::Measurement];
    let phases = [FeatureType::ElectricalConnection, FeatureType::Measurement];

    UseCaseDescriptor::new(
        UseCaseActor::MonitoringAppliance,
        UseCaseName::MonitoringOfGridConnectionPoint,
        "1.0.0",
        "RC5",
    )
    .with_scenario(ScenarioSpec::new(1).with_server_features([FeatureType::DeviceConfiguration]))
    .with_scenario(ScenarioSpec::new(2).mandatory().with_server_features(phases))
    .with_scenario(ScenarioSpec::new(3).mandatory().with_server_features(measurement))
    .with_scenario(ScenarioSpec::new(4).mandatory().with_server_features(measurement))
    .with_scenario(ScenarioSpec::new(5).with_server_features(phases))
    .with_scenario(ScenarioSpec::new(6).with_server_features(phases))
    .with_scenario(ScenarioSpec::new(7).with_server_features(measurement))
    .with_valid_actor_types([UseCaseActor::GridConnectionPoint])
    .with_valid_entity_types([EntityType::GridConnectionPointOfPremises])
    .with_update_event(USE_CASE_SUPPORT_UPDATE)
    .with_event_callback(event_callback)
}

pub struct Mgcp {
    base: UseCaseBase,
}

impl Mgcp {
    pub fn new(
        local_entity: Arc<dyn EntityLocal>,
        event_callback: Option<EntityEventCallback>,
        bus: Arc<dyn EventBus>,
    ) -> Arc<Self> {
        let base = UseCaseBase::new(local_entity, descriptor(event_callback), bus.clone());
        let mgcp = Arc::new(Self { base });

        bus.subscribe(Arc::downgrade(&mgcp) as Weak<dyn EventHandler>);
        mgcp
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.base.registry()
    }

    pub fn add_features(&self) {
        self.base.add_features(&CLIENT_FEATURES);
    }

    pub fn add_use_case(&self) {
        self.base.registry().register();
    }

    pub fn remove_use_case(&self) {
        self.base.registry().unregister();
    }

    pub fn is_compatible_entity_type(&self, entity: &Arc<dyn EntityRemote>) -> bool {
        self.base.registry().is_compatible_entity_type(Some(entity))
    }

    pub fn manufacturer_data(&self, entity: &Arc<dyn EntityRemote>) -> Result<ManufacturerData> {
        self.base.manufacturer_data(entity)
    }

    // Scenario 1

    /// Current PV curtailment limit factor
    pub fn power_limitation_factor(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.base.ensure_compatible(entity)?;
        let channel = self.base.channel(entity, FeatureType::DeviceConfiguration)?;
        key_value_number(&channel, KeyName::PvCurtailmentLimitFactor)
    }

    // Scenario 2

    /// Momentary power at the grid connection point in W
    ///
    /// - positive values are used for consumption
    /// - negative values are used for production
    pub fn power(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.base.ensure_compatible(entity)?;
        let channel = self.base.channel(entity, FeatureType::Measurement)?;

        match measurement_values(&channel, &POWER)?.as_slice() {
            [value] => Ok(*value),
            _ => Err(UseCaseError::DataNotAvailable),
        }
    }

    // Scenario 3

    /// Total energy fed into the grid in Wh
    pub fn energy_feed_in(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &ENERGY_FEED_IN)
    }

    // Scenario 4

    /// Total energy consumed from the grid in Wh
    pub fn energy_consumed(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &ENERGY_CONSUMED)
    }

    // Scenario 5

    /// Current per phase at the grid connection point in A
    pub fn current_per_phase(&self, entity: &Arc<dyn EntityRemote>) -> Result<Vec<f64>> {
        self.phases(entity, &CURRENT_PER_PHASE)
    }

    // Scenario 6

    /// Voltage per phase at the grid connection point in V
    pub fn voltage_per_phase(&self, entity: &Arc<dyn EntityRemote>) -> Result<Vec<f64>> {
        self.phases(entity, &VOLTAGE_PER_PHASE)
    }

    // Scenario 7

    /// Grid frequency in Hz
    pub fn frequency(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &FREQUENCY)
    }

    fn measurement(
        &self,
        entity: &Arc<dyn EntityRemote>,
        filter: &MeasurementFilter,
    ) -> Result<f64> {
        self.base.ensure_compatible(entity)?;
        let channel = self.base.channel(entity, FeatureType::Measurement)?;
        measurement_value(&channel, filter)
    }

    fn phases(
        &self,
        entity: &Arc<dyn EntityRemote>,
        filter: &MeasurementFilter,
    ) -> Result<Vec<f64>> {
        self.base.ensure_compatible(entity)?;
        let channel = self.base.channel(entity, FeatureType::Measurement)?;
        measurement_values(&channel, filter)
    }

    fn handle_data_update(&self, entity: &Arc<dyn EntityRemote>, function: FunctionType) {
        match function {
            FunctionType::DeviceConfigurationKeyValueDescriptionListData => {
                self.base.request(
                    entity,
                    FeatureType::DeviceConfiguration,
                    FunctionType::DeviceConfigurationKeyValueListData,
                );
            }
            FunctionType::DeviceConfigurationKeyValueListData => {
                if self.power_limitation_factor(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_POWER_LIMITATION_FACTOR);
                }
            }
            FunctionType::MeasurementDescriptionListData => {
                self.base
                    .request(entity, FeatureType::Measurement, FunctionType::MeasurementListData);
            }
            FunctionType::MeasurementListData => {
                if self.power(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_POWER);
                }
                if self.energy_feed_in(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_ENERGY_FEED_IN);
                }
                if self.energy_consumed(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_ENERGY_CONSUMED);
                }
                if self.current_per_phase(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_CURRENT_PER_PHASE);
                }
                if self.voltage_per_phase(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_VOLTAGE_PER_PHASE);
                }
                if self.frequency(entity).is_ok() {
                    self.base.notify(entity, DATA_UPDATE_FREQUENCY);
                }
            }
            _ => {}
        }
    }
}

impl EventHandler for Mgcp {
    fn handle_event(&self, payload: &EventPayload) {
        if lifecycle::is_device_disconnected(payload) {
            if let Some(device) = &payload.device {
                self.base.disconnect_device(device);
            }
            return;
        }

        let Some(entity) = &payload.entity else {
            return;
        };
        if !self.is_compatible_entity_type(entity) {
            return;
        }

        if lifecycle::is_entity_added(payload) {
            debug!("MGCP: grid connection point {:?} connected", entity.key());
            self.base.connect(entity, &INTERESTS);
        } else if lifecycle::is_entity_removed(payload) {
            self.base.disconnect(entity);
        } else if payload.event_type == EventType::DataChange
            && payload.change_type == ElementChange::Update
        {
            if let Some(function) = payload.function {
                self.handle_data_update(entity, function);
            }
        }
    }
}
