//! Visualization of Aggregated Battery Data, CEM side
//!
//! Reads power, charged and discharged energy, and state of charge of a
//! remote battery system.
//!
//! | Scenario | Value | Mandatory |
//! |----------|-------|-----------|
//! | 1 | Momentary power | Yes |
//! | 2 | Total charged energy | No |
//! | 3 | Total discharged energy | No |
//! | 4 | State of charge | Yes |

use std::sync::{Arc, Weak};

use tracing::debug;
use ucs_core::lifecycle;
use ucs_core::{
    CapabilityRegistry, ElementChange, EntityEventCallback, EntityLocal, EntityRemote,
    EntityType, EventBus, EventHandler, EventPayload, EventType, FeatureType, FunctionType,
    Result, ScenarioSpec, UseCaseActor, UseCaseDescriptor, UseCaseEvent, UseCaseName,
};

use crate::model::{
    measurement_value, ManufacturerData, MeasurementFilter, MeasurementType, ScopeType,
};
use crate::usecase::{FeatureInterest, UseCaseBase};

/// Supported scenarios of a remote entity changed
pub const USE_CASE_SUPPORT_UPDATE: UseCaseEvent = UseCaseEvent("vabd-UseCaseSupportUpdate");
pub const DATA_UPDATE_POWER: UseCaseEvent = UseCaseEvent("vabd-DataUpdatePower");
pub const DATA_UPDATE_ENERGY_CHARGED: UseCaseEvent = UseCaseEvent("vabd-DataUpdateEnergyCharged");
pub const DATA_UPDATE_ENERGY_DISCHARGED: UseCaseEvent =
    UseCaseEvent("vabd-DataUpdateEnergyDischarged");
pub const DATA_UPDATE_STATE_OF_CHARGE: UseCaseEvent = UseCaseEvent("vabd-DataUpdateStateOfCharge");

const POWER: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Power, ScopeType::AcPowerTotal);
const ENERGY_CHARGED: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Energy, ScopeType::Charge);
const ENERGY_DISCHARGED: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Energy, ScopeType::Discharge);
const STATE_OF_CHARGE: MeasurementFilter =
    MeasurementFilter::electricity(MeasurementType::Percentage, ScopeType::StateOfCharge);

/// Measurement values and the event raised when they change
const MEASUREMENT_EVENTS: [(MeasurementFilter, UseCaseEvent); 4] = [
    (POWER, DATA_UPDATE_POWER),
    (ENERGY_CHARGED, DATA_UPDATE_ENERGY_CHARGED),
    (ENERGY_DISCHARGED, DATA_UPDATE_ENERGY_DISCHARGED),
    (STATE_OF_CHARGE, DATA_UPDATE_STATE_OF_CHARGE),
];

const CLIENT_FEATURES: [FeatureType; 4] = [
    FeatureType::DeviceClassification,
    FeatureType::DeviceConfiguration,
    FeatureType::ElectricalConnection,
    FeatureType::Measurement,
];

const INTERESTS: [FeatureInterest; 2] = [
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
    let servers = [FeatureType::Measurement, FeatureType::ElectricalConnection];

    UseCaseDescriptor::new(
        UseCaseActor::Cem,
        UseCaseName::VisualizationOfAggregatedBatteryData,
        "1.0.1",
        "RC1",
    )
    .with_scenario(ScenarioSpec::new(1).mandatory().with_server_features(servers))
    .with_scenario(ScenarioSpec::new(2).with_server_features(servers))
    .with_scenario(ScenarioSpec::new(3).with_server_features(servers))
    .with_scenario(ScenarioSpec::new(4).mandatory().with_server_features(servers))
    .with_valid_actor_types([UseCaseActor::BatterySystem])
    .with_valid_entity_types([EntityType::BatterySystem])
    .with_update_event(USE_CASE_SUPPORT_UPDATE)
    .with_event_callback(event_callback)
}

pub struct Vabd {
    base: UseCaseBase,
}

impl Vabd {
    /// Create the use case on a local entity and subscribe it to the bus
    pub fn new(
        local_entity: Arc<dyn EntityLocal>,
        event_callback: Option<EntityEventCallback>,
        bus: Arc<dyn EventBus>,
    ) -> Arc<Self> {
        let base = UseCaseBase::new(local_entity, descriptor(event_callback), bus.clone());
        let vabd = Arc::new(Self { base });

        bus.subscribe(Arc::downgrade(&vabd) as Weak<dyn EventHandler>);
        vabd
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        self.base.registry()
    }

    /// Add the client features the use case needs
    pub fn add_features(&self) {
        self.base.add_features(&CLIENT_FEATURES);
    }

    /// Publish the use case on the local entity
    pub fn add_use_case(&self) {
        self.base.registry().register();
    }

    pub fn remove_use_case(&self) {
        self.base.registry().unregister();
    }

    pub fn is_compatible_entity_type(&self, entity: &Arc<dyn EntityRemote>) -> bool {
        self.base.registry().is_compatible_entity_type(Some(entity))
    }

    /// Manufacturer details of a battery system
    pub fn manufacturer_data(&self, entity: &Arc<dyn EntityRemote>) -> Result<ManufacturerData> {
        self.base.manufacturer_data(entity)
    }

    // Scenario 1

    /// Momentary battery power in W
    ///
    /// - positive values are used for discharge
    /// - negative values are used for charge
    pub fn power(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &POWER)
    }

    // Scenario 2

    /// Total energy charged into the battery, in Wh
    pub fn energy_charged(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &ENERGY_CHARGED)
    }

    // Scenario 3

    /// Total energy discharged from the battery, in Wh
    pub fn energy_discharged(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &ENERGY_DISCHARGED)
    }

    // Scenario 4

    /// Battery state of charge in percent
    pub fn state_of_charge(&self, entity: &Arc<dyn EntityRemote>) -> Result<f64> {
        self.measurement(entity, &STATE_OF_CHARGE)
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

    fn handle_data_update(&self, entity: &Arc<dyn EntityRemote>, function: FunctionType) {
        match function {
            FunctionType::MeasurementDescriptionListData => {
                self.base
                    .request(entity, FeatureType::Measurement, FunctionType::MeasurementListData);
            }
            FunctionType::MeasurementListData => {
                for (filter, event) in &MEASUREMENT_EVENTS {
                    if self.measurement(entity, filter).is_ok() {
                        self.base.notify(entity, *event);
                    }
                }
            }
            _ => {}
        }
    }
}

impl EventHandler for Vabd {
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
            debug!("VABD: battery system {:?} connected", entity.key());
            self.base.connect(entity, &INTERESTS);
            return;
        }
        if lifecycle::is_entity_removed(payload) {
            self.base.disconnect(entity);
            return;
        }

        if payload.event_type == EventType::DataChange
            && payload.change_type == ElementChange::Update
        {
            if let Some(function) = payload.function {
                self.handle_data_update(entity, function);
            }
        }
    }
}
