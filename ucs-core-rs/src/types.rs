//! Core types for the use case layer
//!
//! Addresses, model enumerations and the use case support records exchanged
//! with the SPINE node management feature.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation counter assigned by the transport to an outbound request
pub type MsgCounter = u64;

/// Numbered scenario of a use case
pub type ScenarioId = u32;

// ============================================================================
// Addresses
// ============================================================================

/// Address of a device within the SPINE network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(pub String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hierarchical address of an entity within its device, e.g. `[1, 1]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityAddress(pub Vec<u32>);

impl EntityAddress {
    pub fn new(parts: impl Into<Vec<u32>>) -> Self {
        Self(parts.into())
    }
}

impl fmt::Display for EntityAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

/// Canonical structural key of an entity: owning device address plus the
/// entity address within that device.
///
/// Two handles for the same logical entity produce equal keys even when the
/// handles themselves are distinct objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    #[serde(rename = "Device")]
    pub device: DeviceAddress,
    #[serde(rename = "Entity")]
    pub entity: EntityAddress,
}

impl EntityKey {
    pub fn new(device: DeviceAddress, entity: EntityAddress) -> Self {
        Self { device, entity }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.entity)
    }
}

/// Full address of a feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAddress {
    pub device: DeviceAddress,
    pub entity: EntityAddress,
    pub feature: u32,
}

impl FeatureAddress {
    pub fn new(device: DeviceAddress, entity: EntityAddress, feature: u32) -> Self {
        Self { device, entity, feature }
    }

    /// Key of the entity owning this feature
    pub fn entity_key(&self) -> EntityKey {
        EntityKey::new(self.device.clone(), self.entity.clone())
    }
}

impl fmt::Display for FeatureAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.device, self.entity, self.feature)
    }
}

// ============================================================================
// Enumerations
// ============================================================================

/// Actor a use case is offered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UseCaseActor {
    Cem,
    BatterySystem,
    ControllableSystem,
    EnergyGuard,
    GridConnectionPoint,
    MonitoringAppliance,
    MonitoredUnit,
    Inverter,
}

/// Standardized use case names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UseCaseName {
    LimitationOfPowerConsumption,
    LimitationOfPowerProduction,
    MonitoringOfGridConnectionPoint,
    MonitoringOfPowerConsumption,
    VisualizationOfAggregatedBatteryData,
    VisualizationOfAggregatedPhotovoltaicData,
}

/// Entity types a remote device may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityType {
    Battery,
    BatterySystem,
    Cem,
    Compressor,
    DeviceInformation,
    ElectricalImmersionHeater,
    EV,
    EVSE,
    GridConnectionPointOfPremises,
    HeatPumpAppliance,
    Inverter,
    PVSystem,
    SubMeterElectricity,
}

/// Feature types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureType {
    Alarm,
    Bill,
    DeviceClassification,
    DeviceConfiguration,
    DeviceDiagnosis,
    ElectricalConnection,
    LoadControl,
    Measurement,
    NodeManagement,
}

/// Role a feature plays on its entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    Client,
    Server,
    Special,
}

/// Functions exposed by features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionType {
    AlarmListData,
    BillListData,
    DeviceClassificationManufacturerData,
    DeviceConfigurationKeyValueDescriptionListData,
    DeviceConfigurationKeyValueListData,
    ElectricalConnectionDescriptionListData,
    ElectricalConnectionParameterDescriptionListData,
    LoadControlLimitDescriptionListData,
    LoadControlLimitListData,
    MeasurementDescriptionListData,
    MeasurementListData,
    NodeManagementUseCaseData,
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Operations a remote feature declares for one of its functions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operations {
    pub read: bool,
    pub read_partial: bool,
    pub write: bool,
    pub write_partial: bool,
}

impl Operations {
    /// Full read, no partial read, no write
    pub fn read_only() -> Self {
        Self { read: true, ..Default::default() }
    }

    /// Full and partial read
    pub fn read_partial() -> Self {
        Self { read: true, read_partial: true, ..Default::default() }
    }
}

// ============================================================================
// Use case descriptions
// ============================================================================

/// A scenario of a use case and the remote server features it needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSpec {
    pub scenario: ScenarioId,
    pub mandatory: bool,
    pub server_features: Vec<FeatureType>,
}

impl ScenarioSpec {
    pub fn new(scenario: ScenarioId) -> Self {
        Self {
            scenario,
            mandatory: false,
            server_features: Vec::new(),
        }
    }

    /// Mark the scenario as mandatory
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn with_server_features(mut self, features: impl Into<Vec<FeatureType>>) -> Self {
        self.server_features = features.into();
        self
    }
}

/// Filter selecting published use case support by actor and name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseFilter {
    pub actor: UseCaseActor,
    pub use_case_name: UseCaseName,
}

/// Use case support entry as reported by a remote node management feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseSupport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_name: Option<UseCaseName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_case_available: Option<bool>,
    #[serde(default)]
    pub scenario_support: Vec<ScenarioId>,
}

/// All use cases one remote entity reports under one actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCaseInformation {
    /// Entity address within the reporting device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<EntityAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<UseCaseActor>,
    #[serde(default)]
    pub use_case_support: Vec<UseCaseSupport>,
}

/// Tag of the notification a use case raises towards application code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseCaseEvent(pub &'static str);

impl fmt::Display for UseCaseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
