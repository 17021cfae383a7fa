//! Typed function data read by the use cases
//!
//! Only the fields the use cases evaluate are modelled. Unknown enumeration
//! values decode to `Other` so that one unfamiliar entry does not spoil a
//! whole list.

use serde::{Deserialize, Serialize};
use ucs_core::{FeatureChannel, FunctionType, Result, UseCaseError};

/// SPINE scaled number: `number * 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledNumber {
    pub number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<i8>,
}

impl ScaledNumber {
    pub fn new(number: i64, scale: i8) -> Self {
        Self { number, scale: Some(scale) }
    }

    pub fn value(&self) -> f64 {
        self.number as f64 * 10f64.powi(self.scale.unwrap_or(0) as i32)
    }
}

// ============================================================================
// Measurement
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementType {
    Current,
    Energy,
    Frequency,
    Percentage,
    Power,
    Voltage,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommodityType {
    Electricity,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScopeType {
    AcCurrent,
    AcFrequency,
    AcPowerTotal,
    AcVoltage,
    Charge,
    Discharge,
    GridConsumption,
    GridFeedIn,
    StateOfCharge,
    #[serde(other)]
    Other,
}

/// Validity of a measured value; only `Normal` values are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementValueState {
    Normal,
    OutOfRange,
    Error,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementDescription {
    pub measurement_id: Option<u32>,
    pub measurement_type: Option<MeasurementType>,
    pub commodity_type: Option<CommodityType>,
    pub scope_type: Option<ScopeType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementDescriptionListData {
    #[serde(default)]
    pub measurement_description_data: Vec<MeasurementDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementData {
    pub measurement_id: Option<u32>,
    pub value: Option<ScaledNumber>,
    pub value_state: Option<MeasurementValueState>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementListData {
    #[serde(default)]
    pub measurement_data: Vec<MeasurementData>,
}

/// Selects measurement descriptions by type, commodity and scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeasurementFilter {
    pub measurement_type: MeasurementType,
    pub commodity_type: CommodityType,
    pub scope_type: ScopeType,
}

impl MeasurementFilter {
    pub const fn electricity(measurement_type: MeasurementType, scope_type: ScopeType) -> Self {
        Self {
            measurement_type,
            commodity_type: CommodityType::Electricity,
            scope_type,
        }
    }

    pub fn matches(&self, description: &MeasurementDescription) -> bool {
        description.measurement_type == Some(self.measurement_type)
            && description.commodity_type == Some(self.commodity_type)
            && description.scope_type == Some(self.scope_type)
    }

    /// Ids of the descriptions matching the filter
    pub fn ids(&self, descriptions: &MeasurementDescriptionListData) -> Vec<u32> {
        descriptions
            .measurement_description_data
            .iter()
            .filter(|d| self.matches(d))
            .filter_map(|d| d.measurement_id)
            .collect()
    }
}

/// Values matching a filter, in list order
///
/// Fails with `DataNotAvailable` when no description or value matches, and
/// with `DataInvalid` when a matching value carries a state other than
/// normal.
pub fn measurement_values(
    channel: &FeatureChannel,
    filter: &MeasurementFilter,
) -> Result<Vec<f64>> {
    let descriptions: MeasurementDescriptionListData =
        channel.data_as(FunctionType::MeasurementDescriptionListData)?;
    let ids = filter.ids(&descriptions);
    if ids.is_empty() {
        return Err(UseCaseError::DataNotAvailable);
    }

    let data: MeasurementListData = channel.data_as(FunctionType::MeasurementListData)?;
    let mut values = Vec::new();
    for item in &data.measurement_data {
        let (Some(id), Some(value)) = (item.measurement_id, item.value) else {
            continue;
        };
        if !ids.contains(&id) {
            continue;
        }
        if matches!(item.value_state, Some(state) if state != MeasurementValueState::Normal) {
            return Err(UseCaseError::DataInvalid);
        }
        values.push(value.value());
    }

    if values.is_empty() {
        return Err(UseCaseError::DataNotAvailable);
    }
    Ok(values)
}

/// First value matching a filter
pub fn measurement_value(channel: &FeatureChannel, filter: &MeasurementFilter) -> Result<f64> {
    let values = measurement_values(channel, filter)?;
    values.first().copied().ok_or(UseCaseError::DataNotAvailable)
}

// ============================================================================
// Device configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyName {
    FailsafeConsumptionActivePowerLimit,
    FailsafeDurationMinimum,
    PvCurtailmentLimitFactor,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyValueType {
    Boolean,
    Duration,
    ScaledNumber,
    String,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueDescription {
    pub key_id: Option<u32>,
    pub key_name: Option<KeyName>,
    pub value_type: Option<KeyValueType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueDescriptionListData {
    #[serde(default)]
    pub device_configuration_key_value_description_data: Vec<KeyValueDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueValue {
    pub scaled_number: Option<ScaledNumber>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueData {
    pub key_id: Option<u32>,
    pub value: Option<KeyValueValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValueListData {
    #[serde(default)]
    pub device_configuration_key_value_data: Vec<KeyValueData>,
}

/// Scaled number value configured under a key name
pub fn key_value_number(channel: &FeatureChannel, key_name: KeyName) -> Result<f64> {
    let descriptions: KeyValueDescriptionListData =
        channel.data_as(FunctionType::DeviceConfigurationKeyValueDescriptionListData)?;

    let key_id = descriptions
        .device_configuration_key_value_description_data
        .iter()
        .find(|d| d.key_name == Some(key_name) && d.value_type == Some(KeyValueType::ScaledNumber))
        .and_then(|d| d.key_id)
        .ok_or(UseCaseError::DataNotAvailable)?;

    let data: KeyValueListData =
        channel.data_as(FunctionType::DeviceConfigurationKeyValueListData)?;
    data.device_configuration_key_value_data
        .iter()
        .find(|d| d.key_id == Some(key_id))
        .and_then(|d| d.value.as_ref())
        .and_then(|v| v.scaled_number)
        .map(|n| n.value())
        .ok_or(UseCaseError::DataNotAvailable)
}

// ============================================================================
// Device classification
// ============================================================================

/// Manufacturer details of a remote device
///
/// Fields the remote does not report decode as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ManufacturerData {
    pub device_name: String,
    pub device_code: String,
    pub serial_number: String,
    pub software_revision: String,
    pub hardware_revision: String,
    pub vendor_name: String,
    pub vendor_code: String,
    pub brand_name: String,
    pub power_source: String,
    pub manufacturer_node_identification: String,
    pub manufacturer_label: String,
    pub manufacturer_description: String,
}
