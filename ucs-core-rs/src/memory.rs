//! In-memory entity model
//!
//! A minimal implementation of the [`crate::spine`] contracts that keeps
//! devices, entities and features in process. Local features record every
//! request they send and allocate increasing message counters; remote
//! features hold declared operations and cached data that tests and
//! simulations set directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Result, UseCaseError};
use crate::spine::*;
use crate::types::*;

// ============================================================================
// Remote side
// ============================================================================

/// Remote device holding its entities
#[derive(Debug)]
pub struct MemoryDevice {
    ski: String,
    address: Option<DeviceAddress>,
    entities: Mutex<Vec<Arc<MemoryEntityRemote>>>,
    me: Weak<MemoryDevice>,
}

impl MemoryDevice {
    pub fn new(ski: impl Into<String>, address: impl Into<String>) -> Arc<Self> {
        Self::build(ski.into(), Some(DeviceAddress::new(address)))
    }

    /// A device that has not announced its address yet
    pub fn without_address(ski: impl Into<String>) -> Arc<Self> {
        Self::build(ski.into(), None)
    }

    fn build(ski: String, address: Option<DeviceAddress>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            ski,
            address,
            entities: Mutex::new(Vec::new()),
            me: me.clone(),
        })
    }

    pub fn add_entity(
        &self,
        address: impl Into<Vec<u32>>,
        entity_type: EntityType,
    ) -> Arc<MemoryEntityRemote> {
        let entity = Arc::new(MemoryEntityRemote {
            device: self.me.clone(),
            ski: self.ski.clone(),
            device_address: self.address.clone(),
            address: EntityAddress::new(address),
            entity_type,
            features: Mutex::new(Vec::new()),
            next_feature_id: AtomicU32::new(1),
        });
        self.entities.lock().push(entity.clone());
        entity
    }

    pub fn remove_entity(&self, address: &EntityAddress) -> Option<Arc<MemoryEntityRemote>> {
        let mut entities = self.entities.lock();
        let index = entities.iter().position(|e| &e.address == address)?;
        Some(entities.remove(index))
    }
}

impl DeviceRemote for MemoryDevice {
    fn ski(&self) -> String {
        self.ski.clone()
    }

    fn address(&self) -> Option<DeviceAddress> {
        self.address.clone()
    }

    fn entity(&self, address: &EntityAddress) -> Option<Arc<dyn EntityRemote>> {
        self.entities
            .lock()
            .iter()
            .find(|e| &e.address == address)
            .map(|e| e.clone() as Arc<dyn EntityRemote>)
    }
}

/// Remote entity holding its features
#[derive(Debug)]
pub struct MemoryEntityRemote {
    device: Weak<MemoryDevice>,
    ski: String,
    device_address: Option<DeviceAddress>,
    address: EntityAddress,
    entity_type: EntityType,
    features: Mutex<Vec<Arc<MemoryFeatureRemote>>>,
    next_feature_id: AtomicU32,
}

impl MemoryEntityRemote {
    pub fn add_feature(&self, feature_type: FeatureType, role: Role) -> Arc<MemoryFeatureRemote> {
        let id = self.next_feature_id.fetch_add(1, Ordering::Relaxed);
        let device = self.device_address.clone().unwrap_or_else(|| DeviceAddress::new(""));
        let feature = Arc::new(MemoryFeatureRemote {
            address: FeatureAddress::new(device, self.address.clone(), id),
            feature_type,
            role,
            operations: Mutex::new(HashMap::new()),
            data: Mutex::new(HashMap::new()),
        });
        self.features.lock().push(feature.clone());
        feature
    }

    pub fn remove_feature(&self, feature_type: FeatureType, role: Role) {
        self.features
            .lock()
            .retain(|f| !(f.feature_type == feature_type && f.role == role));
    }
}

impl EntityRemote for MemoryEntityRemote {
    fn device(&self) -> Arc<dyn DeviceRemote> {
        match self.device.upgrade() {
            Some(device) => device as Arc<dyn DeviceRemote>,
            // Device gone: hand out a detached stand-in with the same identity
            None => MemoryDevice::build(self.ski.clone(), self.device_address.clone()),
        }
    }

    fn address(&self) -> EntityAddress {
        self.address.clone()
    }

    fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    fn feature_of_type_and_role(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<dyn FeatureRemote>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.feature_type == feature_type && f.role == role)
            .map(|f| f.clone() as Arc<dyn FeatureRemote>)
    }
}

/// Remote feature with declared operations and cached data
#[derive(Debug)]
pub struct MemoryFeatureRemote {
    address: FeatureAddress,
    feature_type: FeatureType,
    role: Role,
    operations: Mutex<HashMap<FunctionType, Operations>>,
    data: Mutex<HashMap<FunctionType, Value>>,
}

impl MemoryFeatureRemote {
    pub fn set_operation(&self, function: FunctionType, operations: Operations) {
        self.operations.lock().insert(function, operations);
    }

    pub fn set_data(&self, function: FunctionType, data: Value) {
        self.data.lock().insert(function, data);
    }
}

impl FeatureRemote for MemoryFeatureRemote {
    fn address(&self) -> FeatureAddress {
        self.address.clone()
    }

    fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    fn role(&self) -> Role {
        self.role
    }

    fn operations(&self) -> HashMap<FunctionType, Operations> {
        self.operations.lock().clone()
    }

    fn data(&self, function: FunctionType) -> Option<Value> {
        self.data.lock().get(&function).cloned()
    }
}

// ============================================================================
// Local side
// ============================================================================

/// Use case support published by a local entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedUseCase {
    pub actor: UseCaseActor,
    pub use_case_name: UseCaseName,
    pub version: String,
    pub sub_version: String,
    pub available: bool,
    pub scenarios: Vec<ScenarioId>,
}

/// Local entity with its features and published use cases
#[derive(Debug)]
pub struct MemoryEntityLocal {
    key: EntityKey,
    features: Mutex<Vec<Arc<MemoryFeatureLocal>>>,
    use_cases: Mutex<Vec<PublishedUseCase>>,
    next_feature_id: AtomicU32,
    counter: Arc<AtomicU64>,
}

impl MemoryEntityLocal {
    pub fn new(device: impl Into<String>, address: impl Into<Vec<u32>>) -> Arc<Self> {
        Arc::new(Self {
            key: EntityKey::new(DeviceAddress::new(device), EntityAddress::new(address)),
            features: Mutex::new(Vec::new()),
            use_cases: Mutex::new(Vec::new()),
            next_feature_id: AtomicU32::new(1),
            counter: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Add a feature and return the concrete handle
    pub fn add_feature(&self, feature_type: FeatureType, role: Role) -> Arc<MemoryFeatureLocal> {
        let id = self.next_feature_id.fetch_add(1, Ordering::Relaxed);
        let feature = Arc::new(MemoryFeatureLocal {
            address: FeatureAddress::new(self.key.device.clone(), self.key.entity.clone(), id),
            feature_type,
            role,
            counter: self.counter.clone(),
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        });
        self.features.lock().push(feature.clone());
        feature
    }

    /// Concrete handle of a local feature
    pub fn feature(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<MemoryFeatureLocal>> {
        self.features
            .lock()
            .iter()
            .find(|f| f.feature_type == feature_type && f.role == role)
            .cloned()
    }

    pub fn published_use_cases(&self) -> Vec<PublishedUseCase> {
        self.use_cases.lock().clone()
    }
}

impl EntityLocal for MemoryEntityLocal {
    fn address(&self) -> EntityKey {
        self.key.clone()
    }

    fn feature_of_type_and_role(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<dyn FeatureLocal>> {
        self.feature(feature_type, role)
            .map(|f| f as Arc<dyn FeatureLocal>)
    }

    fn get_or_add_feature(&self, feature_type: FeatureType, role: Role) -> Arc<dyn FeatureLocal> {
        match self.feature(feature_type, role) {
            Some(feature) => feature,
            None => self.add_feature(feature_type, role),
        }
    }

    fn add_use_case_support(
        &self,
        actor: UseCaseActor,
        use_case_name: UseCaseName,
        version: &str,
        sub_version: &str,
        available: bool,
        scenarios: &[ScenarioId],
    ) {
        let entry = PublishedUseCase {
            actor,
            use_case_name,
            version: version.to_string(),
            sub_version: sub_version.to_string(),
            available,
            scenarios: scenarios.to_vec(),
        };

        let mut use_cases = self.use_cases.lock();
        match use_cases
            .iter_mut()
            .find(|u| u.actor == actor && u.use_case_name == use_case_name)
        {
            Some(existing) => *existing = entry,
            None => use_cases.push(entry),
        }
    }

    fn remove_use_case_supports(&self, filters: &[UseCaseFilter]) {
        self.use_cases.lock().retain(|u| {
            !filters
                .iter()
                .any(|f| f.actor == u.actor && f.use_case_name == u.use_case_name)
        });
    }

    fn set_use_case_availability(&self, filter: UseCaseFilter, available: bool) {
        for use_case in self.use_cases.lock().iter_mut() {
            if use_case.actor == filter.actor && use_case.use_case_name == filter.use_case_name {
                use_case.available = available;
            }
        }
    }
}

/// Local feature recording the requests it sends
#[derive(Debug)]
pub struct MemoryFeatureLocal {
    address: FeatureAddress,
    feature_type: FeatureType,
    role: Role,
    counter: Arc<AtomicU64>,
    sent: Mutex<Vec<(MsgCounter, FeatureRequest)>>,
    fail_sends: AtomicBool,
}

impl MemoryFeatureLocal {
    /// Requests sent so far, with their counters
    pub fn sent_requests(&self) -> Vec<(MsgCounter, FeatureRequest)> {
        self.sent.lock().clone()
    }

    /// Make subsequent sends fail, as a closed connection would
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }
}

impl FeatureLocal for MemoryFeatureLocal {
    fn address(&self) -> FeatureAddress {
        self.address.clone()
    }

    fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    fn role(&self) -> Role {
        self.role
    }

    fn send_request(&self, request: FeatureRequest) -> Result<MsgCounter> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(UseCaseError::SendFailed("connection closed".to_string()));
        }

        let counter = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.sent.lock().push((counter, request));
        Ok(counter)
    }
}
