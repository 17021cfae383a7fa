//! Contracts of the SPINE entity model
//!
//! The device/entity/feature model, wire encoding and message dispatch live
//! outside this crate. This module states what the use case layer needs from
//! them. [`crate::memory`] provides an in-process implementation.
//!
//! # Implementing the model
//!
//! ```ignore
//! struct MyLocalFeature { /* ... */ }
//!
//! impl FeatureLocal for MyLocalFeature {
//!     fn send_request(&self, request: FeatureRequest) -> Result<MsgCounter> {
//!         // encode the request, hand it to the connection, return its counter
//!     }
//!
//!     // ... implement other methods
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::types::*;

/// A remote device reachable over a trusted connection
pub trait DeviceRemote: Send + Sync + Debug {
    /// Subject key identifier of the peer
    fn ski(&self) -> String;

    /// Device address, if the peer has announced one
    fn address(&self) -> Option<DeviceAddress>;

    /// Look up one of the device's entities by address
    fn entity(&self, address: &EntityAddress) -> Option<Arc<dyn EntityRemote>>;
}

/// An entity exposed by a remote device
pub trait EntityRemote: Send + Sync + Debug {
    fn device(&self) -> Arc<dyn DeviceRemote>;

    fn address(&self) -> EntityAddress;

    fn entity_type(&self) -> EntityType;

    fn feature_of_type_and_role(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<dyn FeatureRemote>>;

    /// Structural key built from the device and entity addresses
    ///
    /// `None` while the owning device has no address.
    fn key(&self) -> Option<EntityKey> {
        let device = self.device().address()?;
        Some(EntityKey::new(device, self.address()))
    }
}

/// A feature exposed by a remote entity
pub trait FeatureRemote: Send + Sync + Debug {
    fn address(&self) -> FeatureAddress;

    fn feature_type(&self) -> FeatureType;

    fn role(&self) -> Role;

    /// Functions and the operations the remote allows on them
    fn operations(&self) -> HashMap<FunctionType, Operations>;

    /// Last data received for a function, as cached by the entity model
    fn data(&self, function: FunctionType) -> Option<Value>;
}

/// The local entity a use case is attached to
pub trait EntityLocal: Send + Sync + Debug {
    fn address(&self) -> EntityKey;

    fn feature_of_type_and_role(
        &self,
        feature_type: FeatureType,
        role: Role,
    ) -> Option<Arc<dyn FeatureLocal>>;

    fn get_or_add_feature(&self, feature_type: FeatureType, role: Role) -> Arc<dyn FeatureLocal>;

    /// Publish support for a use case in the local node management data
    fn add_use_case_support(
        &self,
        actor: UseCaseActor,
        use_case_name: UseCaseName,
        version: &str,
        sub_version: &str,
        available: bool,
        scenarios: &[ScenarioId],
    );

    /// Retract published use case support matching any of the filters
    fn remove_use_case_supports(&self, filters: &[UseCaseFilter]);

    fn set_use_case_availability(&self, filter: UseCaseFilter, available: bool);
}

/// A local feature able to send requests to remote features
pub trait FeatureLocal: Send + Sync + Debug {
    fn address(&self) -> FeatureAddress;

    fn feature_type(&self) -> FeatureType;

    fn role(&self) -> Role;

    /// Hand a request to the connection and return its correlation counter
    fn send_request(&self, request: FeatureRequest) -> Result<MsgCounter>;
}

/// Requests the use case layer issues through a local feature
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureRequest {
    Subscribe { remote: FeatureAddress },
    Unsubscribe { remote: FeatureAddress },
    Bind { remote: FeatureAddress },
    Unbind { remote: FeatureAddress },
    /// Read a function; selectors narrow list items, elements narrow fields
    Read {
        remote: FeatureAddress,
        function: FunctionType,
        selectors: Option<Value>,
        elements: Option<Value>,
    },
}

impl FeatureRequest {
    /// Address of the remote feature the request targets
    pub fn remote(&self) -> &FeatureAddress {
        match self {
            FeatureRequest::Subscribe { remote }
            | FeatureRequest::Unsubscribe { remote }
            | FeatureRequest::Bind { remote }
            | FeatureRequest::Unbind { remote }
            | FeatureRequest::Read { remote, .. } => remote,
        }
    }
}
