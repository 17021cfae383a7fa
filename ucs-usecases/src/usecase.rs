//! Shared plumbing of the concrete use cases
//!
//! Wraps a [`CapabilityRegistry`] and keeps one [`FeatureChannel`] per
//! (remote entity, feature type) pair the use case talks to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use ucs_core::{
    CapabilityRegistry, DeviceRemote, EntityEventCallback, EntityKey, EntityLocal, EntityRemote,
    EventBus, FeatureChannel, FeatureType, FunctionType, Result, Role, UseCaseDescriptor,
    UseCaseError, UseCaseEvent,
};

use crate::model::ManufacturerData;

/// Feature the use case subscribes to on connect, and the description read
/// it issues right away
#[derive(Debug, Clone, Copy)]
pub struct FeatureInterest {
    pub feature_type: FeatureType,
    pub description: Option<FunctionType>,
}

pub struct UseCaseBase {
    registry: Arc<CapabilityRegistry>,
    bus: Arc<dyn EventBus>,
    channels: Mutex<HashMap<(EntityKey, FeatureType), Arc<FeatureChannel>>>,
    event_callback: Option<EntityEventCallback>,
}

impl UseCaseBase {
    pub fn new(
        local_entity: Arc<dyn EntityLocal>,
        descriptor: UseCaseDescriptor,
        bus: Arc<dyn EventBus>,
    ) -> Self {
        let event_callback = descriptor.event_callback.clone();
        let registry = CapabilityRegistry::new(local_entity, descriptor, bus.as_ref());

        Self {
            registry,
            bus,
            channels: Mutex::new(HashMap::new()),
            event_callback,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Create the client features the use case needs on the local entity
    pub fn add_features(&self, features: &[FeatureType]) {
        let local = self.registry.local_entity();
        for feature in features {
            local.get_or_add_feature(*feature, Role::Client);
        }
    }

    /// Admission gate shared by every accessor
    pub fn ensure_compatible(&self, entity: &Arc<dyn EntityRemote>) -> Result<()> {
        if self.registry.is_compatible_entity_type(Some(entity)) {
            Ok(())
        } else {
            Err(UseCaseError::NoCompatibleEntity)
        }
    }

    /// Channel to a feature of the entity, opened on first use
    pub fn channel(
        &self,
        entity: &Arc<dyn EntityRemote>,
        feature_type: FeatureType,
    ) -> Result<Arc<FeatureChannel>> {
        let key = entity.key().ok_or(UseCaseError::NoCompatibleEntity)?;

        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(&(key.clone(), feature_type)) {
            return Ok(channel.clone());
        }

        let channel = FeatureChannel::open(
            feature_type,
            Some(self.registry.local_entity()),
            Some(entity),
            self.bus.as_ref(),
        )?;
        channels.insert((key, feature_type), channel.clone());
        Ok(channel)
    }

    /// Subscribe to each feature of interest and request its description
    ///
    /// Channels cached for an earlier handle of the same entity are replaced.
    /// Failures are logged per feature; a remote lacking one feature still
    /// gets the others set up.
    pub fn connect(&self, entity: &Arc<dyn EntityRemote>, interests: &[FeatureInterest]) {
        self.drop_stale_channels(entity);

        for interest in interests {
            if let Err(e) = self.setup_feature(entity, interest) {
                debug!(
                    "UseCase: {:?} not set up on {:?}: {}",
                    interest.feature_type,
                    entity.key(),
                    e
                );
            }
        }
    }

    fn drop_stale_channels(&self, entity: &Arc<dyn EntityRemote>) {
        let Some(key) = entity.key() else {
            return;
        };

        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|(k, _), channel| {
            k != &key || same_handle(channel.remote_entity(), entity)
        });
        if channels.len() != before {
            debug!("UseCase: {} stale channels of {} replaced", before - channels.len(), key);
        }
    }

    fn setup_feature(
        &self,
        entity: &Arc<dyn EntityRemote>,
        interest: &FeatureInterest,
    ) -> Result<()> {
        let channel = self.channel(entity, interest.feature_type)?;
        if let Some(err) = channel.remote_error() {
            return Err(err);
        }

        if !channel.has_subscription() {
            channel.subscribe()?;
        }
        if let Some(description) = interest.description {
            channel.request_data(description, None, None)?;
        }
        Ok(())
    }

    /// Request a function of an entity's feature, logging failures
    pub fn request(
        &self,
        entity: &Arc<dyn EntityRemote>,
        feature_type: FeatureType,
        function: FunctionType,
    ) {
        let result = self
            .channel(entity, feature_type)
            .and_then(|channel| channel.request_data(function, None, None));

        if let Err(e) = result {
            warn!("UseCase: request of {} failed: {}", function, e);
        }
    }

    /// Forget every channel opened towards the entity
    pub fn disconnect(&self, entity: &Arc<dyn EntityRemote>) {
        let Some(key) = entity.key() else {
            return;
        };

        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|(k, _), _| k != &key);
        debug!("UseCase: {} channels of {} closed", before - channels.len(), key);
    }

    /// Forget every channel opened towards entities of the device
    pub fn disconnect_device(&self, device: &Arc<dyn DeviceRemote>) {
        let Some(address) = device.address() else {
            return;
        };

        let mut channels = self.channels.lock();
        let before = channels.len();
        channels.retain(|(k, _), _| k.device != address);
        debug!("UseCase: {} channels of device {} closed", before - channels.len(), address);
    }

    /// Manufacturer details the entity's device classification reports
    pub fn manufacturer_data(&self, entity: &Arc<dyn EntityRemote>) -> Result<ManufacturerData> {
        self.ensure_compatible(entity)?;
        let channel = self.channel(entity, FeatureType::DeviceClassification)?;
        channel.data_as(FunctionType::DeviceClassificationManufacturerData)
    }

    /// Number of channels currently open
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Raise a use case event for an entity towards the application
    pub fn notify(&self, entity: &Arc<dyn EntityRemote>, event: UseCaseEvent) {
        if let Some(callback) = &self.event_callback {
            let device = entity.device();
            let ski = device.ski();
            callback(&ski, Some(device), Some(entity.clone()), event);
        }
    }
}

fn same_handle(a: &Arc<dyn EntityRemote>, b: &Arc<dyn EntityRemote>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
