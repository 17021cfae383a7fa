//! Event bus connecting the entity model to the use case layer
//!
//! The entity model publishes device, entity, subscription, binding and data
//! changes, and delivers responses to outbound requests. Components subscribe
//! once at construction and are called for every event, one at a time, in
//! publication order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::spine::{DeviceRemote, EntityRemote};
use crate::types::*;

/// Kind of change an event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    DeviceChange,
    EntityChange,
    SubscriptionChange,
    BindingChange,
    DataChange,
}

/// Whether the element was added, removed or updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementChange {
    Add,
    Remove,
    Update,
}

/// Client/server feature pair of a subscription or binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureLink {
    pub client: FeatureAddress,
    pub server: FeatureAddress,
}

/// Decoded payload attached to an event
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Node management use case data of a remote device
    UseCaseData(Vec<UseCaseInformation>),
    Subscription(FeatureLink),
    Binding(FeatureLink),
}

/// A system-wide change notification
#[derive(Debug, Clone)]
pub struct EventPayload {
    /// Peer the change originates from
    pub ski: String,
    pub device: Option<Arc<dyn DeviceRemote>>,
    pub entity: Option<Arc<dyn EntityRemote>>,
    pub event_type: EventType,
    pub change_type: ElementChange,
    pub function: Option<FunctionType>,
    pub data: Option<EventData>,
}

impl EventPayload {
    pub fn new(event_type: EventType, change_type: ElementChange) -> Self {
        Self {
            ski: String::new(),
            device: None,
            entity: None,
            event_type,
            change_type,
            function: None,
            data: None,
        }
    }

    pub fn with_device(mut self, device: Arc<dyn DeviceRemote>) -> Self {
        self.ski = device.ski();
        self.device = Some(device);
        self
    }

    /// Attach an entity, and its device if none is set yet
    pub fn with_entity(mut self, entity: Arc<dyn EntityRemote>) -> Self {
        if self.device.is_none() {
            self = self.with_device(entity.device());
        }
        self.entity = Some(entity);
        self
    }

    pub fn with_function(mut self, function: FunctionType) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_data(mut self, data: EventData) -> Self {
        self.data = Some(data);
        self
    }
}

/// Result block of a response, present when the remote answered with a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    pub error_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ResultData {
    pub fn is_error(&self) -> bool {
        self.error_number != 0
    }
}

/// An inbound response to a request issued through a local feature
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMessage {
    /// Counter of the request this message answers
    pub msg_counter_reference: MsgCounter,
    /// Remote feature that answered
    pub source: FeatureAddress,
    /// Local feature the request came from
    pub destination: FeatureAddress,
    pub function: Option<FunctionType>,
    pub data: Option<Value>,
    pub result: Option<ResultData>,
}

/// Receiver of bus traffic
pub trait EventHandler: Send + Sync {
    fn handle_event(&self, payload: &EventPayload);

    /// Called for every response delivered on the bus
    fn handle_response(&self, _response: &ResponseMessage) {}
}

/// Identifier of a bus subscription
pub type HandlerId = u64;

/// Subscription side of an event bus
pub trait EventBus: Send + Sync {
    /// Register a handler; it is dropped from the bus once its owner is gone
    fn subscribe(&self, handler: Weak<dyn EventHandler>) -> HandlerId;

    fn unsubscribe(&self, id: HandlerId);
}

/// In-process event bus
///
/// Delivery is serialized across threads; a handler may publish again from
/// within its callback on the same thread.
#[derive(Default)]
pub struct LocalEventBus {
    handlers: Mutex<Vec<(HandlerId, Weak<dyn EventHandler>)>>,
    next_id: AtomicU64,
    dispatch: ReentrantMutex<()>,
}

impl LocalEventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of live handlers
    pub fn handler_count(&self) -> usize {
        self.live_handlers().len()
    }

    /// Deliver an event to every handler
    pub fn publish(&self, payload: &EventPayload) {
        let _guard = self.dispatch.lock();
        debug!(
            "Bus: {:?}/{:?} from {}",
            payload.event_type, payload.change_type, payload.ski
        );

        for handler in self.live_handlers() {
            handler.handle_event(payload);
        }
    }

    /// Deliver a response to every handler
    pub fn deliver_response(&self, response: &ResponseMessage) {
        let _guard = self.dispatch.lock();
        debug!(
            "Bus: response for counter {} from {}",
            response.msg_counter_reference, response.source
        );

        for handler in self.live_handlers() {
            handler.handle_response(response);
        }
    }

    /// Upgrade live handlers and prune dropped ones
    fn live_handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        let mut handlers = self.handlers.lock();
        handlers.retain(|(_, h)| h.strong_count() > 0);
        handlers.iter().filter_map(|(_, h)| h.upgrade()).collect()
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&self, handler: Weak<dyn EventHandler>) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.lock().push((id, handler));
        id
    }

    fn unsubscribe(&self, id: HandlerId) {
        self.handlers.lock().retain(|(handler_id, _)| *handler_id != id);
    }
}
