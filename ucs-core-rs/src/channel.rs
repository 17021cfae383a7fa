//! Feature channel between a local client feature and a remote server feature
//!
//! Handles:
//! - Subscription and binding requests and their confirmed state
//! - Filtered read requests
//! - Request/response correlation via message counters
//!
//! Requests return as soon as the local feature has dispatched them. Remote
//! approval of a subscription or binding arrives later as a bus event and is
//! reflected by [`FeatureChannel::has_subscription`] and
//! [`FeatureChannel::has_binding`]. There is no timeout on outstanding
//! counters; callers that need a deadline track it themselves.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, UseCaseError};
use crate::events::{
    ElementChange, EventBus, EventData, EventHandler, EventPayload, EventType, FeatureLink,
    ResponseMessage,
};
use crate::lifecycle;
use crate::spine::{EntityLocal, EntityRemote, FeatureLocal, FeatureRemote, FeatureRequest};
use crate::types::*;

/// Answered counters remembered to detect late callback registrations
const ANSWERED_HISTORY: usize = 64;

/// One-shot handler for the response to a specific counter
pub type ResponseCallback = Box<dyn FnOnce(&ResponseMessage) + Send>;

/// Standing handler for every response the channel receives
pub type ResultCallback = Arc<dyn Fn(&ResponseMessage) + Send + Sync>;

/// Correlation state guarded by the channel lock
#[derive(Default)]
struct Correlation {
    subscribed: bool,
    bound: bool,
    pending: HashMap<MsgCounter, ResponseCallback>,
    answered: VecDeque<MsgCounter>,
    result_callbacks: Vec<ResultCallback>,
}

impl Correlation {
    fn mark_answered(&mut self, counter: MsgCounter) {
        if self.answered.contains(&counter) {
            return;
        }
        if self.answered.len() == ANSWERED_HISTORY {
            self.answered.pop_front();
        }
        self.answered.push_back(counter);
    }
}

/// Channel for one (local feature type, remote entity) pairing
pub struct FeatureChannel {
    feature_type: FeatureType,
    local_feature: Arc<dyn FeatureLocal>,
    remote_entity: Arc<dyn EntityRemote>,
    remote_key: Option<EntityKey>,
    state: Mutex<Correlation>,
}

impl FeatureChannel {
    /// Open a channel and subscribe it to the bus
    ///
    /// Fails when the local entity is absent or has no client feature of
    /// `feature_type`, or when the remote entity is absent. A remote entity
    /// without a matching server feature still yields a channel; the
    /// incompatibility is reported by [`FeatureChannel::remote_error`] and by
    /// every data operation until the remote feature appears.
    pub fn open(
        feature_type: FeatureType,
        local_entity: Option<&Arc<dyn EntityLocal>>,
        remote_entity: Option<&Arc<dyn EntityRemote>>,
        bus: &dyn EventBus,
    ) -> Result<Arc<Self>> {
        let local_entity = local_entity.ok_or(UseCaseError::LocalEntityMissing)?;
        let remote_entity = remote_entity.ok_or(UseCaseError::NoCompatibleEntity)?;

        let local_feature = local_entity
            .feature_of_type_and_role(feature_type, Role::Client)
            .ok_or(UseCaseError::LocalFeatureMissing(feature_type))?;

        let channel = Arc::new(Self {
            feature_type,
            local_feature,
            remote_entity: remote_entity.clone(),
            remote_key: remote_entity.key(),
            state: Mutex::new(Correlation::default()),
        });

        if let Some(err) = channel.remote_error() {
            debug!("Channel: opened {:?} without remote feature: {}", feature_type, err);
        }

        bus.subscribe(Arc::downgrade(&channel) as Weak<dyn EventHandler>);
        Ok(channel)
    }

    pub fn feature_type(&self) -> FeatureType {
        self.feature_type
    }

    pub fn local_feature(&self) -> &Arc<dyn FeatureLocal> {
        &self.local_feature
    }

    pub fn remote_entity(&self) -> &Arc<dyn EntityRemote> {
        &self.remote_entity
    }

    /// The remote server feature, resolved on every call
    pub fn remote_feature(&self) -> Result<Arc<dyn FeatureRemote>> {
        self.remote_entity
            .feature_of_type_and_role(self.feature_type, Role::Server)
            .ok_or(UseCaseError::RemoteFeatureMissing(self.feature_type))
    }

    /// Why data operations currently fail, if they do
    pub fn remote_error(&self) -> Option<UseCaseError> {
        self.remote_feature().err()
    }

    /// Request a subscription; confirmation arrives as a bus event
    pub fn subscribe(&self) -> Result<MsgCounter> {
        let remote = self.remote_feature()?.address();
        self.send(FeatureRequest::Subscribe { remote })
    }

    pub fn unsubscribe(&self) -> Result<MsgCounter> {
        let remote = self.remote_feature()?.address();
        self.send(FeatureRequest::Unsubscribe { remote })
    }

    /// Request a binding; confirmation arrives as a bus event
    pub fn bind(&self) -> Result<MsgCounter> {
        let remote = self.remote_feature()?.address();
        self.send(FeatureRequest::Bind { remote })
    }

    pub fn unbind(&self) -> Result<MsgCounter> {
        let remote = self.remote_feature()?.address();
        self.send(FeatureRequest::Unbind { remote })
    }

    /// Whether the remote confirmed a subscription
    pub fn has_subscription(&self) -> bool {
        self.state.lock().subscribed
    }

    /// Whether the remote confirmed a binding
    pub fn has_binding(&self) -> bool {
        self.state.lock().bound
    }

    /// Request data of a readable function
    ///
    /// Selectors are only sent when the remote allows partial reads of the
    /// function; otherwise the full list is requested.
    pub fn request_data(
        &self,
        function: FunctionType,
        selectors: Option<Value>,
        elements: Option<Value>,
    ) -> Result<MsgCounter> {
        let remote = self.remote_feature()?;

        let operations = match remote.operations().get(&function) {
            Some(op) if op.read => *op,
            _ => return Err(UseCaseError::FunctionNotSupported(function)),
        };

        let selectors = if operations.read_partial {
            selectors
        } else {
            if selectors.is_some() {
                debug!("Channel: {} has no partial read, requesting full data", function);
            }
            None
        };

        self.send(FeatureRequest::Read {
            remote: remote.address(),
            function,
            selectors,
            elements,
        })
    }

    /// Last data received for a function
    pub fn data(&self, function: FunctionType) -> Result<Value> {
        self.remote_feature()?
            .data(function)
            .ok_or(UseCaseError::DataNotAvailable)
    }

    /// Last data received for a function, decoded
    pub fn data_as<T: DeserializeOwned>(&self, function: FunctionType) -> Result<T> {
        Ok(serde_json::from_value(self.data(function)?)?)
    }

    /// Register a handler for the response to `counter`
    ///
    /// The handler runs at most once. Registering for a counter that was
    /// already answered stores nothing, since the response cannot be
    /// replayed.
    pub fn add_response_callback(
        &self,
        counter: MsgCounter,
        callback: impl FnOnce(&ResponseMessage) + Send + 'static,
    ) -> Result<()> {
        let mut state = self.state.lock();

        if state.answered.contains(&counter) {
            warn!("Channel: response for counter {} already received, callback dropped", counter);
            return Ok(());
        }
        if state.pending.contains_key(&counter) {
            return Err(UseCaseError::CallbackExists(counter));
        }

        state.pending.insert(counter, Box::new(callback));
        Ok(())
    }

    /// Register a handler invoked for every response, in registration order
    pub fn add_result_callback(&self, callback: impl Fn(&ResponseMessage) + Send + Sync + 'static) {
        self.state.lock().result_callbacks.push(Arc::new(callback));
    }

    /// Receiver completed with the response to `counter`
    pub fn response(&self, counter: MsgCounter) -> Result<oneshot::Receiver<ResponseMessage>> {
        let (tx, rx) = oneshot::channel();
        self.add_response_callback(counter, move |msg| {
            let _ = tx.send(msg.clone());
        })?;
        Ok(rx)
    }

    /// Number of counters awaiting a response handler invocation
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn send(&self, request: FeatureRequest) -> Result<MsgCounter> {
        let label = request_label(&request);
        let remote = request.remote().clone();
        let counter = self.local_feature.send_request(request)?;
        debug!(
            "Channel: {} {:?} to {} sent with counter {}",
            label, self.feature_type, remote, counter
        );
        Ok(counter)
    }

    fn is_own_link(&self, link: &FeatureLink) -> bool {
        link.client == self.local_feature.address()
            && Some(link.server.entity_key()) == self.remote_key
    }

    fn is_remote_gone(&self, payload: &EventPayload) -> bool {
        let Some(key) = &self.remote_key else {
            return false;
        };

        if lifecycle::is_device_disconnected(payload) {
            return payload
                .device
                .as_ref()
                .and_then(|d| d.address())
                .is_some_and(|address| address == key.device);
        }

        if lifecycle::is_entity_removed(payload) {
            return payload
                .entity
                .as_ref()
                .and_then(|e| e.key())
                .is_some_and(|k| &k == key);
        }

        false
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        let dropped = state.pending.len();
        state.subscribed = false;
        state.bound = false;
        state.pending.clear();

        debug!(
            "Channel: {:?} remote disconnected, {} pending callbacks dropped",
            self.feature_type, dropped
        );
    }
}

impl EventHandler for FeatureChannel {
    fn handle_event(&self, payload: &EventPayload) {
        if self.is_remote_gone(payload) {
            self.reset();
            return;
        }

        let confirmed = match payload.change_type {
            ElementChange::Add => true,
            ElementChange::Remove => false,
            ElementChange::Update => return,
        };

        match (payload.event_type, &payload.data) {
            (EventType::SubscriptionChange, Some(EventData::Subscription(link)))
                if self.is_own_link(link) =>
            {
                debug!("Channel: {:?} subscription confirmed = {}", self.feature_type, confirmed);
                self.state.lock().subscribed = confirmed;
            }
            (EventType::BindingChange, Some(EventData::Binding(link)))
                if self.is_own_link(link) =>
            {
                debug!("Channel: {:?} binding confirmed = {}", self.feature_type, confirmed);
                self.state.lock().bound = confirmed;
            }
            _ => {}
        }
    }

    fn handle_response(&self, response: &ResponseMessage) {
        if response.destination != self.local_feature.address()
            || Some(response.source.entity_key()) != self.remote_key
        {
            return;
        }

        let counter = response.msg_counter_reference;
        let (callback, results) = {
            let mut state = self.state.lock();
            let callback = state.pending.remove(&counter);
            state.mark_answered(counter);
            (callback, state.result_callbacks.clone())
        };

        if callback.is_none() && results.is_empty() {
            debug!("Channel: no handler for response to counter {}", counter);
        }

        if let Some(callback) = callback {
            callback(response);
        }
        for result in &results {
            result(response);
        }
    }
}

fn request_label(request: &FeatureRequest) -> &'static str {
    match request {
        FeatureRequest::Subscribe { .. } => "subscribe",
        FeatureRequest::Unsubscribe { .. } => "unsubscribe",
        FeatureRequest::Bind { .. } => "bind",
        FeatureRequest::Unbind { .. } => "unbind",
        FeatureRequest::Read { .. } => "read",
    }
}
