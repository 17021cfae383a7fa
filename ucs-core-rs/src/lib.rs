//! # UCS Core
//!
//! Capability core for energy management use cases on SPINE devices.
//!
//! ## Architecture
//!
//! ```text
//! Entity model (devices, entities, features, connections)
//!       │ events, responses          ▲ requests
//!       ▼                            │
//! ┌──────────────────────────────────┴──────┐
//! │    ucs-core                             │
//! │  ┌────────────┐  ┌──────────────────┐   │
//! │  │ Lifecycle  │  │ CapabilityRegistry│  │
//! │  │ predicates │  │ (per use case)    │  │
//! │  └────────────┘  └──────────────────┘   │
//! │  ┌────────────────────────────────────┐ │
//! │  │ FeatureChannel (per feature type)  │ │
//! │  └────────────────────────────────────┘ │
//! └─────────────┬───────────────────────────┘
//!               │ notifications
//!               ▼
//!        Application callbacks
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use ucs_core::memory::{MemoryDevice, MemoryEntityLocal};
//! use ucs_core::*;
//!
//! let bus = LocalEventBus::new();
//! let local = MemoryEntityLocal::new("cem", [1]);
//! let descriptor = UseCaseDescriptor::new(
//!     UseCaseActor::Cem,
//!     UseCaseName::VisualizationOfAggregatedBatteryData,
//!     "1.0.1",
//!     "release",
//! )
//! .with_scenario(ScenarioSpec::new(1).mandatory())
//! .with_valid_actor_types([UseCaseActor::BatterySystem])
//! .with_valid_entity_types([EntityType::BatterySystem]);
//!
//! let registry = CapabilityRegistry::new(local, descriptor, bus.as_ref());
//! registry.register();
//!
//! let device = MemoryDevice::new("ski", "battery");
//! let entity: Arc<dyn EntityRemote> = device.add_entity([1], EntityType::BatterySystem);
//! registry.update_remote_entity_scenarios(&entity, &[1]);
//! assert_eq!(registry.scenarios_for(&entity), vec![1]);
//! ```

pub mod types;
pub mod error;
pub mod spine;
pub mod events;
pub mod lifecycle;
pub mod registry;
pub mod channel;
pub mod memory;

pub use types::*;
pub use error::{Result, UseCaseError};
pub use spine::{
    DeviceRemote, EntityLocal, EntityRemote, FeatureLocal, FeatureRemote, FeatureRequest,
};
pub use events::{
    ElementChange, EventBus, EventData, EventHandler, EventPayload, EventType, FeatureLink,
    LocalEventBus, ResponseMessage, ResultData,
};
pub use registry::{
    CapabilityRegistry, EntityEventCallback, RemoteEntityScenarios, UseCaseDescriptor,
};
pub use channel::FeatureChannel;
