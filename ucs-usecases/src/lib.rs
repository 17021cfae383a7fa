//! # UCS Use Cases
//!
//! Energy management use cases built on `ucs-core`.
//!
//! | Use case | Local actor | Remote entity |
//! |----------|-------------|---------------|
//! | [`Vabd`] Visualization of Aggregated Battery Data | CEM | BatterySystem |
//! | [`Mgcp`] Monitoring of Grid Connection Point | MonitoringAppliance | GridConnectionPointOfPremises |
//!
//! Each use case owns a capability registry, opens feature channels when a
//! compatible entity connects, and raises data update events through the
//! application callback once new values can be read.

pub mod model;
pub mod usecase;
pub mod vabd;
pub mod mgcp;

pub use mgcp::Mgcp;
pub use model::ManufacturerData;
pub use usecase::{FeatureInterest, UseCaseBase};
pub use vabd::Vabd;
