//! Feature Engineering Engine
//!
//! Turns a raw [`obd_protocol::Reading`] into engineering ratios, stress
//! flags and short-window stability measures.
//!
//! [`FeatureEngineer::compute`] is a pure function of the reading and a
//! [`SessionFeatureState`]. The state carries the previous coolant sample
//! and the rolling history windows, and is owned and threaded through by
//! the collection loop.

mod config;
mod features;
mod state;
mod statistics;

pub use config::FeatureConfig;
pub use features::{DerivedFeatures, FeatureEngineer};
pub use state::{SessionFeatureState, TemperatureSample};
pub use statistics::StatisticalFeatures;
