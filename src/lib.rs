//! Control plane of a battery-powered soil-moisture node.
//!
//! Raw ADC samples are turned into calibrated percentages, published over MQTT together
//! with Home Assistant discovery payloads, and the node spends most of its life in deep
//! sleep between duty cycles. Calibration bounds and the sleep interval are adjustable
//! remotely through retained command topics.
//!
//! Everything outside [`esp`] is hardware independent and runs on the host.

pub mod calibration;
pub mod constants;
pub mod error;
pub mod identity;
pub mod orchestrator;
pub mod platform;
pub mod protocol;
pub mod provisioning;
pub mod record;
pub mod sensor;
pub mod store;

#[cfg(target_os = "espidf")]
pub mod esp;

pub use error::{AcquisitionError, CommandError, RecordError, StoreError};
pub use identity::DeviceIdentity;
pub use orchestrator::{Board, BootOutcome, DutyCycle, NodeState};
pub use record::ConfigurationRecord;
pub use store::ConfigStore;
