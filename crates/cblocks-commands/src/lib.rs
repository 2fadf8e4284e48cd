//! Resource writes for CBlocks.
//!
//! - `protocol`: publish a write and correlate the device's answer
//! - `write`: registry-validated write use case
//! - `mqtt`: rumqttc implementation of the transport

pub mod mqtt;
pub mod protocol;
pub mod write;

pub use mqtt::{MqttConfig, MqttTransport};
pub use protocol::{ResourceWriteProtocol, WriteKey};
pub use write::ResourceWriteUseCase;
