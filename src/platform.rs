//! Seams between the control plane and the board it runs on.
//!
//! The ESP-IDF implementations live in `crate::esp`; the integration tests provide
//! in-memory fakes so every transition can be exercised without a radio.

use core::time::Duration;
use std::sync::mpsc;

use crate::error::AcquisitionError;
use crate::identity::DeviceIdentity;
use crate::record::ConfigurationRecord;

/// One oneshot ADC channel returning 12-bit samples.
pub trait AdcChannel {
    fn read_raw(&mut self) -> Result<u16, AcquisitionError>;
}

/// Excitation supply of the moisture probe.
pub trait PowerRail {
    fn set_powered(&mut self, on: bool) -> Result<(), AcquisitionError>;
}

/// Blocking delay used inside an acquisition window.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}

/// Monotonic time since boot plus a blocking wait.
pub trait Clock {
    fn uptime(&self) -> Duration;
    fn sleep(&mut self, duration: Duration);
}

/// Station-mode network attach.
pub trait Network {
    fn attach(&mut self, record: &ConfigurationRecord) -> anyhow::Result<()>;
    fn is_attached(&mut self) -> bool;
}

/// QoS mapping for a minimal, crate-agnostic publish interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Qos {
    AtMostOnce,
    AtLeastOnce,
}

/// A started messaging session. Reconnects are the transport's business.
pub trait ControlChannel {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool) -> anyhow::Result<()>;
    fn subscribe(&mut self, topic: &str) -> anyhow::Result<()>;
}

/// Starts the messaging session; connection events are delivered through an [`EventSource`].
pub trait ControlConnector {
    type Channel: ControlChannel;

    fn start(&mut self, record: &ConfigurationRecord, identity: &DeviceIdentity) -> anyhow::Result<Self::Channel>;
}

/// Typed transport events consumed by the duty-cycle loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    Message { topic: String, payload: Vec<u8> },
}

pub trait EventSource {
    /// Waits up to `timeout` for the next event.
    fn next_event(&mut self, timeout: Duration) -> Option<ChannelEvent>;
}

impl EventSource for mpsc::Receiver<ChannelEvent> {
    fn next_event(&mut self, timeout: Duration) -> Option<ChannelEvent> {
        self.recv_timeout(timeout).ok()
    }
}

/// Deep-sleep entry. On hardware this does not return; the next wake is a fresh boot.
pub trait Suspender {
    fn suspend(&mut self, duration: Duration);
}
