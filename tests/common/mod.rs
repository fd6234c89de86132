//! Simulated board: one shared virtual clock drives the event queue, the network and
//! the retry delays, so a whole boot runs instantly and deterministically.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::anyhow;
use soil_node::platform::{ChannelEvent, Clock, ControlChannel, ControlConnector, EventSource, Network, Qos, Suspender};
use soil_node::record::ConfigurationRecord;
use soil_node::sensor::Sampler;
use soil_node::store::MemoryBlobStore;
use soil_node::{AcquisitionError, Board, ConfigStore, DeviceIdentity, DutyCycle};

pub const MAC: [u8; 6] = [0x24, 0x0a, 0xc4, 0xab, 0xcd, 0xef];
pub const BASE: &str = "soilsensor/abcdef";

#[derive(Clone, Debug, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
    pub qos: Qos,
    pub retain: bool,
}

#[derive(Default)]
pub struct SimState {
    pub now: Duration,
    pub script: VecDeque<(Duration, ChannelEvent)>,
    pub attached: bool,
    pub failing_attaches: u32,
    pub attach_attempts: u32,
    pub link_down_at: Option<Duration>,
    pub control_starts: u32,
    pub published: Vec<Published>,
    pub subscribed: Vec<String>,
    pub battery: Option<Result<f32, AcquisitionError>>,
    pub moisture: Option<Result<u16, AcquisitionError>>,
    pub moisture_reads: u32,
    pub suspended: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct Sim(pub Rc<RefCell<SimState>>);

impl Sim {
    pub fn new() -> Self {
        let sim = Sim::default();
        {
            let mut state = sim.0.borrow_mut();
            state.battery = Some(Ok(3.7));
            state.moisture = Some(Ok(2200));
        }
        sim
    }

    pub fn at(&self, secs: f32, event: ChannelEvent) -> &Self {
        self.0
            .borrow_mut()
            .script
            .push_back((Duration::from_secs_f32(secs), event));
        self
    }

    pub fn message(&self, secs: f32, suffix: &str, payload: &str) -> &Self {
        self.at(
            secs,
            ChannelEvent::Message {
                topic: format!("{}/{}", BASE, suffix),
                payload: payload.as_bytes().to_vec(),
            },
        )
    }

    pub fn published_on(&self, suffix: &str) -> Vec<Published> {
        let topic = format!("{}/{}", BASE, suffix);
        self.0
            .borrow()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn payloads_on(&self, suffix: &str) -> Vec<String> {
        self.published_on(suffix).into_iter().map(|p| p.payload).collect()
    }
}

impl Clock for Sim {
    fn uptime(&self) -> Duration {
        self.0.borrow().now
    }

    fn sleep(&mut self, duration: Duration) {
        self.0.borrow_mut().now += duration;
    }
}

impl EventSource for Sim {
    fn next_event(&mut self, timeout: Duration) -> Option<ChannelEvent> {
        let mut state = self.0.borrow_mut();
        let deadline = state.now + timeout;
        let next_at = state.script.front().map(|(at, _)| *at);
        match next_at {
            Some(at) if at <= deadline => {
                let (_, event) = state.script.pop_front()?;
                state.now = state.now.max(at);
                Some(event)
            }
            _ => {
                state.now = deadline;
                None
            }
        }
    }
}

impl Network for Sim {
    fn attach(&mut self, _record: &ConfigurationRecord) -> anyhow::Result<()> {
        let mut state = self.0.borrow_mut();
        state.attach_attempts += 1;
        if state.failing_attaches > 0 {
            state.failing_attaches -= 1;
            return Err(anyhow!("no AP in range"));
        }
        state.attached = true;
        Ok(())
    }

    fn is_attached(&mut self) -> bool {
        let mut state = self.0.borrow_mut();
        if let Some(at) = state.link_down_at {
            if state.now >= at {
                state.link_down_at = None;
                state.attached = false;
            }
        }
        state.attached
    }
}

pub struct SimChannel(Sim);

impl ControlChannel for SimChannel {
    fn publish(&mut self, topic: &str, payload: &[u8], qos: Qos, retain: bool) -> anyhow::Result<()> {
        self.0.0.borrow_mut().published.push(Published {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
            retain,
        });
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> anyhow::Result<()> {
        self.0.0.borrow_mut().subscribed.push(topic.to_string());
        Ok(())
    }
}

impl ControlConnector for Sim {
    type Channel = SimChannel;

    fn start(&mut self, _record: &ConfigurationRecord, _identity: &DeviceIdentity) -> anyhow::Result<SimChannel> {
        self.0.borrow_mut().control_starts += 1;
        Ok(SimChannel(self.clone()))
    }
}

impl Sampler for Sim {
    fn battery_volts(&mut self) -> Result<f32, AcquisitionError> {
        self.0.borrow().battery.unwrap_or(Err(AcquisitionError::Unavailable))
    }

    fn moisture_raw(&mut self) -> Result<u16, AcquisitionError> {
        let mut state = self.0.borrow_mut();
        state.moisture_reads += 1;
        state.moisture.unwrap_or(Err(AcquisitionError::Unavailable))
    }
}

impl Suspender for Sim {
    fn suspend(&mut self, duration: Duration) {
        self.0.borrow_mut().suspended = Some(duration);
    }
}

pub type SimCycle<'a> = DutyCycle<&'a mut MemoryBlobStore, Sim, Sim, Sim, Sim, Sim, Sim>;

pub fn provisioned() -> ConfigurationRecord {
    ConfigurationRecord {
        wifi_ssid: "garden".try_into().unwrap(),
        wifi_pass: "hunter22".try_into().unwrap(),
        mqtt_host: "broker.lan".try_into().unwrap(),
        ..Default::default()
    }
}

/// Blob store already holding `record`.
pub fn backend_with(record: &ConfigurationRecord) -> MemoryBlobStore {
    let mut backend = MemoryBlobStore::new();
    ConfigStore::new(&mut backend).save(record).unwrap();
    backend
}

pub fn cycle<'a>(backend: &'a mut MemoryBlobStore, sim: &Sim) -> SimCycle<'a> {
    let board = Board {
        network: sim.clone(),
        connector: sim.clone(),
        events: sim.clone(),
        sampler: sim.clone(),
        clock: sim.clone(),
        suspender: sim.clone(),
    };
    DutyCycle::new(ConfigStore::new(backend), DeviceIdentity::from_mac(MAC), board)
}
