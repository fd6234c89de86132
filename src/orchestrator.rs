//! The wake / measure / publish / sleep state machine.
//!
//! Transport callbacks never touch state directly. They are turned into [`ChannelEvent`]s
//! and consumed here, one at a time, whenever the cycle waits: during the settle window,
//! the publish flush window and while staying awake. Inbound commands therefore never run
//! concurrently with a measurement.

use core::fmt;
use core::time::Duration;

use log::{debug, error, info, warn};

use crate::constants::*;
use crate::identity::DeviceIdentity;
use crate::platform::{ChannelEvent, Clock, ControlChannel, ControlConnector, EventSource, Network, Qos, Suspender};
use crate::protocol::{self, Command, CommandTopic, StateUpdate, Topics};
use crate::sensor::Sampler;
use crate::store::{BlobStore, ConfigStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Boot,
    Provisioning,
    NetworkConnecting,
    ControlConnecting,
    Settling,
    Measuring,
    Publishing,
    Suspending,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Boot => "BOOT",
            NodeState::Provisioning => "PROVISIONING",
            NodeState::NetworkConnecting => "NETWORK_CONNECTING",
            NodeState::ControlConnecting => "CONTROL_CONNECTING",
            NodeState::Settling => "SETTLING",
            NodeState::Measuring => "MEASURING",
            NodeState::Publishing => "PUBLISHING",
            NodeState::Suspending => "SUSPENDING",
        };
        f.write_str(name)
    }
}

/// How a boot ended. On hardware only `Provisioning` is ever observed, since deep sleep
/// does not return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootOutcome {
    /// No usable configuration; the provisioning portal must take over.
    Provisioning,
    /// The node suspended for the given duration.
    Suspended(Duration),
}

/// Board services the duty cycle drives.
pub struct Board<N, C, E, S, K, P> {
    pub network: N,
    pub connector: C,
    pub events: E,
    pub sampler: S,
    pub clock: K,
    pub suspender: P,
}

pub struct DutyCycle<B, N, C, E, S, K, P> {
    store: ConfigStore<B>,
    identity: DeviceIdentity,
    topics: Topics,
    board: Board<N, C, E, S, K, P>,
    state: NodeState,
    woke_at: Duration,
}

#[derive(Debug, Default)]
struct Readings {
    battery_volts: Option<f32>,
    moisture_raw: Option<u16>,
}

impl<B, N, C, E, S, K, P> DutyCycle<B, N, C, E, S, K, P>
where
    B: BlobStore,
    N: Network,
    C: ControlConnector,
    E: EventSource,
    S: Sampler,
    K: Clock,
    P: Suspender,
{
    pub fn new(store: ConfigStore<B>, identity: DeviceIdentity, board: Board<N, C, E, S, K, P>) -> Self {
        let topics = Topics::new(&identity);
        Self {
            store,
            identity,
            topics,
            board,
            state: NodeState::Boot,
            woke_at: Duration::ZERO,
        }
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn store(&self) -> &ConfigStore<B> {
        &self.store
    }

    /// Hands store and board back, e.g. to the provisioning portal.
    pub fn into_parts(self) -> (ConfigStore<B>, Board<N, C, E, S, K, P>) {
        (self.store, self.board)
    }

    /// Runs one boot from load to suspension.
    pub fn run(&mut self) -> BootOutcome {
        self.woke_at = self.board.clock.uptime();
        self.enter(NodeState::Boot);

        let record = self.store.load();
        if !self.store.is_valid() {
            error!("Configuration storage unavailable, starting provisioning");
            self.enter(NodeState::Provisioning);
            return BootOutcome::Provisioning;
        }
        if !record.has_network_credentials() {
            info!("Device not provisioned, starting provisioning");
            self.enter(NodeState::Provisioning);
            return BootOutcome::Provisioning;
        }
        info!("Device id {}, firmware {}", self.identity, FIRMWARE_VERSION);

        if !self.attach_network() {
            return self.suspend();
        }
        let Some(mut channel) = self.start_control() else {
            return self.suspend();
        };

        self.enter(NodeState::Settling);
        self.service(&mut channel, CONTROL_SETTLE, false);

        loop {
            self.enter(NodeState::Measuring);
            let readings = self.measure();

            self.enter(NodeState::Publishing);
            let updates = protocol::reading_updates(readings.battery_volts, readings.moisture_raw, &self.store.get());
            for update in &updates {
                self.publish(&mut channel, update);
            }
            self.service(&mut channel, PUBLISH_FLUSH, false);

            if self.store.get().sleep_duration().is_some() {
                return self.suspend();
            }

            info!("Sleep interval is 0, staying awake");
            self.service(&mut channel, AWAKE_REFRESH, true);
            if self.store.get().sleep_duration().is_some() {
                return self.suspend();
            }
        }
    }

    fn enter(&mut self, state: NodeState) {
        if self.state != state || state == NodeState::Boot {
            info!("State: {} -> {}", self.state, state);
        }
        self.state = state;
    }

    fn budget_exhausted(&self) -> bool {
        self.store.get().sleep_interval != 0 && self.board.clock.uptime().saturating_sub(self.woke_at) >= AWAKE_BUDGET
    }

    /// Retries until the link is up. Gives up only once the awake budget is spent.
    fn attach_network(&mut self) -> bool {
        let resume = self.state;
        self.enter(NodeState::NetworkConnecting);
        loop {
            let record = self.store.get();
            match self.board.network.attach(&record) {
                Ok(()) => {
                    info!("Network attached");
                    if resume != NodeState::Boot {
                        self.enter(resume);
                    }
                    return true;
                }
                Err(e) => warn!("Network attach failed: {:#}", e),
            }
            if self.budget_exhausted() {
                error!("Awake budget spent while attaching network");
                return false;
            }
            self.board.clock.sleep(NETWORK_RETRY_DELAY);
        }
    }

    /// Starts the messaging session. A broker host carrying a scheme is a configuration
    /// error: the cycle stalls here instead of attempting a malformed connection.
    fn start_control(&mut self) -> Option<C::Channel> {
        self.enter(NodeState::ControlConnecting);
        loop {
            if !self.board.network.is_attached() {
                warn!("Link lost before control channel start");
                if !self.attach_network() {
                    return None;
                }
            }

            let record = self.store.get();
            match record.broker_host() {
                Ok(host) => {
                    info!("Starting control channel to {}:{}", host, record.mqtt_port);
                    match self.board.connector.start(&record, &self.identity) {
                        Ok(channel) => return Some(channel),
                        Err(e) => warn!("Control channel start failed: {:#}", e),
                    }
                }
                Err(e) => error!("Refusing to start control channel: {}", e),
            }

            if self.budget_exhausted() {
                error!("Awake budget spent in {}", NodeState::ControlConnecting);
                return None;
            }
            self.board.clock.sleep(CONTROL_RETRY_DELAY);
        }
    }

    /// Services inbound events for `window`, re-attaching the network on link loss.
    /// With `until_sleep_set` the window ends early once a non-zero interval is stored.
    fn service(&mut self, channel: &mut C::Channel, window: Duration, until_sleep_set: bool) {
        let deadline = self.board.clock.uptime() + window;
        loop {
            let now = self.board.clock.uptime();
            if now >= deadline {
                return;
            }
            if let Some(event) = self.board.events.next_event(deadline - now) {
                self.on_event(channel, event);
                if until_sleep_set && self.store.get().sleep_interval != 0 {
                    return;
                }
            }
            if !self.board.network.is_attached() {
                warn!("Link lost in {}, re-attaching", self.state);
                if !self.attach_network() {
                    return;
                }
            }
        }
    }

    fn on_event(&mut self, channel: &mut C::Channel, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                info!("Control channel connected");
                self.announce(channel);
            }
            ChannelEvent::Disconnected => {
                warn!("Control channel disconnected, waiting for reconnect");
            }
            ChannelEvent::Message { topic, payload } => self.on_message(channel, &topic, &payload),
        }
    }

    /// Connect-time burst: discovery, subscriptions, then retained calibration state.
    fn announce(&mut self, channel: &mut C::Channel) {
        for announcement in protocol::announcements(&self.topics, &self.identity) {
            if let Err(e) = channel.publish(&announcement.topic, announcement.payload.as_bytes(), Qos::AtLeastOnce, true) {
                error!("Failed to publish discovery {}: {:#}", announcement.topic, e);
            }
        }
        for command in CommandTopic::ALL {
            let topic = self.topics.command(command);
            if let Err(e) = channel.subscribe(&topic) {
                error!("Failed to subscribe to {}: {:#}", topic, e);
            }
        }
        for update in protocol::retained_state(&self.store.get()) {
            self.publish(channel, &update);
        }
    }

    fn on_message(&mut self, channel: &mut C::Channel, topic: &str, payload: &[u8]) {
        let Some(command_topic) = self.topics.classify(topic) else {
            debug!("Ignoring message on {}", topic);
            return;
        };
        let command = match Command::parse(command_topic, payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Dropping command on {}: {}", topic, e);
                return;
            }
        };
        match protocol::apply(command, &mut self.store, &mut self.board.sampler) {
            Ok(updates) => {
                for update in &updates {
                    self.publish(channel, update);
                }
            }
            Err(e) => warn!("Rejected {}: {}", command.name(), e),
        }
    }

    fn measure(&mut self) -> Readings {
        let mut readings = Readings::default();
        match self.board.sampler.battery_volts() {
            Ok(v) => readings.battery_volts = Some(v),
            Err(e) => warn!("Battery reading unavailable: {}", e),
        }
        match self.board.sampler.moisture_raw() {
            Ok(raw) => readings.moisture_raw = Some(raw),
            Err(e) => warn!("Moisture reading unavailable: {}", e),
        }
        readings
    }

    fn publish(&self, channel: &mut C::Channel, update: &StateUpdate) {
        let topic = self.topics.state(update.topic);
        let (qos, retain) = if update.retained() {
            (Qos::AtLeastOnce, true)
        } else {
            (Qos::AtMostOnce, false)
        };
        match channel.publish(&topic, update.payload.as_bytes(), qos, retain) {
            Ok(()) => info!("Published {} = {}", topic, update.payload),
            Err(e) => error!("Failed to publish {}: {:#}", topic, e),
        }
    }

    fn suspend(&mut self) -> BootOutcome {
        self.enter(NodeState::Suspending);
        let duration = self
            .store
            .get()
            .sleep_duration()
            .unwrap_or(Duration::from_secs(u64::from(DEFAULT_SLEEP_MINUTES) * 60));
        info!("Entering deep sleep for {} s", duration.as_secs());
        self.board.suspender.suspend(duration);
        BootOutcome::Suspended(duration)
    }
}
