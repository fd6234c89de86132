mod common;

use std::time::Duration;

use common::*;
use soil_node::platform::{ChannelEvent, Qos};
use soil_node::record::ConfigurationRecord;
use soil_node::store::MemoryBlobStore;
use soil_node::{AcquisitionError, BootOutcome, ConfigStore, NodeState};

fn stored(backend: &mut MemoryBlobStore) -> ConfigurationRecord {
    ConfigStore::new(backend).load()
}

#[test]
fn fresh_device_goes_to_provisioning() {
    let mut backend = MemoryBlobStore::new();
    let sim = Sim::new();

    let mut cycle = cycle(&mut backend, &sim);
    assert_eq!(cycle.run(), BootOutcome::Provisioning);
    assert_eq!(cycle.state(), NodeState::Provisioning);
    drop(cycle);

    assert_eq!(sim.0.borrow().attach_attempts, 0);
    assert_eq!(sim.0.borrow().suspended, None);
    // defaults were persisted on the way
    assert_eq!(backend.write_count(), 1);
    assert_eq!(stored(&mut backend).sleep_interval, 5);
}

#[test]
fn unavailable_storage_goes_to_provisioning() {
    let mut backend = backend_with(&provisioned());
    backend.set_offline(true);
    let sim = Sim::new();

    assert_eq!(cycle(&mut backend, &sim).run(), BootOutcome::Provisioning);
    assert_eq!(sim.0.borrow().attach_attempts, 0);
}

#[test]
fn connect_burst_then_readings_then_sleep() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.at(0.5, ChannelEvent::Connected);

    let mut cycle = cycle(&mut backend, &sim);
    assert_eq!(cycle.run(), BootOutcome::Suspended(Duration::from_secs(300)));
    assert_eq!(cycle.state(), NodeState::Suspending);

    let state = sim.0.borrow();
    assert_eq!(state.suspended, Some(Duration::from_secs(300)));
    assert_eq!(state.control_starts, 1);
    assert_eq!(state.subscribed.len(), 7);
    assert!(state.subscribed.contains(&format!("{}/sleep_interval/set", BASE)));
    assert!(state.subscribed.contains(&format!("{}/cmd/soil_mark_dry", BASE)));

    let discovery: Vec<_> = state
        .published
        .iter()
        .filter(|p| p.topic.starts_with("homeassistant/"))
        .collect();
    assert_eq!(discovery.len(), 10);
    assert!(discovery.iter().all(|p| p.retain));

    // discovery first, readings last
    let first_reading = state
        .published
        .iter()
        .position(|p| p.topic.ends_with("/humidity"))
        .unwrap();
    let last_discovery = state
        .published
        .iter()
        .rposition(|p| p.topic.starts_with("homeassistant/"))
        .unwrap();
    assert!(last_discovery < first_reading);
    drop(state);

    assert_eq!(sim.payloads_on("sleep_interval"), ["5"]);
    assert_eq!(sim.payloads_on("batt_v_min"), ["3.20"]);
    assert_eq!(sim.payloads_on("batt_v_max"), ["4.20"]);
    assert_eq!(sim.payloads_on("soil_wet_raw"), ["1200"]);
    assert_eq!(sim.payloads_on("soil_dry_raw"), ["3200"]);
    assert!(sim.published_on("soil_dry_raw")[0].retain);

    let humidity = sim.published_on("humidity");
    assert_eq!(humidity.len(), 1);
    assert_eq!(humidity[0].payload, "50.0");
    assert!(!humidity[0].retain);
    assert_eq!(humidity[0].qos, Qos::AtMostOnce);
    assert_eq!(sim.payloads_on("battery"), ["3.70"]);
    assert_eq!(sim.payloads_on("battery_pct"), ["50"]);
}

#[test]
fn failed_battery_channel_skips_only_battery_topics() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().battery = Some(Err(AcquisitionError::ReadFailed(-1)));

    cycle(&mut backend, &sim).run();

    assert_eq!(sim.payloads_on("humidity"), ["50.0"]);
    assert!(sim.published_on("battery").is_empty());
    assert!(sim.published_on("battery_pct").is_empty());
    assert!(sim.0.borrow().suspended.is_some());
}

#[test]
fn failed_moisture_channel_still_publishes_battery() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().moisture = Some(Err(AcquisitionError::OutOfRange(5000)));

    cycle(&mut backend, &sim).run();

    assert!(sim.published_on("humidity").is_empty());
    assert_eq!(sim.payloads_on("battery"), ["3.70"]);
}

#[test]
fn command_during_settle_is_applied_before_sleep() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.at(0.2, ChannelEvent::Connected)
        .message(1.0, "sleep_interval/set", "45");

    let outcome = cycle(&mut backend, &sim).run();

    assert_eq!(outcome, BootOutcome::Suspended(Duration::from_secs(45 * 60)));
    assert_eq!(stored(&mut backend).sleep_interval, 45);
    assert_eq!(sim.payloads_on("sleep_interval"), ["5", "45"]);
    let echo = sim.published_on("sleep_interval").pop().unwrap();
    assert!(echo.retain);
    assert_eq!(echo.qos, Qos::AtLeastOnce);
}

#[test]
fn invalid_commands_are_dropped_without_state_change() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.at(0.2, ChannelEvent::Connected)
        .message(0.5, "set/batt_v_min", "4.20")
        .message(0.6, "set/batt_v_max", "6.0")
        .message(0.7, "sleep_interval/set", "soon")
        .message(0.8, "set/soil_wet_raw", "5000")
        .message(0.9, "unknown/topic", "1");

    cycle(&mut backend, &sim).run();

    assert_eq!(stored(&mut backend), provisioned());
    assert_eq!(sim.payloads_on("batt_v_min"), ["3.20"]);
    assert_eq!(sim.payloads_on("batt_v_max"), ["4.20"]);
    assert_eq!(sim.payloads_on("soil_wet_raw"), ["1200"]);
}

#[test]
fn bounds_are_checked_against_persisted_values_in_a_batch() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.at(0.2, ChannelEvent::Connected)
        .message(0.5, "set/batt_v_max", "3.60")
        .message(0.6, "set/batt_v_min", "3.60")
        .message(0.7, "set/batt_v_min", "3.59");

    cycle(&mut backend, &sim).run();

    let record = stored(&mut backend);
    assert_eq!(record.batt_v_max, 3.60);
    assert_eq!(record.batt_v_min, 3.59);
    assert_eq!(sim.payloads_on("batt_v_min"), ["3.20", "3.59"]);
}

#[test]
fn mark_wet_captures_bound_and_republishes_moisture() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().moisture = Some(Ok(1150));
    sim.at(0.2, ChannelEvent::Connected)
        .message(1.0, "cmd/soil_mark_wet", "1");

    cycle(&mut backend, &sim).run();

    assert_eq!(stored(&mut backend).soil_wet_raw, 1150);
    assert_eq!(sim.payloads_on("soil_wet_raw"), ["1200", "1150"]);
    // one republish from the command, one from the regular measurement
    assert_eq!(sim.payloads_on("humidity"), ["100.0", "100.0"]);
    assert_eq!(sim.0.borrow().moisture_reads, 2);
}

#[test]
fn network_attach_is_retried() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().failing_attaches = 2;

    let outcome = cycle(&mut backend, &sim).run();

    assert_eq!(outcome, BootOutcome::Suspended(Duration::from_secs(300)));
    let state = sim.0.borrow();
    assert_eq!(state.attach_attempts, 3);
    assert_eq!(state.control_starts, 1);
}

#[test]
fn unreachable_network_suspends_after_awake_budget() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().failing_attaches = u32::MAX;

    let outcome = cycle(&mut backend, &sim).run();

    assert_eq!(outcome, BootOutcome::Suspended(Duration::from_secs(300)));
    let state = sim.0.borrow();
    assert_eq!(state.control_starts, 0);
    assert!(state.now >= Duration::from_secs(120));
    assert!(state.published.is_empty());
}

#[test]
fn scheme_prefixed_broker_never_starts_control_channel() {
    let mut record = provisioned();
    record.mqtt_host = "mqtt://broker.lan".try_into().unwrap();
    let mut backend = backend_with(&record);
    let sim = Sim::new();

    let outcome = cycle(&mut backend, &sim).run();

    assert_eq!(outcome, BootOutcome::Suspended(Duration::from_secs(300)));
    let state = sim.0.borrow();
    assert_eq!(state.attach_attempts, 1);
    assert_eq!(state.control_starts, 0);
    assert!(state.now >= Duration::from_secs(120));
}

#[test]
fn link_loss_while_settling_reattaches() {
    let mut backend = backend_with(&provisioned());
    let sim = Sim::new();
    sim.0.borrow_mut().link_down_at = Some(Duration::from_secs(1));
    sim.at(0.2, ChannelEvent::Connected)
        .at(1.5, ChannelEvent::Disconnected)
        .at(2.0, ChannelEvent::Connected);

    let outcome = cycle(&mut backend, &sim).run();

    assert!(matches!(outcome, BootOutcome::Suspended(_)));
    assert_eq!(sim.0.borrow().attach_attempts, 2);
    // the burst repeats on every reconnect
    assert_eq!(sim.payloads_on("sleep_interval"), ["5", "5"]);
    assert_eq!(sim.payloads_on("humidity"), ["50.0"]);
}

#[test]
fn zero_interval_stays_awake_until_interval_is_set() {
    let mut record = provisioned();
    record.sleep_interval = 0;
    let mut backend = backend_with(&record);
    let sim = Sim::new();
    sim.at(0.2, ChannelEvent::Connected)
        .message(90.0, "sleep_interval/set", "10");

    let outcome = cycle(&mut backend, &sim).run();

    assert_eq!(outcome, BootOutcome::Suspended(Duration::from_secs(600)));
    // measured on entry and again after one refresh period
    assert_eq!(sim.payloads_on("humidity"), ["50.0", "50.0"]);
    assert_eq!(sim.payloads_on("sleep_interval"), ["0", "10"]);
    let state = sim.0.borrow();
    assert_eq!(state.now, Duration::from_secs(90));
    assert_eq!(state.suspended, Some(Duration::from_secs(600)));
}
