#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::mpsc;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::gpio::OutputPin;
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
    use log::info;

    use soil_node::esp::adc::{OneshotChannel, OneshotUnit, BATTERY_CHANNEL, MOISTURE_CHANNEL};
    use soil_node::esp::mqtt::MqttConnector;
    use soil_node::esp::nvs::NvsBlobStore;
    use soil_node::esp::power::GpioRail;
    use soil_node::esp::wifi::StationNetwork;
    use soil_node::esp::{self, DeepSleep, EspClock};
    use soil_node::sensor::Sensors;
    use soil_node::{Board, BootOutcome, ConfigStore, DeviceIdentity, DutyCycle};

    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    info!("Starting soil-node {}", soil_node::constants::FIRMWARE_VERSION);

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let identity = DeviceIdentity::from_mac(esp::read_station_mac()?);
    let store = ConfigStore::new(NvsBlobStore::open(nvs.clone()));
    let wifi = BlockingWifi::wrap(EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?, sys_loop)?;

    let adc1 = OneshotUnit::adc1();
    let sensors = Sensors::new(
        OneshotChannel::new(adc1.clone(), MOISTURE_CHANNEL),
        OneshotChannel::new(adc1, BATTERY_CHANNEL),
        GpioRail::new(peripherals.pins.gpio4.downgrade_output())?,
        FreeRtos,
    );

    let (events_tx, events_rx) = mpsc::channel();
    let board = Board {
        network: StationNetwork::new(wifi),
        connector: MqttConnector::new(events_tx),
        events: events_rx,
        sampler: sensors,
        clock: EspClock,
        suspender: DeepSleep,
    };

    let mut cycle = DutyCycle::new(store, identity.clone(), board);
    match cycle.run() {
        BootOutcome::Provisioning => {
            let (store, board) = cycle.into_parts();
            esp::portal::serve(board.network.into_inner(), store, &identity)
        }
        BootOutcome::Suspended(_) => Ok(()),
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("soil-node is ESP-IDF firmware; run the library tests on the host instead");
}
