// ESP-IDF platform
// Concrete peripherals behind the hal traits. Only built for espidf targets.

pub mod board;
pub mod mqtt;
pub mod pairing;
pub mod storage;
pub mod wifi;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::info;

use crate::device_info::read_factory_mac;
use crate::hal::{Board, Platform};

use board::{PairingButton, SerialPort, StatusLed, SystemReset};
use mqtt::EspMqttTransport;
use pairing::HttpPairingEndpoint;
use storage::NvsStorage;
use wifi::EspWifiLink;

pub struct EspPlatform;

impl Platform for EspPlatform {
    type Storage = NvsStorage;
    type Link = EspWifiLink;
    type Broker = EspMqttTransport;
    type Serial = SerialPort;
    type Indicator = StatusLed;
    type Button = PairingButton;
    type Pairing = HttpPairingEndpoint;
    type System = SystemReset;
}

/// Take the peripherals and bring up every driver the controller needs
pub fn take_board() -> Result<Board<EspPlatform>> {
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let storage = NvsStorage::new(nvs.clone())?;
    let mac = read_factory_mac()?;
    let link = EspWifiLink::new(peripherals.modem, sys_loop, nvs, mac)?;

    let board = Board {
        storage,
        link,
        broker: EspMqttTransport::new(),
        serial: SerialPort::new(peripherals.uart2, peripherals.pins.gpio17, peripherals.pins.gpio16)?,
        indicator: StatusLed::new(peripherals.pins.gpio2)?,
        button: PairingButton::new(peripherals.pins.gpio0)?,
        pairing: HttpPairingEndpoint::new(),
        system: SystemReset,
    };
    info!("✅ Board peripherals initialized");
    Ok(board)
}
