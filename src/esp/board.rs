// Board peripherals: status LED, pairing button, serial port, restart

use anyhow::Result;
use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::{
    AnyIOPin, Gpio0, Gpio16, Gpio17, Gpio2, Input, InterruptType, Output, PinDriver, Pull,
};
use esp_idf_svc::hal::uart::{config::Config as UartConfig, UartDriver, UART2};
use esp_idf_svc::hal::units::Hertz;
use log::{info, warn};

use crate::button_monitor::EdgeFlag;
use crate::config::{
    PAIRING_BUTTON_GPIO, SERIAL_BAUDRATE, SERIAL_RX_GPIO, SERIAL_TX_GPIO, STATUS_LED_ACTIVE_LOW,
    STATUS_LED_GPIO,
};
use crate::hal::{ButtonInput, SerialLink, StatusIndicator, SystemControl};

// Interrupt-to-loop slot; exists before the interrupt is armed
pub static BUTTON_EDGE: EdgeFlag = EdgeFlag::new();

pub struct StatusLed {
    pin: PinDriver<'static, Gpio2, Output>,
}

impl StatusLed {
    pub fn new(gpio: Gpio2) -> Result<Self> {
        let mut led = Self {
            pin: PinDriver::output(gpio)?,
        };
        led.set(false);
        info!("💡 Status LED on GPIO{}", STATUS_LED_GPIO);
        Ok(led)
    }
}

impl StatusIndicator for StatusLed {
    fn set(&mut self, on: bool) {
        let high = on != STATUS_LED_ACTIVE_LOW;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("⚠️ Status LED write failed: {:?}", e);
        }
    }
}

pub struct PairingButton {
    pin: PinDriver<'static, Gpio0, Input>,
}

impl PairingButton {
    pub fn new(gpio: Gpio0) -> Result<Self> {
        // Pull-up means a press reads as LOW
        let mut pin = PinDriver::input(gpio)?;
        pin.set_pull(Pull::Up)?;
        pin.set_interrupt_type(InterruptType::AnyEdge)?;

        // SAFETY: the callback only stores to an atomic flag
        unsafe {
            pin.subscribe(|| BUTTON_EDGE.notify())?;
        }
        pin.enable_interrupt()?;

        info!("🔘 Pairing button on GPIO{} (any-edge interrupt)", PAIRING_BUTTON_GPIO);
        Ok(Self { pin })
    }
}

impl ButtonInput for PairingButton {
    fn is_pressed(&mut self) -> bool {
        self.pin.is_low()
    }

    fn take_edge(&mut self) -> bool {
        let edge = BUTTON_EDGE.take();
        if edge {
            // The driver disarms the interrupt after each notification
            if let Err(e) = self.pin.enable_interrupt() {
                warn!("⚠️ Failed to re-arm button interrupt: {:?}", e);
            }
        }
        edge
    }
}

pub struct SerialPort {
    uart: UartDriver<'static>,
}

impl SerialPort {
    pub fn new(uart: UART2, tx: Gpio17, rx: Gpio16) -> Result<Self> {
        let config = UartConfig::default().baudrate(Hertz(SERIAL_BAUDRATE));
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        info!(
            "🔌 Serial link on UART2 (TX GPIO{}, RX GPIO{}) at {} baud",
            SERIAL_TX_GPIO, SERIAL_RX_GPIO, SERIAL_BAUDRATE
        );
        Ok(Self { uart })
    }
}

impl SerialLink for SerialPort {
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.uart.read(&mut byte, NON_BLOCK) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            written += self.uart.write(&data[written..])?;
        }
        Ok(())
    }
}

pub struct SystemReset;

impl SystemControl for SystemReset {
    fn restart(&mut self) {
        info!("🔄 Restarting now");
        esp_idf_svc::hal::reset::restart();
    }
}
