//! # relay-bridge
//!
//! Supervisory controller of a serial-to-MQTT bridge appliance.
//!
//! The device boots into one of two modes:
//! - **Pairing**: access point plus a local `/pair` endpoint that accepts
//!   network and broker parameters from the companion app.
//! - **Operational**: station mode, broker session upkeep and a line relay
//!   between the serial host and the broker topic pair.
//!
//! Everything above the [`hal`] traits is target independent and tested on
//! the host through `sim`. The ESP-IDF bindings live in `esp`.

pub mod button_monitor;
pub mod config;
pub mod config_storage;
pub mod controller;
pub mod device_info;
pub mod hal;
pub mod led_manager;
pub mod provisioning;
pub mod relay;
pub mod scheduler;
pub mod serial_protocol;
#[cfg(not(target_os = "espidf"))]
pub mod sim;
pub mod storage;
pub mod system_state;

#[cfg(target_os = "espidf")]
pub mod esp;

pub use config::ControllerConfig;
pub use config_storage::{ConfigStorage, Configuration};
pub use controller::{Controller, TaskKind};
pub use system_state::{DeviceStatus, LinkPhase, ModeKind, ModeState, PairingPhase, RestartReason};
