// Hardware Abstraction Module
// Every external collaborator of the controller sits behind one of these
// traits. The ESP-IDF implementations live in `esp`, the in-memory ones in `sim`.

use anyhow::Result;

use crate::provisioning::PairingResponse;
pub use crate::storage::Storage;

/// Wireless radio in station or access-point role
pub trait NetworkLink {
    fn start_station(&mut self, ssid: &str, password: &str, hostname: &str) -> Result<()>;
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<()>;
    /// Station associated and holding an address
    fn is_connected(&mut self) -> bool;
    fn mac_address(&self) -> [u8; 6];
}

/// Connection parameters for one broker session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokerSession<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub user: &'a str,
    pub password: &'a str,
}

/// A message delivered by the broker on a subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe client
pub trait BrokerTransport {
    fn connect(&mut self, session: &BrokerSession<'_>) -> Result<()>;
    fn is_connected(&self) -> bool;
    /// Number of sessions established so far. A change means the broker
    /// forgot our subscriptions and they have to be renewed.
    fn session_generation(&self) -> u32;
    fn subscribe(&mut self, topic: &str) -> Result<()>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
    fn disconnect(&mut self);
    /// Transport pump: next pending delivery, if any
    fn poll(&mut self) -> Option<InboundMessage>;
}

/// Local byte-stream transport to the serial host
pub trait SerialLink {
    /// Non-blocking; `None` when no byte is waiting
    fn read_byte(&mut self) -> Option<u8>;
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

pub trait StatusIndicator {
    fn set(&mut self, on: bool);
}

pub trait ButtonInput {
    /// True while the contact is closed (line pulled low)
    fn is_pressed(&mut self) -> bool;
    /// Consume the edge flag raised by the interrupt handler
    fn take_edge(&mut self) -> bool;
}

/// Local pairing endpoint served while in pairing mode
pub trait PairingEndpoint {
    fn start(&mut self, path: &str) -> Result<()>;
    /// Next pending request body. Bodies that are not JSON arrive as `Null`.
    fn next_request(&mut self) -> Option<serde_json::Value>;
    fn respond(&mut self, response: &PairingResponse) -> Result<()>;
}

pub trait SystemControl {
    /// Request a full restart. On the device this does not return.
    fn restart(&mut self);
}

/// Bundles one concrete type per collaborator
pub trait Platform {
    type Storage: Storage;
    type Link: NetworkLink;
    type Broker: BrokerTransport;
    type Serial: SerialLink;
    type Indicator: StatusIndicator;
    type Button: ButtonInput;
    type Pairing: PairingEndpoint;
    type System: SystemControl;
}

/// One instance of each collaborator, handed to the controller at boot
pub struct Board<P: Platform> {
    pub storage: P::Storage,
    pub link: P::Link,
    pub broker: P::Broker,
    pub serial: P::Serial,
    pub indicator: P::Indicator,
    pub button: P::Button,
    pub pairing: P::Pairing,
    pub system: P::System,
}
