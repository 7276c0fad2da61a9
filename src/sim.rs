// Simulation Platform
// In-memory implementations of every hardware trait. Each handle is a cheap
// clone sharing one state cell, so a test keeps a handle while the
// controller owns another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use log::debug;

use crate::hal::{
    Board, BrokerSession, BrokerTransport, ButtonInput, InboundMessage, NetworkLink,
    PairingEndpoint, Platform, SerialLink, StatusIndicator, SystemControl,
};
use crate::provisioning::PairingResponse;
use crate::storage::{MemoryStorage, Storage, StorageError};

pub const SIM_STORAGE_CAPACITY: usize = 512;
pub const SIM_MAC: [u8; 6] = [0x24, 0x0a, 0xc4, 0x12, 0x34, 0x56];

/// Storage region that survives controller restarts
#[derive(Clone)]
pub struct SimStorage {
    inner: Rc<RefCell<MemoryStorage>>,
}

impl SimStorage {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(MemoryStorage::new(capacity))),
        }
    }

    pub fn committed(&self) -> Vec<u8> {
        self.inner.borrow().committed().to_vec()
    }

    pub fn commit_count(&self) -> u32 {
        self.inner.borrow().commit_count()
    }

    pub fn set_fail_commits(&self, fail: bool) {
        self.inner.borrow_mut().set_fail_commits(fail);
    }

    pub fn power_cycle(&self) {
        self.inner.borrow_mut().power_cycle();
    }

    /// Overwrite staged and committed bytes at `offset` without a commit
    pub fn preload(&self, offset: usize, bytes: &[u8]) -> Result<(), StorageError> {
        self.inner.borrow_mut().preload(offset, bytes)
    }
}

impl Storage for SimStorage {
    fn capacity(&self) -> usize {
        self.inner.borrow().capacity()
    }

    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        self.inner.borrow_mut().read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        self.inner.borrow_mut().write(offset, data)
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.inner.borrow_mut().commit()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRole {
    Idle,
    Station {
        ssid: String,
        password: String,
        hostname: String,
    },
    AccessPoint {
        ssid: String,
        password: String,
    },
}

struct LinkState {
    role: LinkRole,
    connected: bool,
    mac: [u8; 6],
    failing_starts: u32,
}

#[derive(Clone)]
pub struct SimLink {
    state: Rc<RefCell<LinkState>>,
}

impl SimLink {
    pub fn new(mac: [u8; 6]) -> Self {
        Self {
            state: Rc::new(RefCell::new(LinkState {
                role: LinkRole::Idle,
                connected: false,
                mac,
                failing_starts: 0,
            })),
        }
    }

    /// Whether a started station would currently be associated
    pub fn set_connected(&self, connected: bool) {
        self.state.borrow_mut().connected = connected;
    }

    pub fn role(&self) -> LinkRole {
        self.state.borrow().role.clone()
    }

    /// Make the next `count` radio start-ups fail, as a driver error would
    pub fn fail_next_starts(&self, count: u32) {
        self.state.borrow_mut().failing_starts = count;
    }

    fn start_attempt(&self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(anyhow!("radio start-up failed"));
        }
        Ok(())
    }
}

impl NetworkLink for SimLink {
    fn start_station(&mut self, ssid: &str, password: &str, hostname: &str) -> Result<()> {
        self.start_attempt()?;
        self.state.borrow_mut().role = LinkRole::Station {
            ssid: ssid.to_string(),
            password: password.to_string(),
            hostname: hostname.to_string(),
        };
        Ok(())
    }

    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<()> {
        self.start_attempt()?;
        self.state.borrow_mut().role = LinkRole::AccessPoint {
            ssid: ssid.to_string(),
            password: password.to_string(),
        };
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        let state = self.state.borrow();
        matches!(state.role, LinkRole::Station { .. }) && state.connected
    }

    fn mac_address(&self) -> [u8; 6] {
        self.state.borrow().mac
    }
}

/// Owned copy of the last session the controller opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub user: String,
    pub password: String,
}

struct BrokerState {
    reachable: bool,
    subscribe_accepts: bool,
    connected: bool,
    connect_attempts: u32,
    generation: u32,
    session: Option<SessionRecord>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    inbox: VecDeque<InboundMessage>,
}

#[derive(Clone)]
pub struct SimBroker {
    state: Rc<RefCell<BrokerState>>,
}

impl SimBroker {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(BrokerState {
                reachable: false,
                subscribe_accepts: false,
                connected: false,
                connect_attempts: 0,
                generation: 0,
                session: None,
                subscriptions: Vec::new(),
                published: Vec::new(),
                inbox: VecDeque::new(),
            })),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.borrow_mut().reachable = reachable;
    }

    pub fn set_subscribe_accepts(&self, accepts: bool) {
        self.state.borrow_mut().subscribe_accepts = accepts;
    }

    /// Broker side closes the connection
    pub fn drop_connection(&self) {
        self.state.borrow_mut().connected = false;
    }

    /// Session dropped and re-established by the client on its own, without
    /// a `connect` call. The broker starts the new session with no subscriptions.
    pub fn renew_session(&self) {
        let mut state = self.state.borrow_mut();
        state.connected = true;
        state.generation += 1;
        state.subscriptions.clear();
    }

    /// Queue a delivery for the next `poll`
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        self.state.borrow_mut().inbox.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.state.borrow().published.clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.borrow().subscriptions.clone()
    }

    pub fn session(&self) -> Option<SessionRecord> {
        self.state.borrow().session.clone()
    }

    pub fn connect_attempts(&self) -> u32 {
        self.state.borrow().connect_attempts
    }

    pub fn pending_deliveries(&self) -> usize {
        self.state.borrow().inbox.len()
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerTransport for SimBroker {
    fn connect(&mut self, session: &BrokerSession<'_>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.connect_attempts += 1;
        if !state.reachable {
            return Err(anyhow!("broker {}:{} unreachable", session.host, session.port));
        }
        state.connected = true;
        state.generation += 1;
        state.session = Some(SessionRecord {
            host: session.host.to_string(),
            port: session.port,
            client_id: session.client_id.to_string(),
            user: session.user.to_string(),
            password: session.password.to_string(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn session_generation(&self) -> u32 {
        self.state.borrow().generation
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(anyhow!("not connected"));
        }
        if !state.subscribe_accepts {
            return Err(anyhow!("subscription to '{}' refused", topic));
        }
        state.subscriptions.push(topic.to_string());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(anyhow!("not connected"));
        }
        state.published.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.subscriptions.clear();
    }

    fn poll(&mut self) -> Option<InboundMessage> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return None;
        }
        state.inbox.pop_front()
    }
}

#[derive(Default)]
struct SerialState {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct SimSerial {
    state: Rc<RefCell<SerialState>>,
}

impl SimSerial {
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.borrow_mut().input.extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        self.state.borrow().input.len()
    }

    /// Everything written since the last call
    pub fn take_output(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.borrow_mut().output)
    }

    pub fn take_output_text(&self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }
}

impl SerialLink for SimSerial {
    fn read_byte(&mut self) -> Option<u8> {
        self.state.borrow_mut().input.pop_front()
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.state.borrow_mut().output.extend_from_slice(data);
        Ok(())
    }
}

#[derive(Default)]
struct IndicatorState {
    on: bool,
    writes: Vec<bool>,
}

#[derive(Clone, Default)]
pub struct SimIndicator {
    state: Rc<RefCell<IndicatorState>>,
}

impl SimIndicator {
    pub fn is_on(&self) -> bool {
        self.state.borrow().on
    }

    /// Every level written, in order
    pub fn writes(&self) -> Vec<bool> {
        self.state.borrow().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.borrow_mut().writes.clear();
    }
}

impl StatusIndicator for SimIndicator {
    fn set(&mut self, on: bool) {
        let mut state = self.state.borrow_mut();
        state.on = on;
        state.writes.push(on);
    }
}

#[derive(Default)]
struct ButtonState {
    pressed: bool,
    edge: bool,
}

/// Button whose edges are raised by `press`/`release`, like the GPIO interrupt
#[derive(Clone, Default)]
pub struct SimButton {
    state: Rc<RefCell<ButtonState>>,
}

impl SimButton {
    pub fn press(&self) {
        let mut state = self.state.borrow_mut();
        state.pressed = true;
        state.edge = true;
    }

    pub fn release(&self) {
        let mut state = self.state.borrow_mut();
        state.pressed = false;
        state.edge = true;
    }
}

impl ButtonInput for SimButton {
    fn is_pressed(&mut self) -> bool {
        self.state.borrow().pressed
    }

    fn take_edge(&mut self) -> bool {
        std::mem::take(&mut self.state.borrow_mut().edge)
    }
}

#[derive(Default)]
struct PairingState {
    path: Option<String>,
    failing_starts: u32,
    requests: VecDeque<serde_json::Value>,
    responses: Vec<PairingResponse>,
}

#[derive(Clone, Default)]
pub struct SimPairing {
    state: Rc<RefCell<PairingState>>,
}

impl SimPairing {
    /// Queue a request body, as the HTTP server would on POST
    pub fn submit(&self, body: serde_json::Value) {
        self.state.borrow_mut().requests.push_back(body);
    }

    /// Make the next `count` endpoint start-ups fail
    pub fn fail_next_starts(&self, count: u32) {
        self.state.borrow_mut().failing_starts = count;
    }

    pub fn served_path(&self) -> Option<String> {
        self.state.borrow().path.clone()
    }

    pub fn responses(&self) -> Vec<PairingResponse> {
        self.state.borrow().responses.clone()
    }

    pub fn last_response(&self) -> Option<PairingResponse> {
        self.state.borrow().responses.last().cloned()
    }
}

impl PairingEndpoint for SimPairing {
    fn start(&mut self, path: &str) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failing_starts > 0 {
            state.failing_starts -= 1;
            return Err(anyhow!("could not bind pairing endpoint"));
        }
        state.path = Some(path.to_string());
        Ok(())
    }

    fn next_request(&mut self) -> Option<serde_json::Value> {
        let mut state = self.state.borrow_mut();
        state.path.as_ref()?;
        state.requests.pop_front()
    }

    fn respond(&mut self, response: &PairingResponse) -> Result<()> {
        debug!("📨 Pairing response {:?}", response);
        self.state.borrow_mut().responses.push(response.clone());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct SimSystem {
    restarts: Rc<RefCell<u32>>,
}

impl SimSystem {
    pub fn restart_count(&self) -> u32 {
        *self.restarts.borrow()
    }
}

impl SystemControl for SimSystem {
    fn restart(&mut self) {
        *self.restarts.borrow_mut() += 1;
    }
}

pub struct SimPlatform;

impl Platform for SimPlatform {
    type Storage = SimStorage;
    type Link = SimLink;
    type Broker = SimBroker;
    type Serial = SimSerial;
    type Indicator = SimIndicator;
    type Button = SimButton;
    type Pairing = SimPairing;
    type System = SimSystem;
}

/// One set of simulated peripherals. `board()` hands the controller its own
/// handles; a second `board()` after a restart is a reboot over the same state.
#[derive(Clone)]
pub struct SimHandles {
    pub storage: SimStorage,
    pub link: SimLink,
    pub broker: SimBroker,
    pub serial: SimSerial,
    pub indicator: SimIndicator,
    pub button: SimButton,
    pub pairing: SimPairing,
    pub system: SimSystem,
}

impl SimHandles {
    pub fn new() -> Self {
        Self {
            storage: SimStorage::new(SIM_STORAGE_CAPACITY),
            link: SimLink::new(SIM_MAC),
            broker: SimBroker::new(),
            serial: SimSerial::default(),
            indicator: SimIndicator::default(),
            button: SimButton::default(),
            pairing: SimPairing::default(),
            system: SimSystem::default(),
        }
    }

    pub fn board(&self) -> Board<SimPlatform> {
        Board {
            storage: self.storage.clone(),
            link: self.link.clone(),
            broker: self.broker.clone(),
            serial: self.serial.clone(),
            indicator: self.indicator.clone(),
            button: self.button.clone(),
            pairing: self.pairing.clone(),
            system: self.system.clone(),
        }
    }

    /// Peripherals as a reboot leaves them: radio idle, broker session
    /// gone, endpoint stopped. Storage keeps its committed image.
    pub fn reboot(&self) -> Self {
        self.storage.power_cycle();
        let broker = SimBroker::new();
        {
            let old = self.broker.state.borrow();
            broker.set_reachable(old.reachable);
            broker.set_subscribe_accepts(old.subscribe_accepts);
        }
        let link = SimLink::new(self.link.mac_address());
        link.set_connected(self.link.state.borrow().connected);
        Self {
            storage: self.storage.clone(),
            link,
            broker,
            serial: self.serial.clone(),
            indicator: SimIndicator::default(),
            button: SimButton::default(),
            pairing: SimPairing::default(),
            system: self.system.clone(),
        }
    }
}

impl Default for SimHandles {
    fn default() -> Self {
        Self::new()
    }
}
