//! Shared test rig: a controller over the simulation platform plus a
//! millisecond clock advanced in control-loop sized steps.

#![allow(dead_code)]

use relay_bridge::config::LOOP_IDLE_MS;
use relay_bridge::config_storage::fit_text;
use relay_bridge::sim::{SimHandles, SimPlatform};
use relay_bridge::{Configuration, Controller, ControllerConfig};

pub struct Rig {
    pub sim: SimHandles,
    pub controller: Controller<SimPlatform>,
    pub now: u64,
}

impl Rig {
    /// Fresh board, factory-blank storage
    pub fn fresh() -> Self {
        Self::boot(SimHandles::new())
    }

    /// Board whose storage already holds `config`
    pub fn with_config(config: &Configuration) -> Self {
        let sim = SimHandles::new();
        sim.storage.preload(0, &config.encode()).unwrap();
        Self::boot(sim)
    }

    pub fn boot(sim: SimHandles) -> Self {
        let mut controller = Controller::new(sim.board(), ControllerConfig::default());
        controller.start(0);
        Self {
            sim,
            controller,
            now: 0,
        }
    }

    /// Power-cycle the board and boot a new controller at the current time
    pub fn reboot(&mut self) {
        self.sim = self.sim.reboot();
        self.controller = Controller::new(self.sim.board(), ControllerConfig::default());
        self.controller.start(self.now);
    }

    pub fn tick(&mut self) {
        self.controller.tick(self.now);
    }

    /// Jump the clock to `at_ms` and run one tick there
    pub fn tick_at(&mut self, at_ms: u64) {
        self.now = at_ms;
        self.controller.tick(at_ms);
    }

    /// Run the loop for `ms`, one tick per loop period
    pub fn advance(&mut self, ms: u64) {
        let until = self.now + ms;
        while self.now < until {
            self.now = (self.now + LOOP_IDLE_MS).min(until);
            self.controller.tick(self.now);
        }
    }

    /// Configuration currently in the committed storage image
    pub fn stored_config(&self) -> Configuration {
        Configuration::decode(&self.sim.storage.committed())
    }
}

/// A fully provisioned device configuration
pub fn configured() -> Configuration {
    Configuration {
        configured: true,
        network_name: fit_text("lab").unwrap(),
        network_credential: fit_text("secret").unwrap(),
        broker_host: fit_text("broker.local").unwrap(),
        broker_user: fit_text("dev").unwrap(),
        broker_credential: fit_text("pw").unwrap(),
        inbound_topic: fit_text("dev/in").unwrap(),
        outbound_topic: fit_text("dev/out").unwrap(),
        ..Configuration::initialize()
    }
}

/// Configured device with network and broker both available, run until the
/// first health check has brought it to Ready
pub fn ready_rig() -> Rig {
    let sim = SimHandles::new();
    sim.storage.preload(0, &configured().encode()).unwrap();
    sim.link.set_connected(true);
    sim.broker.set_reachable(true);
    sim.broker.set_subscribe_accepts(true);

    let mut rig = Rig::boot(sim);
    rig.advance(5_000);
    rig
}

/// Valid pairing request body
pub fn pairing_request() -> serde_json::Value {
    serde_json::json!({
        "networkSsid": "lab",
        "networkPassword": "secret",
        "mqttHostName": "broker.local",
        "mqttUserName": "dev",
        "mqttUserPassword": "pw",
        "subscribeTopic": "A",
        "publishTopic": "B"
    })
}
