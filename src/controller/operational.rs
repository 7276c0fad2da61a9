// Operational Mode
// Station mode, broker session upkeep and the serial relay.
// Connectivity faults are never fatal: they show up in the status code and
// the indicator cadence, and the next health check retries.

use log::{debug, info, warn};

use super::{Core, ModeBehavior, TaskKind};
use crate::hal::{BrokerSession, BrokerTransport, NetworkLink, Platform};
use crate::led_manager;
use crate::relay::{forward_to_broker, forward_to_serial};
use crate::scheduler::{Iterations, Scheduler, TaskId};
use crate::system_state::{LinkPhase, ModeKind, ModeState};

pub struct OperationalMode {
    check_connection: Option<TaskId>,
    station_started: bool,
    /// Broker session our subscription belongs to
    subscribed_session: Option<u32>,
}

impl OperationalMode {
    pub fn new() -> Self {
        Self {
            check_connection: None,
            station_started: false,
            subscribed_session: None,
        }
    }

    fn start_station<P: Platform>(&mut self, core: &mut Core<P>) {
        info!("📶 Joining network '{}'", core.config.network_name);
        match core.link.start_station(
            &core.config.network_name,
            &core.config.network_credential,
            &core.device_id,
        ) {
            Ok(()) => self.station_started = true,
            Err(e) => warn!("⚠️ Station start failed: {:?}", e),
        }
    }

    fn phase<P: Platform>(core: &Core<P>) -> LinkPhase {
        match core.state() {
            ModeState::Operational(phase) => phase,
            _ => LinkPhase::NoLink,
        }
    }

    /// Walk the connectivity ladder one step per check
    fn health_check<P: Platform>(
        &mut self,
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
    ) {
        let current = Self::phase(core);
        if !self.station_started {
            self.start_station(core);
        }

        let phase = if !core.link.is_connected() {
            if core.broker.is_connected() {
                info!("🔌 Network lost - dropping broker connection");
                core.broker.disconnect();
            }
            LinkPhase::NoLink
        } else if !core.broker.is_connected() {
            self.connect_broker(core)
        } else if current != LinkPhase::Ready
            || self.subscribed_session != Some(core.broker.session_generation())
        {
            if current == LinkPhase::Ready {
                info!("🔁 Broker session renewed - subscribing again");
            }
            self.subscribe(core)
        } else {
            LinkPhase::Ready
        };

        debug!("🩺 Health check: {:?} -> {:?}", current, phase);
        core.set_state(ModeState::Operational(phase));
        Self::update_indicator(core, scheduler, phase);
    }

    fn connect_broker<P: Platform>(&mut self, core: &mut Core<P>) -> LinkPhase {
        let session = BrokerSession {
            host: &core.config.broker_host,
            port: core.settings.broker_port,
            client_id: &core.device_id,
            user: &core.config.broker_user,
            password: &core.config.broker_credential,
        };
        info!(
            "📡 Connecting to broker {}:{} as '{}'",
            session.host, session.port, session.client_id
        );

        match core.broker.connect(&session) {
            Ok(()) => self.subscribe(core),
            Err(e) => {
                warn!("⚠️ Broker connection failed: {:?}", e);
                LinkPhase::NoBroker
            }
        }
    }

    fn subscribe<P: Platform>(&mut self, core: &mut Core<P>) -> LinkPhase {
        match core.broker.subscribe(&core.config.inbound_topic) {
            Ok(()) => {
                self.subscribed_session = Some(core.broker.session_generation());
                info!("✅ Subscribed to '{}'", core.config.inbound_topic);
                LinkPhase::Ready
            }
            Err(e) => {
                warn!(
                    "⚠️ Subscription to '{}' failed: {:?}",
                    core.config.inbound_topic, e
                );
                LinkPhase::NoSubscription
            }
        }
    }

    fn update_indicator<P: Platform>(
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
        phase: LinkPhase,
    ) {
        let blink = core.tasks.blink;
        let interval = match phase {
            LinkPhase::Ready => {
                scheduler.disable(blink, core);
                led_manager::solid_on(&mut core.indicator);
                return;
            }
            LinkPhase::NoLink => core.settings.no_link_blink_interval_ms,
            LinkPhase::NoBroker | LinkPhase::NoSubscription => {
                core.settings.no_broker_blink_interval_ms
            }
        };

        if scheduler.interval(blink) != interval {
            scheduler.set_interval(blink, interval);
        }
        scheduler.enable_if_not(blink, core);
    }
}

impl Default for OperationalMode {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> ModeBehavior<P> for OperationalMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Operational
    }

    fn setup(&mut self, core: &mut Core<P>, scheduler: &mut Scheduler<TaskKind>) {
        led_manager::off(&mut core.indicator);
        info!("⚙️ Stored parameters: {}", core.config.summary());

        let check = scheduler.add(
            TaskKind::CheckConnection,
            core.settings.health_check_interval_ms,
            Iterations::Forever,
        );
        self.check_connection = Some(check);
        let first_check = core.settings.first_health_check_delay_ms;
        scheduler.enable_delayed(check, first_check, core);

        core.set_state(ModeState::Operational(LinkPhase::NoLink));
        Self::update_indicator(core, scheduler, LinkPhase::NoLink);

        // Retried from the health check when this fails
        self.start_station(core);
    }

    fn poll(&mut self, core: &mut Core<P>, _scheduler: &mut Scheduler<TaskKind>) {
        for _ in 0..core.settings.inbound_batch_limit {
            let Some(message) = core.broker.poll() else {
                break;
            };
            forward_to_serial(&mut core.serial, &message.topic, &message.payload);
        }
    }

    fn handle_passthrough(&mut self, core: &mut Core<P>, payload: &[u8]) {
        forward_to_broker(&mut core.broker, &core.config.outbound_topic, payload);
    }

    fn run_task(
        &mut self,
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
        kind: TaskKind,
        _run_counter: u32,
    ) {
        if kind == TaskKind::CheckConnection {
            self.health_check(core, scheduler);
        }
    }
}
