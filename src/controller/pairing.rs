// Pairing Mode
// Access point named after the device plus the local pairing endpoint.
// An accepted request is held for a short commit window (the indicator blinks
// through it), then persisted by the commit task's deactivation hook.

use log::{info, warn};

use super::{Core, ModeBehavior, TaskKind};
use crate::config::PAIRING_HTTP_PATH;
use crate::hal::{NetworkLink, PairingEndpoint, Platform};
use crate::led_manager;
use crate::provisioning::{validate_request, PairingError, PairingResponse};
use crate::scheduler::{Iterations, Scheduler, TaskId};
use crate::system_state::{ModeKind, ModeState, PairingPhase};

pub struct PairingMode {
    commit_task: Option<TaskId>,
    retry_task: Option<TaskId>,
    access_point_up: bool,
    endpoint_up: bool,
}

impl PairingMode {
    pub fn new() -> Self {
        Self {
            commit_task: None,
            retry_task: None,
            access_point_up: false,
            endpoint_up: false,
        }
    }

    /// Start whichever of the access point and the endpoint is not running
    /// yet. True once both are up.
    fn bring_up<P: Platform>(&mut self, core: &mut Core<P>) -> bool {
        if !self.access_point_up {
            info!("📡 Starting pairing access point '{}'", core.device_id);
            match core
                .link
                .start_access_point(&core.device_id, &core.settings.pairing_ap_password)
            {
                Ok(()) => self.access_point_up = true,
                Err(e) => warn!("⚠️ Pairing access point failed to start: {:?}", e),
            }
        }

        if !self.endpoint_up {
            match core.pairing.start(PAIRING_HTTP_PATH) {
                Ok(()) => {
                    self.endpoint_up = true;
                    info!("✅ Pairing endpoint ready at {}", PAIRING_HTTP_PATH);
                }
                Err(e) => warn!("⚠️ Pairing endpoint failed to start: {:?}", e),
            }
        }

        self.access_point_up && self.endpoint_up
    }

    fn phase<P: Platform>(core: &Core<P>) -> PairingPhase {
        match core.state() {
            ModeState::Pairing(phase) => phase,
            _ => PairingPhase::AwaitingPair,
        }
    }

    fn handle_request<P: Platform>(
        &mut self,
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
        request: serde_json::Value,
    ) {
        if Self::phase(core) == PairingPhase::Committing {
            warn!("⚠️ Pairing request while committing - rejected");
            Self::respond(core, &PairingResponse::rejected(&PairingError::AlreadyCommitting));
            return;
        }

        info!("📲 Pairing request received");
        let blink = core.tasks.blink;
        scheduler.disable(blink, core);
        led_manager::solid_on(&mut core.indicator);

        match validate_request(&request) {
            Ok(config) => {
                info!("✅ Pairing accepted: {}", config.summary());
                let response = PairingResponse::accepted(&core.device_id, &config);
                Self::respond(core, &response);

                core.config = config;
                core.set_state(ModeState::Pairing(PairingPhase::Committing));
                if let Some(commit) = self.commit_task {
                    let delay = core.settings.commit_delay_ms;
                    scheduler.enable_delayed(commit, delay, core);
                }
            }
            Err(e) => {
                warn!("❌ Pairing rejected: {}", e);
                Self::respond(core, &PairingResponse::rejected(&e));
                scheduler.enable_if_not(blink, core);
            }
        }
    }

    fn respond<P: Platform>(core: &mut Core<P>, response: &PairingResponse) {
        if let Err(e) = core.pairing.respond(response) {
            warn!("⚠️ Failed to send pairing response: {:?}", e);
        }
    }
}

impl Default for PairingMode {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Platform> ModeBehavior<P> for PairingMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Pairing
    }

    fn setup(&mut self, core: &mut Core<P>, scheduler: &mut Scheduler<TaskKind>) {
        self.commit_task = Some(scheduler.add(
            TaskKind::CommitConfig,
            core.settings.commit_blink_interval_ms,
            Iterations::Times(core.settings.commit_blink_steps),
        ));
        let retry = scheduler.add(
            TaskKind::RetryPairingStart,
            core.settings.pairing_retry_interval_ms,
            Iterations::Forever,
        );
        self.retry_task = Some(retry);

        let blink = core.tasks.blink;
        scheduler.set_interval(blink, core.settings.pairing_blink_interval_ms);
        scheduler.enable(blink, core);

        core.set_state(ModeState::Pairing(PairingPhase::AwaitingPair));
        if !self.bring_up(core) {
            let interval = core.settings.pairing_retry_interval_ms;
            scheduler.enable_delayed(retry, interval, core);
        }
    }

    fn poll(&mut self, core: &mut Core<P>, scheduler: &mut Scheduler<TaskKind>) {
        // One exchange per loop iteration
        if let Some(request) = core.pairing.next_request() {
            self.handle_request(core, scheduler, request);
        }
    }

    fn handle_passthrough(&mut self, _core: &mut Core<P>, payload: &[u8]) {
        warn!(
            "⚠️ Pass-through line ignored in pairing mode ({} bytes)",
            payload.len()
        );
    }

    fn run_task(
        &mut self,
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
        kind: TaskKind,
        run_counter: u32,
    ) {
        match kind {
            TaskKind::CommitConfig => led_manager::blink_step(&mut core.indicator, run_counter),
            TaskKind::RetryPairingStart => {
                if self.bring_up(core) {
                    if let Some(retry) = self.retry_task {
                        scheduler.disable(retry, core);
                    }
                }
            }
            _ => {}
        }
    }
}
