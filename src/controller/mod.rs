// Mode Controller
// Shared controller core plus the active mode behaviour (pairing or
// operational). The control loop calls `Controller::tick` repeatedly; nothing
// in here blocks.

mod operational;
mod pairing;

pub use operational::OperationalMode;
pub use pairing::PairingMode;

use log::{debug, error, info, warn};

use crate::button_monitor::{ButtonMonitor, PressAction, PressThresholds};
use crate::config::{ControllerConfig, DEFAULT_BLINK_INTERVAL_MS, LINE_TERMINATOR};
use crate::config_storage::{ConfigStorage, Configuration};
use crate::device_info::{device_id_from_mac, format_mac_address};
use crate::hal::{Board, ButtonInput, NetworkLink, Platform, SerialLink, SystemControl};
use crate::led_manager;
use crate::scheduler::{Iterations, Scheduler, TaskHooks, TaskId, TaskRunner};
use crate::serial_protocol::{classify_line, format_pong, Command, LineAssembler, SerialLine};
use crate::system_state::{
    DeviceStatus, ModeKind, ModeState, RestartReason, SystemEvent, SYSTEM_EVENT_SIGNAL,
};

/// Every task the controller and its modes register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    BlinkIndicator,
    CheckButton,
    CommitConfig,
    RetryPairingStart,
    CheckConnection,
}

/// Tasks owned by the shared core
#[derive(Debug, Clone, Copy)]
pub struct CoreTasks {
    pub blink: TaskId,
    pub check_button: TaskId,
}

/// Boot-time mode selection
pub fn select_mode(config: &Configuration) -> ModeKind {
    if config.requires_pairing() {
        ModeKind::Pairing
    } else {
        ModeKind::Operational
    }
}

/// Behaviour that differs between pairing and operational mode
pub trait ModeBehavior<P: Platform> {
    fn kind(&self) -> ModeKind;

    /// Bring up the mode's radio role, endpoints and tasks. Start-up
    /// failures are logged and retried by the mode's own periodic task.
    fn setup(&mut self, core: &mut Core<P>, scheduler: &mut Scheduler<TaskKind>);

    /// Per-loop pump of the mode's external endpoint
    fn poll(&mut self, core: &mut Core<P>, scheduler: &mut Scheduler<TaskKind>);

    /// A `$` line from the serial host, marker stripped
    fn handle_passthrough(&mut self, core: &mut Core<P>, payload: &[u8]);

    /// Body of a task the core does not handle itself
    fn run_task(
        &mut self,
        core: &mut Core<P>,
        scheduler: &mut Scheduler<TaskKind>,
        kind: TaskKind,
        run_counter: u32,
    );
}

/// State and collaborators shared by both modes
pub struct Core<P: Platform> {
    pub link: P::Link,
    pub broker: P::Broker,
    pub serial: P::Serial,
    pub indicator: P::Indicator,
    pub button_input: P::Button,
    pub pairing: P::Pairing,
    pub system: P::System,
    pub store: ConfigStorage<P::Storage>,
    pub config: Configuration,
    pub settings: ControllerConfig,
    pub device_id: String,
    pub tasks: CoreTasks,
    state: ModeState,
    button: ButtonMonitor,
    halted: bool,
}

impl<P: Platform> Core<P> {
    pub fn state(&self) -> ModeState {
        self.state
    }

    pub fn status(&self) -> DeviceStatus {
        self.state.status()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Move to a new state, announcing status changes
    pub fn set_state(&mut self, state: ModeState) {
        if state == self.state {
            return;
        }
        let previous = self.state.status();
        debug!("🔀 State {:?} -> {:?}", self.state, state);
        self.state = state;

        let status = state.status();
        if status != previous {
            info!("📶 Device status: {:?} (code {})", status, status.code());
            SYSTEM_EVENT_SIGNAL.signal(SystemEvent::StatusChanged(status));
        }
    }

    /// Write one line to the serial host
    pub fn write_line(&mut self, text: &str) {
        let mut frame = Vec::with_capacity(text.len() + LINE_TERMINATOR.len());
        frame.extend_from_slice(text.as_bytes());
        frame.extend_from_slice(LINE_TERMINATOR.as_bytes());
        if let Err(e) = self.serial.write(&frame) {
            warn!("⚠️ Serial write failed: {:?}", e);
        }
    }

    /// Hand control back to the platform for a restart. The controller
    /// stops doing work once this has been called.
    pub fn restart(&mut self, reason: RestartReason) {
        info!("🔄 Restarting device ({:?})", reason);
        SYSTEM_EVENT_SIGNAL.signal(SystemEvent::Restarting(reason));
        self.halted = true;
        self.system.restart();
    }

    /// Erase the storage region; restart whether or not the erase worked
    pub fn erase_and_restart(&mut self, reason: RestartReason) {
        if let Err(e) = self.store.erase() {
            error!("❌ Failed to erase configuration storage: {}", e);
        }
        self.restart(reason);
    }

    /// Persist the active configuration; restart whether or not the commit worked
    pub fn commit_and_restart(&mut self, reason: RestartReason) {
        if let Err(e) = self.store.commit(&self.config) {
            error!("❌ Failed to commit configuration: {}", e);
        }
        self.restart(reason);
    }

    pub fn force_pairing_and_restart(&mut self, reason: RestartReason) {
        info!("📲 Forcing pairing mode on next boot");
        self.config.force_pairing = true;
        self.commit_and_restart(reason);
    }

    fn handle_command(&mut self, command: Command) {
        info!("⌨️ Serial command {:?}", command);
        match command {
            Command::Ping => {
                let pong = format_pong(self.status());
                self.write_line(&pong);
            }
            Command::Reboot => self.restart(RestartReason::RebootCommand),
            Command::RebootIntoPairing => {
                self.force_pairing_and_restart(RestartReason::RebootIntoPairing)
            }
            Command::ClearParams => self.erase_and_restart(RestartReason::ClearParams),
        }
    }

    /// Debounced sample of the button, a fixed delay after the last edge
    fn check_button(&mut self, now_ms: u64) {
        let contact = self.button_input.is_pressed();
        let Some(press) = self.button.sample(contact, now_ms) else {
            return;
        };

        let thresholds = PressThresholds {
            short_ms: self.settings.short_press_threshold_ms,
            long_ms: self.settings.long_press_threshold_ms,
        };
        match thresholds.classify(press.duration_ms) {
            PressAction::EraseAndRestart => {
                warn!("🔥 Long press ({} ms) - erasing configuration", press.duration_ms);
                self.erase_and_restart(RestartReason::LongPress);
            }
            PressAction::ForcePairingAndRestart => {
                info!("📲 Short press ({} ms) - rebooting into pairing", press.duration_ms);
                self.force_pairing_and_restart(RestartReason::ShortPress);
            }
            PressAction::Ignore => {
                debug!("🔘 Press of {} ms ignored", press.duration_ms);
            }
        }
    }
}

impl<P: Platform> TaskHooks<TaskKind> for Core<P> {
    fn on_enable(&mut self, kind: TaskKind) -> bool {
        if kind == TaskKind::BlinkIndicator {
            led_manager::off(&mut self.indicator);
        }
        true
    }

    fn on_disable(&mut self, kind: TaskKind) {
        if self.halted {
            return;
        }
        match kind {
            TaskKind::BlinkIndicator => led_manager::off(&mut self.indicator),
            TaskKind::CommitConfig => {
                info!("💾 Commit window elapsed - persisting new configuration");
                self.commit_and_restart(RestartReason::PairingCommitted);
            }
            TaskKind::CheckButton | TaskKind::RetryPairingStart | TaskKind::CheckConnection => {}
        }
    }
}

/// Routes scheduler callbacks to the core or the active mode
struct Dispatch<'a, P: Platform> {
    core: &'a mut Core<P>,
    mode: &'a mut dyn ModeBehavior<P>,
}

impl<P: Platform> TaskHooks<TaskKind> for Dispatch<'_, P> {
    fn on_enable(&mut self, kind: TaskKind) -> bool {
        self.core.on_enable(kind)
    }

    fn on_disable(&mut self, kind: TaskKind) {
        self.core.on_disable(kind)
    }
}

impl<P: Platform> TaskRunner<TaskKind> for Dispatch<'_, P> {
    fn run_task(
        &mut self,
        scheduler: &mut Scheduler<TaskKind>,
        _id: TaskId,
        kind: TaskKind,
        run_counter: u32,
    ) {
        if self.core.halted {
            return;
        }
        match kind {
            TaskKind::BlinkIndicator => led_manager::blink_step(&mut self.core.indicator, run_counter),
            TaskKind::CheckButton => self.core.check_button(scheduler.now_ms()),
            _ => self.mode.run_task(self.core, scheduler, kind, run_counter),
        }
    }
}

/// Supervisory controller: owns the core, the scheduler and the active mode
pub struct Controller<P: Platform> {
    core: Core<P>,
    scheduler: Scheduler<TaskKind>,
    mode: Box<dyn ModeBehavior<P>>,
    lines: LineAssembler,
}

impl<P: Platform> Controller<P> {
    /// Load configuration and pick the mode. Nothing is started until `start`.
    pub fn new(board: Board<P>, settings: ControllerConfig) -> Self {
        let mut store = ConfigStorage::new(board.storage);
        let config = match store.load() {
            Ok(config) => config,
            Err(e) => {
                warn!("⚠️ Configuration read failed ({}) - treating storage as uninitialized", e);
                Configuration::initialize()
            }
        };

        let mac = board.link.mac_address();
        let device_id = device_id_from_mac(mac);
        info!("🆔 Device {} (MAC {})", device_id, format_mac_address(mac));

        let mut scheduler = Scheduler::new();
        let tasks = CoreTasks {
            blink: scheduler.add(TaskKind::BlinkIndicator, DEFAULT_BLINK_INTERVAL_MS, Iterations::Forever),
            check_button: scheduler.add(
                TaskKind::CheckButton,
                settings.button_recheck_delay_ms,
                Iterations::Times(1),
            ),
        };

        let mode: Box<dyn ModeBehavior<P>> = match select_mode(&config) {
            ModeKind::Pairing => {
                info!(
                    "📲 Pairing required (valid={}, configured={}, force_pairing={})",
                    config.is_valid(),
                    config.configured,
                    config.force_pairing
                );
                Box::new(PairingMode::new())
            }
            ModeKind::Operational => Box::new(OperationalMode::new()),
        };

        Self {
            core: Core {
                link: board.link,
                broker: board.broker,
                serial: board.serial,
                indicator: board.indicator,
                button_input: board.button,
                pairing: board.pairing,
                system: board.system,
                store,
                config,
                settings,
                device_id,
                tasks,
                state: ModeState::Uninitialized,
                button: ButtonMonitor::new(),
                halted: false,
            },
            scheduler,
            mode,
            lines: LineAssembler::new(),
        }
    }

    /// Enter the selected mode
    pub fn start(&mut self, now_ms: u64) {
        self.scheduler.sync_clock(now_ms);
        let kind = self.mode.kind();
        info!("🚀 Entering {:?} mode", kind);
        SYSTEM_EVENT_SIGNAL.signal(SystemEvent::ModeEntered(kind));

        self.mode.setup(&mut self.core, &mut self.scheduler);
    }

    /// One control loop iteration
    pub fn tick(&mut self, now_ms: u64) {
        if self.core.halted {
            return;
        }
        self.scheduler.sync_clock(now_ms);

        // (a) button edge: (re)arm the debounced sample
        if self.core.button_input.take_edge() {
            let id = self.core.tasks.check_button;
            let delay = self.core.settings.button_recheck_delay_ms;
            self.scheduler.restart_delayed(id, delay, &mut self.core);
        }

        // (b) due tasks
        let mut dispatch = Dispatch {
            core: &mut self.core,
            mode: self.mode.as_mut(),
        };
        self.scheduler.execute(now_ms, &mut dispatch);

        // (c) bounded batch of serial bytes
        for _ in 0..self.core.settings.serial_batch_limit {
            if self.core.halted {
                return;
            }
            let Some(byte) = self.core.serial.read_byte() else {
                break;
            };
            if let Some(line) = self.lines.push(byte) {
                self.handle_line(&line);
            }
        }

        // (d) mode endpoint pump
        if !self.core.halted {
            self.mode.poll(&mut self.core, &mut self.scheduler);
        }
    }

    fn handle_line(&mut self, line: &[u8]) {
        match classify_line(line) {
            SerialLine::Command(command) => self.core.handle_command(command),
            SerialLine::Passthrough(payload) => self.mode.handle_passthrough(&mut self.core, payload),
            SerialLine::Unprocessed(text) => {
                info!("❔ Unprocessed serial line: '{}'", String::from_utf8_lossy(text))
            }
        }
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn state(&self) -> ModeState {
        self.core.state()
    }

    pub fn status(&self) -> DeviceStatus {
        self.core.status()
    }

    pub fn configuration(&self) -> &Configuration {
        &self.core.config
    }

    pub fn device_id(&self) -> &str {
        &self.core.device_id
    }

    /// True once a restart has been requested
    pub fn is_halted(&self) -> bool {
        self.core.halted
    }

    pub fn is_task_enabled(&self, kind: TaskKind) -> bool {
        self.scheduler.enabled_kinds().any(|k| k == kind)
    }

    pub fn blink_interval(&self) -> u64 {
        self.scheduler.interval(self.core.tasks.blink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_storage::fit_text;

    #[test]
    fn boot_selection() {
        let mut config = Configuration::initialize();
        assert_eq!(select_mode(&config), ModeKind::Pairing);

        config.configured = true;
        config.network_name = fit_text("lab").unwrap();
        assert_eq!(select_mode(&config), ModeKind::Operational);

        config.force_pairing = true;
        assert_eq!(select_mode(&config), ModeKind::Pairing);

        config.force_pairing = false;
        config.signature = *b"XXXX";
        assert_eq!(select_mode(&config), ModeKind::Pairing);

        assert_eq!(select_mode(&Configuration::zeroed()), ModeKind::Pairing);
    }
}
