// relay-bridge firmware entry point
// On the ESP32 the controller runs as an embassy task. On a desktop host the
// same controller runs over the simulation platform: stdin is the serial
// host, stdout receives what the bridge writes back.

#[cfg(target_os = "espidf")]
mod device {
    use embassy_executor::Spawner;
    use embassy_time::{Instant, Timer};
    use log::{error, info};

    use relay_bridge::config::LOOP_IDLE_MS;
    use relay_bridge::esp::{take_board, EspPlatform};
    use relay_bridge::system_state::{SystemEvent, SYSTEM_EVENT_SIGNAL};
    use relay_bridge::{Controller, ControllerConfig};

    #[embassy_executor::task]
    async fn control_loop(mut controller: Box<Controller<EspPlatform>>) {
        controller.start(Instant::now().as_millis());
        loop {
            controller.tick(Instant::now().as_millis());
            Timer::after_millis(LOOP_IDLE_MS).await;
        }
    }

    #[embassy_executor::task]
    async fn status_reporter() {
        info!("📣 Status reporter started");
        loop {
            match SYSTEM_EVENT_SIGNAL.wait().await {
                SystemEvent::ModeEntered(mode) => info!("📣 Mode entered: {:?}", mode),
                SystemEvent::StatusChanged(status) => {
                    info!("📣 Status {:?} (code {})", status, status.code())
                }
                SystemEvent::Restarting(reason) => info!("📣 Restart requested: {:?}", reason),
            }
        }
    }

    pub async fn run(spawner: Spawner) {
        info!("🚀 relay-bridge starting");

        let board = match take_board() {
            Ok(board) => board,
            Err(e) => {
                error!("❌ Board initialization failed: {:?} - restarting", e);
                esp_idf_svc::hal::reset::restart();
            }
        };

        let controller = Box::new(Controller::new(board, ControllerConfig::default()));

        if let Err(e) = spawner.spawn(status_reporter()) {
            error!("❌ Failed to spawn status reporter: {:?}", e);
        }
        if let Err(e) = spawner.spawn(control_loop(controller)) {
            error!("❌ Failed to spawn control loop: {:?}", e);
        }
    }
}

#[cfg(target_os = "espidf")]
#[embassy_executor::main]
async fn main(spawner: embassy_executor::Spawner) {
    // It is necessary to call this function once. Otherwise some patches to the runtime
    // implemented by esp-idf-sys might not link properly.
    esp_idf_svc::sys::link_patches();

    // Bind the log crate to the ESP Logging facilities
    esp_idf_svc::log::EspLogger::initialize_default();

    device::run(spawner).await;
}

#[cfg(not(target_os = "espidf"))]
mod simulation {
    use std::io::{BufRead, Write};
    use std::sync::mpsc::{self, Receiver, TryRecvError};
    use std::thread;
    use std::time::{Duration, Instant};

    use anyhow::{Context, Result};
    use log::{info, warn};
    use tracing_subscriber::filter::LevelFilter;

    use relay_bridge::config::LOOP_IDLE_MS;
    use relay_bridge::sim::{SimHandles, SimPlatform};
    use relay_bridge::{Controller, ControllerConfig, ModeKind, ModeState, PairingPhase};

    struct Options {
        verbose: bool,
        pairing_request: Option<serde_json::Value>,
    }

    fn parse_options() -> Result<Options> {
        let mut options = Options {
            verbose: false,
            pairing_request: None,
        };
        for arg in std::env::args().skip(1) {
            if arg == "-v" || arg == "--verbose" {
                options.verbose = true;
                continue;
            }
            let text = std::fs::read_to_string(&arg)
                .with_context(|| format!("reading pairing request {}", arg))?;
            let request = serde_json::from_str(&text)
                .with_context(|| format!("parsing pairing request {}", arg))?;
            options.pairing_request = Some(request);
        }
        Ok(options)
    }

    /// Forward stdin lines to the loop; the channel closes on EOF
    fn spawn_stdin_reader() -> Result<Receiver<Vec<u8>>> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("stdin".into())
            .spawn(move || {
                for line in std::io::stdin().lock().lines() {
                    let Ok(mut line) = line else { break };
                    line.push('\n');
                    if tx.send(line.into_bytes()).is_err() {
                        break;
                    }
                }
            })?;
        Ok(rx)
    }

    fn boot(handles: &SimHandles, started: Instant) -> Controller<SimPlatform> {
        let mut controller = Controller::new(handles.board(), ControllerConfig::default());
        controller.start(started.elapsed().as_millis() as u64);
        controller
    }

    pub fn run() -> Result<()> {
        let options = parse_options()?;
        let level = if options.verbose {
            LevelFilter::DEBUG
        } else {
            LevelFilter::INFO
        };
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_max_level(level)
            .init();

        info!("🖥️ relay-bridge desktop simulation (stdin = serial host)");

        // The simulated network and broker are always available
        let mut handles = SimHandles::new();
        handles.link.set_connected(true);
        handles.broker.set_reachable(true);
        handles.broker.set_subscribe_accepts(true);

        let input = spawn_stdin_reader()?;
        let started = Instant::now();
        let mut controller = boot(&handles, started);
        let mut pending_request = options.pairing_request;
        let mut input_open = true;
        let mut responses_logged = 0;
        let mut stdout = std::io::stdout();

        loop {
            if let Some(request) = pending_request.take() {
                if controller.mode_kind() == ModeKind::Pairing {
                    info!("📨 Submitting pairing request from file");
                    handles.pairing.submit(request);
                } else {
                    warn!("⚠️ Device already configured - pairing request not submitted");
                }
            }

            while input_open {
                match input.try_recv() {
                    Ok(bytes) => handles.serial.push_input(&bytes),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => input_open = false,
                }
            }

            controller.tick(started.elapsed().as_millis() as u64);

            let output = handles.serial.take_output();
            if !output.is_empty() {
                stdout.write_all(&output)?;
                stdout.flush()?;
            }
            let responses = handles.pairing.responses();
            for response in responses.iter().skip(responses_logged) {
                info!("📨 Pairing response: {}", serde_json::to_string(response)?);
            }
            responses_logged = responses.len();

            if controller.is_halted() {
                info!("🔄 Simulated reboot");
                handles = handles.reboot();
                controller = boot(&handles, started);
                responses_logged = 0;
                continue;
            }
            let awaiting_commit = controller.state() == ModeState::Pairing(PairingPhase::Committing);

            if !input_open && handles.serial.pending_input() == 0 && !awaiting_commit {
                info!("👋 Input closed - leaving simulation");
                return Ok(());
            }

            thread::sleep(Duration::from_millis(LOOP_IDLE_MS));
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    simulation::run()
}
