// Bridge configuration constants
// Pins, protocol markers, debounce thresholds and task intervals.
// `ControllerConfig` bundles the runtime-relevant ones so tests can shrink them.

// Hardware assignments (ESP32 dev board)
pub const STATUS_LED_GPIO: u8 = 2; // Built-in LED
pub const STATUS_LED_ACTIVE_LOW: bool = false;
pub const PAIRING_BUTTON_GPIO: u8 = 0; // BOOT button, pulled up, contact = LOW
pub const SERIAL_TX_GPIO: u8 = 17; // UART2, keeps UART0 free for the log console
pub const SERIAL_RX_GPIO: u8 = 16;
pub const SERIAL_BAUDRATE: u32 = 115_200;

// Local transport line protocol
pub const COMMAND_MARKER: char = '!';
pub const PASSTHROUGH_MARKER: char = '$';
pub const LINE_TERMINATOR: &str = "\r\n";
pub const SERIAL_LINE_CAPACITY: usize = 255; // data bytes, terminator excluded
pub const SERIAL_BATCH_LIMIT: usize = 32; // bytes drained per loop iteration
pub const INBOUND_BATCH_LIMIT: usize = 8; // broker deliveries drained per loop iteration

// Button debounce and classification
pub const BUTTON_RECHECK_DELAY_MS: u64 = 100;
pub const SHORT_PRESS_THRESHOLD_MS: u64 = 1_000;
pub const LONG_PRESS_THRESHOLD_MS: u64 = 15_000;

// Indicator cadences
pub const DEFAULT_BLINK_INTERVAL_MS: u64 = 250;
pub const PAIRING_BLINK_INTERVAL_MS: u64 = 500;
pub const NO_LINK_BLINK_INTERVAL_MS: u64 = 1_000;
pub const NO_BROKER_BLINK_INTERVAL_MS: u64 = 500;

// Pairing commit window: delay, then N blink steps, then persist + restart
pub const COMMIT_DELAY_MS: u64 = 5_000;
pub const COMMIT_BLINK_INTERVAL_MS: u64 = 500;
pub const COMMIT_BLINK_STEPS: u32 = 10;

// Pairing start-up retry while the access point or endpoint is down
pub const PAIRING_RETRY_INTERVAL_MS: u64 = 5_000;

// Operational health checks
pub const FIRST_HEALTH_CHECK_DELAY_MS: u64 = 5_000;
pub const HEALTH_CHECK_INTERVAL_MS: u64 = 15_000;

// Network
pub const BROKER_PORT: u16 = 1883;
pub const PAIRING_AP_PASSWORD: &str = "12345678";
pub const PAIRING_HTTP_PATH: &str = "/pair";
pub const DEVICE_ID_PREFIX: &str = "bridge_";

// Control loop idle time between ticks on the device
pub const LOOP_IDLE_MS: u64 = 5;

/// Runtime tunables handed to the controller at boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub button_recheck_delay_ms: u64,
    pub short_press_threshold_ms: u64,
    pub long_press_threshold_ms: u64,
    pub pairing_blink_interval_ms: u64,
    pub commit_delay_ms: u64,
    pub commit_blink_interval_ms: u64,
    pub commit_blink_steps: u32,
    pub pairing_retry_interval_ms: u64,
    pub first_health_check_delay_ms: u64,
    pub health_check_interval_ms: u64,
    pub no_link_blink_interval_ms: u64,
    pub no_broker_blink_interval_ms: u64,
    pub serial_batch_limit: usize,
    pub inbound_batch_limit: usize,
    pub broker_port: u16,
    pub pairing_ap_password: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            button_recheck_delay_ms: BUTTON_RECHECK_DELAY_MS,
            short_press_threshold_ms: SHORT_PRESS_THRESHOLD_MS,
            long_press_threshold_ms: LONG_PRESS_THRESHOLD_MS,
            pairing_blink_interval_ms: PAIRING_BLINK_INTERVAL_MS,
            commit_delay_ms: COMMIT_DELAY_MS,
            commit_blink_interval_ms: COMMIT_BLINK_INTERVAL_MS,
            commit_blink_steps: COMMIT_BLINK_STEPS,
            pairing_retry_interval_ms: PAIRING_RETRY_INTERVAL_MS,
            first_health_check_delay_ms: FIRST_HEALTH_CHECK_DELAY_MS,
            health_check_interval_ms: HEALTH_CHECK_INTERVAL_MS,
            no_link_blink_interval_ms: NO_LINK_BLINK_INTERVAL_MS,
            no_broker_blink_interval_ms: NO_BROKER_BLINK_INTERVAL_MS,
            serial_batch_limit: SERIAL_BATCH_LIMIT,
            inbound_batch_limit: INBOUND_BATCH_LIMIT,
            broker_port: BROKER_PORT,
            pairing_ap_password: PAIRING_AP_PASSWORD.to_string(),
        }
    }
}
