use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

// Status codes reported by `!PING`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    Ready,          // Broker connected and subscribed
    NoSubscription, // Broker connected, subscription refused
    NoBroker,       // Network up, broker unreachable
    NoLink,         // Not associated with the network
    PairingReady,   // Pairing access point and endpoint up
    Unknown,        // Before any mode has been entered
}

impl DeviceStatus {
    pub fn code(self) -> u8 {
        match self {
            DeviceStatus::Ready => 0,
            DeviceStatus::NoSubscription => 1,
            DeviceStatus::NoBroker => 2,
            DeviceStatus::NoLink => 3,
            DeviceStatus::PairingReady => 100,
            DeviceStatus::Unknown => 255,
        }
    }
}

// Operational connectivity sub-states, re-entrant in any direction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkPhase {
    NoLink,
    NoBroker,
    NoSubscription,
    Ready,
}

impl LinkPhase {
    pub fn status(self) -> DeviceStatus {
        match self {
            LinkPhase::NoLink => DeviceStatus::NoLink,
            LinkPhase::NoBroker => DeviceStatus::NoBroker,
            LinkPhase::NoSubscription => DeviceStatus::NoSubscription,
            LinkPhase::Ready => DeviceStatus::Ready,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairingPhase {
    AwaitingPair,
    Committing, // Accepted configuration waiting for the commit task
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeState {
    Uninitialized,
    Pairing(PairingPhase),
    Operational(LinkPhase),
}

impl ModeState {
    pub fn status(self) -> DeviceStatus {
        match self {
            ModeState::Uninitialized => DeviceStatus::Unknown,
            ModeState::Pairing(_) => DeviceStatus::PairingReady,
            ModeState::Operational(phase) => phase.status(),
        }
    }
}

// Which variant the controller boots into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    Pairing,
    Operational,
}

// Why the controller asked for a restart
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartReason {
    LongPress,         // Configuration erased from the button
    ShortPress,        // Pairing forced from the button
    RebootCommand,     // !REBOOT
    RebootIntoPairing, // !REBOOT_AP
    ClearParams,       // !CLEAR_PARAMS
    PairingCommitted,  // New configuration persisted
}

// System lifecycle events
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SystemEvent {
    ModeEntered(ModeKind),
    StatusChanged(DeviceStatus),
    Restarting(RestartReason),
}

// Latest-value signal for the status reporter task
// Using CriticalSectionRawMutex for interrupt-safe access in embedded systems
pub static SYSTEM_EVENT_SIGNAL: Signal<CriticalSectionRawMutex, SystemEvent> = Signal::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_line_protocol() {
        assert_eq!(DeviceStatus::Ready.code(), 0);
        assert_eq!(DeviceStatus::NoSubscription.code(), 1);
        assert_eq!(DeviceStatus::NoBroker.code(), 2);
        assert_eq!(DeviceStatus::NoLink.code(), 3);
        assert_eq!(DeviceStatus::PairingReady.code(), 100);
        assert_eq!(DeviceStatus::Unknown.code(), 255);
    }

    #[test]
    fn mode_state_maps_to_status() {
        assert_eq!(ModeState::Uninitialized.status(), DeviceStatus::Unknown);
        assert_eq!(
            ModeState::Pairing(PairingPhase::Committing).status(),
            DeviceStatus::PairingReady
        );
        assert_eq!(
            ModeState::Operational(LinkPhase::NoBroker).status(),
            DeviceStatus::NoBroker
        );
    }
}
