// Button Monitor Module
// Debounced press detection for the pairing button
// The GPIO interrupt only raises an EdgeFlag; the control loop samples the
// line a short delay later and feeds the level into ButtonMonitor.

// Import atomic operations for the interrupt-to-loop handoff
use core::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info};

/// Single-slot interrupt flag shared between the GPIO handler and the loop
pub struct EdgeFlag {
    pending: AtomicBool,
}

impl EdgeFlag {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Called from interrupt context; must stay allocation and lock free
    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending edge, if any
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for EdgeFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// A completed press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressEvent {
    pub started_at_ms: u64,
    pub duration_ms: u64,
}

/// What the controller does with a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressAction {
    EraseAndRestart,
    ForcePairingAndRestart,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressThresholds {
    pub short_ms: u64,
    pub long_ms: u64,
}

impl PressThresholds {
    pub fn classify(&self, duration_ms: u64) -> PressAction {
        if duration_ms > self.long_ms {
            PressAction::EraseAndRestart
        } else if duration_ms > self.short_ms {
            PressAction::ForcePairingAndRestart
        } else {
            PressAction::Ignore
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Pressed { since_ms: u64 },
}

/// IDLE -> PRESSED -> IDLE state machine over debounced samples
#[derive(Debug)]
pub struct ButtonMonitor {
    state: MonitorState,
}

impl ButtonMonitor {
    pub fn new() -> Self {
        Self {
            state: MonitorState::Idle,
        }
    }

    pub fn is_pressed(&self) -> bool {
        matches!(self.state, MonitorState::Pressed { .. })
    }

    /// Feed one sample; `contact` is true while the button is held.
    /// Returns the press once the button is released.
    pub fn sample(&mut self, contact: bool, now_ms: u64) -> Option<PressEvent> {
        match (self.state, contact) {
            (MonitorState::Idle, true) => {
                debug!("🔘 Button contact at {} ms", now_ms);
                self.state = MonitorState::Pressed { since_ms: now_ms };
                None
            }
            (MonitorState::Pressed { since_ms }, false) => {
                self.state = MonitorState::Idle;
                let event = PressEvent {
                    started_at_ms: since_ms,
                    duration_ms: now_ms.saturating_sub(since_ms),
                };
                info!("🔘 Button released after {} ms", event.duration_ms);
                Some(event)
            }
            // Repeated low samples while pressed, or high samples while idle
            _ => None,
        }
    }
}

impl Default for ButtonMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: PressThresholds = PressThresholds {
        short_ms: 1_000,
        long_ms: 15_000,
    };

    #[test]
    fn press_duration_measured_from_first_contact() {
        let mut monitor = ButtonMonitor::new();
        assert_eq!(monitor.sample(true, 100), None);
        assert_eq!(monitor.sample(true, 400), None);
        assert!(monitor.is_pressed());

        let event = monitor.sample(false, 2_100).unwrap();
        assert_eq!(
            event,
            PressEvent {
                started_at_ms: 100,
                duration_ms: 2_000
            }
        );
        assert!(!monitor.is_pressed());
    }

    #[test]
    fn release_without_press_is_ignored() {
        let mut monitor = ButtonMonitor::new();
        assert_eq!(monitor.sample(false, 50), None);
    }

    #[test]
    fn thresholds_are_exclusive() {
        assert_eq!(THRESHOLDS.classify(999), PressAction::Ignore);
        assert_eq!(THRESHOLDS.classify(1_000), PressAction::Ignore);
        assert_eq!(THRESHOLDS.classify(1_001), PressAction::ForcePairingAndRestart);
        assert_eq!(THRESHOLDS.classify(14_999), PressAction::ForcePairingAndRestart);
        assert_eq!(THRESHOLDS.classify(15_000), PressAction::ForcePairingAndRestart);
        assert_eq!(THRESHOLDS.classify(15_001), PressAction::EraseAndRestart);
    }

    #[test]
    fn edge_flag_is_consumed_once() {
        let flag = EdgeFlag::new();
        assert!(!flag.take());
        flag.notify();
        flag.notify();
        assert!(flag.take());
        assert!(!flag.take());
    }
}
