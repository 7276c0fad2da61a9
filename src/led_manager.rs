// LED Manager Module
// Status indicator patterns driven by scheduler run counters

use log::trace;

use crate::hal::StatusIndicator;

/// Indicator level for one blink step: odd runs on, even runs off
pub fn blink_level(run_counter: u32) -> bool {
    run_counter % 2 == 1
}

/// Apply one blink step to the indicator
pub fn blink_step<I: StatusIndicator + ?Sized>(indicator: &mut I, run_counter: u32) {
    let on = blink_level(run_counter);
    trace!("💡 Blink step {} -> {}", run_counter, if on { "on" } else { "off" });
    indicator.set(on);
}

/// Solid on, used while a request is handled and when fully connected
pub fn solid_on<I: StatusIndicator + ?Sized>(indicator: &mut I) {
    indicator.set(true);
}

pub fn off<I: StatusIndicator + ?Sized>(indicator: &mut I) {
    indicator.set(false);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blink_alternates_starting_on() {
        let levels: Vec<bool> = (1..=4).map(blink_level).collect();
        assert_eq!(levels, vec![true, false, true, false]);
    }
}
