//! Boot-time mode selection over the simulation platform

mod common;

use common::{configured, Rig};
use relay_bridge::sim::{LinkRole, SimHandles};
use relay_bridge::{Configuration, DeviceStatus, ModeKind, ModeState, PairingPhase};

fn assert_pairing_access_point(rig: &Rig) {
    assert_eq!(rig.controller.mode_kind(), ModeKind::Pairing);
    assert_eq!(
        rig.controller.state(),
        ModeState::Pairing(PairingPhase::AwaitingPair)
    );
    assert_eq!(rig.controller.status(), DeviceStatus::PairingReady);
    assert_eq!(
        rig.sim.link.role(),
        LinkRole::AccessPoint {
            ssid: "bridge_240ac4123456".to_string(),
            password: "12345678".to_string(),
        }
    );
    assert_eq!(rig.sim.pairing.served_path().as_deref(), Some("/pair"));
}

#[test]
fn test_factory_blank_storage_boots_pairing() {
    let rig = Rig::fresh();
    assert_pairing_access_point(&rig);
    assert_eq!(rig.controller.device_id(), "bridge_240ac4123456");
    // Selecting the mode never writes storage
    assert_eq!(rig.sim.storage.commit_count(), 0);
}

#[test]
fn test_erased_storage_boots_pairing() {
    let sim = SimHandles::new();
    sim.storage
        .preload(0, &[0u8; relay_bridge::sim::SIM_STORAGE_CAPACITY])
        .unwrap();
    let rig = Rig::boot(sim);
    assert_pairing_access_point(&rig);
}

#[test]
fn test_wrong_signature_boots_pairing() {
    let mut config = configured();
    config.signature = *b"XXXX";
    let rig = Rig::with_config(&config);
    assert_pairing_access_point(&rig);
    assert!(!rig.controller.configuration().configured);
}

#[test]
fn test_unconfigured_record_boots_pairing() {
    let rig = Rig::with_config(&Configuration::initialize());
    assert_pairing_access_point(&rig);
}

#[test]
fn test_force_pairing_flag_boots_pairing() {
    let mut config = configured();
    config.force_pairing = true;
    let rig = Rig::with_config(&config);
    assert_pairing_access_point(&rig);
    // Existing parameters are still loaded
    assert_eq!(rig.controller.configuration().network_name.as_str(), "lab");
}

#[test]
fn test_configured_device_boots_operational() {
    let rig = Rig::with_config(&configured());

    assert_eq!(rig.controller.mode_kind(), ModeKind::Operational);
    assert_eq!(rig.controller.status(), DeviceStatus::NoLink);
    assert_eq!(
        rig.sim.link.role(),
        LinkRole::Station {
            ssid: "lab".to_string(),
            password: "secret".to_string(),
            hostname: "bridge_240ac4123456".to_string(),
        }
    );
    assert_eq!(rig.sim.pairing.served_path(), None);
    assert_eq!(rig.sim.storage.commit_count(), 0);
}

#[test]
fn test_pairing_mode_blinks_at_pairing_cadence() {
    let mut rig = Rig::fresh();
    assert_eq!(rig.controller.blink_interval(), 500);
    assert!(rig.controller.is_task_enabled(relay_bridge::TaskKind::BlinkIndicator));

    rig.sim.indicator.clear_writes();
    rig.advance(2_000);
    let writes = rig.sim.indicator.writes();
    assert!(writes.len() >= 4);
    assert!(writes.windows(2).all(|pair| pair[0] != pair[1]));
}
