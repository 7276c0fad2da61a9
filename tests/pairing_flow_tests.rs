//! Pairing exchange, commit window and restart into operational mode

mod common;

use common::{pairing_request, Rig};
use relay_bridge::sim::{LinkRole, SimHandles};
use relay_bridge::{ModeKind, ModeState, PairingPhase, TaskKind};

#[test]
fn test_valid_request_is_accepted_with_inverted_topics() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);

    let response = rig.sim.pairing.last_response().unwrap();
    assert!(response.is_accepted());
    assert_eq!(response.pairing_response, 0);
    assert_eq!(response.pairing_device_name.as_deref(), Some("bridge_240ac4123456"));
    assert_eq!(response.subscribe_topic.as_deref(), Some("A"));
    assert_eq!(response.publish_topic.as_deref(), Some("B"));
    assert_eq!(response.pairing_response_detail, None);

    let config = rig.controller.configuration();
    assert!(config.configured);
    assert!(!config.force_pairing);
    assert_eq!(config.inbound_topic.as_str(), "B");
    assert_eq!(config.outbound_topic.as_str(), "A");
    assert_eq!(config.broker_host.as_str(), "broker.local");

    assert_eq!(
        rig.controller.state(),
        ModeState::Pairing(PairingPhase::Committing)
    );
    // Solid on while the commit window runs down; nothing persisted yet
    assert!(!rig.controller.is_task_enabled(TaskKind::BlinkIndicator));
    assert!(rig.controller.is_task_enabled(TaskKind::CommitConfig));
    assert!(rig.sim.indicator.is_on());
    assert_eq!(rig.sim.storage.commit_count(), 0);
}

#[test]
fn test_missing_field_is_rejected_and_blinking_resumes() {
    let mut rig = Rig::fresh();
    let mut body = pairing_request();
    body.as_object_mut().unwrap().remove("mqttHostName");
    rig.sim.pairing.submit(body);
    rig.advance(5);

    let response = rig.sim.pairing.last_response().unwrap();
    assert_eq!(response.pairing_response, -1);
    assert_eq!(
        response.pairing_response_detail.as_deref(),
        Some("Field 'mqttHostName' not found in request object")
    );
    assert_eq!(response.network_ssid, None);

    assert!(!rig.controller.configuration().configured);
    assert_eq!(
        rig.controller.state(),
        ModeState::Pairing(PairingPhase::AwaitingPair)
    );
    assert!(rig.controller.is_task_enabled(TaskKind::BlinkIndicator));
    assert!(!rig.controller.is_task_enabled(TaskKind::CommitConfig));
}

#[test]
fn test_every_missing_field_is_named_in_the_rejection() {
    let fields = [
        "networkSsid",
        "networkPassword",
        "mqttHostName",
        "mqttUserName",
        "mqttUserPassword",
        "subscribeTopic",
        "publishTopic",
    ];

    for field in fields {
        let mut rig = Rig::fresh();
        let mut body = pairing_request();
        body.as_object_mut().unwrap().remove(field);
        rig.sim.pairing.submit(body);
        rig.advance(5);

        let response = rig.sim.pairing.last_response().unwrap();
        assert_eq!(response.pairing_response, -1, "{}", field);
        assert_eq!(
            response.pairing_response_detail,
            Some(format!("Field '{}' not found in request object", field))
        );
        assert!(!rig.controller.configuration().configured, "{}", field);
        assert!(rig.controller.is_task_enabled(TaskKind::BlinkIndicator), "{}", field);
    }
}

#[test]
fn test_malformed_body_is_rejected() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(serde_json::Value::Null);
    rig.advance(5);

    let response = rig.sim.pairing.last_response().unwrap();
    assert_eq!(response.pairing_response, -1);
    assert_eq!(
        response.pairing_response_detail.as_deref(),
        Some("Request payload is not a JSON object")
    );
}

#[test]
fn test_rejected_request_can_be_followed_by_a_valid_one() {
    let mut rig = Rig::fresh();
    let mut body = pairing_request();
    body["networkSsid"] = serde_json::json!(7);
    rig.sim.pairing.submit(body);
    rig.advance(5);
    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);

    let responses = rig.sim.pairing.responses();
    assert_eq!(responses.len(), 2);
    assert!(!responses[0].is_accepted());
    assert!(responses[1].is_accepted());
    assert_eq!(
        rig.controller.state(),
        ModeState::Pairing(PairingPhase::Committing)
    );
}

#[test]
fn test_request_during_commit_window_is_refused() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);

    let mut other = pairing_request();
    other["networkSsid"] = serde_json::json!("elsewhere");
    rig.sim.pairing.submit(other);
    rig.advance(5);

    let response = rig.sim.pairing.last_response().unwrap();
    assert_eq!(response.pairing_response, -1);
    assert_eq!(
        response.pairing_response_detail.as_deref(),
        Some("Pairing already in progress")
    );
    // The first accepted configuration stays pending
    assert_eq!(rig.controller.configuration().network_name.as_str(), "lab");
}

#[test]
fn test_commit_window_persists_and_restarts() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);

    // 5 s delay, then ten 500 ms blink steps; the last one commits
    rig.advance(9_400);
    assert!(!rig.controller.is_halted());
    assert_eq!(rig.sim.storage.commit_count(), 0);

    rig.advance(200);
    assert!(rig.controller.is_halted());
    assert_eq!(rig.sim.system.restart_count(), 1);
    assert_eq!(rig.sim.storage.commit_count(), 1);

    let stored = rig.stored_config();
    assert!(stored.is_valid());
    assert!(stored.configured);
    assert!(!stored.force_pairing);
    assert_eq!(stored.inbound_topic.as_str(), "B");
    assert_eq!(stored.outbound_topic.as_str(), "A");

    rig.reboot();
    assert_eq!(rig.controller.mode_kind(), ModeKind::Operational);
    assert_eq!(
        rig.sim.link.role(),
        LinkRole::Station {
            ssid: "lab".to_string(),
            password: "secret".to_string(),
            hostname: "bridge_240ac4123456".to_string(),
        }
    );
}

#[test]
fn test_commit_window_blinks_the_indicator() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);
    rig.sim.indicator.clear_writes();

    rig.advance(4_900);
    assert!(rig.sim.indicator.writes().is_empty());
    assert!(rig.sim.indicator.is_on());

    rig.advance(1_000);
    assert_eq!(rig.sim.indicator.writes(), vec![true, false]);
}

#[test]
fn test_halted_controller_ignores_further_work() {
    let mut rig = Rig::fresh();
    rig.sim.pairing.submit(pairing_request());
    rig.advance(10_000);
    assert!(rig.controller.is_halted());

    rig.sim.serial.push_input(b"!PING\n");
    rig.advance(100);
    assert_eq!(rig.sim.serial.take_output_text(), "");
    assert_eq!(rig.sim.serial.pending_input(), 6);
    assert_eq!(rig.sim.system.restart_count(), 1);
}

#[test]
fn test_access_point_failure_is_retried() {
    let sim = SimHandles::new();
    sim.link.fail_next_starts(1);
    let mut rig = Rig::boot(sim);

    // Still waiting for a request, with the endpoint up
    assert_eq!(
        rig.controller.state(),
        ModeState::Pairing(PairingPhase::AwaitingPair)
    );
    assert_eq!(rig.sim.link.role(), LinkRole::Idle);
    assert_eq!(rig.sim.pairing.served_path().as_deref(), Some("/pair"));
    assert!(rig.controller.is_task_enabled(TaskKind::RetryPairingStart));

    rig.advance(5_000);
    assert_eq!(
        rig.sim.link.role(),
        LinkRole::AccessPoint {
            ssid: "bridge_240ac4123456".to_string(),
            password: "12345678".to_string(),
        }
    );
    assert!(!rig.controller.is_task_enabled(TaskKind::RetryPairingStart));

    rig.sim.pairing.submit(pairing_request());
    rig.advance(5);
    assert!(rig.sim.pairing.last_response().unwrap().is_accepted());
}

#[test]
fn test_endpoint_failure_is_retried_until_it_binds() {
    let sim = SimHandles::new();
    sim.pairing.fail_next_starts(2);
    let mut rig = Rig::boot(sim);
    rig.sim.pairing.submit(pairing_request());

    assert!(matches!(rig.sim.link.role(), LinkRole::AccessPoint { .. }));
    rig.advance(5_000);
    assert_eq!(rig.sim.pairing.served_path(), None);
    assert!(rig.sim.pairing.responses().is_empty());

    // The request that waited is answered as soon as the endpoint binds
    rig.advance(5_000);
    assert_eq!(rig.sim.pairing.served_path().as_deref(), Some("/pair"));
    assert!(!rig.controller.is_task_enabled(TaskKind::RetryPairingStart));
    assert!(rig.sim.pairing.last_response().unwrap().is_accepted());
}

#[test]
fn test_clean_start_needs_no_retry() {
    let rig = Rig::fresh();
    assert!(matches!(rig.sim.link.role(), LinkRole::AccessPoint { .. }));
    assert!(!rig.controller.is_task_enabled(TaskKind::RetryPairingStart));
}
