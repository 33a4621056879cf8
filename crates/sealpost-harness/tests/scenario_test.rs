//! Built-in scenarios under fixed seeds.

use sealpost_harness::Scenario;

#[tokio::test]
async fn every_scenario_passes() {
    for scenario in Scenario::ALL {
        let report = scenario.run(7).await;
        assert!(report.is_ok(), "{scenario} failed: {report:?}");
    }
}

#[tokio::test]
async fn same_seed_same_report() {
    let first = Scenario::SharedSession.run(42).await.unwrap();
    let second = Scenario::SharedSession.run(42).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn abandoned_chat_leaves_no_messages() {
    let report = Scenario::AbandonedChat.run(3).await.unwrap();

    assert_eq!(report.messages_left, 0);
    assert_eq!(report.sessions, 1);
}

#[tokio::test]
async fn inactive_chat_consumes_virtual_time_only() {
    let started = std::time::Instant::now();
    let report = Scenario::InactiveChat.run(5).await.unwrap();

    assert!(report.elapsed > std::time::Duration::from_secs(24 * 60 * 60));
    assert!(started.elapsed() < report.elapsed);
    assert_eq!(report.sessions, 0);
}

#[test]
fn scenario_names_round_trip() {
    for scenario in Scenario::ALL {
        assert_eq!(scenario.name().parse::<Scenario>(), Ok(scenario));
    }
    assert!("no-such-scenario".parse::<Scenario>().is_err());
}
