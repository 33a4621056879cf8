//! Abandoned-session cleanup tests

mod common;

use common::{ALICE, BOB, Fixture};
use sealpost_client::{ClientError, CleanupReport, CleanupWatcher, MessageBody, MonitorState};
use sealpost_core::{ChatStore, KeyBroker, SessionStatus};

#[tokio::test]
async fn both_offline_expires_session_and_purges_messages() {
    let fixture = Fixture::new(30);
    let alice = fixture.register(ALICE).await;
    let bob = fixture.register(BOB).await;
    let chat = fixture.chat(ALICE, BOB).await;
    let a = fixture.presence.connect(ALICE);
    let b = fixture.presence.connect(BOB);

    let mut view = fixture.monitor(&alice, chat);
    view.open().await;
    let session = view.active_session().unwrap();
    view.send(b"ephemeral").await.unwrap();
    view.send(b"also ephemeral").await.unwrap();

    let watcher = CleanupWatcher::new(fixture.ctx(), chat)
        .await
        .unwrap()
        .evicting_from(alice.keyring());
    let run = tokio::spawn(watcher.run());

    drop(a);
    tokio::task::yield_now().await;
    assert!(!run.is_finished(), "bob is still online");

    drop(b);
    let report = run.await.unwrap().unwrap();

    assert_eq!(report, CleanupReport { session: Some(session), purged: 2 });
    assert_eq!(fixture.store.message_count().unwrap(), 0);

    let expired = fixture.store.load_session(chat, session).await.unwrap().unwrap();
    assert_eq!(expired.status, SessionStatus::Expired);
    assert!(alice.keyring().session_key(session).unwrap().is_none());

    // The chat document itself is untouched.
    assert!(fixture.store.load_chat(chat).await.unwrap().is_some());
    drop(bob);
}

#[tokio::test]
async fn next_open_after_cleanup_mints_fresh_session() {
    let fixture = Fixture::new(31);
    let alice = fixture.register(ALICE).await;
    let _bob = fixture.register(BOB).await;
    let chat = fixture.chat(ALICE, BOB).await;

    let first = {
        let _a = fixture.presence.connect(ALICE);
        let _b = fixture.presence.connect(BOB);
        let mut view = fixture.monitor(&alice, chat);
        view.open().await;
        view.active_session().unwrap()
    };

    let watcher = CleanupWatcher::new(fixture.ctx(), chat).await.unwrap();
    watcher.run().await.unwrap();

    let _a = fixture.presence.connect(ALICE);
    let _b = fixture.presence.connect(BOB);
    let mut view = fixture.monitor(&alice, chat);
    let state = view.open().await.clone();

    let MonitorState::Active { session_id } = state else {
        unreachable!("expected a fresh session, got {state:?}");
    };
    assert_ne!(session_id, first);
}

#[tokio::test]
async fn cleanup_without_session_is_a_no_op() {
    let fixture = Fixture::new(32);
    let chat = fixture.chat(ALICE, BOB).await;

    let watcher = CleanupWatcher::new(fixture.ctx(), chat).await.unwrap();
    assert_eq!(watcher.cleanup().await.unwrap(), CleanupReport::default());
}

#[tokio::test]
async fn open_view_cannot_send_under_expired_session() {
    let fixture = Fixture::new(33);
    let alice = fixture.register(ALICE).await;
    let bob = fixture.register(BOB).await;
    let chat = fixture.chat(ALICE, BOB).await;

    let mut view = fixture.monitor(&alice, chat);
    let retired = {
        let _a = fixture.presence.connect(ALICE);
        let _b = fixture.presence.connect(BOB);
        view.open().await;
        view.active_session().unwrap()
    };
    CleanupWatcher::new(fixture.ctx(), chat).await.unwrap().run().await.unwrap();

    let _a = fixture.presence.connect(ALICE);
    let _b = fixture.presence.connect(BOB);
    // The view has not noticed yet.
    assert_eq!(view.active_session(), Some(retired));

    let result = view.send(b"late").await;
    assert_eq!(result.unwrap_err(), ClientError::SessionExpired { session: retired });
    assert_eq!(fixture.store.message_count().unwrap(), 0);
    assert!(alice.keyring().session_key(retired).unwrap().is_none());

    // Both are online, so resolving again minted a fresh session.
    let fresh = view.active_session().unwrap();
    assert_ne!(fresh, retired);
    view.send(b"on time").await.unwrap();

    let mut bob_view = fixture.monitor(&bob, chat);
    assert_eq!(bob_view.open().await, &MonitorState::Active { session_id: fresh });
    let history = bob_view.read_recent(10).await.unwrap();
    let bodies: Vec<_> = history.iter().map(|m| m.body.clone()).collect();
    assert_eq!(bodies, vec![MessageBody::Plaintext(b"on time".to_vec())]);
}

#[tokio::test]
async fn expired_view_waits_for_peer_when_alone() {
    let fixture = Fixture::new(34);
    let alice = fixture.register(ALICE).await;
    let _bob = fixture.register(BOB).await;
    let chat = fixture.chat(ALICE, BOB).await;

    let mut view = fixture.monitor(&alice, chat);
    let retired = {
        let _a = fixture.presence.connect(ALICE);
        let _b = fixture.presence.connect(BOB);
        view.open().await;
        view.active_session().unwrap()
    };
    CleanupWatcher::new(fixture.ctx(), chat).await.unwrap().run().await.unwrap();

    let _a = fixture.presence.connect(ALICE);
    let result = view.send(b"anyone?").await;

    assert_eq!(result.unwrap_err(), ClientError::SessionExpired { session: retired });
    assert_eq!(view.state(), &MonitorState::AwaitingPeer { peer: BOB });
    assert_eq!(fixture.store.message_count().unwrap(), 0);
}

#[tokio::test]
async fn cleanup_purges_every_expired_session() {
    let fixture = Fixture::new(35);
    let alice = fixture.register(ALICE).await;
    let _bob = fixture.register(BOB).await;
    let chat = fixture.chat(ALICE, BOB).await;
    let a = fixture.presence.connect(ALICE);
    let b = fixture.presence.connect(BOB);

    let mut first = fixture.monitor(&alice, chat);
    first.open().await;
    let old = first.active_session().unwrap();
    first.send(b"from the first session").await.unwrap();

    // Expired without a purge, as after a crash mid-cleanup.
    fixture.broker.expire_session(chat, old).await.unwrap();

    let mut second = fixture.monitor(&alice, chat);
    second.open().await;
    let new = second.active_session().unwrap();
    assert_ne!(new, old);
    second.send(b"from the second session").await.unwrap();
    assert_eq!(fixture.store.message_count().unwrap(), 2);

    drop((a, b));
    let report = CleanupWatcher::new(fixture.ctx(), chat).await.unwrap().cleanup().await.unwrap();

    assert_eq!(report, CleanupReport { session: Some(new), purged: 2 });
    assert_eq!(fixture.store.message_count().unwrap(), 0);
}
