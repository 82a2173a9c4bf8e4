mod helpers;

use helpers::*;
use sealbid_backend::error::AppError;
use sealbid_backend::models::*;
use sealbid_backend::services::AuditTrailService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// End-to-end: store strategy → open room with it → bets → watcher settles
#[tokio::test]
async fn test_e2e_strategy_room_flow() {
    let venue = TestVenue::new().await;
    let mut events = venue.state.events.subscribe();

    // Step 1: creator stores a reusable strategy
    let creator = venue.funded_account("creator", 30).await;
    let sealed = venue.seal_strategy(&[2, 1, 0]).await;
    let index = venue
        .state
        .strategies
        .store_custom_strategy(&creator, sealed)
        .await
        .expect("Failed to store strategy");

    // Step 2: room opens with the creator's strategy as first bet
    let room = venue
        .state
        .registry
        .create_room_from_strategy(room_params(10), &creator, index)
        .await
        .expect("Failed to create room");
    assert_eq!(venue.locked(&creator).await, 10);

    // Step 3: two more bettors, one reusing a strategy of their own
    let fresh = venue.funded_account("fresh", 30).await;
    venue.bet(room, &fresh, &[2, 1, 1]).await;

    let reuser = venue.funded_account("reuser", 30).await;
    let their_strategy = venue.seal_strategy(&[0, 0, 2]).await;
    let their_index = venue
        .state
        .strategies
        .store_custom_strategy(&reuser, their_strategy)
        .await
        .unwrap();
    venue
        .state
        .registry
        .place_bet_from_strategy(room, &reuser, their_index)
        .await
        .expect("Failed to bet from strategy");

    // Step 4: window closes, watcher decrypts and settles
    venue.expire();
    let report = venue.watcher().run_tick().await;
    assert_eq!(report.settled, vec![room]);

    let settled = venue.state.registry.get_room(room).await.unwrap();
    assert_eq!(settled.status, RoomStatus::Settled);
    assert_eq!(
        settled.decoded_outcome,
        Some(vec![vec![2, 1, 0], vec![2, 1, 1], vec![0, 0, 2]])
    );

    // majority [2, 1, 0]: creator 3, fresh 2, reuser 1
    let summary = settled.settlement.unwrap();
    assert_eq!(summary.winners, vec![creator.clone()]);
    assert_eq!(venue.free(&creator).await, 50);
    assert_eq!(venue.free(&fresh).await, 20);
    assert_eq!(venue.free(&reuser).await, 20);

    // Step 5: one event per transition, in order
    let mut names = Vec::new();
    while let Ok(event) = events.try_recv() {
        names.push(event.as_str());
    }
    assert_eq!(
        names,
        vec![
            "room_created",
            "bet_placed",
            "bet_placed",
            "bet_placed",
            "room_closed",
            "outcome_decoded",
            "room_settled"
        ]
    );
}

#[tokio::test]
async fn test_strategy_reused_across_rooms() {
    let venue = TestVenue::new().await;
    let alice = venue.funded_account("alice", 10).await;
    let bob = venue.funded_account("bob", 10).await;
    let sealed = venue.seal_strategy(&[1, 1]).await;
    venue.state.strategies.store_custom_strategy(&alice, sealed).await.unwrap();

    let first = venue.open_room(1).await;
    let second = venue.open_room(1).await;
    for room in [first, second] {
        venue
            .state
            .registry
            .place_bet_from_strategy(room, &alice, 0)
            .await
            .unwrap();
        venue.bet(room, &bob, &[1, 1]).await;
    }

    venue.expire();
    let report = venue.watcher().run_tick().await;
    assert_eq!(report.settled, vec![first, second]);
    for room in [first, second] {
        let settled = venue.state.registry.get_room(room).await.unwrap();
        assert_eq!(settled.decoded_outcome, Some(vec![vec![1, 1], vec![1, 1]]));
    }
    assert_eq!(venue.free(&alice).await, 10);
}

#[tokio::test]
async fn test_unknown_strategy_bet_is_not_found() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 10).await;

    let err = venue
        .state
        .registry
        .place_bet_from_strategy(room, &alice, 0)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(venue.locked(&alice).await, 0);
}

#[tokio::test]
async fn test_custody_outage_then_recovery() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 10).await;
    venue.bet(room, &alice, &[1]).await;

    venue.expire();
    venue.custody.set_unavailable(true);
    let watcher = venue.watcher();
    let report = watcher.run_tick().await;
    assert_eq!(report.retried, vec![room]);
    assert_eq!(
        venue.state.registry.get_room(room).await.unwrap().status,
        RoomStatus::Open
    );

    venue.custody.set_unavailable(false);
    assert_eq!(watcher.run_tick().await.settled, vec![room]);
    assert_eq!(venue.free(&alice).await, 10);
}

#[tokio::test]
async fn test_crash_between_decode_and_settlement() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(4).await;
    let alice = venue.funded_account("alice", 10).await;
    let bob = venue.funded_account("bob", 10).await;
    venue.bet(room, &alice, &[3]).await;
    venue.bet(room, &bob, &[3]).await;

    // an operator closes and decodes, then goes away before paying out
    venue.expire();
    let registry = &venue.state.registry;
    registry.close_for_decoding(room).await.unwrap();
    registry
        .decode_bet_datas(room, vec![vec![3], vec![3]], &venue.operator)
        .await
        .unwrap();
    let pending: Vec<RoomId> = registry.rooms_pending_settlement(registry.now()).await.collect();
    assert_eq!(pending, vec![room]);

    // a fresh watcher picks the room up and only settles it
    assert_eq!(venue.watcher().run_tick().await.settled, vec![room]);
    assert_eq!(venue.free(&alice).await, 10);
    assert_eq!(venue.free(&bob).await, 10);
    assert!(matches!(
        registry.settlement(room, &venue.operator).await,
        Err(AppError::AlreadySettled(_))
    ));
}

#[tokio::test]
async fn test_background_watcher_and_audit_trail() {
    let venue = TestVenue::new().await;
    let dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditTrailService::new(dir.path()).unwrap());
    let audit_handle = tokio::spawn(audit.clone().run(venue.state.events.subscribe()));

    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 5).await;
    venue.bet(room, &alice, &[1]).await;
    venue.expire();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher_handle = tokio::spawn(venue.watcher().start(shutdown_rx));

    let mut settled = false;
    for _ in 0..200 {
        if venue.state.registry.get_room(room).await.unwrap().is_settled() {
            settled = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(settled);

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), watcher_handle)
        .await
        .expect("Watcher did not stop")
        .unwrap();

    // give the forwarder a moment to drain
    tokio::time::sleep(Duration::from_millis(50)).await;
    audit_handle.abort();

    let contents = std::fs::read_to_string(audit.log_file()).unwrap();
    let types: Vec<String> = contents
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["event_type"].to_string())
        .collect();
    assert_eq!(types.first().map(String::as_str), Some("\"room_created\""));
    assert_eq!(types.last().map(String::as_str), Some("\"room_settled\""));
}
