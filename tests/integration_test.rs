mod helpers;

use helpers::*;
use sealbid_backend::error::AppError;
use sealbid_backend::models::*;
use sealbid_backend::repositories::replay_balances;

#[tokio::test]
async fn test_locked_stake_tracks_bet_count() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(3).await;

    for i in 0..4 {
        let bettor = venue.funded_account(&format!("bettor-{}", i), 10).await;
        venue.bet(room, &bettor, &[1, 0, i as u8]).await;

        let snapshot = venue.state.registry.get_room(room).await.unwrap();
        assert_eq!(venue.state.ledger.total_locked(&usdc()).await, 3 * snapshot.bets.len() as u64);
        assert_eq!(snapshot.total_locked(), 3 * (i + 1));
    }
}

#[tokio::test]
async fn test_duplicate_bettor_rejected() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 100).await;

    venue.bet(room, &alice, &[1]).await;
    let again = venue.seal_for_room(room, &[2]).await;
    let err = venue.state.registry.place_bet(room, &alice, again).await.unwrap_err();

    assert!(matches!(err, AppError::DuplicateBettor { .. }));
    assert_eq!(venue.state.registry.get_room(room).await.unwrap().bets.len(), 1);
    assert_eq!(venue.locked(&alice).await, 1);
}

#[tokio::test]
async fn test_bet_after_end_time_is_rejected() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 100).await;
    let sealed = venue.seal_for_room(room, &[1]).await;

    venue.expire();
    let err = venue.state.registry.place_bet(room, &alice, sealed).await.unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(venue.state.registry.bet_ciphertexts(room).await.unwrap().is_empty());
    assert_eq!(venue.free(&alice).await, 100);
}

#[tokio::test]
async fn test_zero_winners_refunds_everyone() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 100).await;
    let bob = venue.funded_account("bob", 100).await;

    // identical wagers: nobody is separated from the field
    venue.bet(room, &alice, &[2, 2]).await;
    venue.bet(room, &bob, &[2, 2]).await;
    assert_eq!(venue.free(&alice).await, 99);

    venue.expire();
    let report = venue.watcher().run_tick().await;
    assert_eq!(report.settled, vec![room]);

    let settled = venue.state.registry.get_room(room).await.unwrap();
    assert!(settled.settlement.unwrap().refunded);
    assert_eq!(venue.free(&alice).await, 100);
    assert_eq!(venue.free(&bob).await, 100);
    assert_eq!(venue.locked(&alice).await, 0);
}

#[tokio::test]
async fn test_settlement_conserves_value() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(7).await;

    let wagers: [&[u8]; 5] = [&[1, 2, 3], &[1, 2, 3], &[1, 2, 0], &[0, 0, 0], &[1, 1, 3]];
    let mut bettors = Vec::new();
    for (i, wager) in wagers.iter().enumerate() {
        let bettor = venue.funded_account(&format!("b{}", i), 50).await;
        venue.bet(room, &bettor, wager).await;
        bettors.push(bettor);
    }

    let mut held_before = 0;
    for bettor in &bettors {
        held_before += venue.state.ledger.get_balance(bettor, &usdc()).await.total();
    }
    assert_eq!(held_before, 250);

    venue.expire();
    venue.watcher().run_tick().await;

    let locks = flow_total(&venue, &bettors, FlowKind::Lock).await;
    let releases = flow_total(&venue, &bettors, FlowKind::Release).await;
    let payouts = flow_total(&venue, &bettors, FlowKind::Payout).await;
    assert_eq!(locks, 35);
    assert_eq!(releases + payouts, locks);

    let mut total_free = 0;
    let mut held_after = 0;
    for bettor in &bettors {
        total_free += venue.free(bettor).await;
        held_after += venue.state.ledger.get_balance(bettor, &usdc()).await.total();
    }
    assert_eq!(total_free, 250);
    assert_eq!(held_after, held_before);
    assert_eq!(venue.state.ledger.total_locked(&usdc()).await, 0);
}

#[tokio::test]
async fn test_double_settlement_leaves_balances_alone() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(5).await;
    let alice = venue.funded_account("alice", 20).await;
    let bob = venue.funded_account("bob", 20).await;
    venue.bet(room, &alice, &[1]).await;
    venue.bet(room, &bob, &[1]).await;

    venue.expire();
    venue.watcher().run_tick().await;
    let before = (venue.free(&alice).await, venue.free(&bob).await);
    let history = venue.state.ledger.get_user_token_fund_flow_records(&alice).await.len();

    let err = venue
        .state
        .registry
        .settlement(room, &venue.operator)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadySettled(_)));
    assert_eq!((venue.free(&alice).await, venue.free(&bob).await), before);
    assert_eq!(
        venue.state.ledger.get_user_token_fund_flow_records(&alice).await.len(),
        history
    );
}

#[tokio::test]
async fn test_concurrent_settlement_pays_once() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(4).await;
    let alice = venue.funded_account("alice", 20).await;
    let bob = venue.funded_account("bob", 20).await;
    let carol = venue.funded_account("carol", 20).await;
    venue.bet(room, &alice, &[1, 1]).await;
    venue.bet(room, &bob, &[1, 1]).await;
    venue.bet(room, &carol, &[0, 0]).await;

    venue.expire();
    let registry = venue.state.registry.clone();
    registry.close_for_decoding(room).await.unwrap();
    registry
        .decode_bet_datas(room, vec![vec![1, 1], vec![1, 1], vec![0, 0]], &venue.operator)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        registry.settlement(room, &venue.operator),
        registry.settlement(room, &venue.operator)
    );
    let (won, lost) = if a.is_ok() { (a, b) } else { (b, a) };
    assert_eq!(won.unwrap().winners, vec![alice.clone(), bob.clone()]);
    assert!(matches!(lost, Err(AppError::AlreadySettled(_))));

    // deposit, lock, then release + payout for winners or forfeit for carol
    assert_eq!(venue.free(&alice).await, 22);
    assert_eq!(venue.free(&bob).await, 22);
    assert_eq!(venue.free(&carol).await, 16);
    for (account, records) in [(&alice, 4), (&bob, 4), (&carol, 3)] {
        let history = venue.state.ledger.get_user_token_fund_flow_records(account).await;
        assert_eq!(history.len(), records);
    }
}

#[tokio::test]
async fn test_racing_watchers_settle_once() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(3).await;
    let alice = venue.funded_account("alice", 10).await;
    let bob = venue.funded_account("bob", 10).await;
    venue.bet(room, &alice, &[2]).await;
    venue.bet(room, &bob, &[2]).await;
    venue.expire();

    let first = venue.watcher();
    let second = venue.watcher();
    let (a, b) = tokio::join!(first.run_tick(), second.run_tick());

    assert_eq!(a.settled.len() + b.settled.len(), 1);
    assert!(a.retried.is_empty() && b.retried.is_empty());
    assert_eq!(venue.free(&alice).await, 10);
    assert_eq!(venue.free(&bob).await, 10);
    for account in [&alice, &bob] {
        let history = venue.state.ledger.get_user_token_fund_flow_records(account).await;
        assert_eq!(history.len(), 3);
    }
}

#[tokio::test]
async fn test_stake_that_would_overflow_pool_is_rejected() {
    let venue = TestVenue::new().await;
    let stake = u64::MAX / 2 + 1;
    let room = venue.open_room(stake).await;
    let alice = venue.funded_account("alice", stake).await;
    let bob = venue.funded_account("bob", stake).await;
    venue.bet(room, &alice, &[1, 1]).await;

    let sealed = venue.seal_for_room(room, &[1, 1]).await;
    let err = venue.state.registry.place_bet(room, &bob, sealed).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(venue.free(&bob).await, stake);
    assert_eq!(venue.locked(&bob).await, 0);

    venue.expire();
    let report = venue.watcher().run_tick().await;
    assert_eq!(report.settled, vec![room]);
    let settled = venue.state.registry.get_room(room).await.unwrap();
    assert_eq!(settled.settlement.unwrap().pool, stake);
    assert_eq!(venue.free(&alice).await, stake);
}

#[tokio::test]
async fn test_strategy_lookup() {
    let venue = TestVenue::new().await;
    let owner = AccountId::new("a");
    let sealed = venue.seal_strategy(&[4, 4, 1]).await;

    let index = venue
        .state
        .strategies
        .store_custom_strategy(&owner, sealed.clone())
        .await
        .unwrap();
    assert_eq!(index, 0);
    assert_eq!(venue.state.strategies.get_custom_strategy(&owner, 0).await.unwrap(), sealed);

    let err = venue.state.strategies.get_custom_strategy(&owner, 1).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_flow_record_replay_matches_balance() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(2).await;
    let alice = venue.funded_account("alice", 40).await;
    let bob = venue.funded_account("bob", 40).await;
    let carol = venue.funded_account("carol", 40).await;
    venue.state.ledger.withdraw(&alice, &usdc(), 5).await.unwrap();

    venue.bet(room, &alice, &[1, 1]).await;
    venue.bet(room, &bob, &[1, 1]).await;
    venue.bet(room, &carol, &[0, 1]).await;
    venue.expire();
    venue.watcher().run_tick().await;

    for account in [&alice, &bob, &carol] {
        let records = venue.state.ledger.get_user_token_fund_flow_records(account).await;
        let replayed = replay_balances(&records, &usdc()).unwrap();
        assert_eq!(replayed.free, venue.free(account).await);
        assert_eq!(replayed.locked, 0);
        assert_eq!(records.last().unwrap().resulting_balance, venue.free(account).await);
        venue.state.ledger.verify_account(account).await.unwrap();
    }
    // carol lost her stake to the two winners
    assert_eq!(venue.free(&carol).await, 38);
    assert_eq!(venue.free(&alice).await, 36);
    assert_eq!(venue.free(&bob).await, 41);
}

#[tokio::test]
async fn test_concurrent_bets_from_one_bettor() {
    let venue = TestVenue::new().await;
    let room = venue.open_room(1).await;
    let alice = venue.funded_account("alice", 100).await;
    let first = venue.seal_for_room(room, &[1]).await;
    let second = venue.seal_for_room(room, &[2]).await;

    let registry = venue.state.registry.clone();
    let (a, b) = tokio::join!(
        registry.place_bet(room, &alice, first),
        registry.place_bet(room, &alice, second)
    );

    assert!(a.is_ok() != b.is_ok());
    assert_eq!(venue.locked(&alice).await, 1);
}
