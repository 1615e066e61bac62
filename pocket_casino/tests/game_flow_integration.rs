//! End-to-end game flow tests.
//!
//! Every session opened by one casino draws on the same ledger. These tests
//! play several games in turn and check that the balance, the transaction
//! history and the display mirror stay consistent.

use pocket_casino::{
    Casino, CasinoConfig, GameKind, GameSession, LedgerError, SessionError, SessionInfo,
    game::{BlackjackSession, CrapsBet, CrapsSession, RouletteBet, VideoPokerSession},
    ledger::TransactionCause,
    store::DEFAULT_BALANCE,
};
use std::time::Duration;

async fn casino() -> Casino {
    Casino::open(CasinoConfig::in_memory()).await.unwrap()
}

async fn open_blackjack(casino: &Casino, seed: u64) -> BlackjackSession {
    match casino.open_game(GameKind::Blackjack, Some(seed)).await.unwrap() {
        GameSession::Blackjack(session) => session,
        other => panic!("opened {}", other.kind()),
    }
}

async fn open_craps(casino: &Casino) -> CrapsSession {
    match casino.open_game(GameKind::Craps, Some(1)).await.unwrap() {
        GameSession::Craps(session) => session,
        other => panic!("opened {}", other.kind()),
    }
}

async fn open_poker(casino: &Casino, seed: u64) -> VideoPokerSession {
    match casino.open_game(GameKind::VideoPoker, Some(seed)).await.unwrap() {
        GameSession::VideoPoker(session) => session,
        other => panic!("opened {}", other.kind()),
    }
}

#[tokio::test]
async fn test_games_share_one_balance() {
    let casino = casino().await;
    let ledger = casino.ledger().clone();

    let mut slots = casino.open_slots("advanced", Some(11)).await.unwrap();
    let mut blackjack = open_blackjack(&casino, 12).await;
    let mut craps = open_craps(&casino).await;
    let mut poker = open_poker(&casino, 13).await;

    for _ in 0..5 {
        slots.spin(10).await.unwrap();

        let round = blackjack.deal(10).await.unwrap();
        if round.outcome.is_none() {
            blackjack.stand().await.unwrap();
        }

        poker.deal(10).await.unwrap();
        poker.draw(&[0, 1]).await.unwrap();
    }

    craps.place_bet(CrapsBet::Pass, 20).await.unwrap();
    craps.roll_with(3, 4).await.unwrap();

    // The balance moved by exactly the sum of the recorded deltas.
    let history = ledger.history(usize::MAX).await;
    let net: i64 = history.iter().map(|tx| tx.delta).sum();
    let balance = ledger.balance().await;
    assert_eq!(balance as i64, DEFAULT_BALANCE as i64 + net);

    let games: std::collections::BTreeSet<_> =
        history.iter().filter_map(|tx| tx.game.clone()).collect();
    assert!(games.contains("craps"));
    assert!(games.contains("blackjack"));
    assert!(games.contains("video_poker"));
    assert!(games.iter().any(|g| g.starts_with("slots/")));

    assert_eq!(casino.last_active_game().await.as_deref(), Some("video_poker"));
    casino.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_one_game_can_drain_the_others() {
    let casino = casino().await;
    let mut slots = casino.open_slots("classic", Some(2)).await.unwrap();
    let mut roulette = match casino.open_game(GameKind::Roulette, Some(2)).await.unwrap() {
        GameSession::Roulette(session) => session,
        other => panic!("opened {}", other.kind()),
    };

    roulette
        .place_bet(RouletteBet::Straight(0), DEFAULT_BALANCE)
        .await
        .unwrap();
    let result = roulette.spin_to(5).await.unwrap();
    assert_eq!(result.balance, 0);

    let err = slots.spin(1).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Ledger(LedgerError::InsufficientFunds {
            available: 0,
            required: 1
        })
    );
    assert_eq!(err.client_message(), "Not enough credits");
    assert!(slots.is_idle());
    assert_eq!(casino.ledger().balance().await, 0);
}

#[tokio::test]
async fn test_craps_come_out_seven_pays_even_money() {
    let casino = casino().await;
    let mut craps = open_craps(&casino).await;

    craps.place_bet(CrapsBet::Pass, 50).await.unwrap();
    assert_eq!(casino.ledger().balance().await, DEFAULT_BALANCE - 50);

    let outcome = craps.roll_with(3, 4).await.unwrap();
    assert_eq!(outcome.total, 7);
    assert_eq!(outcome.balance, DEFAULT_BALANCE + 50);

    let last = casino.ledger().history(1).await;
    assert_eq!(last[0].cause, TransactionCause::Payout);
    assert_eq!(last[0].delta, 100);
}

#[tokio::test]
async fn test_mirror_follows_session_play() {
    let casino = casino().await;
    let (mirror, mut handle) = casino.mirror().await;
    tokio::spawn(mirror.run());

    let mut craps = open_craps(&casino).await;
    craps.place_bet(CrapsBet::Field, 25).await.unwrap();

    let shown = tokio::time::timeout(Duration::from_secs(2), handle.changed())
        .await
        .unwrap();
    assert_eq!(shown, Some(DEFAULT_BALANCE - 25));

    // Field pays double on 2.
    craps.roll_with(1, 1).await.unwrap();
    let shown = tokio::time::timeout(Duration::from_secs(2), handle.changed())
        .await
        .unwrap();
    assert_eq!(shown, Some(DEFAULT_BALANCE + 50));
    assert_eq!(handle.balance(), casino.ledger().balance().await);

    handle.shutdown();
}

#[tokio::test]
async fn test_invalid_actions_leave_balance_untouched() {
    let casino = casino().await;
    let mut blackjack = open_blackjack(&casino, 4).await;
    let mut poker = open_poker(&casino, 4).await;

    assert_eq!(blackjack.hit().await.unwrap_err(), SessionError::InvalidAction);
    assert_eq!(poker.draw(&[]).await.unwrap_err(), SessionError::InvalidAction);

    let mut craps = open_craps(&casino).await;
    craps.place_bet(CrapsBet::Pass, 10).await.unwrap();
    craps.roll_with(2, 2).await.unwrap();
    assert_eq!(craps.state().point(), Some(4));
    assert!(matches!(
        craps.place_bet(CrapsBet::Pass, 10).await,
        Err(SessionError::BetNotAllowed(_))
    ));

    assert_eq!(casino.ledger().balance().await, DEFAULT_BALANCE - 10);
    assert!(matches!(
        casino.open_game(GameKind::Slots, None).await,
        Err(pocket_casino::CasinoError::Session(SessionError::InvalidAction))
    ));
}
