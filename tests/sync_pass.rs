mod common;

use axum::extract::ws::Message;
use common::{Harness, MockChain, NOW, harness, harness_with, test_config};
use futures::channel::mpsc;
use futures::{StreamExt, stream};
use inscription_indexer::broadcast::{ServerMessage, snapshot_message};
use inscription_indexer::server::serve_observer;
use inscription_indexer::repository::{
    Database, InscriptionRepository, LAST_SYNCED_BLOCK, MetaRepository, TokenRepository,
};
use inscription_indexer::scanner::PassResult;
use std::sync::atomic::Ordering;
use tokio::sync::broadcast::Receiver;

fn drain(rx: &mut Receiver<std::sync::Arc<str>>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(json) = rx.try_recv() {
        messages.push(serde_json::from_str(&json).unwrap());
    }
    messages
}

fn stored_cursor(db: &Database) -> i64 {
    let conn = db.lock().unwrap();
    MetaRepository::new(&conn)
        .get_i64(LAST_SYNCED_BLOCK)
        .unwrap()
        .unwrap()
}

#[tokio::test]
async fn fresh_start_over_empty_range_advances_and_broadcasts_empty_snapshot() {
    let mut h = harness(MockChain::new(5), 0);
    assert_eq!(h.engine.cursor(), -1);
    let mut rx = h.broadcaster.subscribe();

    let result = h.engine.run_once(NOW).await.unwrap();

    let PassResult::Synced(summary) = result else {
        panic!("expected a synced pass");
    };
    assert_eq!((summary.from, summary.to), (0, 5));
    assert_eq!(h.engine.cursor(), 5);
    assert_eq!(stored_cursor(&h.db), 5);

    let conn = h.db.lock().unwrap();
    assert_eq!(TokenRepository::new(&conn).count().unwrap(), 0);
    assert_eq!(InscriptionRepository::new(&conn).count().unwrap(), 0);
    drop(conn);

    assert_eq!(drain(&mut rx), vec![ServerMessage::TokensSnapshot(vec![])]);
}

#[tokio::test]
async fn deploy_creates_token_from_authoritative_read() {
    let chain = MockChain::new(5);
    chain.deploy("FOO", 3);
    chain.set_token("FOO", 0, 0);
    let mut h = harness(chain, 0);

    h.engine.run_once(NOW).await.unwrap();

    let conn = h.db.lock().unwrap();
    let token = TokenRepository::new(&conn).get("FOO").unwrap().unwrap();
    assert_eq!(token.deployed_at, Some(3));
    assert_eq!(token.max_supply, "1000");
    assert_eq!(token.limit_per_mint, "10");
    assert_eq!(token.minted, "0");
    assert_eq!(token.holders_count, 0);
}

#[tokio::test]
async fn inscription_in_same_block_as_deploy_finds_its_token() {
    let chain = MockChain::new(10);
    // inscribe has no decodable calldata, so only the projected deploy can
    // resolve its tick
    chain.inscribe("PEPE", 10, 1, false);
    chain.deploy("PEPE", 10);
    chain.set_token("PEPE", 10, 1);
    chain.set_timestamp(10, 1_700_000_010);
    let mut h = harness(chain, 0);

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!(summary.deploys.applied, 1);
    assert_eq!(summary.inscriptions.applied, 1);
    assert_eq!(summary.inscriptions.skipped, 0);

    let conn = h.db.lock().unwrap();
    let inscriptions = InscriptionRepository::new(&conn).recent(10).unwrap();
    assert_eq!(inscriptions.len(), 1);
    assert_eq!(inscriptions[0].tick, "PEPE");
    assert_eq!(inscriptions[0].time, 1_700_000_010);
    assert_eq!(inscriptions[0].inscription_number, "1");

    let token = TokenRepository::new(&conn).get("PEPE").unwrap().unwrap();
    assert_eq!(token.minted, "10");
    assert_eq!(token.holders_count, 1);
    assert_eq!(token.deployed_at, Some(10));
}

#[tokio::test]
async fn inscription_of_token_deployed_before_start_resolves_from_calldata() {
    let chain = MockChain::new(20);
    chain.inscribe("OLD", 15, 9, true);
    chain.set_token("OLD", 500, 7);
    chain.set_timestamp(15, 1_700_000_015);
    let mut h = harness(chain, 10);

    h.engine.run_once(NOW).await.unwrap();

    let conn = h.db.lock().unwrap();
    let token = TokenRepository::new(&conn).get("OLD").unwrap().unwrap();
    assert_eq!(token.minted, "500");
    assert_eq!(token.deployed_at, None);
}

#[tokio::test]
async fn token_reflects_latest_read_regardless_of_event_count() {
    let chain = MockChain::new(30);
    chain.deploy("FOO", 3);
    for (n, block) in [11u64, 12, 13].into_iter().enumerate() {
        chain.inscribe("FOO", block, n as u64 + 1, true);
    }
    chain.set_token("FOO", 30, 2);
    let mut h = harness(chain.clone(), 0);

    h.engine.run_once(NOW).await.unwrap();

    // one read for the deploy plus one per inscription
    assert_eq!(chain.token_info_calls.load(Ordering::Relaxed), 4);
    let conn = h.db.lock().unwrap();
    let token = TokenRepository::new(&conn).get("FOO").unwrap().unwrap();
    assert_eq!(token.minted, "30");
    assert_eq!(token.holders_count, 2);
    assert_eq!(InscriptionRepository::new(&conn).count().unwrap(), 3);
}

#[tokio::test]
async fn redeploy_in_later_pass_keeps_first_deployed_at() {
    let chain = MockChain::new(5);
    chain.deploy("FOO", 3);
    chain.set_token("FOO", 0, 0);
    let mut h = harness(chain.clone(), 0);
    h.engine.run_once(NOW).await.unwrap();

    chain.deploy("FOO", 8);
    chain.set_token("FOO", 100, 4);
    chain.set_head(9);
    h.engine.run_once(NOW).await.unwrap();

    let conn = h.db.lock().unwrap();
    let token = TokenRepository::new(&conn).get("FOO").unwrap().unwrap();
    assert_eq!(token.deployed_at, Some(3));
    assert_eq!(token.minted, "100");
    assert_eq!(token.holders_count, 4);
}

#[tokio::test]
async fn nothing_to_do_leaves_cursor_and_skips_broadcast() {
    let mut h = harness(MockChain::new(5), 0);
    h.engine.run_once(NOW).await.unwrap();
    let mut rx = h.broadcaster.subscribe();

    let result = h.engine.run_once(NOW).await.unwrap();

    assert_eq!(result, PassResult::UpToDate { cursor: 5, head: 5 });
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn cursor_never_moves_backwards_when_head_regresses() {
    let chain = MockChain::new(50);
    let mut h = harness(chain.clone(), 0);
    h.engine.run_once(NOW).await.unwrap();

    chain.set_head(40);
    let result = h.engine.run_once(NOW).await.unwrap();

    assert_eq!(result, PassResult::UpToDate { cursor: 50, head: 40 });
    assert_eq!(stored_cursor(&h.db), 50);
}

#[tokio::test]
async fn unrecoverable_fetch_failure_aborts_pass_without_moving_cursor() {
    let chain = MockChain::new(20);
    chain.deploy("FOO", 3);
    chain.set_token("FOO", 0, 0);
    chain.inscribe("FOO", 12, 1, true);
    *chain.broken_block.lock().unwrap() = Some(12);
    let mut h = harness(chain.clone(), 0);
    let mut rx = h.broadcaster.subscribe();

    assert!(h.engine.run_once(NOW).await.is_err());
    assert_eq!(h.engine.cursor(), -1);
    assert_eq!(stored_cursor(&h.db), -1);
    assert!(drain(&mut rx).is_empty());

    // next tick retries the same range
    *chain.broken_block.lock().unwrap() = None;
    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!((summary.from, summary.to), (0, 20));
    assert_eq!(h.engine.cursor(), 20);

    let conn = h.db.lock().unwrap();
    assert_eq!(InscriptionRepository::new(&conn).count().unwrap(), 1);
}

#[tokio::test]
async fn tick_reports_aborted_pass_in_stats() {
    let chain = MockChain::new(20);
    *chain.broken_block.lock().unwrap() = Some(0);
    let mut h = harness(chain, 0);
    let stats = h.engine.stats();

    h.engine.tick().await;

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.aborted_passes, 1);
    assert_eq!(snapshot.completed_passes, 0);
    assert_eq!(snapshot.last_synced_block, -1);
}

#[tokio::test]
async fn range_limited_source_is_recovered_by_halving() {
    let chain = MockChain::new(300);
    chain.deploy("FOO", 7);
    chain.set_token("FOO", 0, 0);
    for (n, block) in [50u64, 150, 299].into_iter().enumerate() {
        chain.inscribe("FOO", block, n as u64 + 1, false);
    }
    *chain.max_range.lock().unwrap() = Some(30);
    let mut h = harness(chain, 0);

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert!(summary.halvings > 0);
    assert_eq!(summary.inscriptions.applied, 3);

    let conn = h.db.lock().unwrap();
    let numbers: Vec<_> = InscriptionRepository::new(&conn)
        .recent(10)
        .unwrap()
        .into_iter()
        .map(|i| i.inscription_number)
        .collect();
    assert_eq!(numbers, vec!["3", "2", "1"]);
}

#[tokio::test]
async fn malformed_log_is_skipped_and_pass_completes() {
    let chain = MockChain::new(10);
    chain.malformed_deploy(2);
    chain.deploy("FOO", 4);
    chain.set_token("FOO", 0, 0);
    let mut h = harness(chain, 0);
    let stats = h.engine.stats();

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!(summary.deploys.skipped, 1);
    assert_eq!(summary.deploys.applied, 1);
    assert_eq!(h.engine.cursor(), 10);
    assert_eq!(stats.snapshot().skipped_logs, 1);
}

#[tokio::test]
async fn failed_token_read_skips_deploy_but_not_the_pass() {
    let chain = MockChain::new(10);
    chain.deploy("GHOST", 4);
    let mut h = harness(chain, 0);

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!(summary.deploys.skipped, 1);
    assert_eq!(h.engine.cursor(), 10);
}

#[tokio::test]
async fn missing_block_timestamp_falls_back_to_wall_clock() {
    let chain = MockChain::new(10);
    chain.deploy("FOO", 1);
    chain.set_token("FOO", 10, 1);
    chain.inscribe("FOO", 6, 1, false);
    let mut h = harness(chain, 0);

    h.engine.run_once(NOW).await.unwrap();

    let conn = h.db.lock().unwrap();
    let inscriptions = InscriptionRepository::new(&conn).recent(1).unwrap();
    assert_eq!(inscriptions[0].time, NOW);
}

#[tokio::test]
async fn pass_broadcast_orders_recent_inscriptions_oldest_first() {
    let chain = MockChain::new(10);
    chain.deploy("FOO", 1);
    chain.set_token("FOO", 20, 1);
    chain.inscribe("FOO", 8, 2, false);
    chain.inscribe("FOO", 5, 1, false);
    let mut h = harness(chain, 0);
    let mut rx = h.broadcaster.subscribe();

    h.engine.run_once(NOW).await.unwrap();

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 3);
    let ServerMessage::TokensSnapshot(tokens) = &messages[0] else {
        panic!("snapshot must come first");
    };
    assert_eq!(tokens.len(), 1);
    let blocks: Vec<_> = messages[1..]
        .iter()
        .map(|m| match m {
            ServerMessage::NewInscribe(i) => i.block_number,
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(blocks, vec![5, 8]);
}

#[tokio::test]
async fn start_block_is_the_first_block_synced() {
    let mut h = harness(MockChain::new(100), 40);
    assert_eq!(h.engine.cursor(), 39);

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!(summary.from, 40);
}

#[tokio::test]
async fn cursor_survives_engine_restart_and_ignores_new_start_block() {
    let db = Database::in_memory().unwrap();
    let chain = MockChain::new(25);
    let mut first = harness_with(chain.clone(), db.clone(), 0, test_config());
    first.engine.run_once(NOW).await.unwrap();
    drop(first);

    let second = harness_with(chain, db, 1_000, test_config());
    assert_eq!(second.engine.cursor(), 25);
}

fn frame_message(frame: &Message) -> ServerMessage {
    let Message::Text(json) = frame else {
        panic!("observer frames are text");
    };
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn new_observer_gets_snapshot_before_a_racing_pass_broadcast() {
    let chain = MockChain::new(10);
    chain.deploy("AAA", 2);
    chain.deploy("BBB", 4);
    chain.inscribe("AAA", 6, 1, true);
    chain.set_token("AAA", 10, 1);
    chain.set_token("BBB", 0, 0);
    let Harness {
        mut engine,
        broadcaster,
        db,
        ..
    } = harness(chain, 0);

    // the pass lands between subscribe and the connect snapshot
    let updates = broadcaster.subscribe();
    engine.run_once(NOW).await.unwrap();
    drop(engine);
    drop(broadcaster);

    let (sink, frames) = mpsc::unbounded::<Message>();
    serve_observer(
        sink,
        stream::pending::<Result<Message, axum::Error>>(),
        updates,
        &db,
        0,
    )
    .await;
    let messages: Vec<_> = frames.collect::<Vec<_>>().await.iter().map(frame_message).collect();

    assert_eq!(messages.len(), 3);
    let ServerMessage::TokensSnapshot(tokens) = &messages[0] else {
        panic!("first frame must be the snapshot");
    };
    let ticks: Vec<_> = tokens.iter().map(|t| t.tick.as_str()).collect();
    assert_eq!(ticks, vec!["BBB", "AAA"]);
    assert!(matches!(messages[1], ServerMessage::TokensSnapshot(_)));
    let ServerMessage::NewInscribe(record) = &messages[2] else {
        panic!("pass inscriptions follow the pass snapshot");
    };
    assert_eq!(record.tick, "AAA");
}

#[tokio::test]
async fn observer_stops_when_it_closes_the_socket() {
    let h = harness(MockChain::new(0), 0);
    let updates = h.broadcaster.subscribe();
    let (sink, frames) = mpsc::unbounded::<Message>();

    serve_observer(
        sink,
        stream::iter(vec![Ok::<_, axum::Error>(Message::Close(None))]),
        updates,
        &h.db,
        1,
    )
    .await;

    let frames: Vec<_> = frames.collect().await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frame_message(&frames[0]), ServerMessage::TokensSnapshot(vec![]));
    assert_eq!(snapshot_message(&h.db).unwrap(), ServerMessage::TokensSnapshot(vec![]));
}

#[tokio::test]
async fn failed_token_refresh_keeps_inscription_counted_as_applied() {
    let chain = MockChain::new(3);
    chain.inscribe("GHOST", 2, 1, true);
    let mut h = harness(chain, 0);

    let PassResult::Synced(summary) = h.engine.run_once(NOW).await.unwrap() else {
        panic!("expected a synced pass");
    };
    assert_eq!(summary.inscriptions.applied, 1);
    assert_eq!(summary.inscriptions.skipped, 0);
    assert_eq!(h.engine.stats().snapshot().skipped_logs, 0);

    let conn = h.db.lock().unwrap();
    assert_eq!(InscriptionRepository::new(&conn).count().unwrap(), 1);
    assert!(TokenRepository::new(&conn).get("GHOST").unwrap().is_none());
}
