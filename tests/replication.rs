//! Replication protocol tests at the replica level: commit ordering, gap
//! recovery, dedup, epoch handling, kick authorization, and takeover.
//!
//! Each test wires a [`TableReplica`] to raw channels, playing the roles of
//! router and transport itself. Timers run on tokio's paused clock, so
//! silence-driven behavior is deterministic.

use std::sync::Arc;
use std::time::Duration;

use mesh_holdem::game::{GameState, PlayerId};
use mesh_holdem::protocol::{
    Action, ActionKind, Epoch, LamportClock, MsgType, NetMessage, NodeId, TableId, TableSnapshot,
};
use mesh_holdem::table::{TableConfig, TableHandle, TableReplica, TableSummary};
use tokio::sync::{mpsc, watch};

const TABLE: &str = "t-test";

struct Harness {
    handle: TableHandle,
    net_tx: mpsc::Sender<NetMessage>,
    out_rx: mpsc::Receiver<NetMessage>,
    _shutdown_tx: watch::Sender<bool>,
}

fn spawn_replica(self_id: &str, is_authority: bool, epoch: Epoch) -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let cfg = TableConfig {
        min_buyin: 1000,
        ..TableConfig::default()
    };
    let (net_tx, net_rx) = mpsc::channel(256);
    let (out_tx, out_rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (replica, handle) = TableReplica::new(
        TableId::from(TABLE),
        NodeId::from(self_id),
        cfg,
        is_authority,
        epoch,
        Arc::new(LamportClock::new()),
        net_rx,
        out_tx,
        shutdown_rx,
    );
    tokio::spawn(replica.run());
    Harness {
        handle,
        net_tx,
        out_rx,
        _shutdown_tx: shutdown_tx,
    }
}

fn join(player: &str) -> Action {
    Action::new(ActionKind::Join, PlayerId::from(player))
}

fn commit_msg(from: &str, epoch: Epoch, seq: u64, action: Action) -> NetMessage {
    NetMessage {
        table: TableId::from(TABLE),
        from: NodeId::from(from),
        kind: MsgType::Commit,
        epoch,
        lamport: 1,
        seq,
        action: Some(action),
        state: None,
    }
}

fn propose_msg(from: &str, epoch: Epoch, action: Action) -> NetMessage {
    NetMessage {
        table: TableId::from(TABLE),
        from: NodeId::from(from),
        kind: MsgType::Propose,
        epoch,
        lamport: 1,
        seq: 0,
        action: Some(action),
        state: None,
    }
}

fn heartbeat_msg(from: &str, epoch: Epoch, seq: u64) -> NetMessage {
    NetMessage {
        table: TableId::from(TABLE),
        from: NodeId::from(from),
        kind: MsgType::Heartbeat,
        epoch,
        lamport: 1,
        seq,
        action: None,
        state: None,
    }
}

fn snapshot_msg(from: &str, snapshot: TableSnapshot) -> NetMessage {
    NetMessage {
        table: TableId::from(TABLE),
        from: NodeId::from(from),
        kind: MsgType::Snapshot,
        epoch: snapshot.epoch,
        lamport: 1,
        seq: snapshot.seq,
        action: None,
        state: Some(snapshot),
    }
}

/// Poll the replica's summary until `predicate` holds.
async fn wait_for<F>(handle: &TableHandle, predicate: F) -> TableSummary
where
    F: Fn(&TableSummary) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let summary = handle.summary().await.expect("replica alive");
            if predicate(&summary) {
                return summary;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}

/// Next outbound message of `kind`, skipping heartbeats and the rest.
async fn next_of_kind(out_rx: &mut mpsc::Receiver<NetMessage>, kind: MsgType) -> NetMessage {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let msg = out_rx.recv().await.expect("outbox open");
            if msg.kind == kind {
                return msg;
            }
        }
    })
    .await
    .expect("expected message kind not emitted")
}

#[tokio::test(start_paused = true)]
async fn authority_orders_local_proposals() {
    let mut h = spawn_replica("n-auth", true, 0);
    h.handle.propose(join("n-a")).await.unwrap();
    h.handle.propose(join("n-b")).await.unwrap();

    let first = next_of_kind(&mut h.out_rx, MsgType::Commit).await;
    assert_eq!(first.seq, 1);
    assert_eq!(first.epoch, 0);
    assert_eq!(first.action.as_ref().unwrap().kind, ActionKind::Join);
    let second = next_of_kind(&mut h.out_rx, MsgType::Commit).await;
    assert_eq!(second.seq, 2);

    let summary = wait_for(&h.handle, |s| s.seats.len() == 2).await;
    assert_eq!(summary.seq, 2);
    assert!(summary.is_authority);
}

#[tokio::test(start_paused = true)]
async fn follower_applies_commit_stream_in_order() {
    let h = spawn_replica("n-2", false, 0);
    h.net_tx
        .send(commit_msg("n-1", 0, 1, join("n-a")))
        .await
        .unwrap();
    h.net_tx
        .send(commit_msg("n-1", 0, 2, join("n-b")))
        .await
        .unwrap();

    let summary = wait_for(&h.handle, |s| s.seq == 2).await;
    assert_eq!(summary.seats.len(), 2);
    // The first commit also taught the follower who the authority is.
    assert_eq!(summary.authority, Some(NodeId::from("n-1")));
    assert!(!summary.is_authority);
}

#[tokio::test(start_paused = true)]
async fn sequence_gap_requests_snapshot_and_recovers() {
    let mut h = spawn_replica("n-2", false, 0);
    h.net_tx
        .send(commit_msg("n-1", 0, 1, join("n-a")))
        .await
        .unwrap();
    h.net_tx
        .send(commit_msg("n-1", 0, 2, join("n-b")))
        .await
        .unwrap();
    wait_for(&h.handle, |s| s.seq == 2).await;

    // Seq 3 is lost; seq 4 arrives: dropped, and a state query goes out.
    h.net_tx
        .send(commit_msg("n-1", 0, 4, join("n-d")))
        .await
        .unwrap();
    let query = next_of_kind(&mut h.out_rx, MsgType::StateQuery).await;
    assert_eq!(query.table, TableId::from(TABLE));
    let summary = wait_for(&h.handle, |s| s.seq == 2).await;
    assert_eq!(summary.seats.len(), 2);

    // The authority answers with its state at seq 4.
    let mut engine = GameState::new(5, 10);
    for player in ["n-a", "n-b", "n-c", "n-d"] {
        engine.sit(PlayerId::from(player), 1000).unwrap();
    }
    let snapshot = TableSnapshot {
        cfg: TableConfig::default(),
        seq: 4,
        epoch: 0,
        authority: Some(NodeId::from("n-1")),
        engine: Some(engine.snapshot()),
    };
    h.net_tx.send(snapshot_msg("n-1", snapshot)).await.unwrap();
    wait_for(&h.handle, |s| s.seq == 4 && s.seats.len() == 4).await;

    // Replication resumes at seq 5.
    h.net_tx
        .send(commit_msg("n-1", 0, 5, join("n-e")))
        .await
        .unwrap();
    let summary = wait_for(&h.handle, |s| s.seq == 5).await;
    assert_eq!(summary.seats.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn replayed_commits_are_idempotent() {
    let h = spawn_replica("n-2", false, 0);
    let action = join("n-a");
    h.net_tx
        .send(commit_msg("n-1", 0, 1, action.clone()))
        .await
        .unwrap();
    wait_for(&h.handle, |s| s.seq == 1).await;

    // Same commit again, and the same action smuggled under a new seq.
    h.net_tx
        .send(commit_msg("n-1", 0, 1, action.clone()))
        .await
        .unwrap();
    h.net_tx
        .send(commit_msg("n-1", 0, 2, action))
        .await
        .unwrap();

    // A fresh commit still lands at seq 2; nothing above was applied.
    h.net_tx
        .send(commit_msg("n-1", 0, 2, join("n-b")))
        .await
        .unwrap();
    let summary = wait_for(&h.handle, |s| s.seq == 2).await;
    assert_eq!(summary.seats.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_epoch_commits_are_dropped() {
    let h = spawn_replica("n-2", false, 0);
    h.net_tx.send(heartbeat_msg("n-1", 2, 0)).await.unwrap();
    wait_for(&h.handle, |s| s.epoch == 2).await;

    h.net_tx
        .send(commit_msg("n-0", 1, 1, join("n-a")))
        .await
        .unwrap();
    // Still empty and at seq 0: the old-epoch commit was ignored.
    let summary = wait_for(&h.handle, |s| s.epoch == 2).await;
    assert_eq!(summary.seq, 0);
    assert!(summary.seats.is_empty());
}

#[tokio::test(start_paused = true)]
async fn kick_requires_authority_on_both_paths() {
    // Authority drops kick proposals from anyone but the authority itself.
    let h = spawn_replica("n-auth", true, 0);
    h.handle.propose(join("n-a")).await.unwrap();
    h.handle.propose(join("n-victim")).await.unwrap();
    wait_for(&h.handle, |s| s.seats.len() == 2).await;

    let rogue_kick = Action::kick(PlayerId::from("n-rogue"), &PlayerId::from("n-victim"));
    h.net_tx
        .send(propose_msg("n-rogue", 0, rogue_kick))
        .await
        .unwrap();
    // Proposal dropped: a follow-up proposal still lands at seq 3.
    h.handle.propose(join("n-c")).await.unwrap();
    let summary = wait_for(&h.handle, |s| s.seats.len() == 3).await;
    assert_eq!(summary.seq, 3);
    assert!(summary.seats.iter().any(|s| s.player == PlayerId::from("n-victim")));

    // Followers drop kick commits not sent by the current authority.
    let f = spawn_replica("n-2", false, 0);
    f.net_tx.send(heartbeat_msg("n-1", 0, 0)).await.unwrap();
    f.net_tx
        .send(commit_msg("n-1", 0, 1, join("n-victim")))
        .await
        .unwrap();
    wait_for(&f.handle, |s| s.seq == 1).await;

    let forged = Action::kick(PlayerId::from("n-rogue"), &PlayerId::from("n-victim"));
    f.net_tx
        .send(commit_msg("n-rogue", 0, 2, forged))
        .await
        .unwrap();
    let summary = wait_for(&f.handle, |s| s.seq == 1).await;
    assert_eq!(summary.seats.len(), 1);

    // The genuine authority's kick goes through.
    let real = Action::kick(PlayerId::from("n-1"), &PlayerId::from("n-victim"));
    f.net_tx.send(commit_msg("n-1", 0, 2, real)).await.unwrap();
    let summary = wait_for(&f.handle, |s| s.seq == 2).await;
    assert!(summary.seats.is_empty());
}

#[tokio::test(start_paused = true)]
async fn follower_takes_over_after_authority_silence() {
    let mut h = spawn_replica("n-2", false, 0);
    // n-1 is the authority and then goes silent.
    h.net_tx.send(heartbeat_msg("n-1", 0, 0)).await.unwrap();
    wait_for(&h.handle, |s| s.authority == Some(NodeId::from("n-1"))).await;

    // Nothing else arrives: the follower timeout elapses and the replica
    // promotes itself, announcing with a heartbeat and a snapshot.
    let beat = next_of_kind(&mut h.out_rx, MsgType::Heartbeat).await;
    assert_eq!(beat.from, NodeId::from("n-2"));
    assert_eq!(beat.epoch, 1);
    let snapshot = next_of_kind(&mut h.out_rx, MsgType::Snapshot).await;
    assert_eq!(snapshot.epoch, 1);
    assert!(snapshot.state.is_some());

    let summary = wait_for(&h.handle, |s| s.is_authority).await;
    assert_eq!(summary.epoch, 1);
    assert_eq!(summary.authority, Some(NodeId::from("n-2")));

    // The old authority's stale heartbeat no longer matters.
    h.net_tx.send(heartbeat_msg("n-1", 0, 0)).await.unwrap();
    let summary = wait_for(&h.handle, |s| s.epoch == 1).await;
    assert!(summary.is_authority);
}

#[tokio::test(start_paused = true)]
async fn demoted_authority_adopts_follower_role() {
    let h = spawn_replica("n-1", true, 0);
    h.handle.propose(join("n-a")).await.unwrap();
    wait_for(&h.handle, |s| s.seq == 1).await;

    // A higher-epoch heartbeat means someone took over while we were cut off.
    h.net_tx.send(heartbeat_msg("n-2", 1, 0)).await.unwrap();
    let summary = wait_for(&h.handle, |s| !s.is_authority).await;
    assert_eq!(summary.epoch, 1);
    assert_eq!(summary.authority, Some(NodeId::from("n-2")));
}

#[tokio::test(start_paused = true)]
async fn authority_answers_state_queries_with_snapshots() {
    let mut h = spawn_replica("n-auth", true, 0);
    h.handle.propose(join("n-a")).await.unwrap();
    wait_for(&h.handle, |s| s.seq == 1).await;

    h.net_tx
        .send(NetMessage {
            table: TableId::from(TABLE),
            from: NodeId::from("n-2"),
            kind: MsgType::StateQuery,
            epoch: 0,
            lamport: 1,
            seq: 0,
            action: None,
            state: None,
        })
        .await
        .unwrap();

    let response = next_of_kind(&mut h.out_rx, MsgType::Snapshot).await;
    let state = response.state.unwrap();
    assert_eq!(state.seq, 1);
    assert_eq!(state.authority, Some(NodeId::from("n-auth")));
    let engine = state.engine.unwrap();
    assert_eq!(engine.order.len(), 1);
}
