//! The per-table replica: an event loop that applies poker actions and
//! synchronizes state through an authority-driven commit stream.
//!
//! The replica never blocks the router for long: its inbox is bounded, and
//! everything it emits goes through the bounded transport outbox (the
//! back-pressure path). Local callers talk to it through a [`TableHandle`]
//! over a command channel, the same way they would talk to any actor.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};

use crate::game::{Chips, EngineError, GameState, Phase, PlayerId, SeatView};
use crate::protocol::{
    Action, ActionId, ActionKind, Epoch, LamportClock, MsgType, NetMessage, NodeId, TableId,
    TableSnapshot,
};
use crate::table::TableConfig;

/// Capacity of the per-table network inbox.
pub const INBOX_CAPACITY: usize = 256;

const COMMAND_CAPACITY: usize = 64;

/// The replica's command channel has been dropped.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("table replica is closed")]
pub struct ReplicaClosed;

/// Local requests served by the replica loop.
#[derive(Debug)]
pub enum ReplicaCommand {
    /// Submit an action originating on this node.
    Propose(Action),
    /// Read-only summary of the table.
    Summary(oneshot::Sender<TableSummary>),
    /// Full snapshot, as it would be broadcast.
    Snapshot(oneshot::Sender<TableSnapshot>),
}

/// Read-only view of a replica for shells and listings.
#[derive(Clone, Debug)]
pub struct TableSummary {
    pub id: TableId,
    pub phase: Phase,
    pub pot: Chips,
    pub current_bet: Chips,
    pub dealer: Option<PlayerId>,
    pub turn: Option<PlayerId>,
    pub seats: Vec<SeatView>,
    pub hand_active: bool,
    pub seq: u64,
    pub epoch: Epoch,
    pub authority: Option<NodeId>,
    pub is_authority: bool,
}

/// Cheap handle for sending commands to a running replica.
#[derive(Clone, Debug)]
pub struct TableHandle {
    id: TableId,
    commands: mpsc::Sender<ReplicaCommand>,
}

impl TableHandle {
    #[must_use]
    pub fn id(&self) -> &TableId {
        &self.id
    }

    /// Submit a local action. Commits only once the authority orders it.
    pub async fn propose(&self, action: Action) -> Result<(), ReplicaClosed> {
        self.commands
            .send(ReplicaCommand::Propose(action))
            .await
            .map_err(|_| ReplicaClosed)
    }

    /// Fetch the current table summary.
    pub async fn summary(&self) -> Result<TableSummary, ReplicaClosed> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(ReplicaCommand::Summary(tx))
            .await
            .map_err(|_| ReplicaClosed)?;
        rx.await.map_err(|_| ReplicaClosed)
    }

    /// Fetch a full snapshot of the replica.
    pub async fn snapshot(&self) -> Result<TableSnapshot, ReplicaClosed> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(ReplicaCommand::Snapshot(tx))
            .await
            .map_err(|_| ReplicaClosed)?;
        rx.await.map_err(|_| ReplicaClosed)
    }
}

/// One table's replicated state machine.
pub struct TableReplica {
    id: TableId,
    self_id: NodeId,
    cfg: TableConfig,
    is_authority: bool,
    epoch: Epoch,
    authority_id: Option<NodeId>,
    clock: Arc<LamportClock>,

    inbox: mpsc::Receiver<NetMessage>,
    commands: mpsc::Receiver<ReplicaCommand>,
    outbox: mpsc::Sender<NetMessage>,
    shutdown: watch::Receiver<bool>,

    seq: u64,
    log: Vec<Action>,
    dedup: HashSet<ActionId>,
    engine: GameState,
    last_heartbeat: Instant,
}

impl TableReplica {
    /// Build a replica and the handle used to talk to it.
    ///
    /// The caller registers `inbox`'s sender half with the router and spawns
    /// [`TableReplica::run`] on its own task.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TableId,
        self_id: NodeId,
        cfg: TableConfig,
        is_authority: bool,
        epoch: Epoch,
        clock: Arc<LamportClock>,
        inbox: mpsc::Receiver<NetMessage>,
        outbox: mpsc::Sender<NetMessage>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, TableHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let engine = GameState::new(cfg.small_blind, cfg.big_blind);
        let authority_id = is_authority.then(|| self_id.clone());
        let replica = Self {
            id: id.clone(),
            self_id,
            cfg,
            is_authority,
            epoch,
            authority_id,
            clock,
            inbox,
            commands: command_rx,
            outbox,
            shutdown,
            seq: 0,
            log: Vec::new(),
            dedup: HashSet::new(),
            engine,
            last_heartbeat: Instant::now(),
        };
        let handle = TableHandle {
            id,
            commands: command_tx,
        };
        (replica, handle)
    }

    /// The committed actions applied so far, in order.
    #[must_use]
    pub fn log(&self) -> &[Action] {
        &self.log
    }

    /// Drive the event loop until shutdown. Authorities interleave a
    /// heartbeat tick; followers watch for authority silence instead.
    pub async fn run(mut self) {
        log::info!(
            "table {}: replica running (authority={}, epoch={})",
            self.id,
            self.is_authority,
            self.epoch
        );
        let mut heartbeat = tokio::time::interval(self.cfg.authority_tick());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.is_authority {
                tokio::select! {
                    maybe = self.inbox.recv() => match maybe {
                        Some(msg) => self.on_net(msg).await,
                        None => break,
                    },
                    maybe = self.commands.recv() => match maybe {
                        Some(command) => self.on_command(command).await,
                        None => break,
                    },
                    _ = heartbeat.tick() => self.send_heartbeat().await,
                    _ = self.shutdown.changed() => break,
                }
            } else {
                tokio::select! {
                    maybe = self.inbox.recv() => match maybe {
                        Some(msg) => self.on_net(msg).await,
                        None => break,
                    },
                    maybe = self.commands.recv() => match maybe {
                        Some(command) => self.on_command(command).await,
                        None => break,
                    },
                    _ = tokio::time::sleep(self.cfg.follower_timeout()) => {
                        self.try_takeover().await;
                    }
                    _ = self.shutdown.changed() => break,
                }
            }
        }
        log::info!("table {}: replica stopped", self.id);
    }

    async fn on_command(&mut self, command: ReplicaCommand) {
        match command {
            ReplicaCommand::Propose(action) => self.propose_local(action).await,
            ReplicaCommand::Summary(reply) => {
                let _ = reply.send(self.summary());
            }
            ReplicaCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Submit an action originating on this node: commit directly when
    /// authority, otherwise forward a propose to the authority. No local
    /// state changes until the commit comes back.
    async fn propose_local(&mut self, action: Action) {
        if self.is_authority {
            self.commit_and_broadcast(action).await;
            return;
        }
        let msg = self.envelope(MsgType::Propose);
        self.send(NetMessage {
            action: Some(action),
            ..msg
        })
        .await;
    }

    // === Inbound handling ===

    async fn on_net(&mut self, msg: NetMessage) {
        match msg.kind {
            MsgType::Propose => {
                if !self.is_authority {
                    return;
                }
                let Some(action) = msg.action else { return };
                if action.kind == ActionKind::Kick && !self.is_from_authority(&msg.from) {
                    log::warn!(
                        "table {}: dropping kick proposal from non-authority {}",
                        self.id,
                        msg.from
                    );
                    return;
                }
                self.commit_and_broadcast(action).await;
            }
            MsgType::Commit => {
                let Some(action) = msg.action else { return };
                if msg.epoch < self.epoch {
                    return;
                }
                if action.kind == ActionKind::Kick && !self.is_from_authority(&msg.from) {
                    log::warn!(
                        "table {}: dropping kick commit from non-authority {}",
                        self.id,
                        msg.from
                    );
                    return;
                }
                self.apply_commit(action, msg.seq).await;
                if msg.epoch > self.epoch || self.authority_id.is_none() {
                    self.observe_authority(msg.epoch, msg.from);
                }
                self.last_heartbeat = Instant::now();
            }
            MsgType::Snapshot => {
                let Some(state) = msg.state else { return };
                if msg.epoch < self.epoch {
                    return;
                }
                self.install_snapshot(state);
                self.last_heartbeat = Instant::now();
            }
            MsgType::Heartbeat => {
                if msg.epoch < self.epoch {
                    return;
                }
                self.observe_authority(msg.epoch, msg.from);
                self.last_heartbeat = Instant::now();
            }
            MsgType::StateQuery => {
                if self.is_authority {
                    self.broadcast_snapshot().await;
                }
            }
            MsgType::Unknown => {
                log::debug!("table {}: ignoring unknown message type", self.id);
            }
        }
    }

    fn is_from_authority(&self, from: &NodeId) -> bool {
        self.authority_id.as_ref() == Some(from)
    }

    /// Record who holds authority at `epoch` (caller has already checked
    /// `epoch >= self.epoch`). A strictly higher epoch from another node
    /// demotes this replica; an equal-epoch claim while we are authority is
    /// a contest we do not yield to; epoch precedence settles it.
    fn observe_authority(&mut self, epoch: Epoch, from: NodeId) {
        if from == self.self_id {
            self.epoch = epoch;
            return;
        }
        if self.is_authority && epoch <= self.epoch {
            return;
        }
        if self.is_authority {
            log::info!(
                "table {}: yielding authority to {} (epoch {} -> {})",
                self.id,
                from,
                self.epoch,
                epoch
            );
        }
        self.epoch = epoch;
        self.is_authority = false;
        self.authority_id = Some(from);
    }

    /// Apply a commit in sequence order; a gap triggers snapshot recovery,
    /// anything stale or already seen is dropped silently.
    async fn apply_commit(&mut self, action: Action, seq: u64) {
        if self.dedup.contains(&action.id) {
            return;
        }
        let expected = self.seq + 1;
        if seq > expected {
            log::warn!(
                "table {}: commit gap (have {}, got {}), requesting snapshot",
                self.id,
                self.seq,
                seq
            );
            let msg = self.envelope(MsgType::StateQuery);
            self.send(msg).await;
            return;
        }
        if seq < expected {
            return;
        }
        self.seq = seq;
        self.apply(&action);
        self.dedup.insert(action.id.clone());
        self.log.push(action);
    }

    // === Commit and broadcast (authority) ===

    /// Order an action into the commit stream and broadcast it, then keep
    /// committing whatever the table's rules demand next: a closed betting
    /// round schedules `advance_phase`, landing on the showdown street
    /// schedules `showdown`. Followers replay the exact same sequence.
    async fn commit_and_broadcast(&mut self, action: Action) {
        let mut pending = VecDeque::from([action]);
        while let Some(action) = pending.pop_front() {
            if self.dedup.contains(&action.id) {
                continue;
            }
            self.seq += 1;
            self.apply(&action);
            self.dedup.insert(action.id.clone());
            self.log.push(action.clone());

            let msg = self.envelope(MsgType::Commit);
            self.send(NetMessage {
                seq: self.seq,
                action: Some(action.clone()),
                ..msg
            })
            .await;

            if let Some(follow_up) = self.follow_up_action(&action) {
                pending.push_back(follow_up);
            }
        }
    }

    /// The next action the authority must synthesize after `last`, if any.
    ///
    /// Landing on the showdown street schedules the showdown; a still-closed
    /// round schedules another advance, so a hand with at most one live seat
    /// runs street by street to settlement without further input.
    fn follow_up_action(&self, last: &Action) -> Option<Action> {
        let self_player = PlayerId::from(&self.self_id);
        if last.kind == ActionKind::AdvancePhase && self.engine.phase == Phase::Showdown {
            return Some(Action::new(ActionKind::Showdown, self_player));
        }
        if self.engine.hand_active && self.engine.round_closed() {
            return Some(Action::new(ActionKind::AdvancePhase, self_player));
        }
        None
    }

    // === Applying actions to the engine ===

    fn apply(&mut self, action: &Action) {
        let result = match action.kind {
            ActionKind::CreateTable => Ok(()),
            ActionKind::Join => {
                // Idempotent: a join for a seated player is a no-op.
                if self.engine.seats.contains_key(&action.player_id) {
                    return;
                }
                self.engine.sit(action.player_id.clone(), self.cfg.min_buyin)
            }
            ActionKind::Leave => {
                self.engine.leave(&action.player_id);
                Ok(())
            }
            ActionKind::Kick => {
                if let Some(target) = action.kick_target() {
                    self.engine.leave(&target);
                }
                Ok(())
            }
            ActionKind::StartHand => self.apply_start_hand(action),
            ActionKind::Check => self.engine.check(&action.player_id),
            ActionKind::Fold => self.engine.fold(&action.player_id),
            ActionKind::Call => self.engine.call(&action.player_id),
            ActionKind::Raise => self.apply_raise(action),
            ActionKind::Bet => {
                if self.engine.current_bet == 0 {
                    self.engine.bet(&action.player_id, action.amount)
                } else {
                    // A bet into a live bet is really a raise to that level.
                    self.apply_raise(action)
                }
            }
            ActionKind::AdvancePhase => {
                self.engine.advance_phase();
                log::info!(
                    "table {}: phase advanced to {}, turn={}",
                    self.id,
                    self.engine.phase,
                    display_player(self.engine.current_player()),
                );
                Ok(())
            }
            ActionKind::Showdown => {
                self.apply_showdown();
                Ok(())
            }
            ActionKind::Unknown => {
                log::warn!("table {}: dropping action with unknown type", self.id);
                return;
            }
        };

        if let Err(err) = result {
            log::warn!(
                "table {}: {} by {} rejected: {}",
                self.id,
                action.kind,
                action.player_id,
                err
            );
        }
    }

    fn apply_start_hand(&mut self, action: &Action) -> Result<(), EngineError> {
        let mut rng = StdRng::seed_from_u64(action.id.seed());
        self.engine.start_hand(&mut rng)?;
        log::info!(
            "table {}: hand started (SB={}, BB={}), dealer={}, turn={}",
            self.id,
            self.cfg.small_blind,
            self.cfg.big_blind,
            display_player(self.engine.dealer()),
            display_player(self.engine.current_player()),
        );
        // Local only: every node prints its own hole cards.
        if let Some(holes) = self.engine.holes.get(&PlayerId::from(&self.self_id)) {
            log::info!(
                "table {}: your hole cards: {} {}",
                self.id,
                holes[0],
                holes[1]
            );
        }
        Ok(())
    }

    /// Translate the wire-level "raise to `amount`" into the engine's
    /// call / raise-by operations.
    fn apply_raise(&mut self, action: &Action) -> Result<(), EngineError> {
        let player = &action.player_id;
        let committed = self
            .engine
            .seats
            .get(player)
            .ok_or(EngineError::UnknownPlayer)?
            .committed;
        let current = self.engine.current_bet;
        let target = action.amount;

        if target <= current {
            return self.engine.call(player);
        }
        let Some(additional) = target.checked_sub(committed) else {
            return Ok(());
        };
        if additional == 0 {
            return Ok(());
        }
        let need = current.saturating_sub(committed);
        let raise_by = additional.saturating_sub(need);
        if raise_by == 0 {
            self.engine.call(player)
        } else {
            self.engine.raise(player, raise_by)
        }
    }

    fn apply_showdown(&mut self) {
        let summary = self.engine.resolve_showdown();
        if summary.winners.is_empty() {
            log::info!("table {}: showdown with no eligible winners", self.id);
            return;
        }
        for winner in &summary.winners {
            log::info!(
                "table {}: winner {} with {} [{} {} {} {} {}] +{}",
                self.id,
                winner.player,
                winner.value.category,
                winner.cards[0],
                winner.cards[1],
                winner.cards[2],
                winner.cards[3],
                winner.cards[4],
                summary.payout_per,
            );
        }
    }

    // === Authority takeover ===

    /// Promote this follower once the authority has been silent past the
    /// timeout. The silence is the whole argument: a dead authority must be
    /// replaceable by whichever follower notices, whatever its id, and the
    /// epoch bump makes every replica prefer the new authority once it
    /// hears from it. Concurrent promotions converge on the higher epoch.
    async fn try_takeover(&mut self) {
        if self.is_authority {
            return;
        }
        if self.last_heartbeat.elapsed() < self.cfg.follower_timeout() {
            return;
        }
        self.is_authority = true;
        self.epoch += 1;
        self.authority_id = Some(self.self_id.clone());
        log::info!(
            "table {}: {} assumes authority, epoch={}",
            self.id,
            self.self_id,
            self.epoch
        );
        self.send_heartbeat().await;
        self.broadcast_snapshot().await;
    }

    // === Snapshots ===

    fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            cfg: self.cfg.clone(),
            seq: self.seq,
            epoch: self.epoch,
            authority: self.authority_id.clone(),
            engine: Some(self.engine.snapshot()),
        }
    }

    fn install_snapshot(&mut self, snapshot: TableSnapshot) {
        self.cfg = snapshot.cfg;
        self.seq = snapshot.seq;
        self.epoch = snapshot.epoch;
        self.authority_id = snapshot.authority;
        self.is_authority = self.authority_id.as_ref() == Some(&self.self_id);
        match snapshot.engine {
            Some(engine) => self.engine.restore(engine),
            None => {
                // Older peer without an engine payload: keep blinds aligned.
                self.engine.small_blind = self.cfg.small_blind;
                self.engine.big_blind = self.cfg.big_blind;
            }
        }
        log::info!(
            "table {}: installed snapshot (seq={}, epoch={})",
            self.id,
            self.seq,
            self.epoch
        );
    }

    async fn broadcast_snapshot(&mut self) {
        if !self.is_authority {
            return;
        }
        let msg = self.envelope(MsgType::Snapshot);
        let snapshot = self.snapshot();
        self.send(NetMessage {
            seq: self.seq,
            state: Some(snapshot),
            ..msg
        })
        .await;
    }

    async fn send_heartbeat(&mut self) {
        if !self.is_authority {
            return;
        }
        let msg = self.envelope(MsgType::Heartbeat);
        self.send(NetMessage {
            seq: self.seq,
            ..msg
        })
        .await;
    }

    // === Plumbing ===

    fn envelope(&self, kind: MsgType) -> NetMessage {
        NetMessage {
            table: self.id.clone(),
            from: self.self_id.clone(),
            kind,
            epoch: self.epoch,
            lamport: self.clock.tick_local(),
            seq: 0,
            action: None,
            state: None,
        }
    }

    async fn send(&mut self, msg: NetMessage) {
        if self.outbox.send(msg).await.is_err() {
            log::error!("table {}: outbound channel closed", self.id);
        }
    }

    fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.clone(),
            phase: self.engine.phase,
            pot: self.engine.pot,
            current_bet: self.engine.current_bet,
            dealer: self.engine.dealer().cloned(),
            turn: self.engine.current_player().cloned(),
            seats: self.engine.seat_views(),
            hand_active: self.engine.hand_active,
            seq: self.seq,
            epoch: self.epoch,
            authority: self.authority_id.clone(),
            is_authority: self.is_authority,
        }
    }
}

fn display_player(player: Option<&PlayerId>) -> &str {
    player.map_or("-", |p| p.as_str())
}
