//! One room: roster, timed phase machine, and fan-out.
//!
//! Each room owns exactly one lifecycle task ([`Room::run`], spawned by
//! the registry). That task is the only writer of phase/round/turn
//! state and of the coin ledger during settlement. The roster is shared
//! with connection handlers (admission, removal), so every roster read
//! and write goes through the single exclusive section `shared`; the
//! two counters that are bumped *before* a member exists (`connected`
//! during registry reservation, `joined` at admission) are the only
//! state touched outside it, and they are plain atomics.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use potluck_protocol::{Action, Message, SERVER_SENDER};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::{Instant, sleep, timeout};

use crate::roster::Roster;
use crate::{Link, Phase, RoomConfig, RoomError};

/// Inbound queue depth. A chat burst beyond this is dropped with a
/// warning rather than blocking the sender's handler task.
const INBOUND_QUEUE_LEN: usize = 32;

/// A snapshot of room metadata.
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub id: String,
    pub phase: Phase,
    pub round: u32,
    pub connected: u32,
    pub joined: u32,
    pub capacity: u32,
    pub turn_holder: Option<String>,
}

/// State guarded by the room's exclusive section.
struct Shared<L: Link> {
    roster: Roster<L>,
    phase: Phase,
    /// Current round, 1-indexed. 0 until the game starts.
    round: u32,
    /// The member whose private deposit window is open, if any.
    turn_holder: Option<String>,
    /// Outbound timestamp sequence, assigned at send time. Every send
    /// happens under this lock, so a plain integer suffices.
    seq: u64,
}

/// What to do to each member after a successful delivery, co-located
/// with the fan-out so ledger updates and hangups never race a second
/// roster pass.
#[derive(Clone, Copy)]
enum Effect {
    CreditFunds(i64),
    CloseLink,
}

/// One game session. Created by the [`Registry`](crate::Registry),
/// shared between its lifecycle task and the connection handlers.
pub struct Room<L: Link> {
    id: String,
    config: RoomConfig,
    /// Reserved capacity slots, bumped at registry lookup before the
    /// connection has a name.
    connected: AtomicU32,
    /// Members who completed admission.
    joined: AtomicU32,
    /// Signaled on each admission; the Forming wait parks here.
    quorum: Notify,
    inbound_tx: mpsc::Sender<Message>,
    /// Taken once, by the lifecycle task.
    inbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
    shared: Mutex<Shared<L>>,
}

impl<L: Link> Room<L> {
    pub(crate) fn new(id: String, config: RoomConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_LEN);
        Self {
            id,
            config,
            connected: AtomicU32::new(0),
            joined: AtomicU32::new(0),
            quorum: Notify::new(),
            inbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            shared: Mutex::new(Shared {
                roster: Roster::new(),
                phase: Phase::Forming,
                round: 0,
                turn_holder: None,
                seq: 0,
            }),
        }
    }

    /// The room's identifier, stable for its lifetime.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Reservation and roster management
    // -----------------------------------------------------------------

    /// Claims one capacity slot for a connection that hasn't picked a
    /// name yet. Rolled back with [`release_slot`](Self::release_slot)
    /// if the connection dies before admission.
    pub fn reserve(&self) -> Result<(), RoomError> {
        let prev = self.connected.fetch_add(1, Ordering::AcqRel);
        if prev + 1 > self.config.capacity {
            self.connected.fetch_sub(1, Ordering::AcqRel);
            return Err(RoomError::Full(self.id.clone()));
        }
        Ok(())
    }

    /// Returns a reservation that never became an admission.
    pub fn release_slot(&self) {
        self.connected.fetch_sub(1, Ordering::AcqRel);
    }

    /// Admits a member under the given name.
    ///
    /// The roster capacity is checked again here even though the
    /// reservation already bounded connections: reservation and
    /// admission are separate steps with a window between them.
    pub async fn admit(&self, name: &str, link: L) -> Result<(), RoomError> {
        if name.is_empty() || name == SERVER_SENDER {
            return Err(RoomError::Protocol(format!(
                "\"{name}\" is not a usable member name"
            )));
        }

        {
            let mut shared = self.shared.lock().await;
            if !shared.phase.is_joinable() {
                return Err(RoomError::Protocol(format!(
                    "room {} no longer accepts members",
                    self.id
                )));
            }
            if shared.roster.len() as u32 >= self.config.capacity {
                return Err(RoomError::Full(self.id.clone()));
            }
            if shared.roster.contains(name) {
                return Err(RoomError::MemberExists(name.to_string()));
            }
            shared.roster.insert(name.to_string(), link);
        }

        self.joined.fetch_add(1, Ordering::AcqRel);
        self.quorum.notify_one();
        tracing::info!(room_id = %self.id, member = name, "member admitted");
        Ok(())
    }

    /// Removes a member: roster, join order, both counters, and their
    /// link (closed here, once). Idempotent: removing an absent name
    /// is a no-op.
    pub async fn remove(&self, name: &str) {
        let removed = self.shared.lock().await.roster.remove(name);
        if let Some(member) = removed {
            self.joined.fetch_sub(1, Ordering::AcqRel);
            self.connected.fetch_sub(1, Ordering::AcqRel);
            member.link.close().await;
            tracing::info!(room_id = %self.id, member = name, "member removed");
        }
    }

    /// Removes the member whose link matches the predicate, for
    /// callers that hold a connection but not a name. Same semantics
    /// as [`remove`](Self::remove), including the no-op when nothing
    /// matches.
    pub async fn remove_by_link(&self, matches: impl Fn(&L) -> bool) {
        let name = self
            .shared
            .lock()
            .await
            .roster
            .name_of(|member_link| matches(member_link));
        if let Some(name) = name {
            self.remove(&name).await;
        }
    }

    // -----------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------

    /// Queues a message from a connection for the lifecycle task.
    ///
    /// An ended room accepts nothing; a full queue drops the message
    /// with a warning rather than blocking the caller.
    pub async fn submit(&self, msg: Message) {
        if self.shared.lock().await.phase.is_over() {
            tracing::debug!(
                room_id = %self.id,
                sender = %msg.sender,
                "dropping message submitted to an ended room"
            );
            return;
        }
        if let Err(e) = self.inbound_tx.try_send(msg) {
            tracing::warn!(room_id = %self.id, error = %e, "inbound queue full, dropping message");
        }
    }

    // -----------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------

    pub async fn info(&self) -> RoomInfo {
        let shared = self.shared.lock().await;
        RoomInfo {
            id: self.id.clone(),
            phase: shared.phase,
            round: shared.round,
            connected: self.connected.load(Ordering::Acquire),
            joined: self.joined.load(Ordering::Acquire),
            capacity: self.config.capacity,
            turn_holder: shared.turn_holder.clone(),
        }
    }

    /// A member's current coin balance, if they are (still) registered.
    /// The roster survives the end of the game, so final balances stay
    /// readable after `gameEnd`.
    pub async fn member_funds(&self, name: &str) -> Option<i64> {
        self.shared.lock().await.roster.get(name).map(|m| m.funds)
    }

    // -----------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------

    /// Delivers `msg` to every member except the one named as its
    /// sender, applying `effect` to each member after a successful
    /// delivery. A failed delivery never aborts the rest; the names
    /// that failed are returned for the caller's phase-specific policy.
    async fn broadcast(&self, mut msg: Message, effect: Option<Effect>) -> Vec<String> {
        let mut shared = self.shared.lock().await;
        shared.seq += 1;
        msg.timestamp = shared.seq;
        let mut failed = Vec::new();
        for name in shared.roster.join_order() {
            if name == msg.sender {
                continue;
            }
            let Some(member) = shared.roster.get_mut(&name) else {
                continue;
            };
            match member.link.send(&msg).await {
                Ok(()) => match effect {
                    Some(Effect::CreditFunds(coins)) => member.funds += coins,
                    Some(Effect::CloseLink) => member.link.close().await,
                    None => {}
                },
                Err(e) => {
                    tracing::warn!(
                        room_id = %self.id,
                        member = %name,
                        error = %e,
                        "delivery failed"
                    );
                    failed.push(name);
                }
            }
        }
        failed
    }

    /// Relays a chat message to its recipient list, or, when the list
    /// is empty, to everyone but the sender. Unknown recipients are
    /// skipped with a diagnostic; duplicates in the list are delivered
    /// once.
    async fn relay(&self, mut msg: Message) -> Vec<String> {
        let mut shared = self.shared.lock().await;
        shared.seq += 1;
        msg.timestamp = shared.seq;
        let targets = if msg.recipients.is_empty() {
            shared.roster.join_order()
        } else {
            msg.recipients.clone()
        };

        let mut seen = HashSet::new();
        let mut failed = Vec::new();
        for name in targets {
            if name == msg.sender || !seen.insert(name.clone()) {
                continue;
            }
            match shared.roster.get_mut(&name) {
                None => {
                    tracing::debug!(
                        room_id = %self.id,
                        sender = %msg.sender,
                        recipient = %name,
                        "dropping relay to unknown recipient"
                    );
                }
                Some(member) => {
                    if let Err(e) = member.link.send(&msg).await {
                        tracing::warn!(
                            room_id = %self.id,
                            member = %name,
                            error = %e,
                            "relay delivery failed"
                        );
                        failed.push(name);
                    }
                }
            }
        }
        failed
    }

    /// Sends an `error` message to one member. Best-effort: a failure
    /// here will surface at the next broadcast anyway.
    async fn rebuke(&self, name: &str, reason: String) {
        let mut msg = Message::error(reason);
        let mut shared = self.shared.lock().await;
        shared.seq += 1;
        msg.timestamp = shared.seq;
        if let Some(member) = shared.roster.get_mut(name) {
            if let Err(e) = member.link.send(&msg).await {
                tracing::debug!(room_id = %self.id, member = name, error = %e, "error reply failed");
            }
        }
    }

    async fn evict(&self, names: Vec<String>) {
        for name in names {
            self.remove(&name).await;
        }
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    async fn set_phase(&self, phase: Phase) {
        let mut shared = self.shared.lock().await;
        tracing::debug!(room_id = %self.id, from = %shared.phase, to = %phase, "phase transition");
        shared.phase = phase;
    }

    /// Parks until `joined == capacity`. The permit stored by
    /// `notify_one` means an admission landing between the check and
    /// the await still wakes us: no lost signal, no polling.
    async fn wait_for_quorum(&self) {
        loop {
            if self.joined.load(Ordering::Acquire) >= self.config.capacity {
                return;
            }
            self.quorum.notified().await;
        }
    }

    /// The lifecycle task. Runs from formation to teardown; the
    /// registry wrapper deregisters the room when this returns.
    pub(crate) async fn run(self: Arc<Self>) {
        let mut inbound = match self.inbound_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                tracing::error!(room_id = %self.id, "lifecycle started twice");
                return;
            }
        };

        tracing::info!(
            room_id = %self.id,
            capacity = self.config.capacity,
            rounds = self.config.rounds,
            "room waiting for members"
        );

        // Formation: wait for quorum, give stragglers the grace
        // interval, then confirm everyone is still reachable. Each
        // failed start send evicts that member and re-enters Forming;
        // the loop is bounded by eventual quorum, and each pass parks
        // on the quorum notify rather than spinning.
        loop {
            self.wait_for_quorum().await;
            self.set_phase(Phase::Starting).await;
            sleep(self.config.start_grace).await;

            if self.joined.load(Ordering::Acquire) < self.config.capacity {
                // Someone left during the grace interval.
                self.set_phase(Phase::Forming).await;
                continue;
            }

            let failed = self
                .broadcast(Message::server(Action::Start, "the game is starting"), None)
                .await;
            if failed.is_empty() {
                break;
            }
            self.evict(failed).await;
            self.set_phase(Phase::Forming).await;
        }

        tracing::info!(room_id = %self.id, "room started");

        for round in 1..=self.config.rounds {
            {
                let mut shared = self.shared.lock().await;
                shared.round = round;
                shared.phase = Phase::Chat;
            }
            tracing::info!(room_id = %self.id, round, "round started");

            self.chat_phase(&mut inbound).await;
            let tax = self.deposit_phase(&mut inbound).await;
            if !self.settle(round, tax).await {
                break;
            }
        }

        self.finish().await;
    }

    /// The chat window: drain and relay until the deadline.
    ///
    /// The wait is bounded by the time left in the window, not by
    /// message availability, so the phase ends on schedule even when
    /// the queue is empty. Whatever is still queued at the deadline is
    /// discarded with a diagnostic; late chat is dropped, not
    /// deferred into the next round.
    async fn chat_phase(&self, inbound: &mut mpsc::Receiver<Message>) {
        let deadline = Instant::now() + self.config.chat_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let msg = match timeout(remaining, inbound.recv()).await {
                Err(_) => break, // window closed
                Ok(None) => break,
                Ok(Some(msg)) => msg,
            };
            match msg.action {
                Action::Chat => {
                    let failed = self.relay(msg).await;
                    self.evict(failed).await;
                }
                other => {
                    let sender = msg.sender.clone();
                    self.rebuke(&sender, format!("unexpected {other} during the chat window"))
                        .await;
                }
            }
        }

        while let Ok(stale) = inbound.try_recv() {
            tracing::debug!(
                room_id = %self.id,
                sender = %stale.sender,
                action = %stale.action,
                "discarding message that missed the chat window"
            );
        }
    }

    /// The deposit phase: one private window per member, strictly in
    /// join order. Returns the round's accumulated tax.
    async fn deposit_phase(&self, inbound: &mut mpsc::Receiver<Message>) -> i64 {
        self.set_phase(Phase::Deposit).await;
        let order = self.shared.lock().await.roster.join_order();

        let mut tax = 0i64;
        for name in order {
            {
                let mut shared = self.shared.lock().await;
                // Members can drop out mid-phase; their turn is skipped
                // and they contribute nothing to the round.
                if !shared.roster.contains(&name) {
                    continue;
                }
                shared.turn_holder = Some(name.clone());
            }

            let failed = self
                .broadcast(
                    Message::server(Action::TurnStart, format!("{name}'s turn")),
                    None,
                )
                .await;
            self.evict(failed).await;

            {
                // The turn holder themselves may have been evicted by
                // that broadcast; don't wait out a window nobody owns.
                let mut shared = self.shared.lock().await;
                if !shared.roster.contains(&name) {
                    shared.turn_holder = None;
                    continue;
                }
            }

            let deposit = self.await_deposit(inbound, &name).await;

            {
                let mut shared = self.shared.lock().await;
                if let Some(member) = shared.roster.get_mut(&name) {
                    member.funds += deposit;
                    // No clamp: depositing more than the ceiling makes a
                    // negative tax contribution.
                    tax += self.config.max_coins - deposit;
                }
                shared.turn_holder = None;
            }

            let failed = self
                .broadcast(
                    Message::server(Action::TurnEnd, format!("{name}'s turn is over")),
                    None,
                )
                .await;
            self.evict(failed).await;
        }
        tax
    }

    /// Waits out one member's private window. A timeout, a closed
    /// queue, or unparseable contents all degrade to a deposit of 0,
    /// never an error. Messages from anyone else during the window get
    /// an `error` reply and don't consume it.
    async fn await_deposit(&self, inbound: &mut mpsc::Receiver<Message>, name: &str) -> i64 {
        let deadline = Instant::now() + self.config.turn_window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::debug!(room_id = %self.id, member = name, "turn window closed without a deposit");
                return 0;
            }
            let msg = match timeout(remaining, inbound.recv()).await {
                Err(_) => {
                    tracing::debug!(room_id = %self.id, member = name, "turn window closed without a deposit");
                    return 0;
                }
                Ok(None) => return 0,
                Ok(Some(msg)) => msg,
            };

            if msg.action == Action::Deposit && msg.sender == name {
                return match msg.contents.trim().parse::<i64>() {
                    Ok(coins) => coins,
                    Err(e) => {
                        tracing::debug!(
                            room_id = %self.id,
                            member = name,
                            contents = %msg.contents,
                            error = %e,
                            "unparseable deposit, treating as zero"
                        );
                        0
                    }
                };
            }

            let sender = msg.sender.clone();
            self.rebuke(&sender, format!("it is {name}'s turn")).await;
        }
    }

    /// Settlement: double the tax pool, split it evenly, credit each
    /// member their share as part of the summary fan-out. Returns
    /// `false` when there is nobody left to settle with.
    async fn settle(&self, round: u32, tax: i64) -> bool {
        self.set_phase(Phase::Settling).await;
        let joined = i64::from(self.joined.load(Ordering::Acquire));
        if joined == 0 {
            tracing::warn!(room_id = %self.id, round, "every member left; ending early");
            return false;
        }

        let pool = tax * 2;
        // Integer division; the remainder is not redistributed.
        let share = pool / joined;
        let summary = format!("round {round} over: the pool of {pool} pays each member {share}");
        let failed = self
            .broadcast(
                Message::server(Action::RoundEnd, summary),
                Some(Effect::CreditFunds(share)),
            )
            .await;
        self.evict(failed).await;

        tracing::info!(room_id = %self.id, round, tax, pool, share, "round settled");
        true
    }

    /// Teardown: final notice, close every link, go inert. The roster
    /// is left in place (with dead links) so final balances remain
    /// readable; the registry wrapper deregisters the id.
    async fn finish(&self) {
        self.set_phase(Phase::Ended).await;
        let failed = self
            .broadcast(
                Message::server(Action::GameEnd, "the game is over"),
                Some(Effect::CloseLink),
            )
            .await;

        // Members whose final send failed still need their link closed.
        let mut shared = self.shared.lock().await;
        shared.turn_holder = None;
        for name in failed {
            if let Some(member) = shared.roster.get_mut(&name) {
                member.link.close().await;
            }
        }
        tracing::info!(room_id = %self.id, "room ended");
    }
}
