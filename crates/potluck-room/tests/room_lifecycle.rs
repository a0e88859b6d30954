//! Integration tests for the registry and the room lifecycle, driven
//! through an in-memory [`Link`] so no sockets are involved.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use potluck_protocol::{Action, Message};
use potluck_room::{Link, LinkError, Phase, Registry, Room, RoomConfig, RoomError};
use tokio::time::{Instant, sleep};

// =========================================================================
// Test link: records everything the room sends.
// =========================================================================

#[derive(Clone, Default)]
struct TestLink {
    sent: Arc<StdMutex<Vec<Message>>>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl TestLink {
    /// A link whose sends always fail, simulating a dead connection.
    fn failing() -> Self {
        let link = Self::default();
        link.fail_sends.store(true, Ordering::Relaxed);
        link
    }

    fn messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    fn count(&self, action: Action) -> usize {
        self.messages().iter().filter(|m| m.action == action).count()
    }

    fn has(&self, action: Action) -> bool {
        self.count(action) > 0
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Link for TestLink {
    async fn send(&self, msg: &Message) -> Result<(), LinkError> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(LinkError("wire cut".into()));
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn fast_config(capacity: u32, rounds: u32) -> RoomConfig {
    RoomConfig {
        capacity,
        rounds,
        max_coins: 10,
        chat_window: Duration::from_millis(100),
        turn_window: Duration::from_millis(250),
        start_grace: Duration::from_millis(20),
    }
}

/// Reserves a slot and admits a member, the way a real connection does.
async fn join(registry: &Registry<TestLink>, id: &str, name: &str) -> TestLink {
    let room = registry
        .lookup_and_reserve(id)
        .await
        .expect("room should exist and have a slot");
    let link = TestLink::default();
    room.admit(name, link.clone())
        .await
        .expect("admission should succeed");
    link
}

async fn wait_for_phase(room: &Room<TestLink>, phase: Phase) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if room.info().await.phase == phase {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for phase {phase}"
        );
        sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

fn deposit_msg(name: &str, amount: &str) -> Message {
    Message {
        action: Action::Deposit,
        sender: name.to_string(),
        recipients: Vec::new(),
        contents: amount.to_string(),
        timestamp: 0,
        error: None,
    }
}

/// Waits for the member's `turnStart`, then submits their deposit.
fn drive_deposit(
    room: Arc<Room<TestLink>>,
    link: TestLink,
    name: &'static str,
    amount: &'static str,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            assert!(Instant::now() < deadline, "never saw {name}'s turn");
            let my_turn = link.messages().iter().any(|m| {
                m.action == Action::TurnStart && m.contents.starts_with(name)
            });
            if my_turn {
                room.submit(deposit_msg(name, amount)).await;
                return;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
}

// =========================================================================
// Registry
// =========================================================================

#[tokio::test]
async fn concurrent_creates_assign_distinct_ids() {
    let registry: Registry<TestLink> = Registry::new();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry.create(fast_config(3, 1)).await.id().to_string()
        }));
    }

    let mut ids = std::collections::HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()), "identifier collision");
    }
    assert_eq!(registry.len().await, 16);
}

#[tokio::test]
async fn lookup_of_unknown_id_fails() {
    let registry: Registry<TestLink> = Registry::new();
    let result = registry.lookup_and_reserve("nope1234").await;
    assert!(matches!(result, Err(RoomError::NotFound(_))));
}

#[tokio::test]
async fn connected_never_exceeds_capacity() {
    let registry: Registry<TestLink> = Registry::new();
    // Long grace so the room sits in Forming for the whole test.
    let config = RoomConfig {
        start_grace: Duration::from_secs(60),
        ..fast_config(3, 1)
    };
    let room = registry.create(config).await;
    let id = room.id().to_string();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let registry = registry.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            registry.lookup_and_reserve(&id).await.is_ok()
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap() {
            successes += 1;
        }
    }
    assert_eq!(successes, 3, "exactly capacity reservations should win");
    assert_eq!(room.info().await.connected, 3);
}

#[tokio::test]
async fn registry_remove_is_idempotent() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(3, 1)).await;
    let id = room.id().to_string();

    registry.remove(&id).await;
    registry.remove(&id).await;
    registry.remove("never-existed").await;
    assert!(!registry.contains(&id).await);
}

// =========================================================================
// Admission
// =========================================================================

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let registry: Registry<TestLink> = Registry::new();
    let config = RoomConfig {
        start_grace: Duration::from_secs(60),
        ..fast_config(3, 1)
    };
    let room = registry.create(config).await;
    let id = room.id().to_string();

    join(&registry, &id, "alice").await;

    let again = registry.lookup_and_reserve(&id).await.unwrap();
    let result = again.admit("alice", TestLink::default()).await;
    assert!(matches!(result, Err(RoomError::MemberExists(_))));
}

#[tokio::test]
async fn admission_beyond_capacity_is_rejected() {
    let registry: Registry<TestLink> = Registry::new();
    let config = RoomConfig {
        start_grace: Duration::from_secs(60),
        ..fast_config(2, 1)
    };
    let room = registry.create(config).await;
    let id = room.id().to_string();

    join(&registry, &id, "alice").await;
    join(&registry, &id, "bob").await;

    // The reservation gate is already exhausted...
    assert!(matches!(
        registry.lookup_and_reserve(&id).await,
        Err(RoomError::Full(_))
    ));
    // ...and the roster refuses directly too; reservation and
    // admission are separate steps.
    let result = room.admit("carol", TestLink::default()).await;
    assert!(matches!(result, Err(RoomError::Full(_))));
}

#[tokio::test]
async fn members_can_be_removed_by_their_link() {
    let registry: Registry<TestLink> = Registry::new();
    let config = RoomConfig {
        start_grace: Duration::from_secs(60),
        ..fast_config(3, 1)
    };
    let room = registry.create(config).await;
    let id = room.id().to_string();

    let alice = join(&registry, &id, "alice").await;
    let bob = join(&registry, &id, "bob").await;

    let target = alice.clone();
    room.remove_by_link(|link| Arc::ptr_eq(&link.sent, &target.sent))
        .await;

    assert!(alice.is_closed());
    assert_eq!(room.member_funds("alice").await, None);
    assert!(room.member_funds("bob").await.is_some());
    let info = room.info().await;
    assert_eq!(info.joined, 1);
    assert_eq!(info.connected, 1);

    // A second pass matches nothing and is a no-op.
    room.remove_by_link(|link| Arc::ptr_eq(&link.sent, &target.sent))
        .await;
    assert_eq!(room.info().await.joined, 1);
    assert!(!bob.is_closed());
}

#[tokio::test]
async fn reserved_names_are_rejected() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(3, 1)).await;

    assert!(matches!(
        room.admit("", TestLink::default()).await,
        Err(RoomError::Protocol(_))
    ));
    assert!(matches!(
        room.admit("server", TestLink::default()).await,
        Err(RoomError::Protocol(_))
    ));
}

// =========================================================================
// Full game, the worked example: capacity 3, one round, ceiling 10.
// Deposits 4 and 10, one timeout. tax = 6 + 0 + 10 = 16, pool = 32,
// share = 32 / 3 = 10 with the remainder dropped.
// =========================================================================

#[tokio::test]
async fn full_game_matches_the_worked_example() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(3, 1)).await;
    let id = room.id().to_string();

    let alice = join(&registry, &id, "alice").await;
    let bob = join(&registry, &id, "bob").await;
    let carol = join(&registry, &id, "carol").await;

    let d1 = drive_deposit(Arc::clone(&room), alice.clone(), "alice", "4");
    let d2 = drive_deposit(Arc::clone(&room), bob.clone(), "bob", "10");
    // carol never deposits: her window times out and counts as zero.

    wait_for_phase(&room, Phase::Ended).await;
    d1.await.unwrap();
    d2.await.unwrap();

    assert_eq!(room.member_funds("alice").await, Some(14));
    assert_eq!(room.member_funds("bob").await, Some(20));
    assert_eq!(room.member_funds("carol").await, Some(10));

    // Every member saw the whole ceremony, in order.
    for link in [&alice, &bob, &carol] {
        assert!(link.has(Action::Start));
        assert_eq!(link.count(Action::TurnStart), 3);
        assert_eq!(link.count(Action::TurnEnd), 3);
        assert_eq!(link.count(Action::RoundEnd), 1);
        assert_eq!(link.count(Action::GameEnd), 1);
        assert!(link.is_closed(), "room teardown must close every link");

        let stamps: Vec<u64> = link.messages().iter().map(|m| m.timestamp).collect();
        assert!(
            stamps.windows(2).all(|w| w[0] < w[1]),
            "timestamps must increase monotonically"
        );
    }

    // Teardown deregisters the id; later lookups must fail.
    let id_for_poll = id.clone();
    let registry_for_poll = registry.clone();
    let deadline = Instant::now() + Duration::from_secs(5);
    while registry_for_poll.contains(&id_for_poll).await {
        assert!(Instant::now() < deadline, "room was never deregistered");
        sleep(Duration::from_millis(5)).await;
    }
    assert!(matches!(
        registry.lookup_and_reserve(&id).await,
        Err(RoomError::NotFound(_))
    ));
}

// =========================================================================
// Deposit edge cases
// =========================================================================

#[tokio::test]
async fn unparseable_deposit_counts_as_zero() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(1, 1)).await;
    let id = room.id().to_string();
    let link = join(&registry, &id, "solo").await;

    drive_deposit(Arc::clone(&room), link.clone(), "solo", "banana");
    wait_for_phase(&room, Phase::Ended).await;

    // Deposit degraded to 0: tax = 10, pool = 20, share = 20.
    assert_eq!(room.member_funds("solo").await, Some(20));
}

#[tokio::test]
async fn deposits_above_the_ceiling_are_not_clamped() {
    // Flagged open question: over-depositing yields a negative tax
    // contribution. We preserve the observed behavior: no clamp.
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(1, 1)).await;
    let id = room.id().to_string();
    let link = join(&registry, &id, "whale").await;

    drive_deposit(Arc::clone(&room), link.clone(), "whale", "25");
    wait_for_phase(&room, Phase::Ended).await;

    // funds = 25, tax = 10 - 25 = -15, pool = -30, share = -30.
    assert_eq!(room.member_funds("whale").await, Some(-5));
}

#[tokio::test]
async fn settlement_share_is_equal_regardless_of_deposit() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(2, 1)).await;
    let id = room.id().to_string();
    let alice = join(&registry, &id, "alice").await;
    let bob = join(&registry, &id, "bob").await;

    let d1 = drive_deposit(Arc::clone(&room), alice.clone(), "alice", "0");
    let d2 = drive_deposit(Arc::clone(&room), bob.clone(), "bob", "10");
    wait_for_phase(&room, Phase::Ended).await;
    d1.await.unwrap();
    d2.await.unwrap();

    // tax = 10 + 0 = 10, pool = 20, share = 10 each.
    assert_eq!(room.member_funds("alice").await, Some(10));
    assert_eq!(room.member_funds("bob").await, Some(20));
}

// =========================================================================
// Chat fan-out
// =========================================================================

#[tokio::test]
async fn chat_relay_excludes_sender_and_unknown_recipients() {
    let registry: Registry<TestLink> = Registry::new();
    let config = RoomConfig {
        chat_window: Duration::from_millis(400),
        ..fast_config(3, 1)
    };
    let room = registry.create(config).await;
    let id = room.id().to_string();

    let alice = join(&registry, &id, "alice").await;
    let bob = join(&registry, &id, "bob").await;
    let carol = join(&registry, &id, "carol").await;

    let alice_w = alice.clone();
    wait_until("the start broadcast", move || alice_w.has(Action::Start)).await;

    // Empty recipient list: everyone but the sender.
    room.submit(Message::chat("alice", vec![], "hello everyone")).await;
    let bob_w = bob.clone();
    wait_until("bob's copy", move || bob_w.has(Action::Chat)).await;
    let carol_w = carol.clone();
    wait_until("carol's copy", move || carol_w.has(Action::Chat)).await;

    // Named recipients: only those, minus the sender, minus unknowns,
    // duplicates collapsed.
    room.submit(Message::chat(
        "bob",
        vec!["alice".into(), "ghost".into(), "alice".into(), "bob".into()],
        "psst",
    ))
    .await;
    let alice_w = alice.clone();
    wait_until("alice's whisper", move || {
        alice_w.messages().iter().any(|m| m.contents == "psst")
    })
    .await;

    wait_for_phase(&room, Phase::Ended).await;

    assert_eq!(
        alice.messages().iter().filter(|m| m.contents == "psst").count(),
        1,
        "duplicate recipients must not mean duplicate deliveries"
    );
    assert!(
        !alice.messages().iter().any(|m| m.contents == "hello everyone"),
        "a relay must never echo to the sender"
    );
    assert!(
        !bob.messages().iter().any(|m| m.contents == "psst"),
        "a named list including the sender still excludes them"
    );
    assert!(
        !carol.messages().iter().any(|m| m.contents == "psst"),
        "members outside the recipient list get nothing"
    );
}

// =========================================================================
// Reformation: a member lost during the start broadcast reopens a seat.
// =========================================================================

#[tokio::test]
async fn failed_start_send_reforms_the_room() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(2, 1)).await;
    let id = room.id().to_string();

    let doomed = registry.lookup_and_reserve(&id).await.unwrap();
    let alice = TestLink::failing();
    doomed.admit("alice", alice.clone()).await.unwrap();
    let bob = join(&registry, &id, "bob").await;

    // The start broadcast fails against alice; she is evicted and the
    // room returns to Forming to wait for a replacement.
    let alice_w = alice.clone();
    wait_until("alice's eviction", move || alice_w.is_closed()).await;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let info = room.info().await;
        if info.joined == 1 && info.phase == Phase::Forming {
            break;
        }
        assert!(Instant::now() < deadline, "room never returned to Forming");
        sleep(Duration::from_millis(5)).await;
    }

    // A replacement completes quorum and the game runs to the end.
    let dana = join(&registry, &id, "dana").await;
    let d1 = drive_deposit(Arc::clone(&room), bob.clone(), "bob", "10");
    let d2 = drive_deposit(Arc::clone(&room), dana.clone(), "dana", "10");
    wait_for_phase(&room, Phase::Ended).await;
    d1.await.unwrap();
    d2.await.unwrap();

    assert_eq!(bob.count(Action::Start), 2, "bob sees both start attempts");
    assert_eq!(dana.count(Action::Start), 1);
    assert_eq!(room.member_funds("alice").await, None);
    assert!(room.member_funds("bob").await.is_some());
}

// =========================================================================
// Terminal state
// =========================================================================

#[tokio::test]
async fn ended_room_accepts_no_admissions_or_messages() {
    let registry: Registry<TestLink> = Registry::new();
    let room = registry.create(fast_config(1, 1)).await;
    let id = room.id().to_string();
    let link = join(&registry, &id, "solo").await;

    wait_for_phase(&room, Phase::Ended).await;
    assert!(link.is_closed());

    let result = room.admit("latecomer", TestLink::default()).await;
    assert!(matches!(result, Err(RoomError::Protocol(_))));

    // Submitting to an ended room is a logged no-op, never a panic.
    room.submit(Message::chat("solo", vec![], "anyone there?")).await;
    assert_eq!(room.info().await.phase, Phase::Ended);
}
