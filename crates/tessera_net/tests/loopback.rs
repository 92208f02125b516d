//! # Loopback Replication Tests
//!
//! Real sessions talking over 127.0.0.1 with ephemeral ports:
//!
//! 1. **Identity**: a participant's actor receives a coordinator-issued id
//! 2. **Replication**: transforms flow both ways and are relayed to peers
//! 3. **Ownership**: request, foreign write refusal, release seen by every peer
//! 4. **Robustness**: garbage datagrams are counted and dropped
//! 5. **Discovery**: a participant without an address finds the coordinator
//!
//! Run with: cargo test -p tessera_net --test loopback

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tessera_net::{
    ActorFactory, EntityKey, EntityKind, LinkState, NetConfig, NetEntity, NetError, NetId,
    OwnershipState, Role, SceneGate, Session, SessionBuilder,
};
use tessera_shared::{Transform, Vec3};

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

fn base_config() -> NetConfig {
    NetConfig {
        bind_ip: LOCALHOST,
        gameplay_port: 0,
        discovery_port: 0,
        tick_interval_ms: 5,
        poll_timeout_ms: 5,
        ..NetConfig::default()
    }
}

fn client_config(server: &Session) -> NetConfig {
    NetConfig {
        server_ip: Some(LOCALHOST),
        gameplay_port: server.gameplay_addr().expect("server bound").port(),
        ..base_config()
    }
}

fn open_gate() -> SceneGate {
    let gate = SceneGate::new();
    gate.mark_ready();
    gate
}

/// Ticks every session until `done` holds or the timeout passes.
fn settle(sessions: &mut [&mut Session], mut done: impl FnMut(&[&mut Session]) -> bool) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        for session in sessions.iter_mut() {
            session.tick(0.016);
        }
        if done(sessions) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    false
}

fn position_of(session: &Session, id: NetId) -> Option<Vec3> {
    session
        .world()
        .table()
        .find(id)
        .map(|entity| entity.transform().position)
}

fn id_of(session: &Session, key: EntityKey) -> NetId {
    session.world().entity(key).map_or(NetId::UNASSIGNED, NetEntity::id)
}

struct CountingFactory(Arc<AtomicUsize>);

impl ActorFactory for CountingFactory {
    fn spawn_remote(&mut self, _key: EntityKey, _entity: &NetEntity) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// IDENTITY + REPLICATION
// ============================================================================

#[test]
fn test_participant_actor_gets_id_and_replicates() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    let wall = server
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
        .unwrap();
    server.start(&open_gate()).unwrap();

    let mut client = SessionBuilder::new(Role::Client, client_config(&server))
        .build()
        .unwrap();
    client
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
        .unwrap();
    let player = client
        .spawn_local(EntityKind::Player, Transform::at(Vec3::new(0.0, 1.0, 0.0)))
        .unwrap();
    client.start(&open_gate()).unwrap();

    // The coordinator was seeded past the placed id 5.
    assert!(settle(&mut [&mut server, &mut client], |s| {
        id_of(&s[1], player) == NetId(6) && s[0].world().table().find(NetId(6)).is_some()
    }));

    // Participant -> coordinator.
    client
        .set_transform(player, Transform::at(Vec3::new(1.0, 2.0, 3.0)))
        .unwrap();
    assert!(settle(&mut [&mut server, &mut client], |s| {
        position_of(&s[0], NetId(6)) == Some(Vec3::new(1.0, 2.0, 3.0))
    }));

    // Coordinator -> participant.
    server
        .set_transform(wall, Transform::at(Vec3::new(0.0, 5.0, 0.0)))
        .unwrap();
    assert!(settle(&mut [&mut server, &mut client], |s| {
        position_of(&s[1], NetId(5)) == Some(Vec3::new(0.0, 5.0, 0.0))
    }));

    assert!(matches!(client.link_state(), LinkState::Connected(_)));
    assert_eq!(server.peers().len(), 1);
}

#[test]
fn test_coordinator_relays_between_participants() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    server.start(&open_gate()).unwrap();

    let mut alice = SessionBuilder::new(Role::Client, client_config(&server))
        .build()
        .unwrap();
    let alice_player = alice
        .spawn_local(EntityKind::Player, Transform::IDENTITY)
        .unwrap();
    alice.start(&open_gate()).unwrap();

    let spawned = Arc::new(AtomicUsize::new(0));
    let mut bob = SessionBuilder::new(Role::Client, client_config(&server))
        .factory(CountingFactory(Arc::clone(&spawned)))
        .build()
        .unwrap();
    bob.start(&open_gate()).unwrap();

    assert!(settle(&mut [&mut server, &mut alice, &mut bob], |s| {
        id_of(&s[1], alice_player).is_assigned()
    }));
    let alice_id = id_of(&alice, alice_player);

    alice
        .set_transform(alice_player, Transform::at(Vec3::new(4.0, 0.0, 4.0)))
        .unwrap();
    assert!(settle(&mut [&mut server, &mut alice, &mut bob], |s| {
        position_of(&s[2], alice_id) == Some(Vec3::new(4.0, 0.0, 4.0))
    }));

    // Bob learned about Alice's player exactly once.
    assert_eq!(spawned.load(Ordering::SeqCst), 1);
    assert_eq!(bob.world().table().len(), 1);
}

#[test]
fn test_host_and_client_see_each_other() {
    let mut host = SessionBuilder::new(Role::Host, base_config()).build().unwrap();
    let wall = host
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(1))
        .unwrap();
    let host_player = host
        .spawn_local(EntityKind::Player, Transform::IDENTITY)
        .unwrap();
    host.start(&open_gate()).unwrap();

    let mut client = SessionBuilder::new(Role::Client, client_config(&host))
        .build()
        .unwrap();
    client
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(1))
        .unwrap();
    let client_player = client
        .spawn_local(EntityKind::Player, Transform::IDENTITY)
        .unwrap();
    client.start(&open_gate()).unwrap();

    // Host player took the first id past the wall.
    assert_eq!(id_of(&host, host_player), NetId(2));
    assert!(settle(&mut [&mut host, &mut client], |s| {
        id_of(&s[1], client_player).is_assigned()
    }));
    let client_id = id_of(&client, client_player);
    assert_ne!(client_id, NetId(2));

    host.set_transform(host_player, Transform::at(Vec3::new(1.0, 0.0, 0.0)))
        .unwrap();
    host.set_transform(wall, Transform::at(Vec3::new(0.0, 3.0, 0.0)))
        .unwrap();
    client
        .set_transform(client_player, Transform::at(Vec3::new(-1.0, 0.0, 0.0)))
        .unwrap();
    assert!(settle(&mut [&mut host, &mut client], |s| {
        position_of(&s[1], NetId(2)) == Some(Vec3::new(1.0, 0.0, 0.0))
            && position_of(&s[1], NetId(1)) == Some(Vec3::new(0.0, 3.0, 0.0))
            && position_of(&s[0], client_id) == Some(Vec3::new(-1.0, 0.0, 0.0))
    }));

    // The host's own participant loop and the remote client.
    assert_eq!(host.peers().len(), 2);
    // The host never lets its own loopback traffic overwrite local state.
    assert_eq!(
        position_of(&host, NetId(2)),
        Some(Vec3::new(1.0, 0.0, 0.0))
    );
}

// ============================================================================
// OWNERSHIP
// ============================================================================

#[test]
fn test_ownership_request_and_release() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    let wall = server
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
        .unwrap();
    server.start(&open_gate()).unwrap();

    let mut client = SessionBuilder::new(Role::Client, client_config(&server))
        .build()
        .unwrap();
    let replica = client
        .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
        .unwrap();
    client.start(&open_gate()).unwrap();
    let client_endpoint = client.participant_addr().unwrap();

    // Participant may not write before it owns the entity.
    assert!(matches!(
        client.set_transform(replica, Transform::IDENTITY),
        Err(NetError::NotAuthoritative(_))
    ));

    client.request_ownership(NetId(5)).unwrap();
    assert!(settle(&mut [&mut server, &mut client], |s| {
        s[1].world().table().ownership(NetId(5)) == Some(OwnershipState::Local)
            && matches!(
                s[0].world().table().ownership(NetId(5)),
                Some(OwnershipState::Remote(owner)) if owner.addr() == client_endpoint
            )
    }));

    // Coordinator lost authority; participant now drives the entity.
    assert!(server.set_transform(wall, Transform::IDENTITY).is_err());
    client
        .set_transform(replica, Transform::at(Vec3::new(9.0, 0.0, 0.0)))
        .unwrap();
    assert!(settle(&mut [&mut server, &mut client], |s| {
        position_of(&s[0], NetId(5)) == Some(Vec3::new(9.0, 0.0, 0.0))
    }));

    // A bystander peer registers with an empty batch.
    let bystander = UdpSocket::bind("127.0.0.1:0").unwrap();
    bystander.set_nonblocking(true).unwrap();
    let target = server.gameplay_addr().unwrap();
    bystander.send_to(&[0, 0, 0, 0, 0], target).unwrap();
    assert!(settle(&mut [&mut server, &mut client], |s| s[0].peers().len() == 2));

    client.release_ownership(NetId(5)).unwrap();
    let released = [6, 5, 0, 0, 0];
    let mut bystander_saw_release = false;
    let mut buf = [0u8; 2048];
    assert!(settle(&mut [&mut server, &mut client], |s| {
        while let Ok((len, _)) = bystander.recv_from(&mut buf) {
            bystander_saw_release |= buf[..len] == released;
        }
        bystander_saw_release
            && s[0].world().table().ownership(NetId(5)) == Some(OwnershipState::Local)
            && s[1].world().table().ownership(NetId(5)) == Some(OwnershipState::Unowned)
    }));
    assert!(server.set_transform(wall, Transform::IDENTITY).is_ok());
}

// ============================================================================
// ROBUSTNESS
// ============================================================================

#[test]
fn test_garbage_is_counted_and_commands_still_answered() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    server.start(&open_gate()).unwrap();
    let target = server.gameplay_addr().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    raw.set_read_timeout(Some(Duration::from_millis(5))).unwrap();
    raw.send_to(&[0xFF, 1, 2, 3], target).unwrap();
    raw.send_to(&[0, 1, 0, 0, 0, 9], target).unwrap(); // truncated batch
    raw.send_to(&[1], target).unwrap(); // REQUEST_ID

    let deadline = Instant::now() + SETTLE_TIMEOUT;
    let mut assigned = None;
    let mut buf = [0u8; 2048];
    while assigned.is_none() && Instant::now() < deadline {
        server.tick(0.016);
        if let Ok((len, _)) = raw.recv_from(&mut buf) {
            if len == 5 && buf[0] == 2 {
                assigned = Some(i32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]));
            }
        }
    }

    assert_eq!(assigned, Some(0));
    assert_eq!(server.stats().coordinator.decode_errors, 2);
    assert_eq!(server.peers().len(), 1);
}

#[test]
fn test_discovery_port_only_answers_exact_request() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    server.start(&open_gate()).unwrap();
    let discovery = server.discovery_addr().unwrap();

    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();
    raw.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut buf = [0u8; 64];

    raw.send_to(b"DISCOVER_SERVER!", discovery).unwrap();
    assert!(raw.recv_from(&mut buf).is_err());

    raw.send_to(b"DISCOVER_SERVER", discovery).unwrap();
    let (len, _) = raw.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..len], b"SERVER_HERE");
}

// ============================================================================
// DISCOVERY
// ============================================================================

#[test]
fn test_participant_discovers_coordinator() {
    let mut server = SessionBuilder::new(Role::Server, base_config()).build().unwrap();
    server.start(&open_gate()).unwrap();
    let gameplay: SocketAddr = server.gameplay_addr().unwrap();

    let mut client = SessionBuilder::new(
        Role::Client,
        NetConfig {
            server_ip: None,
            discovery_target: LOCALHOST,
            discovery_port: server.discovery_addr().unwrap().port(),
            gameplay_port: gameplay.port(),
            discovery_timeout_ms: 2000,
            ..base_config()
        },
    )
    .build()
    .unwrap();
    let player = client
        .spawn_local(EntityKind::Player, Transform::IDENTITY)
        .unwrap();
    client.start(&open_gate()).unwrap();

    assert!(settle(&mut [&mut server, &mut client], |s| {
        s[1].link_state() == LinkState::Connected(gameplay) && id_of(&s[1], player).is_assigned()
    }));
}

#[test]
fn test_participant_without_coordinator_gives_up() {
    let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut client = SessionBuilder::new(
        Role::Client,
        NetConfig {
            server_ip: None,
            discovery_target: LOCALHOST,
            discovery_port: silent.local_addr().unwrap().port(),
            gameplay_port: 1,
            discovery_timeout_ms: 100,
            ..base_config()
        },
    )
    .build()
    .unwrap();
    client.start(&open_gate()).unwrap();

    assert!(settle(&mut [&mut client], |s| s[0].link_state() == LinkState::Unreachable));
}
