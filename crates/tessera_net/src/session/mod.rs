//! # Replication Session
//!
//! The public face of the crate. A [`Session`] owns the [`World`], the
//! [`Dispatcher`] and the background threads its [`Role`] needs.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionBuilder::build()
//!     │  place() / spawn_local()      scene registers its entities
//!     ▼
//! start(&gate)                        waits for the scene, binds sockets,
//!     │                               seeds ids, spawns loops
//!     ▼
//! tick(dt)  ◀── every frame           drain actions, smooth, publish
//!     │
//!     ▼
//! shutdown() / drop                   cancel + join
//! ```
//!
//! | Role   | discovery responder | coordinator loop | participant loop |
//! |--------|---------------------|------------------|------------------|
//! | Server | yes                 | yes              | no               |
//! | Client | no                  | no               | yes              |
//! | Host   | yes                 | yes              | yes (loopback)   |

mod gate;
mod role;

pub use gate::SceneGate;
pub use role::{ParseRoleError, Role};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tessera_shared::Transform;
use tracing::{error, info, warn};

use crate::config::NetConfig;
use crate::discovery::DiscoveryResponder;
use crate::dispatcher::Dispatcher;
use crate::error::{NetError, NetResult};
use crate::protocol::Command;
use crate::replication::{ClientLoop, LoopShared, PeerSet, ServerLoop, ServerTarget, SnapshotCell, WorldSnapshot};
use crate::transport::{TransportStats, TransportStatsSnapshot, UdpTransport};
use crate::world::{ActorFactory, Endpoint, EntityKey, EntityKind, NetId, NullFactory, World};

/// Connection state of the participant loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    /// Loop not running.
    Idle,
    /// Waiting for a discovery reply.
    Discovering,
    /// Exchanging traffic with the coordinator.
    Connected(SocketAddr),
    /// Discovery gave up.
    Unreachable,
}

/// What one [`Session::tick`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tick number after this call.
    pub tick: u64,
    /// Dispatched actions executed.
    pub executed: usize,
    /// Dispatched actions that failed.
    pub failed: usize,
}

/// Counters for every socket the session owns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Coordinator loop socket.
    pub coordinator: TransportStatsSnapshot,
    /// Participant loop socket.
    pub participant: TransportStatsSnapshot,
    /// Discovery responder socket.
    pub discovery: TransportStatsSnapshot,
    /// Known peers (coordinator).
    pub peers: usize,
    /// Dispatched actions that failed since start.
    pub failed_actions: u64,
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    role: Role,
    config: NetConfig,
    factory: Box<dyn ActorFactory>,
}

impl SessionBuilder {
    /// Starts a builder with a no-op actor factory.
    #[must_use]
    pub fn new(role: Role, config: NetConfig) -> Self {
        Self {
            role,
            config,
            factory: Box::new(NullFactory),
        }
    }

    /// Sets the factory for entities introduced by the network.
    #[must_use]
    pub fn factory(mut self, factory: impl ActorFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Validates the configuration and creates the session.
    ///
    /// # Errors
    ///
    /// [`NetError::Config`] if the configuration is invalid.
    pub fn build(self) -> NetResult<Session> {
        self.config.validate()?;
        let (control_tx, control_rx) = unbounded();

        Ok(Session {
            role: self.role,
            world: World::new(self.factory, self.config.smoothing_rate),
            config: self.config,
            dispatcher: Dispatcher::new(),
            snapshot: Arc::new(SnapshotCell::new()),
            peers: Arc::new(PeerSet::new()),
            control_tx,
            control_rx,
            link: Arc::new(Mutex::new(LinkState::Idle)),
            coordinator_stats: Arc::new(TransportStats::default()),
            participant_stats: Arc::new(TransportStats::default()),
            discovery_stats: Arc::new(TransportStats::default()),
            cancel: Arc::new(AtomicBool::new(false)),
            threads: Vec::new(),
            gameplay_addr: None,
            discovery_addr: None,
            participant_addr: None,
            started: false,
            tick: 0,
        })
    }
}

/// A running (or ready to run) replication endpoint.
pub struct Session {
    role: Role,
    config: NetConfig,
    world: World,
    dispatcher: Dispatcher<World>,
    snapshot: Arc<SnapshotCell>,
    peers: Arc<PeerSet>,
    control_tx: Sender<Command>,
    control_rx: Receiver<Command>,
    link: Arc<Mutex<LinkState>>,
    coordinator_stats: Arc<TransportStats>,
    participant_stats: Arc<TransportStats>,
    discovery_stats: Arc<TransportStats>,
    cancel: Arc<AtomicBool>,
    threads: Vec<(&'static str, JoinHandle<()>)>,
    gameplay_addr: Option<SocketAddr>,
    discovery_addr: Option<SocketAddr>,
    participant_addr: Option<SocketAddr>,
    started: bool,
    tick: u64,
}

impl Session {
    /// This session's role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &NetConfig {
        &self.config
    }

    /// Read access to the world.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Write access to the world. Only valid in the coordinator context,
    /// which is whoever owns the session.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<WorldSnapshot> {
        self.snapshot.load()
    }

    /// Endpoints the coordinator loop has heard from.
    #[must_use]
    pub fn peers(&self) -> Vec<Endpoint> {
        self.peers.snapshot()
    }

    /// Participant connection state.
    #[must_use]
    pub fn link_state(&self) -> LinkState {
        *self.link.lock()
    }

    /// Whether `start` succeeded.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Bound coordinator gameplay address.
    #[must_use]
    pub const fn gameplay_addr(&self) -> Option<SocketAddr> {
        self.gameplay_addr
    }

    /// Bound discovery responder address.
    #[must_use]
    pub const fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery_addr
    }

    /// Bound participant socket address.
    #[must_use]
    pub const fn participant_addr(&self) -> Option<SocketAddr> {
        self.participant_addr
    }

    /// Socket and dispatcher counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            coordinator: self.coordinator_stats.snapshot(),
            participant: self.participant_stats.snapshot(),
            discovery: self.discovery_stats.snapshot(),
            peers: self.peers.len(),
            failed_actions: self.dispatcher.total_failed(),
        }
    }

    /// Registers an entity this process drives and arranges an id for it.
    ///
    /// The coordinator allocates directly (at `start` if not yet running);
    /// a participant queues `REQUEST_ID` and binds the answer when it
    /// arrives.
    ///
    /// # Errors
    ///
    /// Id allocation failure on the coordinator.
    pub fn spawn_local(&mut self, kind: EntityKind, transform: Transform) -> NetResult<EntityKey> {
        let key = self.world.insert_native(kind, transform, NetId::UNASSIGNED)?;
        if self.role.is_coordinator() {
            if self.started {
                let id = self.world.assign_id(key)?;
                info!(?key, %id, "spawned local entity");
            }
        } else {
            self.queue(Command::RequestId);
        }
        Ok(key)
    }

    /// Registers a scene entity with a fixed id (or a placeholder if `id`
    /// is unassigned).
    ///
    /// On the coordinator the entity is driven locally; on a client it is
    /// passive until ownership is granted.
    ///
    /// # Errors
    ///
    /// [`NetError::DuplicateId`] if `id` is taken.
    pub fn place(&mut self, kind: EntityKind, transform: Transform, id: NetId) -> NetResult<EntityKey> {
        if self.role.is_coordinator() {
            let key = self.world.insert_native(kind, transform, id)?;
            if self.started && !id.is_assigned() {
                self.world.assign_id(key)?;
            }
            Ok(key)
        } else {
            self.world.insert_passive(kind, transform, id)
        }
    }

    /// Writes the transform of a locally driven entity.
    ///
    /// # Errors
    ///
    /// See [`World::set_transform`].
    pub fn set_transform(&mut self, key: EntityKey, transform: Transform) -> NetResult<()> {
        self.world.set_transform(key, transform)
    }

    /// Asks the coordinator for write authority over `id`.
    ///
    /// # Errors
    ///
    /// [`NetError::WrongRole`] unless this is a Client.
    pub fn request_ownership(&self, id: NetId) -> NetResult<()> {
        if self.role != Role::Client {
            return Err(NetError::WrongRole("request_ownership"));
        }
        self.queue(Command::RequestOwnership(id));
        Ok(())
    }

    /// Gives write authority over `id` back to the coordinator.
    ///
    /// # Errors
    ///
    /// [`NetError::WrongRole`] unless this is a Client.
    pub fn release_ownership(&self, id: NetId) -> NetResult<()> {
        if self.role != Role::Client {
            return Err(NetError::WrongRole("release_ownership"));
        }
        self.queue(Command::ReleaseOwnership(id));
        Ok(())
    }

    fn queue(&self, command: Command) {
        // The session holds a receiver, so the channel cannot disconnect.
        if self.control_tx.send(command).is_err() {
            warn!(%command, "control channel closed");
        }
    }

    /// Waits for the scene, then starts the threads this role needs.
    ///
    /// # Errors
    ///
    /// [`NetError::AlreadyStarted`], [`NetError::SceneNotReady`], bind
    /// failures and thread spawn failures. On error nothing is left running.
    pub fn start(&mut self, gate: &SceneGate) -> NetResult<()> {
        if self.started {
            return Err(NetError::AlreadyStarted);
        }
        if !gate.wait(self.config.scene_ready_timeout()) {
            return Err(NetError::SceneNotReady(self.config.scene_ready_timeout_ms));
        }

        if self.role.is_coordinator() {
            self.world.seed_ids();
            let bound = self.world.assign_pending()?;
            info!(bound, next_id = %self.world.next_id(), "identity allocator seeded");
        }
        self.snapshot.publish(self.world.snapshot(self.tick));

        self.cancel.store(false, Ordering::SeqCst);
        if let Err(error) = self.launch() {
            self.stop_threads();
            return Err(error);
        }

        self.started = true;
        info!(role = %self.role, "session started");
        Ok(())
    }

    fn launch(&mut self) -> NetResult<()> {
        let shared = LoopShared {
            cancel: Arc::clone(&self.cancel),
            snapshot: Arc::clone(&self.snapshot),
            dispatch: self.dispatcher.handle(),
            stats: Arc::clone(&self.coordinator_stats),
            tick_interval: self.config.tick_interval(),
            max_datagram: self.config.max_datagram,
        };
        let poll = self.config.poll_timeout();

        if self.role.is_coordinator() {
            let responder = DiscoveryResponder::bind(
                self.config.discovery_bind_addr(),
                poll,
                Arc::clone(&self.cancel),
                Arc::clone(&self.discovery_stats),
            )?;
            self.discovery_addr = Some(responder.local_addr());
            self.spawn("tessera-discovery", move || responder.run())?;

            let addr = self.config.gameplay_bind_addr();
            let transport = UdpTransport::bind(addr, poll, Arc::clone(&self.coordinator_stats))
                .map_err(|source| NetError::Bind { addr, source })?;
            self.gameplay_addr = Some(transport.local_addr());
            let server = ServerLoop::new(transport, Arc::clone(&self.peers), unbounded(), shared.clone());
            self.spawn("tessera-server", move || server.run())?;
        }

        if self.role.is_participant() {
            let addr = SocketAddr::new(self.config.bind_ip, 0);
            let transport = UdpTransport::bind(addr, poll, Arc::clone(&self.participant_stats))
                .map_err(|source| NetError::Bind { addr, source })?;
            self.participant_addr = Some(transport.local_addr());

            let client = ClientLoop::new(
                transport,
                self.server_target(),
                self.control_rx.clone(),
                Arc::clone(&self.link),
                LoopShared {
                    stats: Arc::clone(&self.participant_stats),
                    ..shared
                },
            );
            self.spawn("tessera-client", move || client.run())?;
        }
        Ok(())
    }

    /// Where the participant loop sends.
    fn server_target(&self) -> ServerTarget {
        if let Some(ip) = self.config.server_ip {
            return ServerTarget::Known(SocketAddr::new(ip, self.config.gameplay_port));
        }
        if let Some(bound) = self.gameplay_addr {
            // Host: talk to our own coordinator.
            let ip = if bound.ip().is_unspecified() {
                IpAddr::V4(Ipv4Addr::LOCALHOST)
            } else {
                bound.ip()
            };
            return ServerTarget::Known(SocketAddr::new(ip, bound.port()));
        }
        ServerTarget::Discover {
            bind_ip: self.config.bind_ip,
            probe_target: self.config.discovery_target_addr(),
            gameplay_port: self.config.gameplay_port,
            timeout: self.config.discovery_timeout(),
            poll: self.config.poll_timeout(),
        }
    }

    fn spawn(&mut self, name: &'static str, body: impl FnOnce() + Send + 'static) -> NetResult<()> {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .map_err(|source| NetError::Spawn { name, source })?;
        self.threads.push((name, handle));
        Ok(())
    }

    /// Runs one coordinator-context step: executes queued actions, advances
    /// smoothing by `dt` seconds and publishes a fresh snapshot.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let drained = self.dispatcher.drain(&mut self.world);
        self.world.advance(dt);
        self.tick += 1;
        self.snapshot.publish(self.world.snapshot(self.tick));

        TickReport {
            tick: self.tick,
            executed: drained.executed,
            failed: drained.failed,
        }
    }

    /// Stops and joins every background thread. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.stop_threads();
        self.started = false;
        info!(role = %self.role, "session stopped");
    }

    fn stop_threads(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        for (name, handle) in self.threads.drain(..) {
            if handle.join().is_err() {
                error!(thread = name, "thread panicked");
            }
        }
        *self.link.lock() = LinkState::Idle;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("started", &self.started)
            .field("tick", &self.tick)
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn local_config() -> NetConfig {
        NetConfig {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            gameplay_port: 0,
            discovery_port: 0,
            tick_interval_ms: 5,
            poll_timeout_ms: 10,
            scene_ready_timeout_ms: 50,
            ..NetConfig::default()
        }
    }

    fn open_gate() -> SceneGate {
        let gate = SceneGate::new();
        gate.mark_ready();
        gate
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = NetConfig {
            tick_interval_ms: 0,
            ..NetConfig::default()
        };
        assert!(matches!(
            SessionBuilder::new(Role::Server, config).build(),
            Err(NetError::Config(_))
        ));
    }

    #[test]
    fn test_start_waits_for_scene() {
        let mut session = SessionBuilder::new(Role::Server, local_config()).build().unwrap();
        let gate = SceneGate::new();
        assert!(matches!(session.start(&gate), Err(NetError::SceneNotReady(50))));
        assert!(!session.is_started());
    }

    #[test]
    fn test_coordinator_binds_pending_ids_at_start() {
        let mut session = SessionBuilder::new(Role::Server, local_config()).build().unwrap();
        let player = session.spawn_local(EntityKind::Player, Transform::IDENTITY).unwrap();
        session
            .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(7))
            .unwrap();
        assert_eq!(session.world().entity(player).unwrap().id(), NetId::UNASSIGNED);

        session.start(&open_gate()).unwrap();
        assert_eq!(session.world().entity(player).unwrap().id(), NetId(8));

        let late = session.spawn_local(EntityKind::Player, Transform::IDENTITY).unwrap();
        assert_eq!(session.world().entity(late).unwrap().id(), NetId(9));

        assert!(matches!(session.start(&open_gate()), Err(NetError::AlreadyStarted)));
        session.shutdown();
        assert!(!session.is_started());
    }

    #[test]
    fn test_ownership_calls_need_client_role() {
        let session = SessionBuilder::new(Role::Host, local_config()).build().unwrap();
        assert!(matches!(
            session.request_ownership(NetId(1)),
            Err(NetError::WrongRole("request_ownership"))
        ));
        assert!(matches!(
            session.release_ownership(NetId(1)),
            Err(NetError::WrongRole("release_ownership"))
        ));
    }

    #[test]
    fn test_tick_publishes_snapshot() {
        let mut session = SessionBuilder::new(Role::Server, local_config()).build().unwrap();
        session
            .place(EntityKind::LevelObject, Transform::IDENTITY, NetId(2))
            .unwrap();

        let report = session.tick(0.016);
        assert_eq!(report.tick, 1);
        assert_eq!(session.snapshot().tick, 1);
        assert!(session.snapshot().find(NetId(2)).is_some());
    }

    #[test]
    fn test_host_links_to_itself() {
        let mut session = SessionBuilder::new(Role::Host, local_config()).build().unwrap();
        session.start(&open_gate()).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !matches!(session.link_state(), LinkState::Connected(_)) {
            assert!(std::time::Instant::now() < deadline, "host never connected");
            std::thread::sleep(Duration::from_millis(5));
        }
        let LinkState::Connected(addr) = session.link_state() else {
            unreachable!()
        };
        assert_eq!(Some(addr), session.gameplay_addr());

        drop(session);
    }
}
