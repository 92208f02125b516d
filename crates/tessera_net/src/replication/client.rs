//! Participant loop: send local state and commands, merge what comes back.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{LoopShared, MAX_DRAIN_PER_TICK};
use crate::discovery;
use crate::dispatcher::DispatchHandle;
use crate::error::NetError;
use crate::protocol::serialization::decode;
use crate::protocol::{Command, Packet, PacketSerializer, TransformRecord};
use crate::session::LinkState;
use crate::transport::UdpTransport;
use crate::world::{Endpoint, MergeMode, World};

/// Where the participant sends its traffic.
#[derive(Clone, Debug)]
pub(crate) enum ServerTarget {
    /// Configured or implied address.
    Known(SocketAddr),
    /// Find the coordinator by broadcast first.
    Discover {
        bind_ip: IpAddr,
        probe_target: SocketAddr,
        gameplay_port: u16,
        timeout: Duration,
        poll: Duration,
    },
}

/// Runs on its own thread for the Client and Host roles.
pub(crate) struct ClientLoop {
    transport: UdpTransport,
    target: ServerTarget,
    control: Receiver<Command>,
    link: Arc<Mutex<LinkState>>,
    shared: LoopShared,
    serializer: PacketSerializer,
    records: Vec<TransformRecord>,
}

impl ClientLoop {
    pub(crate) fn new(
        transport: UdpTransport,
        target: ServerTarget,
        control: Receiver<Command>,
        link: Arc<Mutex<LinkState>>,
        shared: LoopShared,
    ) -> Self {
        let serializer = PacketSerializer::new(shared.max_datagram);
        Self {
            transport,
            target,
            control,
            link,
            shared,
            serializer,
            records: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) {
        let Some(server) = self.resolve() else {
            *self.link.lock() = LinkState::Unreachable;
            error!("no coordinator available, participant loop exiting");
            return;
        };
        *self.link.lock() = LinkState::Connected(server);
        info!(%server, local = %self.transport.local_addr(), "participant loop running");

        while !self.shared.cancel.load(Ordering::Relaxed) {
            self.send_state(server);
            self.send_commands(server);
            self.receive(server);
            std::thread::sleep(self.shared.tick_interval);
        }

        info!("participant loop stopped");
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match &self.target {
            ServerTarget::Known(addr) => Some(*addr),
            ServerTarget::Discover {
                bind_ip,
                probe_target,
                gameplay_port,
                timeout,
                poll,
            } => {
                *self.link.lock() = LinkState::Discovering;
                match discovery::locate(*bind_ip, *probe_target, *timeout, *poll, &self.shared.cancel) {
                    Ok(found) => found.map(|ip| SocketAddr::new(ip, *gameplay_port)),
                    Err(error) => {
                        error!(%error, "discovery failed");
                        None
                    }
                }
            }
        }
    }

    /// Sends locally driven entities. An empty batch still goes out so the
    /// coordinator learns this endpoint.
    fn send_state(&mut self, server: SocketAddr) {
        self.shared.snapshot.load().fill_records(&mut self.records, true);
        if !self.serializer.serialize_batch(&self.records) {
            self.shared.stats.record_oversize();
            warn!(records = self.records.len(), "local batch exceeds datagram limit, dropped");
            return;
        }
        if let Err(error) = self.transport.send_to(self.serializer.as_slice(), server) {
            warn!(%error, "batch send failed");
        }
    }

    fn send_commands(&mut self, server: SocketAddr) {
        while let Ok(command) = self.control.try_recv() {
            if !self.serializer.serialize_command(command) {
                continue;
            }
            match self.transport.send_to(self.serializer.as_slice(), server) {
                Ok(_) => info!(%command, "sent"),
                Err(error) => warn!(%command, %error, "command send failed"),
            }
        }
    }

    /// Drains pending datagrams. Only the coordinator at `server` is heard.
    fn receive(&mut self, server: SocketAddr) {
        for drained in 0..MAX_DRAIN_PER_TICK {
            let received = if drained == 0 {
                self.transport.recv()
            } else {
                self.transport.try_recv()
            };

            let (packet, from) = match received {
                Ok(Some((_, from))) if from != server => {
                    self.shared.stats.record_foreign();
                    warn!(%from, %server, "dropping datagram from unknown sender");
                    continue;
                }
                Ok(Some((data, from))) => (decode(data), Endpoint::new(from)),
                Ok(None) => return,
                Err(error) => {
                    // ConnectionReset lands here when the coordinator is down.
                    warn!(%error, "participant receive failed");
                    return;
                }
            };

            match packet {
                Ok(packet) => route(packet, from, &self.shared.dispatch),
                Err(error) => {
                    self.shared.stats.record_decode_error();
                    warn!(%from, %error, "discarding datagram");
                }
            }
        }
    }
}

/// Turns a datagram from the coordinator into dispatched work.
pub(crate) fn route(packet: Packet, from: Endpoint, dispatch: &DispatchHandle<World>) {
    match packet {
        Packet::Batch(records) => {
            dispatch.enqueue(move |world: &mut World| {
                world.merge_batch(&records, from, MergeMode::Participant);
                Ok(())
            });
        }
        Packet::Command(Command::AssignId(id)) => {
            dispatch.enqueue(move |world: &mut World| world.accept_assigned(id).map(|_| ()));
        }
        Packet::Command(Command::OwnershipGranted(id)) => {
            dispatch.enqueue(move |world: &mut World| {
                world.table_mut().apply_granted(id)?;
                info!(%id, "ownership granted");
                Ok(())
            });
        }
        Packet::Command(Command::OwnershipReleased(id)) => {
            dispatch.enqueue(move |world: &mut World| {
                world.table_mut().apply_released(id)?;
                debug!(%id, "ownership released");
                Ok(())
            });
        }
        Packet::Command(command) => {
            let error = NetError::UnexpectedCommand {
                command: command.to_string(),
                sender: from,
            };
            warn!(%error, "ignoring command");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::replication::SnapshotCell;
    use crate::transport::TransportStats;
    use std::sync::atomic::AtomicBool;
    use crate::world::{EntityKind, NetId, NullFactory, OwnershipState};
    use tessera_shared::{Transform, Vec3};

    fn coordinator() -> Endpoint {
        Endpoint::new(([127, 0, 0, 1], 9050).into())
    }

    fn deliver(world: &mut World, dispatcher: &Dispatcher<World>, packet: Packet) {
        route(packet, coordinator(), &dispatcher.handle());
        dispatcher.drain(world);
    }

    #[test]
    fn test_assign_id_binds_pending_player() {
        let mut world = World::new(Box::new(NullFactory), 10.0);
        let dispatcher = Dispatcher::new();
        let player = world
            .insert_native(EntityKind::Player, Transform::IDENTITY, NetId::UNASSIGNED)
            .unwrap();

        deliver(&mut world, &dispatcher, Packet::Command(Command::AssignId(NetId(3))));
        assert_eq!(world.entity(player).unwrap().id(), NetId(3));
    }

    #[test]
    fn test_grant_and_release_flip_authority() {
        let mut world = World::new(Box::new(NullFactory), 10.0);
        let dispatcher = Dispatcher::new();
        world
            .insert_passive(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
            .unwrap();

        deliver(&mut world, &dispatcher, Packet::Command(Command::OwnershipGranted(NetId(5))));
        assert_eq!(world.table().ownership(NetId(5)), Some(OwnershipState::Local));

        // Incoming relay of our own entity must not overwrite it.
        let relayed = TransformRecord::new(NetId(5), Transform::at(Vec3::new(9.0, 9.0, 9.0)));
        deliver(&mut world, &dispatcher, Packet::Batch(vec![relayed]));
        assert_eq!(world.table().find(NetId(5)).unwrap().transform(), Transform::IDENTITY);

        deliver(&mut world, &dispatcher, Packet::Command(Command::OwnershipReleased(NetId(5))));
        assert_eq!(world.table().ownership(NetId(5)), Some(OwnershipState::Unowned));
    }

    fn bind_local() -> UdpTransport {
        UdpTransport::bind(
            "127.0.0.1:0".parse().unwrap(),
            Duration::from_millis(200),
            Arc::new(TransportStats::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_grant_from_stranger_is_dropped() {
        let coordinator = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let stranger = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let cancel = Arc::new(AtomicBool::new(false));
        let dispatcher = Dispatcher::<World>::new();
        let stats = Arc::new(TransportStats::default());
        let shared = LoopShared {
            cancel: Arc::clone(&cancel),
            snapshot: Arc::new(SnapshotCell::new()),
            dispatch: dispatcher.handle(),
            stats: Arc::clone(&stats),
            tick_interval: Duration::from_millis(5),
            max_datagram: 65_507,
        };
        let transport = bind_local();
        let local = transport.local_addr();
        let server = coordinator.local_addr().unwrap();
        let (_control_tx, control_rx) = crossbeam_channel::unbounded();
        let mut client = ClientLoop::new(
            transport,
            ServerTarget::Known(server),
            control_rx,
            Arc::new(Mutex::new(LinkState::Idle)),
            shared,
        );

        let mut world = World::new(Box::new(NullFactory), 10.0);
        world
            .insert_passive(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
            .unwrap();

        let grant = crate::protocol::serialization::encode_command(Command::OwnershipGranted(NetId(5)));
        stranger.send_to(&grant, local).unwrap();
        client.receive(server);
        dispatcher.drain(&mut world);
        assert_eq!(world.table().ownership(NetId(5)), Some(OwnershipState::Unowned));
        assert_eq!(stats.snapshot().foreign_packets, 1);

        coordinator.send_to(&grant, local).unwrap();
        client.receive(server);
        dispatcher.drain(&mut world);
        assert_eq!(world.table().ownership(NetId(5)), Some(OwnershipState::Local));
    }

    #[test]
    fn test_participant_ignores_requests() {
        let dispatcher = Dispatcher::<World>::new();
        route(Packet::Command(Command::RequestId), coordinator(), &dispatcher.handle());
        assert_eq!(dispatcher.pending(), 0);
    }
}
