//! Coordinator loop: receive, route, relay.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::{LoopShared, Outbound, PeerSet, MAX_DRAIN_PER_TICK};
use crate::dispatcher::DispatchHandle;
use crate::error::NetError;
use crate::protocol::serialization::decode;
use crate::protocol::{Command, Packet, PacketSerializer, TransformRecord};
use crate::transport::UdpTransport;
use crate::world::{Endpoint, MergeMode, World};

/// Runs on its own thread for the Server and Host roles.
pub(crate) struct ServerLoop {
    transport: UdpTransport,
    peers: Arc<PeerSet>,
    outbox_tx: Sender<Outbound>,
    outbox_rx: Receiver<Outbound>,
    shared: LoopShared,
    serializer: PacketSerializer,
    records: Vec<TransformRecord>,
}

impl ServerLoop {
    pub(crate) fn new(
        transport: UdpTransport,
        peers: Arc<PeerSet>,
        outbox: (Sender<Outbound>, Receiver<Outbound>),
        shared: LoopShared,
    ) -> Self {
        let serializer = PacketSerializer::new(shared.max_datagram);
        Self {
            transport,
            peers,
            outbox_tx: outbox.0,
            outbox_rx: outbox.1,
            shared,
            serializer,
            records: Vec::new(),
        }
    }

    pub(crate) fn run(mut self) {
        info!(addr = %self.transport.local_addr(), "coordinator loop running");

        while !self.shared.cancel.load(Ordering::Relaxed) {
            self.receive();
            self.flush_outbox();
            self.send_state();
            std::thread::sleep(self.shared.tick_interval);
        }

        info!("coordinator loop stopped");
    }

    /// Waits up to the poll timeout for traffic, then drains what is queued.
    fn receive(&mut self) {
        for drained in 0..MAX_DRAIN_PER_TICK {
            let received = if drained == 0 {
                self.transport.recv()
            } else {
                self.transport.try_recv()
            };

            let (packet, from) = match received {
                Ok(Some((data, from))) => (decode(data), Endpoint::new(from)),
                Ok(None) => return,
                Err(error) => {
                    warn!(%error, "coordinator receive failed");
                    return;
                }
            };

            if self.peers.insert(from) {
                info!(peer = %from, "new peer");
            }

            match packet {
                Ok(packet) => route(packet, from, &self.shared.dispatch, &self.outbox_tx),
                Err(error) => {
                    self.shared.stats.record_decode_error();
                    warn!(peer = %from, %error, "discarding datagram");
                }
            }
        }
    }

    fn flush_outbox(&mut self) {
        while let Ok(outbound) = self.outbox_rx.try_recv() {
            match outbound {
                Outbound::Send { to, command } => self.send_command(command, &[to]),
                Outbound::Broadcast(command) => {
                    let peers = self.peers.snapshot();
                    self.send_command(command, &peers);
                }
            }
        }
    }

    fn send_command(&mut self, command: Command, recipients: &[Endpoint]) {
        if !self.serializer.serialize_command(command) {
            return;
        }
        for peer in recipients {
            match self.transport.send_to(self.serializer.as_slice(), peer.addr()) {
                Ok(_) => debug!(%peer, %command, "sent"),
                Err(error) => warn!(%peer, %command, %error, "command send failed"),
            }
        }
    }

    /// Sends every bound entity to every peer.
    fn send_state(&mut self) {
        let peers = self.peers.snapshot();
        if peers.is_empty() {
            return;
        }

        self.shared.snapshot.load().fill_records(&mut self.records, false);
        if !self.serializer.serialize_batch(&self.records) {
            self.shared.stats.record_oversize();
            warn!(records = self.records.len(), "state batch exceeds datagram limit, dropped");
            return;
        }

        for peer in peers {
            if let Err(error) = self.transport.send_to(self.serializer.as_slice(), peer.addr()) {
                warn!(%peer, %error, "batch send failed");
            }
        }
    }
}

/// Turns a datagram received by the coordinator into dispatched work.
pub(crate) fn route(
    packet: Packet,
    from: Endpoint,
    dispatch: &DispatchHandle<World>,
    outbox: &Sender<Outbound>,
) {
    match packet {
        Packet::Batch(records) => {
            dispatch.enqueue(move |world: &mut World| {
                world.merge_batch(&records, from, MergeMode::Coordinator);
                Ok(())
            });
        }
        Packet::Command(Command::RequestId) => {
            let outbox = outbox.clone();
            dispatch.enqueue(move |world: &mut World| {
                let id = world.allocate_id()?;
                info!(peer = %from, %id, "assigned id");
                reply(&outbox, Outbound::Send {
                    to: from,
                    command: Command::AssignId(id),
                });
                Ok(())
            });
        }
        Packet::Command(Command::RequestOwnership(id)) => {
            let outbox = outbox.clone();
            dispatch.enqueue(move |world: &mut World| {
                world.table_mut().grant(id, from)?;
                info!(peer = %from, %id, "ownership granted");
                reply(&outbox, Outbound::Send {
                    to: from,
                    command: Command::OwnershipGranted(id),
                });
                Ok(())
            });
        }
        Packet::Command(Command::ReleaseOwnership(id)) => {
            let outbox = outbox.clone();
            dispatch.enqueue(move |world: &mut World| {
                world.table_mut().revoke(id, from)?;
                info!(peer = %from, %id, "ownership released");
                reply(&outbox, Outbound::Broadcast(Command::OwnershipReleased(id)));
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

fn reply(outbox: &Sender<Outbound>, outbound: Outbound) {
    if outbox.send(outbound).is_err() {
        debug!("coordinator loop gone, reply dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Dispatcher;
    use crate::protocol::TransformRecord;
    use crate::world::{EntityKind, NetId, NullFactory, OwnershipState};
    use crossbeam_channel::unbounded;
    use tessera_shared::Transform;

    struct Harness {
        world: World,
        dispatcher: Dispatcher<World>,
        outbox_tx: Sender<Outbound>,
        outbox_rx: Receiver<Outbound>,
    }

    impl Harness {
        fn new() -> Self {
            let mut world = World::new(Box::new(NullFactory), 10.0);
            world
                .insert_native(EntityKind::LevelObject, Transform::IDENTITY, NetId(5))
                .unwrap();
            let (outbox_tx, outbox_rx) = unbounded();
            Self {
                world,
                dispatcher: Dispatcher::new(),
                outbox_tx,
                outbox_rx,
            }
        }

        fn deliver(&mut self, command: Command, from: Endpoint) -> Vec<Outbound> {
            route(Packet::Command(command), from, &self.dispatcher.handle(), &self.outbox_tx);
            self.dispatcher.drain(&mut self.world);
            self.outbox_rx.try_iter().collect()
        }
    }

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::new(([127, 0, 0, 1], port).into())
    }

    #[test]
    fn test_request_id_replies_to_sender() {
        let mut harness = Harness::new();
        harness.world.seed_ids();
        let peer = endpoint(3000);

        let replies = harness.deliver(Command::RequestId, peer);
        assert_eq!(
            replies,
            vec![Outbound::Send {
                to: peer,
                command: Command::AssignId(NetId(6)),
            }]
        );
    }

    #[test]
    fn test_ownership_lifecycle() {
        let mut harness = Harness::new();
        let (owner, other) = (endpoint(3000), endpoint(3001));

        let replies = harness.deliver(Command::RequestOwnership(NetId(5)), owner);
        assert_eq!(
            replies,
            vec![Outbound::Send {
                to: owner,
                command: Command::OwnershipGranted(NetId(5)),
            }]
        );

        // Competing request: refused, no reply.
        assert!(harness.deliver(Command::RequestOwnership(NetId(5)), other).is_empty());

        // Release from a non-owner: refused, state unchanged.
        assert!(harness.deliver(Command::ReleaseOwnership(NetId(5)), other).is_empty());
        assert_eq!(
            harness.world.table().ownership(NetId(5)),
            Some(OwnershipState::Remote(owner))
        );

        // Release from the owner: broadcast to everyone.
        let replies = harness.deliver(Command::ReleaseOwnership(NetId(5)), owner);
        assert_eq!(replies, vec![Outbound::Broadcast(Command::OwnershipReleased(NetId(5)))]);
        assert_eq!(harness.world.table().ownership(NetId(5)), Some(OwnershipState::Local));
    }

    #[test]
    fn test_request_for_missing_entity_is_silent() {
        let mut harness = Harness::new();
        assert!(harness.deliver(Command::RequestOwnership(NetId(99)), endpoint(1)).is_empty());
        assert_eq!(harness.dispatcher.total_failed(), 1);
    }

    #[test]
    fn test_coordinator_only_commands_ignored() {
        let mut harness = Harness::new();
        assert!(harness.deliver(Command::AssignId(NetId(1)), endpoint(1)).is_empty());
        assert!(harness.deliver(Command::OwnershipGranted(NetId(5)), endpoint(1)).is_empty());
        assert_eq!(harness.dispatcher.total_enqueued(), 0);
    }

    #[test]
    fn test_owned_entity_accepts_owner_batches() {
        let mut harness = Harness::new();
        let owner = endpoint(3000);
        harness.deliver(Command::RequestOwnership(NetId(5)), owner);

        let moved = Transform::at(tessera_shared::Vec3::new(1.0, 2.0, 3.0));
        route(
            Packet::Batch(vec![TransformRecord::new(NetId(5), moved)]),
            owner,
            &harness.dispatcher.handle(),
            &harness.outbox_tx,
        );
        harness.dispatcher.drain(&mut harness.world);

        assert_eq!(harness.world.table().find(NetId(5)).unwrap().transform(), moved);
    }
}
