//! Packet dispatch over the cluster bus.
//!
//! The orchestrator enqueues packets without blocking; an I/O pump on
//! the receiving side decodes and routes them to mapped objects.
//! Packets for disconnected peers are dropped and counted, packets
//! for unmapped objects are logged and dropped.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use reef_bus::{Bus, BusError, BusMessage};

use crate::object::LocalNode;
use crate::protocol::{decode_packet, encode_packet, AddressedPacket, Packet};

pub struct PacketDispatcher {
    bus: Arc<dyn Bus>,
    dropped: u64,
}

impl PacketDispatcher {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus, dropped: 0 }
    }

    /// Send one packet to the peer hosting its destination object.
    /// Returns false when the packet was dropped.
    pub fn dispatch(&mut self, packet: &AddressedPacket) -> bool {
        let payload = encode_packet(&packet.packet);
        match self.bus.send(packet.peer, payload) {
            Ok(()) => true,
            Err(BusError::Disconnected(peer)) => {
                self.dropped += 1;
                warn!(
                    target = "transport::dispatch",
                    %peer,
                    task = packet.packet.body.label(),
                    "dropping packet for disconnected peer"
                );
                false
            }
            Err(err) => {
                self.dropped += 1;
                warn!(
                    target = "transport::dispatch",
                    error = %err,
                    task = packet.packet.body.label(),
                    "dropping packet"
                );
                false
            }
        }
    }

    /// Dispatch a frame's packets in emission order; per-peer order
    /// is preserved by the bus. Returns the number delivered.
    pub fn dispatch_all(&mut self, packets: &[AddressedPacket]) -> usize {
        packets
            .iter()
            .filter(|packet| self.dispatch(packet))
            .count()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Receiving-side pump: decodes bus messages and forwards packets for
/// objects mapped on this node. Runs on the bus I/O task; consumers
/// drain the returned channel from their render thread.
pub fn spawn_receiver(
    mut rx: UnboundedReceiver<BusMessage>,
    registry: Arc<RwLock<LocalNode>>,
) -> (JoinHandle<()>, crossbeam_channel::Receiver<Packet>) {
    let (tx, packets) = crossbeam_channel::unbounded();
    let handle = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let packet = match decode_packet(&message.payload) {
                Ok(packet) => packet,
                Err(err) => {
                    warn!(
                        target = "transport::receiver",
                        error = %err,
                        "discarding undecodable packet"
                    );
                    continue;
                }
            };
            if registry.read().object_at(packet.object).is_err() {
                warn!(
                    target = "transport::receiver",
                    object = %packet.object,
                    task = packet.body.label(),
                    "packet for unmapped object, dropping"
                );
                continue;
            }
            debug!(
                target = "transport::receiver",
                object = %packet.object,
                task = packet.body.label(),
                frame = packet.frame_number,
                "packet received"
            );
            if tx.send(packet).is_err() {
                break;
            }
        }
    });
    (handle, packets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Role, RouteId};
    use crate::protocol::TaskPacket;
    use reef_bus::{LocalBus, PeerId};
    use uuid::Uuid;

    fn finish_packet(object: RouteId, peer: PeerId) -> AddressedPacket {
        AddressedPacket {
            peer,
            packet: Packet {
                object,
                frame_number: 1,
                frame_id: 9,
                body: TaskPacket::NodeFrameDrawFinish,
            },
        }
    }

    #[tokio::test]
    async fn round_trip_through_bus_and_receiver() {
        let bus = Arc::new(LocalBus::new());
        let peer = PeerId(1);
        let rx = bus.subscribe(peer).expect("subscribe");

        let mut registry = LocalNode::new();
        let object = Uuid::new_v4();
        let route = registry.attach(object, Role::Slave).expect("attach");
        let registry = Arc::new(RwLock::new(registry));

        let (handle, packets) = spawn_receiver(rx, registry);
        let mut dispatcher = PacketDispatcher::new(bus.clone());
        assert!(dispatcher.dispatch(&finish_packet(route, peer)));

        let received = tokio::task::spawn_blocking(move || {
            packets
                .recv_timeout(std::time::Duration::from_secs(1))
                .expect("packet")
        })
        .await
        .expect("join");
        assert_eq!(received.object, route);
        assert_eq!(received.body, TaskPacket::NodeFrameDrawFinish);
        handle.abort();
    }

    #[tokio::test]
    async fn unmapped_packets_are_dropped() {
        let bus = Arc::new(LocalBus::new());
        let peer = PeerId(1);
        let rx = bus.subscribe(peer).expect("subscribe");
        let registry = Arc::new(RwLock::new(LocalNode::new()));
        let (handle, packets) = spawn_receiver(rx, registry);

        let mut dispatcher = PacketDispatcher::new(bus.clone());
        assert!(dispatcher.dispatch(&finish_packet(RouteId(99), peer)));

        let outcome = tokio::task::spawn_blocking(move || {
            packets.recv_timeout(std::time::Duration::from_millis(200))
        })
        .await
        .expect("join");
        assert!(outcome.is_err());
        handle.abort();
    }

    #[test]
    fn disconnected_peer_counts_drops() {
        let bus = Arc::new(LocalBus::new());
        let peer = PeerId(4);
        bus.disconnect(peer);

        let mut dispatcher = PacketDispatcher::new(bus);
        assert!(!dispatcher.dispatch(&finish_packet(RouteId(1), peer)));
        assert_eq!(dispatcher.dropped(), 1);
    }
}
