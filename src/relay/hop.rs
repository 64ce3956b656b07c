use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::core::{Error, LinkConfig, NodeId, Result};
use crate::link::narrowband::copy_truncated;
use crate::protocol::Packet;
use crate::radio::{AccessStats, ChannelAccessController, PacketTransceiver, RadioDriver, TransceiverStats};
use super::bridge::RelayBridge;
use super::codec::BridgeStats;
use super::frame::RelayFrame;
use super::retry::{RadioRetry, RetryStats};
use super::uart::Uart;
use super::watchdog::{WatchdogHealth, WatchdogSet};

/// Counters of one relay hop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopStats {
    /// Radio packets framed onto the bridge
    pub forwarded_to_peer: u64,
    /// Bridge frames put on the air
    pub forwarded_to_radio: u64,
    /// Bridge frames the radio never accepted
    pub radio_drops: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_received: u64,
    pub bridge: BridgeStats,
    pub retry: RetryStats,
    pub access: AccessStats,
    pub transceiver: TransceiverStats,
    pub health: WatchdogHealth,
}

/// One radio of a two-hop relay, joined to its peer hop by a UART.
///
/// Radio packets flagged for relay and addressed elsewhere cross the bridge;
/// frames from the bridge go out on this hop's frequency with the flag
/// cleared, so the far side does not relay them again.
pub struct RelayHop<R: RadioDriver, U: Uart> {
    node_id: NodeId,
    peer: NodeId,
    transceiver: PacketTransceiver<R>,
    bridge: RelayBridge<U>,
    access: ChannelAccessController,
    retry: RadioRetry,
    watchdogs: WatchdogSet,
    heartbeat_interval: std::time::Duration,
    last_heartbeat: Option<Instant>,
    seen_received: u64,
    forwarded_to_peer: u64,
    forwarded_to_radio: u64,
    radio_drops: u64,
    heartbeats_sent: u64,
    heartbeats_received: u64,
}

impl<R: RadioDriver, U: Uart> RelayHop<R, U> {
    /// Builds a hop forwarding between `radio` and the peer behind `uart`
    pub fn new(radio: R, uart: U, config: &LinkConfig, peer: NodeId) -> Result<Self> {
        Self::with_access(radio, uart, config, peer, ChannelAccessController::new(config.access.clone()))
    }

    /// Like [`RelayHop::new`] with a fixed backoff seed
    pub fn with_seed(radio: R, uart: U, config: &LinkConfig, peer: NodeId, seed: u64) -> Result<Self> {
        let access = ChannelAccessController::with_seed(config.access.clone(), seed);
        Self::with_access(radio, uart, config, peer, access)
    }

    fn with_access(
        radio: R,
        uart: U,
        config: &LinkConfig,
        peer: NodeId,
        access: ChannelAccessController,
    ) -> Result<Self> {
        config.validate()?;
        if !config.forward_relay_requests {
            return Err(Error::config("relay hop needs forward_relay_requests enabled"));
        }
        if peer == config.node_id || peer.is_broadcast() {
            return Err(Error::config(format!("invalid peer hop {}", peer)));
        }

        let now = Instant::now();
        info!("relay hop {} bridging to peer {}", config.node_id, peer);

        Ok(RelayHop {
            node_id: config.node_id,
            peer,
            transceiver: PacketTransceiver::new(radio, config)?,
            bridge: RelayBridge::new(uart, config.relay.inactivity_timeout),
            access,
            retry: RadioRetry::new(config.relay.clone(), config.access.max_backoff),
            watchdogs: WatchdogSet::new(&config.watchdog, now),
            heartbeat_interval: config.relay.heartbeat_interval,
            last_heartbeat: None,
            seen_received: 0,
            forwarded_to_peer: 0,
            forwarded_to_radio: 0,
            radio_drops: 0,
            heartbeats_sent: 0,
            heartbeats_received: 0,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn peer(&self) -> NodeId {
        self.peer
    }

    /// Runs one forwarding pass in both directions.
    ///
    /// Returns the number of packets and frames forwarded.
    pub async fn process(&mut self) -> usize {
        let mut forwarded = 0;
        let now = Instant::now();

        let received = self.transceiver.stats().received;
        if received != self.seen_received {
            self.seen_received = received;
            self.watchdogs.link.feed(now);
        }

        if let Some(inbound) = self.transceiver.take_forward() {
            let packet = inbound.packet;
            let dest = packet.dest;
            match RelayFrame::new(packet.src, dest, packet.payload) {
                Ok(frame) => {
                    if self.bridge.send(frame) {
                        self.forwarded_to_peer += 1;
                        self.watchdogs.relay.feed(now);
                        forwarded += 1;
                    } else {
                        debug!("bridge rejected packet for {}", dest);
                    }
                }
                Err(e) => debug!("packet not framed for bridge: {}", e),
            }
        }

        while let Some(frame) = self.bridge.poll() {
            self.watchdogs.peer.feed(Instant::now());
            if frame.is_heartbeat(self.peer, self.node_id) {
                self.heartbeats_received += 1;
                continue;
            }

            if self.transmit_frame(frame).await {
                forwarded += 1;
            }
        }

        self.send_heartbeat_if_due(Instant::now());
        self.watchdogs.check_all(Instant::now());
        forwarded
    }

    async fn transmit_frame(&mut self, frame: RelayFrame) -> bool {
        let packet = Packet {
            relay_request: false,
            src: frame.src,
            dest: frame.dest,
            payload: frame.payload,
        };

        let bytes = packet.to_bytes();
        if self.retry.transmit_with_retry(&mut self.access, &mut self.transceiver, &bytes).await {
            self.forwarded_to_radio += 1;
            self.watchdogs.relay.feed(Instant::now());
            true
        } else {
            self.radio_drops += 1;
            debug!("dropping bridged packet for {} after retries", packet.dest);
            false
        }
    }

    fn send_heartbeat_if_due(&mut self, now: Instant) {
        let due = match self.last_heartbeat {
            Some(last) => now.saturating_duration_since(last) >= self.heartbeat_interval,
            None => true,
        };
        if due && self.bridge.send(RelayFrame::heartbeat(self.node_id, self.peer)) {
            self.last_heartbeat = Some(now);
            self.heartbeats_sent += 1;
        }
    }

    /// Copies a packet addressed to this hop into `buf`, returning its length
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        match self.transceiver.take_inbound() {
            Some(inbound) => copy_truncated(&inbound.packet.payload, buf),
            None => 0,
        }
    }

    /// Transmits a locally originated payload on this hop's radio
    pub async fn send_local(&mut self, dest: NodeId, payload: Bytes) -> bool {
        match Packet::new(self.node_id, dest, payload) {
            Ok(packet) => {
                let frame = packet.to_bytes();
                self.retry.transmit_with_retry(&mut self.access, &mut self.transceiver, &frame).await
            }
            Err(e) => {
                debug!("refusing local send: {}", e);
                false
            }
        }
    }

    pub fn health(&self) -> WatchdogHealth {
        self.watchdogs.health()
    }

    pub fn bridge(&self) -> &RelayBridge<U> {
        &self.bridge
    }

    pub fn stats(&self) -> HopStats {
        HopStats {
            forwarded_to_peer: self.forwarded_to_peer,
            forwarded_to_radio: self.forwarded_to_radio,
            radio_drops: self.radio_drops,
            heartbeats_sent: self.heartbeats_sent,
            heartbeats_received: self.heartbeats_received,
            bridge: self.bridge.stats(),
            retry: self.retry.stats(),
            access: self.access.stats(),
            transceiver: self.transceiver.stats(),
            health: self.watchdogs.health(),
        }
    }
}
