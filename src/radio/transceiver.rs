use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{LinkConfig, NodeId, Result};
use crate::protocol::{classify_payload, Packet};
use super::mailbox::Mailbox;
use super::{ChannelActivity, Medium, RadioDriver};

/// A packet accepted by the receive path, with link metadata
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub packet: Packet,
    pub rssi_dbm: f32,
    pub snr_db: f32,
}

#[derive(Debug, Default)]
struct RxCounters {
    received: AtomicU64,
    malformed: AtomicU64,
    ignored: AtomicU64,
    blacklisted: AtomicU64,
    forward_candidates: AtomicU64,
    last_rssi_bits: AtomicU32,
    last_snr_bits: AtomicU32,
}

/// State shared between the receive callback and the main loop
#[derive(Debug)]
struct RxShared {
    node_id: NodeId,
    forward_relay_requests: bool,
    local: Mailbox<InboundPacket>,
    forward: Mailbox<InboundPacket>,
    counters: RxCounters,
}

/// Receive entry point handed to the radio driver at registration.
///
/// Cheap to clone and safe to call from the driver's interrupt or callback
/// thread while the main loop runs.
#[derive(Debug, Clone)]
pub struct RxHandle {
    shared: Arc<RxShared>,
}

impl RxHandle {
    fn new(config: &LinkConfig) -> Self {
        RxHandle {
            shared: Arc::new(RxShared {
                node_id: config.node_id,
                forward_relay_requests: config.forward_relay_requests,
                local: Mailbox::new(),
                forward: Mailbox::new(),
                counters: RxCounters::default(),
            }),
        }
    }

    /// Handles one raw packet delivered by the radio
    pub fn on_receive(&self, raw: &[u8], rssi_dbm: f32, snr_db: f32) {
        let shared = &self.shared;
        let counters = &shared.counters;
        counters.received.fetch_add(1, Ordering::Relaxed);
        counters.last_rssi_bits.store(rssi_dbm.to_bits(), Ordering::Relaxed);
        counters.last_snr_bits.store(snr_db.to_bits(), Ordering::Relaxed);

        let packet = match Packet::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                counters.malformed.fetch_add(1, Ordering::Relaxed);
                debug!("dropping malformed packet: {}", e);
                return;
            }
        };

        let inbound = InboundPacket {
            packet,
            rssi_dbm,
            snr_db,
        };

        if !inbound.packet.dest.addresses(shared.node_id) {
            if shared.forward_relay_requests && inbound.packet.relay_request {
                counters.forward_candidates.fetch_add(1, Ordering::Relaxed);
                shared.forward.offer(inbound);
            } else {
                counters.ignored.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        // Senders filter the blacklist too; this guards against misconfigured peers
        if classify_payload(&inbound.packet.payload).blacklisted {
            counters.blacklisted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        shared.local.offer(inbound);
    }
}

/// Snapshot of transceiver counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransceiverStats {
    pub transmitted: u64,
    pub tx_failures: u64,
    pub radio_resets: u64,
    pub received: u64,
    pub malformed: u64,
    pub ignored: u64,
    pub blacklisted: u64,
    pub forward_candidates: u64,
    pub mailbox_overruns: u64,
    pub last_rssi_dbm: f32,
    pub last_snr_db: f32,
}

/// Byte-level packet framing and address filtering over one radio
pub struct PacketTransceiver<R: RadioDriver> {
    radio: R,
    node_id: NodeId,
    rx: RxHandle,
    transmitted: u64,
    tx_failures: u64,
    radio_resets: u64,
}

impl<R: RadioDriver> PacketTransceiver<R> {
    /// Takes ownership of the radio, registers the receive handler and starts listening
    pub fn new(mut radio: R, config: &LinkConfig) -> Result<Self> {
        let rx = RxHandle::new(config);
        radio.set_receive_handler(rx.clone());
        radio.start_receive()?;

        Ok(PacketTransceiver {
            radio,
            node_id: config.node_id,
            rx,
            transmitted: 0,
            tx_failures: 0,
            radio_resets: 0,
        })
    }

    /// This node's address
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Handle through which the driver delivers received packets
    pub fn rx_handle(&self) -> RxHandle {
        self.rx.clone()
    }

    /// Builds and transmits a packet from this node
    pub fn send_packet(&mut self, dest: NodeId, payload: Bytes, relay_request: bool) -> bool {
        match Packet::new(self.node_id, dest, payload) {
            Ok(packet) => self.transmit(&packet.with_relay_request(relay_request).to_bytes()),
            Err(e) => {
                debug!("refusing to transmit: {}", e);
                false
            }
        }
    }

    /// Transmits raw packet bytes, then returns to receive mode whatever the outcome
    pub fn transmit(&mut self, frame: &[u8]) -> bool {
        let sent = match self.radio.transmit(frame) {
            Ok(()) => {
                self.transmitted += 1;
                true
            }
            Err(e) => {
                self.tx_failures += 1;
                debug!("radio transmit failed: {}", e);
                false
            }
        };

        if let Err(e) = self.radio.start_receive() {
            warn!("failed to re-enter receive mode: {}", e);
        }
        sent
    }

    /// Takes the packet addressed to this node, if one is waiting
    pub fn take_inbound(&self) -> Option<InboundPacket> {
        self.rx.shared.local.take()
    }

    /// Takes the packet awaiting forwarding, if one is waiting
    pub fn take_forward(&self) -> Option<InboundPacket> {
        self.rx.shared.forward.take()
    }

    /// Borrows the underlying driver
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Returns a snapshot of the counters
    pub fn stats(&self) -> TransceiverStats {
        let shared = &self.rx.shared;
        let counters = &shared.counters;
        TransceiverStats {
            transmitted: self.transmitted,
            tx_failures: self.tx_failures,
            radio_resets: self.radio_resets,
            received: counters.received.load(Ordering::Relaxed),
            malformed: counters.malformed.load(Ordering::Relaxed),
            ignored: counters.ignored.load(Ordering::Relaxed),
            blacklisted: counters.blacklisted.load(Ordering::Relaxed),
            forward_candidates: counters.forward_candidates.load(Ordering::Relaxed),
            mailbox_overruns: shared.local.overruns() + shared.forward.overruns(),
            last_rssi_dbm: f32::from_bits(counters.last_rssi_bits.load(Ordering::Relaxed)),
            last_snr_db: f32::from_bits(counters.last_snr_bits.load(Ordering::Relaxed)),
        }
    }
}

impl<R: RadioDriver> Medium for PacketTransceiver<R> {
    fn scan_channel(&mut self) -> ChannelActivity {
        // Activity detection needs the radio out of receive mode
        if let Err(e) = self.radio.standby() {
            debug!("standby before channel scan failed: {}", e);
            return ChannelActivity::Error;
        }
        let activity = self.radio.scan_channel_activity();
        if let Err(e) = self.radio.start_receive() {
            warn!("failed to re-enter receive mode after scan: {}", e);
        }
        activity
    }

    fn channel_rssi(&mut self) -> f32 {
        self.radio.rssi_dbm()
    }

    fn transmit_frame(&mut self, frame: &[u8]) -> bool {
        self.transmit(frame)
    }

    fn reset_radio(&mut self) -> bool {
        self.radio_resets += 1;
        let result = self.radio.reset().and_then(|_| self.radio.start_receive());
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("radio reset failed: {}", e);
                false
            }
        }
    }
}
