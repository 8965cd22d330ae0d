use std::net::SocketAddr;

use thiserror::Error;

/// Target id that addresses every currently connected peer
pub const TARGET_BROADCAST: i32 = 0;

/// Unique id reserved for the hosting peer by convention
pub const SERVER_ID: u32 = 1;

/// Per-packet reliability and ordering, chosen by the sender
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum TransferMode {
    /// Fire and forget; may drop, may reorder
    Unreliable,
    /// May drop, but anything older than the newest delivered packet is
    /// discarded instead of being delivered late
    UnreliableOrdered,
    /// Resent until acknowledged, delivered in order
    Reliable,
}

/// Lifecycle of the local peer's attachment to the network
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection lifecycle notifications surfaced by a transport. Drained by
/// the protocol engine each poll, in the order they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A remote peer joined the session
    PeerConnected(u32),
    /// A remote peer left the session (graceful or timed out)
    PeerDisconnected(u32),
    /// This client finished its handshake with the hosting peer
    ConnectedToServer,
    /// This client's connection attempt was refused or timed out
    ConnectionFailed,
    /// The hosting peer went away; every peer is gone with it
    ServerDisconnected,
}

/// One received protocol packet, tagged with the sending peer and the
/// virtual channel it arrived on. Ownership of the buffer moves out of the
/// transport when the packet is taken; there is no way to hold a borrow of
/// transport-internal receive memory across a later receive call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingPacket {
    pub from: u32,
    pub channel: u8,
    pub payload: Vec<u8>,
}

/// Errors surfaced by transport send/introspection operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport has no live connection to send on
    #[error("Transport is not active")]
    NotActive,

    /// The target peer id does not name a connected peer
    #[error("Unknown peer {peer}")]
    UnknownPeer { peer: u32 },

    /// The selected transfer channel is outside the configured channel count
    #[error("Invalid transfer channel {channel} (configured channel count: {channel_count})")]
    InvalidChannel { channel: i32, channel_count: u8 },

    /// The payload cannot fit in one packet
    #[error("Packet of {size} byte(s) exceeds the maximum packet size ({max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The underlying socket reported an error
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Payload compression or decompression failed
    #[error("Compression error: {message}")]
    Compression { message: String },
}

/// Contract for a packet-oriented network peer.
///
/// This is the seam the protocol engine depends on; the UDP mesh transport
/// and the in-memory loopback used in tests are both substitutable behind
/// it. Implementations are single-threaded and poll-driven: nothing here
/// blocks, and all mutation happens on the thread driving `poll`.
pub trait NetworkPeer {
    /// Pump the underlying network machinery: receive datagrams, run
    /// retransmission timers, detect timeouts. Non-blocking.
    fn poll(&mut self);

    /// Pop the next connection lifecycle notification, oldest first
    fn next_event(&mut self) -> Option<PeerEvent>;

    /// Number of fully received packets queued at the time of the call
    fn available_packet_count(&self) -> usize;

    /// Pop the oldest queued packet, transferring ownership of its buffer
    /// to the caller. Returns `None` when the queue is empty.
    fn take_packet(&mut self) -> Option<IncomingPacket>;

    /// Send one packet to the currently configured target with the
    /// currently configured transfer mode
    fn put_packet(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Address the next `put_packet`: `0` broadcasts, a positive id sends to
    /// that peer, a negative id sends to everyone except `-target`
    fn set_target_peer(&mut self, target: i32);

    fn set_transfer_mode(&mut self, mode: TransferMode);

    fn transfer_mode(&self) -> TransferMode;

    fn connection_status(&self) -> ConnectionStatus;

    /// Non-zero unique id of the local peer; `1` is the hosting peer
    fn unique_id(&self) -> u32;

    fn is_server(&self) -> bool;

    fn set_refuse_new_connections(&mut self, refuse: bool);

    fn is_refusing_new_connections(&self) -> bool;

    /// Largest payload `put_packet` accepts
    fn max_packet_size(&self) -> usize;

    /// Remote address of a connected peer, where the transport has one
    fn peer_address(&self, peer: u32) -> Result<SocketAddr, TransportError>;
}
