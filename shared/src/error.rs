use thiserror::Error;

use crate::node::{NodePath, ObjectError};
use crate::rpc_mode::RpcMode;
use crate::transport::TransportError;
use crate::wire::WireError;

/// Configuration errors reported synchronously to the caller of the
/// triggering operation. None of these corrupt engine state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// No network peer has been attached to the engine
    #[error("No active network peer is set")]
    NoActivePeer,

    /// The target peer id is the local peer itself
    #[error("Cannot target the local peer (id {peer})")]
    TargetIsSelf { peer: u32 },

    /// The node handle passed to an outbound operation no longer resolves
    #[error("Node handle {handle} does not resolve to a live object")]
    UnknownNode { handle: u64 },

    /// Raw sends must carry at least one byte of payload
    #[error("Cannot send an empty packet")]
    EmptyPacket,

    /// The transport refused or failed the operation
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Protocol errors raised while decoding one inbound packet. These are
/// non-fatal: the offending packet is dropped and processing continues with
/// the next queued packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    /// The packet had no command byte at all
    #[error("Packet is empty")]
    Empty,

    /// The command discriminant is not part of the protocol
    #[error("Unknown command byte {byte:#04x}")]
    UnknownCommand { byte: u8 },

    /// The payload was malformed at the wire level
    #[error("Wire decode error: {0}")]
    Wire(#[from] WireError),

    /// The sender referenced a path id it never simplified toward us
    #[error("Peer {from} referenced unknown path id {id}")]
    UnknownPathId { from: u32, id: u32 },

    /// A confirmation arrived for an id we never assigned
    #[error("Peer {from} confirmed unknown path id {id}")]
    UnknownConfirmId { from: u32, id: u32 },

    /// The inline path does not resolve to an object in the local tree
    #[error("Path '{path}' does not resolve to a node")]
    UnresolvedPath { path: NodePath },

    /// A cached handle went stale between resolution and dispatch
    #[error("Stale node handle for path '{path}'")]
    StaleHandle { path: NodePath },

    /// The call violates the member's authorization mode
    #[error("{mode:?} call '{name}' from peer {from} is not permitted here")]
    NotAuthorized {
        mode: RpcMode,
        name: String,
        from: u32,
    },

    /// The resolved object rejected the dispatched call
    #[error("Object error: {0}")]
    Object(#[from] ObjectError),
}
