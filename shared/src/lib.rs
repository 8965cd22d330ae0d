//! # Treelink Shared
//! Protocol engine, path caches and the transport seam shared by every
//! treelink transport.
//!
//! Many network participants invoke procedures and synchronize properties on
//! remote addressable objects arranged in a hierarchical tree. Repeatedly
//! naming the same remote object is cheap: after a one-round-trip
//! simplify/confirm handshake, a small integer id stands in for the full
//! path toward each peer that confirmed it.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod command;
mod error;
mod multiplayer;
mod node;
mod path_cache;
mod rpc_mode;
mod transport;
mod wire;

pub use command::NetworkCommand;
pub use error::{PacketError, SessionError};
pub use multiplayer::Multiplayer;
pub use node::{NodeHandle, NodePath, NodeTree, ObjectError, TreeNode};
pub use path_cache::{PathGetCache, PathSentCache};
pub use rpc_mode::RpcMode;
pub use transport::{
    ConnectionStatus, IncomingPacket, NetworkPeer, PeerEvent, TransferMode, TransportError,
    SERVER_ID, TARGET_BROADCAST,
};
pub use wire::{ByteReader, ByteWriter, WireError};
