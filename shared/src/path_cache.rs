use std::collections::HashMap;

use crate::node::{NodeHandle, NodePath};

/// Per-peer confirmation state inside a [`PathSentCache`] entry
#[derive(Copy, Debug, Clone, Eq, PartialEq)]
enum ConfirmState {
    /// SimplifyPath was sent; the peer has not answered yet
    Pending,
    /// The peer confirmed the id; the id form is usable toward it
    Confirmed,
}

/// Sender-side cache entry for one hierarchical address.
///
/// The id is allocated once, is unique within the local process, and is
/// never reused while the entry exists. Confirmation is tracked per peer:
/// different receivers confirm asynchronously and independently, and the id
/// form is only valid toward a peer whose flag is confirmed.
#[derive(Debug, Clone)]
pub struct PathSentCache {
    id: u32,
    confirmed_peers: HashMap<u32, ConfirmState>,
}

impl PathSentCache {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            confirmed_peers: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn is_confirmed(&self, peer: u32) -> bool {
        self.confirmed_peers.get(&peer) == Some(&ConfirmState::Confirmed)
    }

    /// Whether a SimplifyPath has ever been handed to the transport for
    /// this peer (confirmed or still pending)
    pub fn has_offered(&self, peer: u32) -> bool {
        self.confirmed_peers.contains_key(&peer)
    }

    /// Record that a SimplifyPath is on its way to `peer`. Returns `true`
    /// if this is the first time, i.e. the caller should actually send one.
    pub fn mark_pending(&mut self, peer: u32) -> bool {
        if self.confirmed_peers.contains_key(&peer) {
            return false;
        }
        self.confirmed_peers.insert(peer, ConfirmState::Pending);
        true
    }

    /// Flip the peer's flag after its ConfirmPath arrived
    pub fn confirm(&mut self, peer: u32) {
        self.confirmed_peers.insert(peer, ConfirmState::Confirmed);
    }

    /// Drop all state for a disconnected peer, so a reconnect restarts the
    /// handshake from scratch
    pub fn forget_peer(&mut self, peer: u32) {
        self.confirmed_peers.remove(&peer);
    }
}

/// Receiver-side cache for one sending peer: assigned id back to the
/// hierarchical address and the resolved object handle.
///
/// Ids only ever enter this map through an explicit SimplifyPath from that
/// specific sender; a lookup miss is a protocol error for the packet that
/// carried the id, nothing more.
#[derive(Debug, Clone, Default)]
pub struct PathGetCache {
    nodes: HashMap<u32, (NodePath, NodeHandle)>,
}

impl PathGetCache {
    pub fn insert(&mut self, id: u32, path: NodePath, handle: NodeHandle) {
        self.nodes.insert(id, (path, handle));
    }

    pub fn get(&self, id: u32) -> Option<&(NodePath, NodeHandle)> {
        self.nodes.get(&id)
    }
}
