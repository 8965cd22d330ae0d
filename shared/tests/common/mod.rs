// In-memory loopback transport and a minimal tree collaborator, used to
// exercise the protocol engine end to end without touching a socket.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::rc::Rc;

use treelink_shared::{
    ConnectionStatus, IncomingPacket, Multiplayer, NetworkPeer, NodeHandle, NodePath, NodeTree,
    ObjectError, PeerEvent, RpcMode, TransferMode, TransportError, TreeNode, SERVER_ID,
};

/// One packet as it crossed the hub, for asserting wire-level sequences
#[derive(Debug, Clone)]
pub struct TrafficRecord {
    pub from: u32,
    pub to: u32,
    pub bytes: Vec<u8>,
}

impl TrafficRecord {
    pub fn command(&self) -> u8 {
        self.bytes[0]
    }
}

#[derive(Default)]
struct HubState {
    peers: Vec<u32>,
    queues: HashMap<u32, VecDeque<IncomingPacket>>,
    events: HashMap<u32, VecDeque<PeerEvent>>,
    traffic: Vec<TrafficRecord>,
}

/// Instant-delivery packet hub shared by every [`LoopbackPeer`] joined to it
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, id: u32) -> LoopbackPeer {
        let mut state = self.state.borrow_mut();
        let existing: Vec<u32> = state.peers.clone();

        for &other in &existing {
            state
                .events
                .entry(other)
                .or_default()
                .push_back(PeerEvent::PeerConnected(id));
        }

        state.peers.push(id);
        state.queues.insert(id, VecDeque::new());
        let own_events = state.events.entry(id).or_default();
        if id != SERVER_ID && existing.contains(&SERVER_ID) {
            own_events.push_back(PeerEvent::ConnectedToServer);
        }
        for other in existing {
            own_events.push_back(PeerEvent::PeerConnected(other));
        }

        LoopbackPeer {
            hub: self.clone(),
            id,
            target: 0,
            mode: TransferMode::Reliable,
            refuse: false,
        }
    }

    pub fn leave(&self, id: u32) {
        let mut state = self.state.borrow_mut();
        state.peers.retain(|&peer| peer != id);
        state.queues.remove(&id);
        state.events.remove(&id);
        let remaining: Vec<u32> = state.peers.clone();
        for other in remaining {
            state
                .events
                .entry(other)
                .or_default()
                .push_back(PeerEvent::PeerDisconnected(id));
        }
    }

    /// Drop raw bytes straight into a peer's receive queue, bypassing any
    /// sender; used to exercise malformed-packet handling
    pub fn inject(&self, to: u32, from: u32, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        if let Some(queue) = state.queues.get_mut(&to) {
            queue.push_back(IncomingPacket {
                from,
                channel: 0,
                payload: bytes.to_vec(),
            });
        }
    }

    /// Push a lifecycle event into one peer's queue without moving anything
    /// else, to simulate one-sided observations (e.g. a timeout)
    pub fn inject_event(&self, to: u32, event: PeerEvent) {
        let mut state = self.state.borrow_mut();
        state.events.entry(to).or_default().push_back(event);
    }

    pub fn traffic(&self) -> Vec<TrafficRecord> {
        self.state.borrow().traffic.clone()
    }

    pub fn clear_traffic(&self) {
        self.state.borrow_mut().traffic.clear();
    }
}

/// Test double for the transport seam: packets are delivered the moment they
/// are put, and every packet is recorded in the hub's traffic log
pub struct LoopbackPeer {
    hub: LoopbackHub,
    id: u32,
    target: i32,
    mode: TransferMode,
    refuse: bool,
}

impl NetworkPeer for LoopbackPeer {
    fn poll(&mut self) {}

    fn next_event(&mut self) -> Option<PeerEvent> {
        self.hub
            .state
            .borrow_mut()
            .events
            .get_mut(&self.id)?
            .pop_front()
    }

    fn available_packet_count(&self) -> usize {
        self.hub
            .state
            .borrow()
            .queues
            .get(&self.id)
            .map(|queue| queue.len())
            .unwrap_or(0)
    }

    fn take_packet(&mut self) -> Option<IncomingPacket> {
        self.hub
            .state
            .borrow_mut()
            .queues
            .get_mut(&self.id)?
            .pop_front()
    }

    fn put_packet(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.state.borrow_mut();

        let targets: Vec<u32> = if self.target > 0 {
            let target = self.target as u32;
            if !state.peers.contains(&target) {
                return Err(TransportError::UnknownPeer { peer: target });
            }
            vec![target]
        } else {
            let excluded = self.target.unsigned_abs();
            state
                .peers
                .iter()
                .copied()
                .filter(|&peer| peer != self.id && (self.target == 0 || peer != excluded))
                .collect()
        };

        for target in targets {
            state.traffic.push(TrafficRecord {
                from: self.id,
                to: target,
                bytes: payload.to_vec(),
            });
            if let Some(queue) = state.queues.get_mut(&target) {
                queue.push_back(IncomingPacket {
                    from: self.id,
                    channel: 0,
                    payload: payload.to_vec(),
                });
            }
        }
        Ok(())
    }

    fn set_target_peer(&mut self, target: i32) {
        self.target = target;
    }

    fn set_transfer_mode(&mut self, mode: TransferMode) {
        self.mode = mode;
    }

    fn transfer_mode(&self) -> TransferMode {
        self.mode
    }

    fn connection_status(&self) -> ConnectionStatus {
        if self.hub.state.borrow().peers.contains(&self.id) {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    fn unique_id(&self) -> u32 {
        self.id
    }

    fn is_server(&self) -> bool {
        self.id == SERVER_ID
    }

    fn set_refuse_new_connections(&mut self, refuse: bool) {
        self.refuse = refuse;
    }

    fn is_refusing_new_connections(&self) -> bool {
        self.refuse
    }

    fn max_packet_size(&self) -> usize {
        65_536
    }

    fn peer_address(&self, peer: u32) -> Result<SocketAddr, TransportError> {
        Err(TransportError::UnknownPeer { peer })
    }
}

// Tree collaborator double

pub struct TestNode {
    pub path: NodePath,
    pub master: u32,
    pub method_modes: HashMap<String, RpcMode>,
    pub property_modes: HashMap<String, RpcMode>,
    pub calls: Vec<(String, Vec<Vec<u8>>)>,
    pub sets: Vec<(String, Vec<u8>)>,
}

impl TreeNode for TestNode {
    fn path(&self) -> NodePath {
        self.path.clone()
    }

    fn network_master(&self) -> u32 {
        self.master
    }

    fn rpc_mode(&self, method: &str) -> RpcMode {
        self.method_modes
            .get(method)
            .copied()
            .unwrap_or(RpcMode::Disabled)
    }

    fn rset_mode(&self, property: &str) -> RpcMode {
        self.property_modes
            .get(property)
            .copied()
            .unwrap_or(RpcMode::Disabled)
    }

    fn invoke(&mut self, method: &str, args: &[&[u8]]) -> Result<(), ObjectError> {
        self.calls.push((
            method.to_string(),
            args.iter().map(|arg| arg.to_vec()).collect(),
        ));
        Ok(())
    }

    fn set_property(&mut self, property: &str, value: &[u8]) -> Result<(), ObjectError> {
        self.sets.push((property.to_string(), value.to_vec()));
        Ok(())
    }
}

#[derive(Default)]
pub struct TestTree {
    nodes: HashMap<u64, TestNode>,
    by_path: HashMap<NodePath, u64>,
    next_handle: u64,
}

impl TestTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, path: &str, master: u32) -> NodeHandle {
        self.next_handle += 1;
        let handle = self.next_handle;
        let path = NodePath::new(path);
        self.by_path.insert(path.clone(), handle);
        self.nodes.insert(
            handle,
            TestNode {
                path,
                master,
                method_modes: HashMap::new(),
                property_modes: HashMap::new(),
                calls: Vec::new(),
                sets: Vec::new(),
            },
        );
        NodeHandle::new(handle)
    }

    pub fn set_rpc_mode(&mut self, handle: NodeHandle, method: &str, mode: RpcMode) {
        if let Some(node) = self.nodes.get_mut(&handle.raw()) {
            node.method_modes.insert(method.to_string(), mode);
        }
    }

    pub fn set_rset_mode(&mut self, handle: NodeHandle, property: &str, mode: RpcMode) {
        if let Some(node) = self.nodes.get_mut(&handle.raw()) {
            node.property_modes.insert(property.to_string(), mode);
        }
    }

    pub fn remove_node(&mut self, handle: NodeHandle) {
        if let Some(node) = self.nodes.remove(&handle.raw()) {
            self.by_path.remove(&node.path);
        }
    }

    pub fn resolve_handle(&self, path: &str) -> NodeHandle {
        NodeHandle::new(self.by_path[&NodePath::new(path)])
    }

    pub fn node(&self, handle: NodeHandle) -> &TestNode {
        &self.nodes[&handle.raw()]
    }
}

impl NodeTree for TestTree {
    fn resolve(&self, path: &NodePath) -> Option<NodeHandle> {
        self.by_path.get(path).copied().map(NodeHandle::new)
    }

    fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut dyn TreeNode> {
        self.nodes
            .get_mut(&handle.raw())
            .map(|node| node as &mut dyn TreeNode)
    }
}

/// Engine joined to a hub under the given unique id
pub fn make_engine(hub: &LoopbackHub, id: u32) -> Multiplayer {
    let mut engine = Multiplayer::new();
    engine.set_network_peer(Some(Box::new(hub.join(id))));
    engine
}
