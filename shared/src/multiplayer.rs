use std::collections::{BTreeSet, HashMap, VecDeque};

use log::warn;

use crate::command::NetworkCommand;
use crate::error::{PacketError, SessionError};
use crate::node::{NodeHandle, NodePath, NodeTree};
use crate::path_cache::{PathGetCache, PathSentCache};
use crate::transport::{NetworkPeer, PeerEvent, TransferMode, SERVER_ID};
use crate::wire::{ByteReader, ByteWriter};

/// What an outbound remote operation carries besides its destination path
enum Outbound<'a> {
    Call {
        method: &'a str,
        args: &'a [&'a [u8]],
    },
    Set {
        property: &'a str,
        value: &'a [u8],
    },
}

/// The protocol engine.
///
/// Encodes outbound remote-call and remote-set requests, runs the
/// simplify/confirm path-caching handshake, decodes inbound packets and
/// dispatches them against the tree collaborator, and enforces RPC
/// authorization modes at both ends.
///
/// Single-threaded and poll-driven: the host program calls [`poll`] once per
/// network tick, and every packet received in that tick is decoded and
/// dispatched synchronously, in arrival order, before `poll` returns.
///
/// [`poll`]: Multiplayer::poll
pub struct Multiplayer {
    network_peer: Option<Box<dyn NetworkPeer>>,
    connected_peers: BTreeSet<u32>,
    path_send_cache: HashMap<NodePath, PathSentCache>,
    path_get_cache: HashMap<u32, PathGetCache>,
    last_send_cache_id: u32,
    rpc_sender_id: u32,
    // reusable outbound assembly buffer, overwritten on every send
    packet_cache: ByteWriter,
    raw_packets: VecDeque<(u32, Vec<u8>)>,
    events: VecDeque<PeerEvent>,
}

impl Default for Multiplayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Multiplayer {
    pub fn new() -> Self {
        Self {
            network_peer: None,
            connected_peers: BTreeSet::new(),
            path_send_cache: HashMap::new(),
            path_get_cache: HashMap::new(),
            last_send_cache_id: 1,
            rpc_sender_id: 0,
            packet_cache: ByteWriter::new(),
            raw_packets: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Attach a transport, replacing (and discarding all state tied to) any
    /// previous one. `None` detaches.
    pub fn set_network_peer(&mut self, peer: Option<Box<dyn NetworkPeer>>) {
        self.clear();
        self.network_peer = peer;
    }

    pub fn has_network_peer(&self) -> bool {
        self.network_peer.is_some()
    }

    pub fn network_peer(&self) -> Option<&dyn NetworkPeer> {
        self.network_peer.as_deref()
    }

    pub fn network_peer_mut(&mut self) -> Option<&mut (dyn NetworkPeer + '_)> {
        self.network_peer
            .as_deref_mut()
            .map(|peer| peer as &mut dyn NetworkPeer)
    }

    /// Drop all caches, queues and peer bookkeeping. The attached transport
    /// (if any) is kept.
    pub fn clear(&mut self) {
        self.connected_peers.clear();
        self.path_send_cache.clear();
        self.path_get_cache.clear();
        self.packet_cache.clear();
        self.raw_packets.clear();
        self.events.clear();
        self.last_send_cache_id = 1;
        self.rpc_sender_id = 0;
    }

    /// Peer ids currently part of the session, in ascending order
    pub fn network_connected_peers(&self) -> Vec<u32> {
        self.connected_peers.iter().copied().collect()
    }

    /// The local peer's unique id, or `0` while no transport is attached
    pub fn unique_id(&self) -> u32 {
        self.network_peer
            .as_ref()
            .map(|peer| peer.unique_id())
            .unwrap_or(0)
    }

    pub fn is_network_server(&self) -> bool {
        self.unique_id() == SERVER_ID
    }

    /// While a packet is being dispatched, the id of the peer that sent it;
    /// `0` otherwise. Dispatched code may read this to learn who is calling.
    pub fn rpc_sender_id(&self) -> u32 {
        self.rpc_sender_id
    }

    pub fn set_refuse_new_network_connections(&mut self, refuse: bool) {
        if let Some(peer) = self.network_peer.as_deref_mut() {
            peer.set_refuse_new_connections(refuse);
        }
    }

    pub fn is_refusing_new_network_connections(&self) -> bool {
        self.network_peer
            .as_deref()
            .map(|peer| peer.is_refusing_new_connections())
            .unwrap_or(false)
    }

    /// Pop the next session lifecycle event, oldest first
    pub fn take_event(&mut self) -> Option<PeerEvent> {
        self.events.pop_front()
    }

    /// Pop the next received raw payload: `(sender id, bytes)`
    pub fn take_raw_packet(&mut self) -> Option<(u32, Vec<u8>)> {
        self.raw_packets.pop_front()
    }

    /// Send already-encoded application bytes as a Raw packet
    pub fn send_bytes(
        &mut self,
        data: &[u8],
        target: i32,
        mode: TransferMode,
    ) -> Result<(), SessionError> {
        if data.is_empty() {
            return Err(SessionError::EmptyPacket);
        }
        if self.network_peer.is_none() {
            return Err(SessionError::NoActivePeer);
        }
        self.packet_cache.clear();
        self.packet_cache.write_u8(NetworkCommand::Raw.to_byte());
        self.packet_cache.write_bytes(data);
        self.flush_packet(target, mode)
    }

    /// Invoke `method` on the remote instances of `node`.
    ///
    /// `peer_id` addresses the call: `0` broadcasts, a positive id targets
    /// one peer, a negative id targets everyone except `-peer_id`.
    ///
    /// Authorization-mode violations are logged and swallowed, not
    /// propagated; configuration errors (no transport, targeting the local
    /// peer, a dead handle) are returned.
    pub fn rpcp(
        &mut self,
        tree: &mut dyn NodeTree,
        node: NodeHandle,
        peer_id: i32,
        unreliable: bool,
        method: &str,
        args: &[&[u8]],
    ) -> Result<(), SessionError> {
        self.send_remote_op(tree, node, peer_id, unreliable, Outbound::Call { method, args })
    }

    /// Assign `property` on the remote instances of `node`. Targeting and
    /// caching behave exactly as in [`rpcp`](Multiplayer::rpcp).
    pub fn rsetp(
        &mut self,
        tree: &mut dyn NodeTree,
        node: NodeHandle,
        peer_id: i32,
        unreliable: bool,
        property: &str,
        value: &[u8],
    ) -> Result<(), SessionError> {
        self.send_remote_op(tree, node, peer_id, unreliable, Outbound::Set { property, value })
    }

    /// Drain everything the transport has for us this tick: lifecycle
    /// events first, then every queued packet in arrival order. Per-packet
    /// protocol errors are logged and the packet dropped; only a missing
    /// transport fails the poll itself.
    pub fn poll(&mut self, tree: &mut dyn NodeTree) -> Result<(), SessionError> {
        let self_id = {
            let peer = self
                .network_peer
                .as_deref_mut()
                .ok_or(SessionError::NoActivePeer)?;
            peer.poll();
            peer.unique_id()
        };

        loop {
            let event = match self.network_peer.as_deref_mut() {
                Some(peer) => peer.next_event(),
                None => None,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_peer_event(event);
        }

        loop {
            let packet = match self.network_peer.as_deref_mut() {
                Some(peer) => peer.take_packet(),
                None => None,
            };
            let Some(packet) = packet else {
                break;
            };
            self.rpc_sender_id = packet.from;
            if let Err(err) = self.process_packet(tree, self_id, packet.from, &packet.payload) {
                warn!("Dropping packet from peer {}: {}", packet.from, err);
            }
            self.rpc_sender_id = 0;
        }

        Ok(())
    }

    // Lifecycle

    fn handle_peer_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::PeerConnected(id) => self.add_peer(id),
            PeerEvent::PeerDisconnected(id) => self.del_peer(id),
            PeerEvent::ConnectedToServer => self.connected_to_server(),
            PeerEvent::ConnectionFailed => self.connection_failed(),
            PeerEvent::ServerDisconnected => self.server_disconnected(),
        }
    }

    fn add_peer(&mut self, id: u32) {
        self.connected_peers.insert(id);
        self.events.push_back(PeerEvent::PeerConnected(id));
    }

    fn del_peer(&mut self, id: u32) {
        self.connected_peers.remove(&id);
        // a reconnecting peer with the same id starts from scratch
        self.path_get_cache.remove(&id);
        for entry in self.path_send_cache.values_mut() {
            entry.forget_peer(id);
        }
        self.events.push_back(PeerEvent::PeerDisconnected(id));
    }

    fn connected_to_server(&mut self) {
        self.events.push_back(PeerEvent::ConnectedToServer);
    }

    fn connection_failed(&mut self) {
        self.events.push_back(PeerEvent::ConnectionFailed);
    }

    fn server_disconnected(&mut self) {
        // the host relayed everything; with it gone, all per-peer state is stale
        self.connected_peers.clear();
        self.path_get_cache.clear();
        self.path_send_cache.clear();
        self.events.push_back(PeerEvent::ServerDisconnected);
    }

    // Outbound path

    fn send_remote_op(
        &mut self,
        tree: &mut dyn NodeTree,
        node: NodeHandle,
        peer_id: i32,
        unreliable: bool,
        outbound: Outbound<'_>,
    ) -> Result<(), SessionError> {
        let self_id = {
            let peer = self
                .network_peer
                .as_deref()
                .ok_or(SessionError::NoActivePeer)?;
            peer.unique_id()
        };
        if peer_id > 0 && peer_id as u32 == self_id {
            return Err(SessionError::TargetIsSelf { peer: self_id });
        }

        let name = match &outbound {
            Outbound::Call { method, .. } => *method,
            Outbound::Set { property, .. } => *property,
        };
        let (mode, master, path) = {
            let node_ref = tree
                .node_mut(node)
                .ok_or(SessionError::UnknownNode { handle: node.raw() })?;
            let mode = match &outbound {
                Outbound::Call { .. } => node_ref.rpc_mode(name),
                Outbound::Set { .. } => node_ref.rset_mode(name),
            };
            (mode, node_ref.network_master(), node_ref.path())
        };

        if !mode.can_originate(self_id, master) {
            warn!(
                "'{}' on '{}' not sent: mode {:?} does not allow peer {} to originate",
                name, path, mode, self_id
            );
            return Ok(());
        }

        self.encode_and_send(&path, peer_id, unreliable, &outbound)?;

        if mode.is_sync() {
            // sync variants additionally execute on the originating peer
            let Some(node_ref) = tree.node_mut(node) else {
                return Ok(());
            };
            let result = match &outbound {
                Outbound::Call { method, args } => node_ref.invoke(method, args),
                Outbound::Set { property, value } => node_ref.set_property(property, value),
            };
            if let Err(err) = result {
                warn!("Local sync dispatch of '{}' on '{}' failed: {}", name, path, err);
            }
        }

        Ok(())
    }

    fn encode_and_send(
        &mut self,
        path: &NodePath,
        target: i32,
        unreliable: bool,
        outbound: &Outbound<'_>,
    ) -> Result<(), SessionError> {
        let targets = self.resolve_targets(target);
        if targets.is_empty() {
            // nobody to notify remotely; not an error
            return Ok(());
        }

        let (path_id, all_confirmed) = self.simplify_toward(path, &targets)?;

        self.packet_cache.clear();
        let command = match outbound {
            Outbound::Call { .. } => NetworkCommand::RemoteCall,
            Outbound::Set { .. } => NetworkCommand::RemoteSet,
        };
        self.packet_cache.write_u8(command.to_byte());
        // the id form is only usable once every targeted peer confirmed it
        self.packet_cache.write_u8(u8::from(all_confirmed));
        if all_confirmed {
            self.packet_cache.write_varint(path_id);
        } else {
            self.packet_cache.write_string(path.as_str());
        }
        match outbound {
            Outbound::Call { method, args } => {
                self.packet_cache.write_string(method);
                self.packet_cache.write_varint(args.len() as u32);
                for arg in *args {
                    self.packet_cache.write_sized_bytes(arg);
                }
            }
            Outbound::Set { property, value } => {
                self.packet_cache.write_string(property);
                self.packet_cache.write_bytes(value);
            }
        }

        let mode = if unreliable {
            TransferMode::Unreliable
        } else {
            TransferMode::Reliable
        };
        self.flush_packet(target, mode)
    }

    /// Expand a target id into the concrete peers it addresses
    fn resolve_targets(&self, target: i32) -> Vec<u32> {
        if target > 0 {
            return vec![target as u32];
        }
        let excluded = target.unsigned_abs();
        self.connected_peers
            .iter()
            .copied()
            .filter(|&peer| target == 0 || peer != excluded)
            .collect()
    }

    /// Run the lazy simplify handshake toward `targets` for `path`.
    ///
    /// Allocates the entry's id on first use, sends one SimplifyPath offer
    /// to every peer that has never received one, and reports whether every
    /// target has already confirmed (i.e. the id form may be used now).
    fn simplify_toward(
        &mut self,
        path: &NodePath,
        targets: &[u32],
    ) -> Result<(u32, bool), SessionError> {
        let next_id = &mut self.last_send_cache_id;
        let entry = self.path_send_cache.entry(path.clone()).or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            PathSentCache::new(id)
        });

        let id = entry.id();
        let mut all_confirmed = true;
        let mut needs_offer = Vec::new();
        for &peer in targets {
            if entry.is_confirmed(peer) {
                continue;
            }
            all_confirmed = false;
            if !entry.has_offered(peer) {
                needs_offer.push(peer);
            }
        }

        for peer in needs_offer {
            self.packet_cache.clear();
            self.packet_cache
                .write_u8(NetworkCommand::SimplifyPath.to_byte());
            self.packet_cache.write_string(path.as_str());
            self.packet_cache.write_varint(id);
            self.flush_packet(peer as i32, TransferMode::Reliable)?;
            // only a delivered offer counts; a failed send must be retried
            // by the next call toward this peer
            if let Some(entry) = self.path_send_cache.get_mut(path) {
                entry.mark_pending(peer);
            }
        }

        Ok((id, all_confirmed))
    }

    /// Hand the assembled packet-cache contents to the transport
    fn flush_packet(&mut self, target: i32, mode: TransferMode) -> Result<(), SessionError> {
        let peer = self
            .network_peer
            .as_deref_mut()
            .ok_or(SessionError::NoActivePeer)?;
        peer.set_target_peer(target);
        peer.set_transfer_mode(mode);
        peer.put_packet(self.packet_cache.as_slice())?;
        Ok(())
    }

    // Inbound path

    fn process_packet(
        &mut self,
        tree: &mut dyn NodeTree,
        self_id: u32,
        from: u32,
        payload: &[u8],
    ) -> Result<(), PacketError> {
        let Some((&command_byte, rest)) = payload.split_first() else {
            return Err(PacketError::Empty);
        };
        match NetworkCommand::from_byte(command_byte)? {
            NetworkCommand::RemoteCall => self.process_rpc(tree, self_id, from, rest),
            NetworkCommand::RemoteSet => self.process_rset(tree, self_id, from, rest),
            NetworkCommand::SimplifyPath => self.process_simplify_path(tree, from, rest),
            NetworkCommand::ConfirmPath => self.process_confirm_path(from, rest),
            NetworkCommand::Raw => self.process_raw(from, rest),
        }
    }

    /// Read the destination out of a RemoteCall/RemoteSet payload: either an
    /// inline path (resolved now) or a cached id (looked up against this
    /// sender's get-cache)
    fn process_get_node(
        &self,
        tree: &mut dyn NodeTree,
        from: u32,
        reader: &mut ByteReader<'_>,
    ) -> Result<(NodeHandle, NodePath), PacketError> {
        let path_is_id = reader.read_u8()? != 0;
        if path_is_id {
            let id = reader.read_varint()?;
            let cache = self
                .path_get_cache
                .get(&from)
                .ok_or(PacketError::UnknownPathId { from, id })?;
            let (path, handle) = cache
                .get(id)
                .ok_or(PacketError::UnknownPathId { from, id })?;
            Ok((*handle, path.clone()))
        } else {
            let path = NodePath::new(reader.read_string()?);
            let handle = tree
                .resolve(&path)
                .ok_or_else(|| PacketError::UnresolvedPath { path: path.clone() })?;
            Ok((handle, path))
        }
    }

    fn process_rpc(
        &mut self,
        tree: &mut dyn NodeTree,
        self_id: u32,
        from: u32,
        payload: &[u8],
    ) -> Result<(), PacketError> {
        let mut reader = ByteReader::new(payload);
        let (handle, path) = self.process_get_node(tree, from, &mut reader)?;

        let method = reader.read_string()?;
        let arg_count = reader.read_varint()? as usize;
        let mut args: Vec<&[u8]> = Vec::with_capacity(arg_count.min(32));
        for _ in 0..arg_count {
            args.push(reader.read_sized_bytes()?);
        }

        let node = tree
            .node_mut(handle)
            .ok_or(PacketError::StaleHandle { path })?;
        let mode = node.rpc_mode(method);
        if !mode.can_execute(self_id, from, node.network_master()) {
            return Err(PacketError::NotAuthorized {
                mode,
                name: method.to_string(),
                from,
            });
        }
        node.invoke(method, &args)?;
        Ok(())
    }

    fn process_rset(
        &mut self,
        tree: &mut dyn NodeTree,
        self_id: u32,
        from: u32,
        payload: &[u8],
    ) -> Result<(), PacketError> {
        let mut reader = ByteReader::new(payload);
        let (handle, path) = self.process_get_node(tree, from, &mut reader)?;

        let property = reader.read_string()?;
        let value = reader.take_remaining();

        let node = tree
            .node_mut(handle)
            .ok_or(PacketError::StaleHandle { path })?;
        let mode = node.rset_mode(property);
        if !mode.can_execute(self_id, from, node.network_master()) {
            return Err(PacketError::NotAuthorized {
                mode,
                name: property.to_string(),
                from,
            });
        }
        node.set_property(property, value)?;
        Ok(())
    }

    fn process_simplify_path(
        &mut self,
        tree: &mut dyn NodeTree,
        from: u32,
        payload: &[u8],
    ) -> Result<(), PacketError> {
        let mut reader = ByteReader::new(payload);
        let path = NodePath::new(reader.read_string()?);
        let id = reader.read_varint()?;

        let handle = tree
            .resolve(&path)
            .ok_or_else(|| PacketError::UnresolvedPath { path: path.clone() })?;
        self.path_get_cache
            .entry(from)
            .or_default()
            .insert(id, path, handle);

        // acknowledge, so the sender may switch to the id form toward us
        self.packet_cache.clear();
        self.packet_cache
            .write_u8(NetworkCommand::ConfirmPath.to_byte());
        self.packet_cache.write_varint(id);
        if let Err(err) = self.flush_packet(from as i32, TransferMode::Reliable) {
            warn!("Failed to confirm path id {} to peer {}: {}", id, from, err);
        }
        Ok(())
    }

    fn process_confirm_path(&mut self, from: u32, payload: &[u8]) -> Result<(), PacketError> {
        let mut reader = ByteReader::new(payload);
        let id = reader.read_varint()?;

        let entry = self
            .path_send_cache
            .values_mut()
            .find(|entry| entry.id() == id)
            .ok_or(PacketError::UnknownConfirmId { from, id })?;
        entry.confirm(from);
        Ok(())
    }

    fn process_raw(&mut self, from: u32, payload: &[u8]) -> Result<(), PacketError> {
        if payload.is_empty() {
            return Err(PacketError::Empty);
        }
        self.raw_packets.push_back((from, payload.to_vec()));
        Ok(())
    }
}
