use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use treelink_shared::{
    ConnectionStatus, IncomingPacket, NetworkPeer, PeerEvent, TransferMode, TransportError,
    SERVER_ID, TARGET_BROADCAST,
};

use crate::channel::{
    CHANNEL_CONFIG, CHANNEL_RELIABLE, CHANNEL_UNORDERED, CHANNEL_UNRELIABLE, FIRST_CUSTOM_CHANNEL,
};
use crate::compression::{CompressionMode, Decoder, Encoder};
use crate::connection::{RemoteConnection, Routed};
use crate::error::HostError;
use crate::frame::{DataFrame, Frame, SysMessage};

/// Largest protocol payload `put_packet` accepts; the frame header and the
/// compression envelope still fit under the UDP datagram ceiling
pub const MAX_PACKET_SIZE: usize = 65_000;

/// Most application channels `set_channel_count` accepts: the highest
/// custom channel index must still fit the one-byte channel field
pub const MAX_CHANNEL_COUNT: u8 = u8::MAX - FIRST_CUSTOM_CHANNEL + 1;

const RECV_BUFFER_SIZE: usize = 65_535;
const RESEND_INTERVAL: Duration = Duration::from_millis(100);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(200);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Draw a random client id; `0` is unused, `1` belongs to the host, and the
/// id must stay positive as an `i32` to fit the target encoding
fn gen_unique_id() -> u32 {
    loop {
        let id = fastrand::u32(..=i32::MAX as u32);
        if id > SERVER_ID {
            return id;
        }
    }
}

struct Host {
    socket: UdpSocket,
    is_server: bool,
    unique_id: u32,
    status: ConnectionStatus,
    encoder: Encoder,
    decoder: Decoder,
    max_clients: usize,
    /// Connections keyed by unique peer id. A server holds one per client;
    /// a client holds exactly one, to the host.
    connections: HashMap<u32, RemoteConnection>,
    addr_to_peer: HashMap<SocketAddr, u32>,
    /// Mesh membership as seen by a client, learned from system messages
    known_peers: BTreeSet<u32>,
    server_addr: Option<SocketAddr>,
    connect_started: Instant,
    last_connect_attempt: Instant,
    incoming: VecDeque<IncomingPacket>,
    events: VecDeque<PeerEvent>,
}

/// Poll-driven UDP transport in a star topology: every client connects to
/// the hosting peer, which relays client-to-client traffic so the protocol
/// engine above sees a full mesh. Implements [`NetworkPeer`].
pub struct UdpTransport {
    host: Option<Host>,
    compression_mode: CompressionMode,
    always_ordered: bool,
    channel_count: u8,
    transfer_channel: i32,
    transfer_mode: TransferMode,
    target_peer: i32,
    refuse_connections: bool,
    bind_ip: IpAddr,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            host: None,
            compression_mode: CompressionMode::None,
            always_ordered: false,
            channel_count: 0,
            transfer_channel: -1,
            transfer_mode: TransferMode::Reliable,
            target_peer: TARGET_BROADCAST,
            refuse_connections: false,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }

    pub fn is_active(&self) -> bool {
        self.host.is_some()
    }

    /// Start hosting on `port`. The host always has unique id `1`.
    /// Bandwidth arguments are recorded for introspection only.
    pub fn create_server(
        &mut self,
        port: u16,
        max_clients: usize,
        _in_bandwidth: u32,
        _out_bandwidth: u32,
    ) -> Result<(), HostError> {
        if self.host.is_some() {
            return Err(HostError::AlreadyActive);
        }
        let socket = self.bind_socket(port)?;
        let now = Instant::now();
        self.host = Some(Host {
            socket,
            is_server: true,
            unique_id: SERVER_ID,
            status: ConnectionStatus::Connected,
            encoder: Encoder::try_new(self.compression_mode)?,
            decoder: Decoder::try_new(self.compression_mode, MAX_PACKET_SIZE)?,
            max_clients,
            connections: HashMap::new(),
            addr_to_peer: HashMap::new(),
            known_peers: BTreeSet::new(),
            server_addr: None,
            connect_started: now,
            last_connect_attempt: now,
            incoming: VecDeque::new(),
            events: VecDeque::new(),
        });
        info!("Hosting on port {} (max {} clients)", port, max_clients);
        Ok(())
    }

    /// Start connecting to a host. The handshake completes asynchronously:
    /// watch for `ConnectedToServer` or `ConnectionFailed` while polling.
    pub fn create_client(
        &mut self,
        address: &str,
        port: u16,
        _in_bandwidth: u32,
        _out_bandwidth: u32,
        local_port: u16,
    ) -> Result<(), HostError> {
        if self.host.is_some() {
            return Err(HostError::AlreadyActive);
        }
        let remote_ip: IpAddr = address
            .parse()
            .map_err(|_| HostError::InvalidAddress {
                address: address.to_string(),
            })?;
        let server_addr = SocketAddr::new(remote_ip, port);
        let socket = self.bind_socket(local_port)?;
        let unique_id = gen_unique_id();
        let now = Instant::now();
        let mut connections = HashMap::new();
        connections.insert(SERVER_ID, RemoteConnection::new(server_addr, now));
        let mut addr_to_peer = HashMap::new();
        addr_to_peer.insert(server_addr, SERVER_ID);

        let mut host = Host {
            socket,
            is_server: false,
            unique_id,
            status: ConnectionStatus::Connecting,
            encoder: Encoder::try_new(self.compression_mode)?,
            decoder: Decoder::try_new(self.compression_mode, MAX_PACKET_SIZE)?,
            max_clients: 0,
            connections,
            addr_to_peer,
            known_peers: BTreeSet::new(),
            server_addr: Some(server_addr),
            connect_started: now,
            last_connect_attempt: now,
            incoming: VecDeque::new(),
            events: VecDeque::new(),
        };
        host.send_plain(server_addr, &Frame::Connect { client_id: unique_id });
        info!("Connecting to {} as peer {}", server_addr, unique_id);
        self.host = Some(host);
        Ok(())
    }

    fn bind_socket(&self, port: u16) -> Result<UdpSocket, HostError> {
        let socket = UdpSocket::bind(SocketAddr::new(self.bind_ip, port)).map_err(|err| {
            HostError::BindFailed {
                port,
                message: err.to_string(),
            }
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|err| HostError::Socket {
                message: err.to_string(),
            })?;
        Ok(socket)
    }

    /// Tear the host down: flush reliable frames still in flight once, tell
    /// every peer goodbye, then drop all state. `wait_usec` gives the last
    /// datagrams time to leave before the socket closes.
    pub fn close_connection(&mut self, wait_usec: u32) {
        let Some(mut host) = self.host.take() else {
            return;
        };
        let now = Instant::now();
        let peer_ids: Vec<u32> = host.connections.keys().copied().collect();
        for id in peer_ids {
            if let Some(conn) = host.connections.get_mut(&id) {
                if conn.has_in_flight() {
                    for datagram in conn.due_resends(now, Duration::ZERO) {
                        let _ = host.socket.send_to(&datagram, conn.addr);
                    }
                }
                let addr = conn.addr;
                host.send_plain(addr, &Frame::Disconnect);
            }
        }
        if wait_usec > 0 {
            std::thread::sleep(Duration::from_micros(u64::from(wait_usec)));
        }
        info!("Connection closed");
    }

    /// Drop one client, gracefully unless `now` is set. Host side only;
    /// the remaining clients learn about the departure over the config
    /// channel.
    pub fn disconnect_peer(&mut self, peer: u32, now: bool) -> Result<(), HostError> {
        let host = self.host.as_mut().ok_or(HostError::NotActive)?;
        if !host.is_server {
            return Err(HostError::ServerOnly);
        }
        let conn = host
            .connections
            .get(&peer)
            .ok_or(HostError::UnknownPeer { peer })?;
        if !now {
            let addr = conn.addr;
            host.send_plain(addr, &Frame::Disconnect);
        }
        host.drop_peer(peer);
        host.events.push_back(PeerEvent::PeerDisconnected(peer));
        host.broadcast_sys(SysMessage::RemovePeer(peer), Instant::now());
        Ok(())
    }

    /// Select the datagram codec. Fixed for the lifetime of a host; both
    /// ends must agree.
    pub fn set_compression_mode(&mut self, mode: CompressionMode) -> Result<(), HostError> {
        if self.host.is_some() {
            return Err(HostError::ActiveSetting {
                setting: "compression_mode",
            });
        }
        self.compression_mode = mode;
        Ok(())
    }

    pub fn compression_mode(&self) -> CompressionMode {
        self.compression_mode
    }

    /// When set, `TransferMode::Unreliable` traffic rides the sequenced
    /// channel instead of the unordered one
    pub fn set_always_ordered(&mut self, ordered: bool) {
        self.always_ordered = ordered;
    }

    pub fn is_always_ordered(&self) -> bool {
        self.always_ordered
    }

    /// Number of extra application channels beyond the built-in ones. At
    /// most [`MAX_CHANNEL_COUNT`], so every channel fits the wire byte.
    pub fn set_channel_count(&mut self, count: u8) -> Result<(), HostError> {
        if self.host.is_some() {
            return Err(HostError::ActiveSetting {
                setting: "channel_count",
            });
        }
        if count > MAX_CHANNEL_COUNT {
            return Err(HostError::TooManyChannels {
                count,
                max: MAX_CHANNEL_COUNT,
            });
        }
        self.channel_count = count;
        Ok(())
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// Route the next `put_packet` over application channel `channel`
    /// (reliability still follows the transfer mode), or `-1` to fall back
    /// to the mode's built-in channel
    pub fn set_transfer_channel(&mut self, channel: i32) {
        self.transfer_channel = channel;
    }

    pub fn transfer_channel(&self) -> i32 {
        self.transfer_channel
    }

    pub fn set_bind_ip(&mut self, ip: IpAddr) {
        self.bind_ip = ip;
    }

    pub fn local_addr(&self) -> Result<SocketAddr, HostError> {
        let host = self.host.as_ref().ok_or(HostError::NotActive)?;
        host.socket.local_addr().map_err(|err| HostError::Socket {
            message: err.to_string(),
        })
    }

    /// Wire channel and delivery flags for the next outbound packet
    fn outbound_channel(&self) -> Result<(u8, bool, bool), TransportError> {
        if self.transfer_channel >= 0 {
            // validated against the count before any narrowing
            if self.transfer_channel >= i32::from(self.channel_count) {
                return Err(TransportError::InvalidChannel {
                    channel: self.transfer_channel,
                    channel_count: self.channel_count,
                });
            }
            let index = self.transfer_channel as u8;
            let reliable = self.transfer_mode == TransferMode::Reliable;
            let ordered = reliable
                || self.transfer_mode == TransferMode::UnreliableOrdered
                || self.always_ordered;
            return Ok((FIRST_CUSTOM_CHANNEL + index, reliable, ordered));
        }
        Ok(match self.transfer_mode {
            TransferMode::Reliable => (CHANNEL_RELIABLE, true, true),
            TransferMode::UnreliableOrdered => (CHANNEL_UNRELIABLE, false, true),
            TransferMode::Unreliable => {
                if self.always_ordered {
                    (CHANNEL_UNRELIABLE, false, true)
                } else {
                    (CHANNEL_UNORDERED, false, false)
                }
            }
        })
    }
}

impl Host {
    /// Send a frame outside any connection's reliability machinery
    fn send_plain(&mut self, addr: SocketAddr, frame: &Frame) {
        let mut writer = treelink_shared::ByteWriter::new();
        frame.encode(&mut writer);
        match self.encoder.encode(writer.as_slice()) {
            Ok(datagram) => {
                if let Err(err) = self.socket.send_to(&datagram, addr) {
                    warn!("Failed to send to {}: {}", addr, err);
                }
            }
            Err(err) => warn!("Failed to compress outbound frame: {}", err),
        }
    }

    /// Send a data frame over a connection, sequencing it on the right
    /// channel and retaining it for resends when reliable
    fn send_data(
        &mut self,
        peer: u32,
        channel: u8,
        reliable: bool,
        ordered: bool,
        source: u32,
        dest: i32,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), TransportError> {
        let conn = self
            .connections
            .get_mut(&peer)
            .ok_or(TransportError::UnknownPeer { peer })?;
        let seq = conn.next_seq(channel);
        let frame = Frame::Data(DataFrame {
            channel,
            reliable,
            ordered,
            seq,
            source,
            dest,
            payload: payload.to_vec(),
        });
        let mut writer = treelink_shared::ByteWriter::with_capacity(payload.len() + 16);
        frame.encode(&mut writer);
        let datagram =
            self.encoder
                .encode(writer.as_slice())
                .map_err(|err| TransportError::Compression {
                    message: err.to_string(),
                })?;
        self.socket
            .send_to(&datagram, conn.addr)
            .map_err(|err| TransportError::Socket {
                message: err.to_string(),
            })?;
        conn.note_sent(now);
        if reliable {
            conn.track_reliable(channel, seq, datagram, now);
        }
        Ok(())
    }

    /// Reliable config-channel system message to one client
    fn send_sys(&mut self, peer: u32, message: SysMessage, now: Instant) {
        let payload = message.encode();
        if let Err(err) = self.send_data(
            peer,
            CHANNEL_CONFIG,
            true,
            true,
            SERVER_ID,
            peer as i32,
            &payload,
            now,
        ) {
            warn!("Failed to send system message to peer {}: {}", peer, err);
        }
    }

    fn broadcast_sys(&mut self, message: SysMessage, now: Instant) {
        let peers: Vec<u32> = self.connections.keys().copied().collect();
        for peer in peers {
            self.send_sys(peer, message, now);
        }
    }

    fn drop_peer(&mut self, peer: u32) {
        if let Some(conn) = self.connections.remove(&peer) {
            self.addr_to_peer.remove(&conn.addr);
        }
    }

    /// A client presented itself; admit it into the mesh or turn it away
    fn accept_connect(&mut self, addr: SocketAddr, client_id: u32, refuse: bool, now: Instant) {
        if let Some(&existing) = self.addr_to_peer.get(&addr) {
            // retransmitted handshake; the ack evidently got lost
            if existing == client_id {
                self.send_plain(addr, &Frame::ConnectAck);
            }
            return;
        }
        if refuse
            || self.connections.len() >= self.max_clients
            || client_id <= SERVER_ID
            || self.connections.contains_key(&client_id)
        {
            debug!("Refusing connection from {} (peer {})", addr, client_id);
            self.send_plain(addr, &Frame::Disconnect);
            return;
        }

        let existing_peers: Vec<u32> = self.connections.keys().copied().collect();
        self.connections
            .insert(client_id, RemoteConnection::new(addr, now));
        self.addr_to_peer.insert(addr, client_id);
        self.send_plain(addr, &Frame::ConnectAck);
        self.events.push_back(PeerEvent::PeerConnected(client_id));
        info!("Peer {} connected from {}", client_id, addr);

        // mesh view: everyone learns about the newcomer, the newcomer
        // learns about everyone
        for peer in existing_peers {
            self.send_sys(peer, SysMessage::AddPeer(client_id), now);
            self.send_sys(client_id, SysMessage::AddPeer(peer), now);
        }
    }

    /// A payload cleared its channel's ordering rules; deliver it locally
    /// and, on the host, relay it toward its remaining recipients
    fn deliver(&mut self, channel: u8, reliable: bool, ordered: bool, routed: Routed, now: Instant) {
        if self.is_server {
            let Routed {
                source,
                dest,
                payload,
            } = routed;
            let local = match dest {
                0 => true,
                d if d > 0 => d as u32 == SERVER_ID,
                d => d.unsigned_abs() != SERVER_ID,
            };
            let relay_targets: Vec<u32> = self
                .connections
                .keys()
                .copied()
                .filter(|&peer| {
                    peer != source
                        && match dest {
                            0 => true,
                            d if d > 0 => peer == d as u32,
                            d => peer != d.unsigned_abs(),
                        }
                })
                .collect();
            for peer in relay_targets {
                if let Err(err) =
                    self.send_data(peer, channel, reliable, ordered, source, dest, &payload, now)
                {
                    warn!("Failed to relay packet to peer {}: {}", peer, err);
                }
            }
            if local {
                if channel == CHANNEL_CONFIG {
                    debug!("Ignoring config-channel payload from peer {}", source);
                } else {
                    self.incoming.push_back(IncomingPacket {
                        from: source,
                        channel,
                        payload,
                    });
                }
            }
        } else if channel == CHANNEL_CONFIG {
            match SysMessage::decode(&routed.payload) {
                Ok(SysMessage::AddPeer(peer)) => {
                    self.known_peers.insert(peer);
                    self.events.push_back(PeerEvent::PeerConnected(peer));
                }
                Ok(SysMessage::RemovePeer(peer)) => {
                    self.known_peers.remove(&peer);
                    self.events.push_back(PeerEvent::PeerDisconnected(peer));
                }
                Err(err) => warn!("Malformed system message: {}", err),
            }
        } else {
            self.incoming.push_back(IncomingPacket {
                from: routed.source,
                channel,
                payload: routed.payload,
            });
        }
    }

    fn handle_data(&mut self, from_addr: SocketAddr, data: DataFrame, now: Instant) {
        let Some(&peer) = self.addr_to_peer.get(&from_addr) else {
            debug!("Dropping data frame from unknown address {}", from_addr);
            return;
        };
        let DataFrame {
            channel,
            reliable,
            ordered,
            seq,
            source,
            dest,
            payload,
        } = data;
        let routed = Routed {
            source,
            dest,
            payload,
        };

        let mut released = Vec::new();
        {
            let Some(conn) = self.connections.get_mut(&peer) else {
                return;
            };
            conn.note_received(now);
            if reliable {
                for item in conn.receive_ordered(channel, seq, routed) {
                    released.push(item);
                }
            } else if ordered {
                if conn.accept_sequenced(channel, seq) {
                    released.push(routed);
                }
            } else {
                released.push(routed);
            }
        }
        if reliable {
            self.send_plain(from_addr, &Frame::Ack { channel, seq });
        }
        for item in released {
            self.deliver(channel, reliable, ordered, item, now);
        }
    }

    fn handle_disconnect(&mut self, from_addr: SocketAddr, now: Instant) {
        let Some(&peer) = self.addr_to_peer.get(&from_addr) else {
            return;
        };
        if self.is_server {
            info!("Peer {} disconnected", peer);
            self.drop_peer(peer);
            self.events.push_back(PeerEvent::PeerDisconnected(peer));
            self.broadcast_sys(SysMessage::RemovePeer(peer), now);
        } else if peer == SERVER_ID {
            match self.status {
                ConnectionStatus::Connecting => {
                    self.events.push_back(PeerEvent::ConnectionFailed);
                }
                _ => {
                    info!("Server closed the connection");
                    self.events.push_back(PeerEvent::ServerDisconnected);
                }
            }
            self.status = ConnectionStatus::Disconnected;
            self.connections.clear();
            self.addr_to_peer.clear();
            self.known_peers.clear();
        }
    }

    fn handle_frame(&mut self, from_addr: SocketAddr, frame: Frame, refuse: bool, now: Instant) {
        if let Some(conn) = self
            .addr_to_peer
            .get(&from_addr)
            .and_then(|peer| self.connections.get_mut(peer))
        {
            conn.note_received(now);
        }
        match frame {
            Frame::Connect { client_id } => {
                if self.is_server {
                    self.accept_connect(from_addr, client_id, refuse, now);
                }
            }
            Frame::ConnectAck => {
                if !self.is_server
                    && self.server_addr == Some(from_addr)
                    && self.status == ConnectionStatus::Connecting
                {
                    self.status = ConnectionStatus::Connected;
                    self.known_peers.insert(SERVER_ID);
                    self.events.push_back(PeerEvent::PeerConnected(SERVER_ID));
                    self.events.push_back(PeerEvent::ConnectedToServer);
                    info!("Connected to server as peer {}", self.unique_id);
                }
            }
            Frame::Data(data) => self.handle_data(from_addr, data, now),
            Frame::Ack { channel, seq } => {
                if let Some(conn) = self
                    .addr_to_peer
                    .get(&from_addr)
                    .and_then(|peer| self.connections.get_mut(peer))
                {
                    conn.ack(channel, seq);
                }
            }
            Frame::KeepAlive => {}
            Frame::Disconnect => self.handle_disconnect(from_addr, now),
        }
    }

    fn drain_socket(&mut self, refuse: bool, now: Instant) {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];
        loop {
            let (len, from_addr) = match self.socket.recv_from(&mut buffer) {
                Ok(received) => received,
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    warn!("Socket receive error: {}", err);
                    break;
                }
            };
            let bytes = match self.decoder.decode(&buffer[..len]) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("Dropping datagram from {}: {}", from_addr, err);
                    continue;
                }
            };
            match Frame::decode(&bytes) {
                Ok(frame) => self.handle_frame(from_addr, frame, refuse, now),
                Err(err) => warn!("Dropping malformed frame from {}: {}", from_addr, err),
            }
        }
    }

    /// Retransmissions, keepalives, silence timeouts and the client-side
    /// handshake retry
    fn run_timers(&mut self, now: Instant) {
        if !self.is_server && self.status == ConnectionStatus::Connecting {
            if now.duration_since(self.connect_started) >= CONNECT_TIMEOUT {
                warn!("Connection attempt timed out");
                self.status = ConnectionStatus::Disconnected;
                self.connections.clear();
                self.addr_to_peer.clear();
                self.events.push_back(PeerEvent::ConnectionFailed);
                return;
            }
            if now.duration_since(self.last_connect_attempt) >= CONNECT_RETRY_INTERVAL {
                self.last_connect_attempt = now;
                if let Some(addr) = self.server_addr {
                    let client_id = self.unique_id;
                    self.send_plain(addr, &Frame::Connect { client_id });
                }
            }
            return;
        }

        let mut timed_out = Vec::new();
        let mut keepalives = Vec::new();
        for (&peer, conn) in self.connections.iter_mut() {
            if conn.silent_for(now) >= CONNECTION_TIMEOUT {
                timed_out.push(peer);
                continue;
            }
            for datagram in conn.due_resends(now, RESEND_INTERVAL) {
                if let Err(err) = self.socket.send_to(&datagram, conn.addr) {
                    warn!("Failed to resend to peer {}: {}", peer, err);
                }
            }
            if conn.idle_for(now) >= KEEPALIVE_INTERVAL {
                conn.note_sent(now);
                keepalives.push(conn.addr);
            }
        }
        for addr in keepalives {
            self.send_plain(addr, &Frame::KeepAlive);
        }
        for peer in timed_out {
            warn!("Peer {} timed out", peer);
            self.drop_peer(peer);
            if self.is_server {
                self.events.push_back(PeerEvent::PeerDisconnected(peer));
                self.broadcast_sys(SysMessage::RemovePeer(peer), now);
            } else if peer == SERVER_ID {
                self.status = ConnectionStatus::Disconnected;
                self.known_peers.clear();
                self.events.push_back(PeerEvent::ServerDisconnected);
            }
        }
    }
}

impl NetworkPeer for UdpTransport {
    fn poll(&mut self) {
        let refuse = self.refuse_connections;
        let Some(host) = self.host.as_mut() else {
            return;
        };
        let now = Instant::now();
        host.drain_socket(refuse, now);
        host.run_timers(now);
    }

    fn next_event(&mut self) -> Option<PeerEvent> {
        self.host.as_mut()?.events.pop_front()
    }

    fn available_packet_count(&self) -> usize {
        self.host.as_ref().map_or(0, |host| host.incoming.len())
    }

    fn take_packet(&mut self) -> Option<IncomingPacket> {
        self.host.as_mut()?.incoming.pop_front()
    }

    fn put_packet(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if payload.len() > MAX_PACKET_SIZE {
            return Err(TransportError::PacketTooLarge {
                size: payload.len(),
                max: MAX_PACKET_SIZE,
            });
        }
        let (channel, reliable, ordered) = self.outbound_channel()?;
        let target = self.target_peer;
        let host = self.host.as_mut().ok_or(TransportError::NotActive)?;
        if host.status != ConnectionStatus::Connected {
            return Err(TransportError::NotActive);
        }
        let now = Instant::now();
        let source = host.unique_id;

        if host.is_server {
            let recipients: Vec<u32> = match target {
                0 => host.connections.keys().copied().collect(),
                t if t > 0 => {
                    let peer = t as u32;
                    if !host.connections.contains_key(&peer) {
                        return Err(TransportError::UnknownPeer { peer });
                    }
                    vec![peer]
                }
                t => host
                    .connections
                    .keys()
                    .copied()
                    .filter(|&peer| peer != t.unsigned_abs())
                    .collect(),
            };
            for peer in recipients {
                host.send_data(peer, channel, reliable, ordered, source, target, payload, now)?;
            }
            Ok(())
        } else {
            if target > 0 {
                let peer = target as u32;
                if peer != SERVER_ID && !host.known_peers.contains(&peer) {
                    return Err(TransportError::UnknownPeer { peer });
                }
            }
            // everything goes through the host, which relays by dest
            host.send_data(
                SERVER_ID, channel, reliable, ordered, source, target, payload, now,
            )
        }
    }

    fn set_target_peer(&mut self, target: i32) {
        self.target_peer = target;
    }

    fn set_transfer_mode(&mut self, mode: TransferMode) {
        self.transfer_mode = mode;
    }

    fn transfer_mode(&self) -> TransferMode {
        self.transfer_mode
    }

    fn connection_status(&self) -> ConnectionStatus {
        self.host
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, |host| host.status)
    }

    fn unique_id(&self) -> u32 {
        self.host.as_ref().map_or(0, |host| host.unique_id)
    }

    fn is_server(&self) -> bool {
        self.host.as_ref().is_some_and(|host| host.is_server)
    }

    fn set_refuse_new_connections(&mut self, refuse: bool) {
        self.refuse_connections = refuse;
    }

    fn is_refusing_new_connections(&self) -> bool {
        self.refuse_connections
    }

    fn max_packet_size(&self) -> usize {
        MAX_PACKET_SIZE
    }

    fn peer_address(&self, peer: u32) -> Result<SocketAddr, TransportError> {
        let host = self.host.as_ref().ok_or(TransportError::NotActive)?;
        host.connections
            .get(&peer)
            .map(|conn| conn.addr)
            .ok_or(TransportError::UnknownPeer { peer })
    }
}
