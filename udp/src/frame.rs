use treelink_shared::{ByteReader, ByteWriter};

use crate::error::FrameError;

const FRAME_CONNECT: u8 = 0;
const FRAME_CONNECT_ACK: u8 = 1;
const FRAME_DATA: u8 = 2;
const FRAME_ACK: u8 = 3;
const FRAME_KEEP_ALIVE: u8 = 4;
const FRAME_DISCONNECT: u8 = 5;

const FLAG_RELIABLE: u8 = 0b01;
const FLAG_ORDERED: u8 = 0b10;

/// A routed application payload: one protocol packet in flight on one
/// virtual channel. `source` is the original sender's unique id; `dest`
/// uses the engine's target encoding (`0` broadcast, `> 0` unicast,
/// `< 0` exclusion) so the hosting peer can relay it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub channel: u8,
    pub reliable: bool,
    pub ordered: bool,
    pub seq: u16,
    pub source: u32,
    pub dest: i32,
    pub payload: Vec<u8>,
}

/// Everything one UDP datagram can carry. One frame per datagram; the
/// whole datagram is compressed when a compression mode is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Client handshake, repeated until the server answers
    Connect { client_id: u32 },
    /// Server's handshake answer; the client is connected on receipt
    ConnectAck,
    Data(DataFrame),
    /// Acknowledges one reliable `Data` frame on one channel
    Ack { channel: u8, seq: u16 },
    /// Sent when a connection has been idle for a while
    KeepAlive,
    /// Graceful teardown notice
    Disconnect,
}

impl Frame {
    pub fn encode(&self, writer: &mut ByteWriter) {
        match self {
            Frame::Connect { client_id } => {
                writer.write_u8(FRAME_CONNECT);
                writer.write_varint(*client_id);
            }
            Frame::ConnectAck => {
                writer.write_u8(FRAME_CONNECT_ACK);
            }
            Frame::Data(data) => {
                writer.write_u8(FRAME_DATA);
                writer.write_u8(data.channel);
                let mut flags = 0;
                if data.reliable {
                    flags |= FLAG_RELIABLE;
                }
                if data.ordered {
                    flags |= FLAG_ORDERED;
                }
                writer.write_u8(flags);
                writer.write_u16(data.seq);
                writer.write_varint(data.source);
                writer.write_signed_varint(data.dest);
                writer.write_bytes(&data.payload);
            }
            Frame::Ack { channel, seq } => {
                writer.write_u8(FRAME_ACK);
                writer.write_u8(*channel);
                writer.write_u16(*seq);
            }
            Frame::KeepAlive => {
                writer.write_u8(FRAME_KEEP_ALIVE);
            }
            Frame::Disconnect => {
                writer.write_u8(FRAME_DISCONNECT);
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        let mut reader = ByteReader::new(bytes);
        let frame_type = reader.read_u8()?;
        match frame_type {
            FRAME_CONNECT => Ok(Frame::Connect {
                client_id: reader.read_varint()?,
            }),
            FRAME_CONNECT_ACK => Ok(Frame::ConnectAck),
            FRAME_DATA => {
                let channel = reader.read_u8()?;
                let flags = reader.read_u8()?;
                let seq = reader.read_u16()?;
                let source = reader.read_varint()?;
                let dest = reader.read_signed_varint()?;
                let payload = reader.take_remaining().to_vec();
                Ok(Frame::Data(DataFrame {
                    channel,
                    reliable: flags & FLAG_RELIABLE != 0,
                    ordered: flags & FLAG_ORDERED != 0,
                    seq,
                    source,
                    dest,
                    payload,
                }))
            }
            FRAME_ACK => Ok(Frame::Ack {
                channel: reader.read_u8()?,
                seq: reader.read_u16()?,
            }),
            FRAME_KEEP_ALIVE => Ok(Frame::KeepAlive),
            FRAME_DISCONNECT => Ok(Frame::Disconnect),
            byte => Err(FrameError::UnknownType { byte }),
        }
    }
}

const SYS_ADD_PEER: u8 = 0;
const SYS_REMOVE_PEER: u8 = 1;

/// Peer-management notice carried as a `Data` payload on the config
/// channel, so mesh membership rides the same reliable-ordered machinery
/// as everything else
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub enum SysMessage {
    AddPeer(u32),
    RemovePeer(u32),
}

impl SysMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(6);
        match self {
            SysMessage::AddPeer(peer) => {
                writer.write_u8(SYS_ADD_PEER);
                writer.write_varint(*peer);
            }
            SysMessage::RemovePeer(peer) => {
                writer.write_u8(SYS_REMOVE_PEER);
                writer.write_varint(*peer);
            }
        }
        writer.into_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<SysMessage, FrameError> {
        let mut reader = ByteReader::new(bytes);
        let kind = reader.read_u8()?;
        let peer = reader.read_varint()?;
        match kind {
            SYS_ADD_PEER => Ok(SysMessage::AddPeer(peer)),
            SYS_REMOVE_PEER => Ok(SysMessage::RemovePeer(peer)),
            byte => Err(FrameError::UnknownSysMessage { byte }),
        }
    }
}
