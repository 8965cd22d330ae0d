//! # Treelink UDP
//! Star-topology UDP transport for the treelink protocol engine.
//!
//! One peer hosts; every other peer connects to it and the host relays
//! client-to-client traffic, so the engine above sees a full mesh. Virtual
//! channels layer reliability and ordering over plain datagrams, and whole
//! datagrams can be compressed with LZ4 or Zstandard.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod channel;
mod compression;
mod connection;
mod error;
mod frame;
mod sequence;
mod transport;

pub use channel::{
    CHANNEL_CONFIG, CHANNEL_RELIABLE, CHANNEL_UNORDERED, CHANNEL_UNRELIABLE, FIRST_CUSTOM_CHANNEL,
};
pub use compression::{CompressionError, CompressionMode};
pub use error::{FrameError, HostError};
pub use transport::{UdpTransport, MAX_CHANNEL_COUNT, MAX_PACKET_SIZE};
