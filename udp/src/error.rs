use thiserror::Error;

use treelink_shared::WireError;

use crate::compression::CompressionError;

/// Errors reported by host lifecycle operations (creating, introspecting or
/// tearing down a UDP host)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The transport already has a live host; close it first
    #[error("Transport is already active")]
    AlreadyActive,

    /// The operation needs a live host and there is none
    #[error("Transport is not active")]
    NotActive,

    /// The remote address could not be parsed or resolved
    #[error("Invalid address '{address}'")]
    InvalidAddress { address: String },

    /// Binding the local UDP socket failed
    #[error("Failed to bind UDP socket on port {port}: {message}")]
    BindFailed { port: u16, message: String },

    /// The underlying socket reported an error
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// The operation is only meaningful on the hosting peer
    #[error("Operation is only valid on the hosting peer")]
    ServerOnly,

    /// No connected peer carries this id
    #[error("Unknown peer {peer}")]
    UnknownPeer { peer: u32 },

    /// The requested setting cannot change while the host is live
    #[error("Setting '{setting}' cannot change while the transport is active")]
    ActiveSetting { setting: &'static str },

    /// More application channels than the wire channel byte can address
    #[error("Channel count {count} exceeds the maximum ({max})")]
    TooManyChannels { count: u8, max: u8 },

    /// The compression codec could not be set up
    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),
}

/// Errors decoding one received datagram into a frame. Non-fatal: the
/// datagram is dropped and the socket keeps draining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The frame discriminant is not part of the transport protocol
    #[error("Unknown frame type {byte:#04x}")]
    UnknownType { byte: u8 },

    /// The system-message discriminant is not part of the transport protocol
    #[error("Unknown system message {byte:#04x}")]
    UnknownSysMessage { byte: u8 },

    /// The frame body was malformed at the wire level
    #[error("Wire decode error: {0}")]
    Wire(#[from] WireError),
}
