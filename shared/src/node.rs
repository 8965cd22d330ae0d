use std::fmt;

use thiserror::Error;

use crate::rpc_mode::RpcMode;

/// Slash-delimited address of an object inside the tree structure both peers
/// mirror, e.g. `/root/Lobby`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath(String);

impl NodePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Opaque handle to a resolved object. Handles may go stale (the object was
/// removed from the tree); a stale handle resolves to `None` and the packet
/// referencing it is dropped.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Errors reported by the addressable-object collaborator when a dispatched
/// call or property assignment cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectError {
    /// The object has no method with this name
    #[error("Object has no method '{name}'")]
    UnknownMethod { name: String },

    /// The object has no property with this name
    #[error("Object has no property '{name}'")]
    UnknownProperty { name: String },

    /// The method exists but rejected its arguments or failed while running
    #[error("Invocation of '{name}' failed: {reason}")]
    InvocationFailed { name: String, reason: String },
}

/// An addressable object living in the shared tree.
///
/// The engine never inspects object internals: it reads the authorization
/// mode for the named member, then hands over the opaque encoded arguments.
/// The argument/value serialization format is the application's business.
pub trait TreeNode {
    /// The object's hierarchical address
    fn path(&self) -> NodePath;

    /// Unique id of the peer that acts as this object's authority
    fn network_master(&self) -> u32;

    /// Authorization mode of the named method
    fn rpc_mode(&self, method: &str) -> RpcMode;

    /// Authorization mode of the named property
    fn rset_mode(&self, property: &str) -> RpcMode;

    /// Invoke a method with its already-encoded argument list
    fn invoke(&mut self, method: &str, args: &[&[u8]]) -> Result<(), ObjectError>;

    /// Assign a property from its already-encoded value
    fn set_property(&mut self, property: &str, value: &[u8]) -> Result<(), ObjectError>;
}

/// Resolution seam into the tree implementation. The engine only ever needs
/// to turn an address into a handle and a handle back into a live object.
pub trait NodeTree {
    /// Resolve a hierarchical address to a handle, if such an object exists
    fn resolve(&self, path: &NodePath) -> Option<NodeHandle>;

    /// Fetch the live object behind a handle; `None` means the handle went
    /// stale since it was resolved
    fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut dyn TreeNode>;
}
