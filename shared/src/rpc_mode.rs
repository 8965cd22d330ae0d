/// Authorization mode attached to a remotely invocable method or property.
///
/// The mode constrains who may originate a call and where it executes. It is
/// owned by the addressable-object collaborator; the protocol engine only
/// reads it at the two enforcement points (send and dispatch).
#[derive(Copy, Debug, Clone, Eq, PartialEq, Hash)]
pub enum RpcMode {
    /// No remote invocation; every call is blocked (the safe default)
    Disabled,
    /// Anyone may call; executes on every targeted remote
    Remote,
    /// Executes only on the node's designated authority
    Master,
    /// The authority addresses the non-authority peers
    Puppet,
    /// Like `Remote`, and additionally executes locally on the sender
    RemoteSync,
    /// Like `Master`, and additionally executes locally on the sender
    MasterSync,
    /// Like `Puppet`, and additionally executes locally on the sender
    PuppetSync,
}

impl RpcMode {
    /// Whether the `*Sync` family applies: the call also runs locally on the
    /// originating peer.
    pub fn is_sync(self) -> bool {
        matches!(
            self,
            RpcMode::RemoteSync | RpcMode::MasterSync | RpcMode::PuppetSync
        )
    }

    /// Send-side check: may the local peer originate this call at all?
    ///
    /// `Puppet` calls flow from the authority outward, so only the node's
    /// master may start one. The other enabled modes accept any originator;
    /// the receive side enforces where they execute.
    pub fn can_originate(self, self_id: u32, master_id: u32) -> bool {
        match self {
            RpcMode::Disabled => false,
            RpcMode::Remote | RpcMode::RemoteSync => true,
            RpcMode::Master | RpcMode::MasterSync => true,
            RpcMode::Puppet | RpcMode::PuppetSync => self_id == master_id,
        }
    }

    /// Receive-side check: may a call in this mode, sent by `sender_id`,
    /// execute on the local peer?
    pub fn can_execute(self, self_id: u32, sender_id: u32, master_id: u32) -> bool {
        match self {
            RpcMode::Disabled => false,
            RpcMode::Remote | RpcMode::RemoteSync => true,
            // only the authority itself may run a master call
            RpcMode::Master | RpcMode::MasterSync => self_id == master_id,
            // puppets run calls issued by their authority; the authority
            // never runs its own puppet call remotely
            RpcMode::Puppet | RpcMode::PuppetSync => {
                self_id != master_id && sender_id == master_id
            }
        }
    }
}
