// The command discriminant at the head of every protocol packet

use crate::error::PacketError;

pub const COMMAND_REMOTE_CALL: u8 = 0;
pub const COMMAND_REMOTE_SET: u8 = 1;
pub const COMMAND_SIMPLIFY_PATH: u8 = 2;
pub const COMMAND_CONFIRM_PATH: u8 = 3;
pub const COMMAND_RAW: u8 = 4;

#[derive(Copy, Debug, Clone, Eq, PartialEq)]
pub enum NetworkCommand {
    // Invoke a method on a tree-addressed object
    RemoteCall,
    // Assign a property on a tree-addressed object
    RemoteSet,
    // Offer a small integer id in place of a full hierarchical path
    SimplifyPath,
    // Acknowledge a SimplifyPath offer; the id is usable from here on
    ConfirmPath,
    // Opaque application bytes, forwarded verbatim
    Raw,
}

impl NetworkCommand {
    pub fn to_byte(self) -> u8 {
        match self {
            NetworkCommand::RemoteCall => COMMAND_REMOTE_CALL,
            NetworkCommand::RemoteSet => COMMAND_REMOTE_SET,
            NetworkCommand::SimplifyPath => COMMAND_SIMPLIFY_PATH,
            NetworkCommand::ConfirmPath => COMMAND_CONFIRM_PATH,
            NetworkCommand::Raw => COMMAND_RAW,
        }
    }

    /// Decode the discriminant byte. Unknown bytes are a protocol error for
    /// the packet carrying them, not for the connection.
    pub fn from_byte(byte: u8) -> Result<Self, PacketError> {
        match byte {
            COMMAND_REMOTE_CALL => Ok(NetworkCommand::RemoteCall),
            COMMAND_REMOTE_SET => Ok(NetworkCommand::RemoteSet),
            COMMAND_SIMPLIFY_PATH => Ok(NetworkCommand::SimplifyPath),
            COMMAND_CONFIRM_PATH => Ok(NetworkCommand::ConfirmPath),
            COMMAND_RAW => Ok(NetworkCommand::Raw),
            _ => Err(PacketError::UnknownCommand { byte }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NetworkCommand;
    use crate::error::PacketError;

    #[test]
    fn round_trips() {
        for command in [
            NetworkCommand::RemoteCall,
            NetworkCommand::RemoteSet,
            NetworkCommand::SimplifyPath,
            NetworkCommand::ConfirmPath,
            NetworkCommand::Raw,
        ] {
            assert_eq!(NetworkCommand::from_byte(command.to_byte()).unwrap(), command);
        }
    }

    #[test]
    fn unknown_byte_is_an_error() {
        assert_eq!(
            NetworkCommand::from_byte(0xFF),
            Err(PacketError::UnknownCommand { byte: 0xFF })
        );
    }
}
