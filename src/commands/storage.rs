use bytes::Bytes;

use crate::commands::CommandParser;
use crate::error::ProtocolError;

/// Arguments shared by the storage commands:
/// `<command name> <key> <flags> <exptime> <bytes> [noreply]` followed by the data block.
#[derive(Debug, Clone, PartialEq)]
pub struct Storage {
    pub key: Bytes,
    pub flags: u32,
    pub exptime: i64,
    pub data: Bytes,
    pub noreply: bool,
}

impl Storage {
    /// Parses the command line; `data` stays empty until the block is read. Also returns the
    /// announced block length.
    pub(crate) fn parse(parser: &mut CommandParser) -> Result<(Self, usize), ProtocolError> {
        let key = parser.next_key()?;
        let flags = parser.next_flags()?;
        let exptime = parser.next_exptime()?;
        let bytes = parser.next_length()?;
        let noreply = parser.noreply()?;

        let storage = Self {
            key,
            flags,
            exptime,
            data: Bytes::new(),
            noreply,
        };

        Ok((storage, bytes))
    }
}
