use bytes::Bytes;

use crate::backend::{Backend, Error};
use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Removes a key.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#delete>
#[derive(Debug, PartialEq)]
pub struct Delete {
    pub key: Bytes,
    pub noreply: bool,
}

impl Executable for Delete {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        match backend.delete(self.key).await? {
            true => Ok(Reply::Deleted),
            false => Ok(Reply::NotFound),
        }
    }
}

impl TryFrom<&mut CommandParser> for Delete {
    type Error = ProtocolError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_key()?;

        // Old clients send a hold time, which has to be zero.
        let mut rest = Vec::new();
        while parser.has_next() {
            rest.push(parser.next_token()?);
        }
        let noreply = match rest.iter().map(|t| &t[..]).collect::<Vec<_>>()[..] {
            [] | [b"0"] => false,
            [b"noreply"] | [b"0", b"noreply"] => true,
            _ => return Err(ProtocolError::BadFormat),
        };

        Ok(Self { key, noreply })
    }
}
