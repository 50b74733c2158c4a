use bytes::Bytes;

use crate::backend::{Backend, Delta, Error};
use crate::commands::executable::Executable;
use crate::commands::incr::adjust;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Decrements the number stored at key by `delta`. The result never goes below zero.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#incrdecr>
#[derive(Debug, PartialEq)]
pub struct Decr {
    pub key: Bytes,
    pub delta: u64,
    pub noreply: bool,
}

impl Executable for Decr {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        adjust(backend, self.key, Delta::Decr(self.delta)).await
    }
}

impl TryFrom<&mut CommandParser> for Decr {
    type Error = ProtocolError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_key()?;
        let delta = parser.next_delta()?;
        let noreply = parser.noreply()?;

        Ok(Self {
            key,
            delta,
            noreply,
        })
    }
}
