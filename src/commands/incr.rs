use bytes::Bytes;

use crate::backend::{Adjusted, Backend, Delta, Error};
use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Increments the number stored at key by `delta`, wrapping around at 2^64.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#incrdecr>
#[derive(Debug, PartialEq)]
pub struct Incr {
    pub key: Bytes,
    pub delta: u64,
    pub noreply: bool,
}

impl Executable for Incr {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        adjust(backend, self.key, Delta::Incr(self.delta)).await
    }
}

impl TryFrom<&mut CommandParser> for Incr {
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

pub(crate) const NON_NUMERIC: &str = "cannot increment or decrement non-numeric value";

pub(crate) async fn adjust<B: Backend>(
    backend: &mut B,
    key: Bytes,
    delta: Delta,
) -> Result<Reply, Error> {
    match backend.adjust(key, delta).await? {
        Adjusted::Value(value) => Ok(Reply::Numeric(value)),
        Adjusted::Missing => Ok(Reply::NotFound),
        Adjusted::NonNumeric => Ok(Reply::ClientError(NON_NUMERIC.to_string())),
    }
}
