use crate::backend::{Backend, Error};
use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Removes every key of the backend database. Delayed flushes are not supported.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#flush_all>
#[derive(Debug, PartialEq)]
pub struct FlushAll {
    pub noreply: bool,
}

impl Executable for FlushAll {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        backend.flush().await?;
        Ok(Reply::Ok)
    }
}

impl TryFrom<&mut CommandParser> for FlushAll {
    type Error = ProtocolError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let noreply = parser.noreply()?;
        Ok(Self { noreply })
    }
}
