use bytes::Bytes;

use crate::backend::{Backend, Error};
use crate::commands::executable::Executable;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::{Reply, Value};

/// Retrieves the values of one or more keys. Missing keys are left out of the reply.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#get>
#[derive(Debug, PartialEq)]
pub struct Get {
    pub keys: Vec<Bytes>,
}

impl Executable for Get {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let items = backend.fetch(&self.keys).await?;

        let values = self
            .keys
            .into_iter()
            .zip(items)
            .filter_map(|(key, item)| {
                item.map(|item| Value {
                    key,
                    flags: item.flags,
                    data: item.data,
                })
            })
            .collect();

        Ok(Reply::Values(values))
    }
}

impl TryFrom<&mut CommandParser> for Get {
    type Error = ProtocolError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        if !parser.has_next() {
            return Err(ProtocolError::NoKeys);
        }

        let mut keys = vec![parser.next_key()?];
        while parser.has_next() {
            keys.push(parser.next_key()?);
        }

        Ok(Self { keys })
    }
}
