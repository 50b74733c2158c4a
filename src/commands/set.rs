use crate::backend::{Backend, Condition, Error, Item};
use crate::commands::executable::Executable;
use crate::commands::exptime::expiry;
use crate::commands::storage::Storage;
use crate::reply::Reply;

/// Stores the data unconditionally.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#set>
#[derive(Debug, PartialEq)]
pub struct Set(pub Storage);

impl Executable for Set {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let Storage {
            key,
            flags,
            exptime,
            data,
            ..
        } = self.0;

        match expiry(exptime) {
            Some(expiry) => {
                backend
                    .store(key, Item::new(flags, data), expiry, Condition::Always)
                    .await?;
            }
            // Storing an already expired item leaves nothing behind.
            None => {
                backend.delete(key).await?;
            }
        }

        Ok(Reply::Stored)
    }
}
