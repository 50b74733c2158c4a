use crate::backend::{Backend, Condition, Error, Item};
use crate::commands::executable::Executable;
use crate::commands::exptime::expiry;
use crate::commands::storage::Storage;
use crate::reply::Reply;

/// Stores the data only if the key already exists.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#replace>
#[derive(Debug, PartialEq)]
pub struct Replace(pub Storage);

impl Executable for Replace {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let Storage {
            key,
            flags,
            exptime,
            data,
            ..
        } = self.0;

        let stored = match expiry(exptime) {
            Some(expiry) => {
                backend
                    .store(key, Item::new(flags, data), expiry, Condition::IfPresent)
                    .await?
            }
            None => backend.delete(key).await?,
        };

        match stored {
            true => Ok(Reply::Stored),
            false => Ok(Reply::NotStored),
        }
    }
}
