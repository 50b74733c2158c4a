use crate::backend::{Backend, Condition, Error, Item};
use crate::commands::executable::Executable;
use crate::commands::exptime::expiry;
use crate::commands::storage::Storage;
use crate::reply::Reply;

/// Stores the data only if the key does not exist yet.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#add>
#[derive(Debug, PartialEq)]
pub struct Add(pub Storage);

impl Executable for Add {
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
                    .store(key, Item::new(flags, data), expiry, Condition::IfAbsent)
                    .await?
            }
            // An expired item would vanish right away, only the precondition is observable.
            None => {
                let current = backend.fetch(&[key]).await?;
                current.iter().all(Option::is_none)
            }
        };

        match stored {
            true => Ok(Reply::Stored),
            false => Ok(Reply::NotStored),
        }
    }
}
