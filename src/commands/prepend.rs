use crate::backend::{Backend, End, Error};
use crate::commands::executable::Executable;
use crate::commands::storage::Storage;
use crate::reply::Reply;

/// Adds the data before the existing value, keeping its flags and expiration.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#prepend>
#[derive(Debug, PartialEq)]
pub struct Prepend(pub Storage);

impl Executable for Prepend {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let Storage { key, data, .. } = self.0;

        if backend.concat(key, data, End::Front).await? {
            Ok(Reply::Stored)
        } else {
            Ok(Reply::NotStored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnection, Store};
    use crate::backend::{Condition, Expiry, Item};
    use bytes::Bytes;

    #[tokio::test]
    async fn existing_key() {
        let mut backend = MemoryConnection::new(Store::new());
        backend
            .store(
                Bytes::from("key1"),
                Item::new(8, "World"),
                Expiry::Never,
                Condition::Always,
            )
            .await
            .unwrap();

        let cmd = Prepend(Storage {
            key: Bytes::from("key1"),
            flags: 0,
            exptime: 0,
            data: Bytes::from("Hello, "),
            noreply: false,
        });
        let reply = cmd.exec(&mut backend).await.unwrap();

        assert_eq!(reply, Reply::Stored);
        assert_eq!(
            backend.fetch(&[Bytes::from("key1")]).await.unwrap(),
            vec![Some(Item::new(8, "Hello, World"))]
        );
    }
}
