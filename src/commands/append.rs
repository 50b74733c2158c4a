use crate::backend::{Backend, End, Error};
use crate::commands::executable::Executable;
use crate::commands::storage::Storage;
use crate::reply::Reply;

/// Adds the data after the existing value, keeping its flags and expiration.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#append>
#[derive(Debug, PartialEq)]
pub struct Append(pub Storage);

impl Executable for Append {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let Storage { key, data, .. } = self.0;

        if backend.concat(key, data, End::Back).await? {
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

    fn append(data: &str) -> Append {
        Append(Storage {
            key: Bytes::from("key1"),
            flags: 99,
            exptime: 0,
            data: Bytes::from(data.to_string()),
            noreply: false,
        })
    }

    #[tokio::test]
    async fn existing_key() {
        let mut backend = MemoryConnection::new(Store::new());
        backend
            .store(
                Bytes::from("key1"),
                Item::new(5, "Hello"),
                Expiry::Never,
                Condition::Always,
            )
            .await
            .unwrap();

        let reply = append(", World!").exec(&mut backend).await.unwrap();

        assert_eq!(reply, Reply::Stored);
        assert_eq!(
            backend.fetch(&[Bytes::from("key1")]).await.unwrap(),
            vec![Some(Item::new(5, "Hello, World!"))]
        );
    }

    #[tokio::test]
    async fn missing_key() {
        let mut backend = MemoryConnection::new(Store::new());

        let reply = append("data").exec(&mut backend).await.unwrap();

        assert_eq!(reply, Reply::NotStored);
        assert_eq!(
            backend.fetch(&[Bytes::from("key1")]).await.unwrap(),
            vec![None]
        );
    }
}
