use bytes::Bytes;

use crate::backend::{Backend, Error};
use crate::commands::executable::Executable;
use crate::commands::exptime::expiry;
use crate::commands::CommandParser;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Updates the expiration time of an existing key without fetching it.
///
/// Ref: <https://github.com/memcached/memcached/wiki/Commands#touch>
#[derive(Debug, PartialEq)]
pub struct Touch {
    pub key: Bytes,
    pub exptime: i64,
    pub noreply: bool,
}

impl Executable for Touch {
    async fn exec<B: Backend>(self, backend: &mut B) -> Result<Reply, Error> {
        let touched = match expiry(self.exptime) {
            Some(expiry) => backend.touch(self.key, expiry).await?,
            None => backend.delete(self.key).await?,
        };

        match touched {
            true => Ok(Reply::Touched),
            false => Ok(Reply::NotFound),
        }
    }
}

impl TryFrom<&mut CommandParser> for Touch {
    type Error = ProtocolError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_key()?;
        let exptime = parser.next_exptime()?;
        let noreply = parser.noreply()?;

        Ok(Self {
            key,
            exptime,
            noreply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnection, Store};
    use crate::backend::{Condition, Expiry, Item};
    use std::time::Duration;
    use tokio::time;

    fn touch(exptime: i64) -> Touch {
        Touch {
            key: Bytes::from("key1"),
            exptime,
            noreply: false,
        }
    }

    async fn seeded(expiry: Expiry) -> MemoryConnection {
        let mut backend = MemoryConnection::new(Store::new());
        backend
            .store(Bytes::from("key1"), Item::new(0, "v"), expiry, Condition::Always)
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn extends_expiration() {
        time::pause();
        let mut backend = seeded(Expiry::After(Duration::from_secs(5))).await;

        let reply = touch(100).exec(&mut backend).await.unwrap();
        assert_eq!(reply, Reply::Touched);

        time::advance(Duration::from_secs(10)).await;

        assert_eq!(
            backend.fetch(&[Bytes::from("key1")]).await.unwrap(),
            vec![Some(Item::new(0, "v"))]
        );
    }

    #[tokio::test]
    async fn missing_key() {
        let mut backend = MemoryConnection::new(Store::new());

        assert_eq!(touch(100).exec(&mut backend).await.unwrap(), Reply::NotFound);
    }

    #[tokio::test]
    async fn expired_touch_removes_the_key() {
        let mut backend = seeded(Expiry::Never).await;

        assert_eq!(touch(-1).exec(&mut backend).await.unwrap(), Reply::Touched);
        assert_eq!(
            backend.fetch(&[Bytes::from("key1")]).await.unwrap(),
            vec![None]
        );
    }
}
