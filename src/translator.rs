//! Translation of memcache commands into backend operations.

use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use crate::backend::{Backend, Error};
use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::reply::Reply;
use crate::stats::Stats;

/// Version reported by the `version` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Turns a command into its reply using a borrowed backend connection.
///
/// `Err` means the connection itself failed and must not be reused; everything else, including
/// errors the backend reported for this command alone, is a [`Reply`].
pub trait Processor<B: Backend>: Send + Sync {
    fn process(
        &self,
        backend: &mut B,
        command: Command,
    ) -> impl Future<Output = Result<Reply, Error>> + Send;
}

pub struct Translator {
    stats: Arc<Stats>,
}

impl Translator {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self { stats }
    }
}

impl<B: Backend> Processor<B> for Translator {
    async fn process(&self, backend: &mut B, command: Command) -> Result<Reply, Error> {
        let result = match command {
            Command::Get(cmd) => cmd.exec(backend).await,
            Command::Set(cmd) => cmd.exec(backend).await,
            Command::Add(cmd) => cmd.exec(backend).await,
            Command::Replace(cmd) => cmd.exec(backend).await,
            Command::Append(cmd) => cmd.exec(backend).await,
            Command::Prepend(cmd) => cmd.exec(backend).await,
            Command::Delete(cmd) => cmd.exec(backend).await,
            Command::Incr(cmd) => cmd.exec(backend).await,
            Command::Decr(cmd) => cmd.exec(backend).await,
            Command::Touch(cmd) => cmd.exec(backend).await,
            Command::FlushAll(cmd) => cmd.exec(backend).await,
            Command::Version => Ok(Reply::Version(VERSION.to_string())),
            Command::Stats => Ok(Reply::Stats(self.stats.report())),
            // Sessions close the connection before `quit` gets here.
            Command::Quit => Ok(Reply::Ok),
        };

        match result {
            Err(err) if !err.is_fatal() => {
                warn!(%err, "Backend rejected command");
                Ok(Reply::ServerError(err.to_string()))
            }
            result => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnection, Store};
    use crate::backend::{Adjusted, Condition, Delta, End, Expiry, Item};
    use crate::commands::get::Get;
    use crate::commands::incr::Incr;
    use bytes::Bytes;

    /// A backend whose every operation fails with the given error.
    struct Failing(fn() -> Error);

    impl Backend for Failing {
        async fn fetch(&mut self, _: &[Bytes]) -> Result<Vec<Option<Item>>, Error> {
            Err((self.0)())
        }

        async fn store(&mut self, _: Bytes, _: Item, _: Expiry, _: Condition) -> Result<bool, Error> {
            Err((self.0)())
        }

        async fn adjust(&mut self, _: Bytes, _: Delta) -> Result<Adjusted, Error> {
            Err((self.0)())
        }

        async fn concat(&mut self, _: Bytes, _: Bytes, _: End) -> Result<bool, Error> {
            Err((self.0)())
        }

        async fn delete(&mut self, _: Bytes) -> Result<bool, Error> {
            Err((self.0)())
        }

        async fn touch(&mut self, _: Bytes, _: Expiry) -> Result<bool, Error> {
            Err((self.0)())
        }

        async fn flush(&mut self) -> Result<(), Error> {
            Err((self.0)())
        }
    }

    fn translator() -> Translator {
        Translator::new(Arc::new(Stats::new()))
    }

    fn get(key: &'static str) -> Command {
        Command::Get(Get {
            keys: vec![Bytes::from(key)],
        })
    }

    #[tokio::test]
    async fn version() {
        let mut backend = MemoryConnection::new(Store::new());

        let reply = translator()
            .process(&mut backend, Command::Version)
            .await
            .unwrap();

        assert_eq!(reply, Reply::Version(VERSION.to_string()));
    }

    #[tokio::test]
    async fn stats() {
        let mut backend = MemoryConnection::new(Store::new());

        let reply = translator()
            .process(&mut backend, Command::Stats)
            .await
            .unwrap();

        let Reply::Stats(stats) = reply else {
            panic!("expected stats, got {:?}", reply);
        };
        assert!(stats.iter().any(|(name, _)| name == "uptime"));
    }

    #[tokio::test]
    async fn malformed_item_is_a_server_error() {
        let mut backend = Failing(|| Error::Malformed(2));

        let reply = translator().process(&mut backend, get("key1")).await.unwrap();

        assert_eq!(
            reply,
            Reply::ServerError("stored value is malformed (2 bytes)".to_string())
        );
    }

    #[tokio::test]
    async fn error_replies_are_server_errors() {
        let mut backend = Failing(|| Error::Server("BUSY script running".to_string()));
        let cmd = Command::Incr(Incr {
            key: Bytes::from("key1"),
            delta: 1,
            noreply: false,
        });

        let reply = translator().process(&mut backend, cmd).await.unwrap();

        assert_eq!(
            reply,
            Reply::ServerError("BUSY script running".to_string())
        );
    }

    #[tokio::test]
    async fn fatal_errors_propagate() {
        let mut backend = Failing(|| Error::Closed);

        let result = translator().process(&mut backend, get("key1")).await;

        assert!(matches!(result, Err(Error::Closed)));
    }
}
