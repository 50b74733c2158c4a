//! Process wide counters, reported by the `stats` command.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::backend::{Backend, Error};
use crate::commands::{Command, Name};
use crate::reply::Reply;
use crate::translator::{Processor, VERSION};

#[derive(Debug, Default)]
struct Counter(AtomicU64);

impl Counter {
    fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    fn incr(&self) {
        self.add(1);
    }

    fn decr(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Hit and miss counters of a command that looks up a single key.
#[derive(Debug, Default)]
struct Lookups {
    hits: Counter,
    misses: Counter,
}

#[derive(Debug)]
pub struct Stats {
    started: Instant,
    curr_connections: Counter,
    total_connections: Counter,
    cmd_get: Counter,
    cmd_set: Counter,
    cmd_touch: Counter,
    cmd_flush: Counter,
    get: Lookups,
    delete: Lookups,
    incr: Lookups,
    decr: Lookups,
    touch: Lookups,
    backend_errors: Counter,
    processing_time: Counter,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            curr_connections: Counter::default(),
            total_connections: Counter::default(),
            cmd_get: Counter::default(),
            cmd_set: Counter::default(),
            cmd_touch: Counter::default(),
            cmd_flush: Counter::default(),
            get: Lookups::default(),
            delete: Lookups::default(),
            incr: Lookups::default(),
            decr: Lookups::default(),
            touch: Lookups::default(),
            backend_errors: Counter::default(),
            processing_time: Counter::default(),
        }
    }

    /// Counts a client connection until the returned guard is dropped.
    pub fn connection_opened(self: &Arc<Self>) -> ConnectionGuard {
        self.curr_connections.incr();
        self.total_connections.incr();

        ConnectionGuard {
            stats: self.clone(),
        }
    }

    fn record(&self, name: Name, keys: usize, result: &Result<Reply, Error>, elapsed: Duration) {
        self.processing_time
            .add(elapsed.as_micros().try_into().unwrap_or(u64::MAX));

        let reply = match result {
            Ok(Reply::ServerError(_)) | Err(_) => {
                self.backend_errors.incr();
                return;
            }
            Ok(reply) => reply,
        };

        let lookups = match name {
            Name::Get => {
                let found = match reply {
                    Reply::Values(values) => values.len(),
                    _ => 0,
                };
                self.cmd_get.add(keys as u64);
                self.get.hits.add(found as u64);
                self.get.misses.add(keys.saturating_sub(found) as u64);
                return;
            }
            Name::Set | Name::Add | Name::Replace | Name::Append | Name::Prepend => {
                self.cmd_set.incr();
                return;
            }
            Name::FlushAll => {
                self.cmd_flush.incr();
                return;
            }
            Name::Touch => {
                self.cmd_touch.incr();
                &self.touch
            }
            Name::Delete => &self.delete,
            Name::Incr => &self.incr,
            Name::Decr => &self.decr,
            Name::Version | Name::Stats | Name::Quit => return,
        };

        match reply {
            Reply::NotFound => lookups.misses.incr(),
            Reply::Deleted | Reply::Touched | Reply::Numeric(_) => lookups.hits.incr(),
            _ => {}
        }
    }

    /// Current values, named the way memcached names them.
    pub fn report(&self) -> Vec<(String, String)> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut stats = vec![
            ("pid", std::process::id().to_string()),
            ("uptime", self.started.elapsed().as_secs().to_string()),
            ("time", now.to_string()),
            ("version", VERSION.to_string()),
        ];

        let counters = [
            ("curr_connections", &self.curr_connections),
            ("total_connections", &self.total_connections),
            ("cmd_get", &self.cmd_get),
            ("cmd_set", &self.cmd_set),
            ("cmd_flush", &self.cmd_flush),
            ("cmd_touch", &self.cmd_touch),
            ("get_hits", &self.get.hits),
            ("get_misses", &self.get.misses),
            ("delete_misses", &self.delete.misses),
            ("delete_hits", &self.delete.hits),
            ("incr_misses", &self.incr.misses),
            ("incr_hits", &self.incr.hits),
            ("decr_misses", &self.decr.misses),
            ("decr_hits", &self.decr.hits),
            ("touch_hits", &self.touch.hits),
            ("touch_misses", &self.touch.misses),
            ("backend_errors", &self.backend_errors),
            ("processing_time_us", &self.processing_time),
        ];
        stats.extend(
            counters
                .into_iter()
                .map(|(name, counter)| (name, counter.get().to_string())),
        );

        stats
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ConnectionGuard {
    stats: Arc<Stats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.curr_connections.decr();
    }
}

/// Wraps a [`Processor`], recording every command it handles. Replies pass through unchanged.
pub struct Instrumented<P> {
    inner: P,
    stats: Arc<Stats>,
}

impl<P> Instrumented<P> {
    pub fn new(inner: P, stats: Arc<Stats>) -> Self {
        Self { inner, stats }
    }
}

impl<B: Backend, P: Processor<B>> Processor<B> for Instrumented<P> {
    async fn process(&self, backend: &mut B, command: Command) -> Result<Reply, Error> {
        let name = command.name();
        let keys = command.key_count();
        let started = Instant::now();

        let result = self.inner.process(backend, command).await;

        let elapsed = started.elapsed();
        self.stats.record(name, keys, &result, elapsed);
        debug!(command = name.as_str(), ?elapsed, "Processed command");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryConnection, Store};
    use crate::backend::{Condition, Expiry, Item};
    use crate::commands::delete::Delete;
    use crate::commands::get::Get;
    use crate::translator::Translator;
    use bytes::Bytes;

    fn value(stats: &Stats, name: &str) -> String {
        stats
            .report()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value)
            .unwrap()
    }

    #[test]
    fn connection_guard() {
        let stats = Arc::new(Stats::new());

        let first = stats.connection_opened();
        let second = stats.connection_opened();
        drop(first);

        assert_eq!(value(&stats, "curr_connections"), "1");
        assert_eq!(value(&stats, "total_connections"), "2");

        drop(second);
        assert_eq!(value(&stats, "curr_connections"), "0");
    }

    #[tokio::test]
    async fn counts_hits_and_misses() {
        let stats = Arc::new(Stats::new());
        let processor = Instrumented::new(Translator::new(stats.clone()), stats.clone());
        let mut backend = MemoryConnection::new(Store::new());
        backend
            .store(
                Bytes::from("a"),
                Item::new(0, "1"),
                Expiry::Never,
                Condition::Always,
            )
            .await
            .unwrap();

        let get = Command::Get(Get {
            keys: vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")],
        });
        let reply = processor.process(&mut backend, get).await.unwrap();
        assert!(matches!(reply, Reply::Values(ref values) if values.len() == 1));

        let delete = Command::Delete(Delete {
            key: Bytes::from("b"),
            noreply: false,
        });
        let reply = processor.process(&mut backend, delete).await.unwrap();
        assert_eq!(reply, Reply::NotFound);

        assert_eq!(value(&stats, "cmd_get"), "3");
        assert_eq!(value(&stats, "get_hits"), "1");
        assert_eq!(value(&stats, "get_misses"), "2");
        assert_eq!(value(&stats, "delete_misses"), "1");
        assert_eq!(value(&stats, "delete_hits"), "0");
    }
}
