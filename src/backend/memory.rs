//! An in-process backend.
//!
//! It implements the same semantics as the Redis backend without a network hop, which makes it
//! the backend of choice for tests and for embedding the proxy.

use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};

use crate::backend::pool::Pool;
use crate::backend::{counter, Adjusted, Backend, Condition, Delta, End, Error, Expiry, Item};

/// The Store is responsible for managing items, with an optional expiration instant for each
/// key. Expired keys are invisible immediately and removed by a background task when their TTL
/// elapses. The store is designed to be thread-safe, allowing it to be shared and cloned cheaply
/// using reference counting.
#[derive(Clone)]
pub struct Store {
    inner: Arc<InnerStore>,
}

impl Store {
    pub fn new() -> Store {
        let state = State {
            entries: HashMap::new(),
            ttls: BTreeSet::new(),
        };

        let inner = Arc::new(InnerStore {
            state: Mutex::new(state),
            waker: Notify::new(),
        });

        tokio::spawn({
            let inner = inner.clone();
            async move { remove_expired_keys(inner).await }
        });

        Self { inner }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Store {
    type Target = InnerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct InnerStore {
    state: Mutex<State>,
    waker: Notify,
}

impl InnerStore {
    pub fn lock(&self) -> InnerStoreLocked<'_> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        InnerStoreLocked {
            state,
            waker: &self.waker,
        }
    }
}

pub struct InnerStoreLocked<'a> {
    state: MutexGuard<'a, State>,
    waker: &'a Notify,
}

impl<'a> InnerStoreLocked<'a> {
    pub fn get(&self, key: &[u8]) -> Option<&Item> {
        self.state
            .entries
            .get(key)
            .filter(|entry| entry.is_live(Instant::now()))
            .map(|entry| &entry.item)
    }

    pub fn set(&mut self, key: Bytes, item: Item, expires_at: Option<Instant>) {
        if let Some(previous) = self.state.entries.remove(&key) {
            self.forget_ttl(&key, previous.expires_at);
        }
        self.state
            .entries
            .insert(key.clone(), Entry { item, expires_at });
        self.track_ttl(key, expires_at);
    }

    /// Replaces the item of a live key, keeping its expiration.
    pub fn replace(&mut self, key: &[u8], item: Item) -> bool {
        let now = Instant::now();
        match self.state.entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.item = item;
                true
            }
            _ => false,
        }
    }

    /// Changes the expiration of a live key.
    pub fn expire(&mut self, key: &[u8], expires_at: Option<Instant>) -> bool {
        let (key, item) = match self.remove_entry(key) {
            Some(removed) => removed,
            None => return false,
        };
        self.set(key, item, expires_at);
        true
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Item> {
        self.remove_entry(key).map(|(_, item)| item)
    }

    pub fn clear(&mut self) {
        self.state.entries.clear();
        self.state.ttls.clear();
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Number of stored keys, including expired ones not purged yet.
    pub fn size(&self) -> usize {
        self.state.entries.len()
    }

    pub fn remove_expired_keys(&mut self) -> Option<Instant> {
        let now = Instant::now();

        let expired_keys: Vec<(Instant, Bytes)> = self
            .state
            .ttls
            .iter()
            .take_while(|(expires_at, _)| expires_at <= &now)
            .cloned()
            .collect();

        for (when, key) in expired_keys {
            self.state.entries.remove(&key);
            self.state.ttls.remove(&(when, key));
        }

        self.state
            .ttls
            .iter()
            .next()
            .map(|&(expires_at, _)| expires_at)
    }

    fn remove_entry(&mut self, key: &[u8]) -> Option<(Bytes, Item)> {
        let (key, entry) = self.state.entries.remove_entry(key)?;
        self.forget_ttl(&key, entry.expires_at);
        entry.is_live(Instant::now()).then_some((key, entry.item))
    }

    fn track_ttl(&mut self, key: Bytes, expires_at: Option<Instant>) {
        let Some(expires_at) = expires_at else {
            return;
        };

        self.state.ttls.insert((expires_at, key.clone()));

        let next_to_expire = self.state.ttls.iter().next().map(|(_, key)| key);
        if next_to_expire == Some(&key) {
            self.waker.notify_one();
        }
    }

    fn forget_ttl(&mut self, key: &Bytes, expires_at: Option<Instant>) {
        if let Some(expires_at) = expires_at {
            self.state.ttls.remove(&(expires_at, key.clone()));
        }
    }
}

struct Entry {
    item: Item,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

struct State {
    entries: HashMap<Bytes, Entry>,
    ttls: BTreeSet<(Instant, Bytes)>,
}

async fn remove_expired_keys(store: Arc<InnerStore>) {
    loop {
        let next_expiration = store.lock().remove_expired_keys();

        if let Some(next_expiration) = next_expiration {
            tokio::select! {
                _ = sleep_until(next_expiration) => {}
                _ = store.waker.notified() => {}
            }
        } else {
            store.waker.notified().await;
        }
    }
}

fn deadline(expiry: Expiry) -> Option<Instant> {
    match expiry {
        Expiry::Never => None,
        Expiry::After(ttl) => Some(Instant::now() + ttl),
    }
}

/// A connection to a [`Store`]. Every connection of a [`MemoryPool`] shares the same store.
pub struct MemoryConnection {
    store: Store,
}

impl MemoryConnection {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

impl Backend for MemoryConnection {
    async fn fetch(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Item>>, Error> {
        let store = self.store.lock();
        Ok(keys.iter().map(|key| store.get(key).cloned()).collect())
    }

    async fn store(
        &mut self,
        key: Bytes,
        item: Item,
        expiry: Expiry,
        condition: Condition,
    ) -> Result<bool, Error> {
        let mut store = self.store.lock();

        let allowed = match condition {
            Condition::Always => true,
            Condition::IfAbsent => !store.exists(&key),
            Condition::IfPresent => store.exists(&key),
        };
        if allowed {
            store.set(key, item, deadline(expiry));
        }

        Ok(allowed)
    }

    async fn adjust(&mut self, key: Bytes, delta: Delta) -> Result<Adjusted, Error> {
        let mut store = self.store.lock();

        let Some(item) = store.get(&key) else {
            return Ok(Adjusted::Missing);
        };
        let Some(current) = counter(&item.data) else {
            return Ok(Adjusted::NonNumeric);
        };

        let value = delta.apply(current);
        let item = Item::new(item.flags, value.to_string());
        store.replace(&key, item);

        Ok(Adjusted::Value(value))
    }

    async fn concat(&mut self, key: Bytes, data: Bytes, end: End) -> Result<bool, Error> {
        let mut store = self.store.lock();

        let Some(item) = store.get(&key) else {
            return Ok(false);
        };
        let joined = match end {
            End::Front => [&data[..], &item.data[..]].concat(),
            End::Back => [&item.data[..], &data[..]].concat(),
        };
        let item = Item::new(item.flags, joined);
        store.replace(&key, item);

        Ok(true)
    }

    async fn delete(&mut self, key: Bytes) -> Result<bool, Error> {
        Ok(self.store.lock().remove(&key).is_some())
    }

    async fn touch(&mut self, key: Bytes, expiry: Expiry) -> Result<bool, Error> {
        Ok(self.store.lock().expire(&key, deadline(expiry)))
    }

    async fn flush(&mut self) -> Result<(), Error> {
        self.store.lock().clear();
        Ok(())
    }
}

/// Hands out connections to one shared [`Store`]. There is no connection limit.
#[derive(Clone, Default)]
pub struct MemoryPool {
    store: Store,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl Pool for MemoryPool {
    type Backend = MemoryConnection;
    type Handle = Box<MemoryConnection>;

    async fn acquire(&self) -> Result<Self::Handle, Error> {
        Ok(Box::new(MemoryConnection::new(self.store.clone())))
    }

    fn discard(&self, handle: Self::Handle) {
        drop(handle);
    }
}
