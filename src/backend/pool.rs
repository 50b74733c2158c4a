//! Backend connection pooling.
//!
//! Sessions only see the [`Pool`] trait, so tests can hand the server any pool they like. The
//! Redis pool is a [`deadpool`] managed pool: connections are dialed and authenticated lazily,
//! idle connections are pinged before reuse when they have not been used for a while, and the
//! number of live connections never exceeds `max_connections`.

use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult};
use deadpool::Runtime;
use std::cell::Cell;
use std::future::Future;
use std::ops::DerefMut;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::redis::RedisConnection;
use crate::backend::{Backend, Error};

/// Idle connections unused for longer than this are pinged before being handed out.
const FRESHNESS: Duration = Duration::from_secs(60);

/// How often idle connections above `max_idle` are closed.
const REAP_INTERVAL: Duration = Duration::from_secs(30);

/// A source of backend connections shared by every session.
///
/// A handle is released back to the pool when dropped. Handles whose connection failed must be
/// given to [`Pool::discard`] instead so the connection is never reused.
pub trait Pool: Clone + Send + Sync + 'static {
    type Backend: Backend;
    type Handle: DerefMut<Target = Self::Backend> + Send;

    fn acquire(&self) -> impl Future<Output = Result<Self::Handle, Error>> + Send;

    fn discard(&self, handle: Self::Handle);
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// `host:port` of the backend.
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub max_idle: usize,
    pub max_connections: usize,
    /// Bounds dialing, waiting for a free connection and every backend round trip.
    pub timeout: Duration,
}

/// Dials, authenticates and health-checks Redis connections for [`RedisPool`].
pub struct Manager {
    config: PoolConfig,
}

impl managed::Manager for Manager {
    type Type = RedisConnection;
    type Error = Error;

    async fn create(&self) -> Result<RedisConnection, Error> {
        let mut conn = RedisConnection::connect(&self.config.address, self.config.timeout).await?;

        if let Some(password) = &self.config.password {
            conn.auth(self.config.username.as_deref(), password).await?;
        }
        if self.config.database != 0 {
            conn.select(self.config.database).await?;
        }

        debug!(address = %self.config.address, "Opened backend connection");
        Ok(conn)
    }

    async fn recycle(&self, conn: &mut RedisConnection, metrics: &Metrics) -> RecycleResult<Error> {
        if metrics.last_used() < FRESHNESS {
            return Ok(());
        }

        conn.ping().await.map_err(RecycleError::Backend)
    }
}

#[derive(Clone)]
pub struct RedisPool {
    inner: managed::Pool<Manager>,
    max_idle: usize,
}

impl RedisPool {
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        let max_idle = config.max_idle;
        let timeout = config.timeout;

        let inner = managed::Pool::builder(Manager {
            config: config.clone(),
        })
        .max_size(config.max_connections)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .recycle_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|err| Error::Pool(err.to_string()))?;

        Ok(Self { inner, max_idle })
    }

    /// Periodically closes idle connections beyond `max_idle`.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let pool = self.inner.clone();
        let max_idle = self.max_idle;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);
            loop {
                interval.tick().await;

                let kept = Cell::new(0usize);
                pool.retain(|_, _| {
                    kept.set(kept.get() + 1);
                    kept.get() <= max_idle
                });
            }
        })
    }
}

impl Pool for RedisPool {
    type Backend = RedisConnection;
    type Handle = Object<Manager>;

    async fn acquire(&self) -> Result<Self::Handle, Error> {
        self.inner.get().await.map_err(|err| match err {
            PoolError::Backend(err) => err,
            PoolError::Timeout(_) => Error::Pool("timed out waiting for a connection".to_string()),
            err => Error::Pool(err.to_string()),
        })
    }

    fn discard(&self, handle: Self::Handle) {
        warn!("Discarding backend connection");
        // Detached from the pool, the connection is closed when dropped.
        drop(Object::take(handle));
    }
}
