//! The key-value store the proxy persists into.
//!
//! [`Backend`] lists the primitives the memcache commands are translated to. The production
//! implementation talks to Redis ([`redis::RedisConnection`]) and is handed out by a
//! [`pool::Pool`]; [`memory`] provides an in-process store with the same semantics.

pub mod memory;
pub mod pool;
pub mod redis;

use bytes::{BufMut, Bytes, BytesMut};
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error as ThisError;

use crate::resp::frame;

/// Size of the flags header that prefixes every stored value.
pub const HEADER_LEN: usize = 4;

/// A value together with its client flags.
///
/// The backend has no notion of flags, so items are stored as the big-endian flags followed by
/// the raw data.
#[derive(Clone, Debug, PartialEq)]
pub struct Item {
    pub flags: u32,
    pub data: Bytes,
}

impl Item {
    pub fn new(flags: u32, data: impl Into<Bytes>) -> Self {
        Self {
            flags,
            data: data.into(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.put_u32(self.flags);
        buf.extend_from_slice(&self.data);
        buf.freeze()
    }

    pub fn decode(raw: Bytes) -> Result<Self, Error> {
        if raw.len() < HEADER_LEN {
            return Err(Error::Malformed(raw.len()));
        }

        let mut header = [0u8; HEADER_LEN];
        header.copy_from_slice(&raw[..HEADER_LEN]);

        Ok(Self {
            flags: u32::from_be_bytes(header),
            data: raw.slice(HEADER_LEN..),
        })
    }
}

/// When a stored item stops being visible.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expiry {
    Never,
    After(Duration),
}

/// Precondition of a store operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    IfAbsent,
    IfPresent,
}

/// A change applied to the number stored at a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delta {
    /// Adds, wrapping around at 2^64.
    Incr(u64),
    /// Subtracts, stopping at zero.
    Decr(u64),
}

impl Delta {
    pub fn apply(self, value: u64) -> u64 {
        match self {
            Delta::Incr(amount) => value.wrapping_add(amount),
            Delta::Decr(amount) => value.saturating_sub(amount),
        }
    }
}

/// Outcome of [`Backend::adjust`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Adjusted {
    Missing,
    /// The stored data is not a decimal number, nothing was written.
    NonNumeric,
    /// The number now stored.
    Value(u64),
}

/// The end of a value that [`Backend::concat`] extends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum End {
    Front,
    Back,
}

/// Reads stored data as a counter: decimal digits, optionally padded with trailing spaces.
pub fn counter(data: &[u8]) -> Option<u64> {
    let end = data.iter().rposition(|b| *b != b' ')? + 1;
    let digits = &data[..end];
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("backend i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("backend closed the connection")]
    Closed,
    #[error("backend did not answer within {0:?}")]
    Timeout(Duration),
    #[error("backend protocol error: {0}")]
    Protocol(String),
    #[error("unexpected backend reply: {0}")]
    UnexpectedReply(String),
    #[error("no backend connection available: {0}")]
    Pool(String),
    /// An error reply sent by the backend for a single command.
    #[error("{0}")]
    Server(String),
    #[error("stored value is malformed ({0} bytes)")]
    Malformed(usize),
}

impl Error {
    /// Fatal errors leave the connection in an unknown state; it must not be used again.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Server(_) | Error::Malformed(_))
    }
}

impl From<frame::Error> for Error {
    fn from(err: frame::Error) -> Self {
        match err {
            frame::Error::Io(err) => Error::Io(err),
            err => Error::Protocol(err.to_string()),
        }
    }
}

/// The primitives memcache commands are translated into.
///
/// Semantic outcomes (a missing key, a failed precondition) are reported in the return values;
/// `Err` is reserved for failures of the backend itself.
pub trait Backend: Send {
    /// Fetches the items stored at `keys`, in order, `None` for missing keys.
    fn fetch(
        &mut self,
        keys: &[Bytes],
    ) -> impl Future<Output = Result<Vec<Option<Item>>, Error>> + Send;

    /// Stores `item` at `key` if `condition` holds. Returns whether it was stored.
    fn store(
        &mut self,
        key: Bytes,
        item: Item,
        expiry: Expiry,
        condition: Condition,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Applies `delta` to the [`counter`] stored at `key` in one atomic step, keeping the
    /// item's flags and expiry.
    fn adjust(
        &mut self,
        key: Bytes,
        delta: Delta,
    ) -> impl Future<Output = Result<Adjusted, Error>> + Send;

    /// Adds `data` to one end of the value at `key` in one atomic step, keeping the item's flags
    /// and expiry. Returns whether the key existed.
    fn concat(
        &mut self,
        key: Bytes,
        data: Bytes,
        end: End,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes `key`. Returns whether it existed.
    fn delete(&mut self, key: Bytes) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Sets a new expiry on `key`. Returns whether it existed.
    fn touch(
        &mut self,
        key: Bytes,
        expiry: Expiry,
    ) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every key.
    fn flush(&mut self) -> impl Future<Output = Result<(), Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_layout() {
        let item = Item::new(0x01020304, "value");

        assert_eq!(&item.encode()[..], b"\x01\x02\x03\x04value");
        assert_eq!(Item::decode(item.encode()).unwrap(), item);
    }

    #[test]
    fn item_with_empty_data() {
        let item = Item::decode(Bytes::from_static(b"\x00\x00\x00\x07")).unwrap();

        assert_eq!(item, Item::new(7, Bytes::new()));
    }

    #[test]
    fn item_too_short() {
        let err = Item::decode(Bytes::from_static(b"abc")).unwrap_err();

        assert!(matches!(err, Error::Malformed(3)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_errors() {
        assert!(Error::Closed.is_fatal());
        assert!(Error::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(Error::Protocol("x".to_string()).is_fatal());
        assert!(!Error::Server("WRONGTYPE".to_string()).is_fatal());
    }

    #[test]
    fn counters() {
        assert_eq!(counter(b"42"), Some(42));
        assert_eq!(counter(b"007"), Some(7));
        assert_eq!(counter(b"8   "), Some(8));
        assert_eq!(counter(b"18446744073709551615"), Some(u64::MAX));
        assert_eq!(counter(b"18446744073709551616"), None);
        assert_eq!(counter(b"+1"), None);
        assert_eq!(counter(b" 1"), None);
        assert_eq!(counter(b"1a"), None);
        assert_eq!(counter(b""), None);
        assert_eq!(counter(b"   "), None);
    }

    #[test]
    fn deltas() {
        assert_eq!(Delta::Incr(1).apply(10), 11);
        assert_eq!(Delta::Incr(2).apply(u64::MAX), 1);
        assert_eq!(Delta::Decr(20).apply(5), 0);
        assert_eq!(Delta::Decr(1).apply(5), 4);
    }
}
