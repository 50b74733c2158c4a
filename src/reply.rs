use bytes::{Bytes, BytesMut};
use std::fmt;

use crate::error::ProtocolError;

static CRLF: &[u8; 2] = b"\r\n";

/// An item returned by a retrieval command.
#[derive(Clone, Debug, PartialEq)]
pub struct Value {
    pub key: Bytes,
    pub flags: u32,
    pub data: Bytes,
}

/// Everything the proxy can answer to a memcache client.
///
/// Ref: <https://github.com/memcached/memcached/blob/master/doc/protocol.txt>
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
    Ok,
    /// Zero or more `VALUE` blocks followed by `END`.
    Values(Vec<Value>),
    Numeric(u64),
    Version(String),
    Stats(Vec<(String, String)>),
    Error,
    ClientError(String),
    ServerError(String),
}

impl Reply {
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            Reply::Stored => line(dst, b"STORED"),
            Reply::NotStored => line(dst, b"NOT_STORED"),
            Reply::Exists => line(dst, b"EXISTS"),
            Reply::NotFound => line(dst, b"NOT_FOUND"),
            Reply::Deleted => line(dst, b"DELETED"),
            Reply::Touched => line(dst, b"TOUCHED"),
            Reply::Ok => line(dst, b"OK"),
            Reply::Values(values) => {
                for value in values {
                    dst.reserve(value.key.len() + value.data.len() + 32);
                    dst.extend_from_slice(b"VALUE ");
                    dst.extend_from_slice(&value.key);
                    dst.extend_from_slice(format!(" {} {}", value.flags, value.data.len()).as_bytes());
                    dst.extend_from_slice(CRLF);
                    dst.extend_from_slice(&value.data);
                    dst.extend_from_slice(CRLF);
                }
                line(dst, b"END");
            }
            Reply::Numeric(n) => line(dst, n.to_string().as_bytes()),
            Reply::Version(version) => line(dst, format!("VERSION {}", version).as_bytes()),
            Reply::Stats(stats) => {
                for (name, value) in stats {
                    line(dst, format!("STAT {} {}", name, value).as_bytes());
                }
                line(dst, b"END");
            }
            Reply::Error => line(dst, b"ERROR"),
            Reply::ClientError(msg) => line(dst, format!("CLIENT_ERROR {}", msg).as_bytes()),
            Reply::ServerError(msg) => line(dst, format!("SERVER_ERROR {}", msg).as_bytes()),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = BytesMut::new();
        self.write_to(&mut bytes);
        bytes.to_vec()
    }
}

fn line(dst: &mut BytesMut, token: &[u8]) {
    dst.extend_from_slice(token);
    dst.extend_from_slice(CRLF);
}

impl From<ProtocolError> for Reply {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::UnknownCommand(_) | ProtocolError::NoKeys => Reply::Error,
            ProtocolError::TooLarge => Reply::ServerError(err.to_string()),
            err => Reply::ClientError(err.to_string()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Values(values) => write!(f, "{} value(s)", values.len()),
            Reply::Stats(stats) => write!(f, "{} stat(s)", stats.len()),
            reply => {
                let bytes = reply.serialize();
                write!(f, "{}", String::from_utf8_lossy(&bytes).trim_end())
            }
        }
    }
}
