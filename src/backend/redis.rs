use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio_util::codec::Framed;

use crate::backend::{counter, Adjusted, Backend, Condition, Delta, End, Error, Expiry, Item};
use crate::resp::{Frame, RespCodec};

/// Read-modify-write operations run server side so concurrent clients never race.
const ADJUST_SCRIPT: &str = include_str!("scripts/adjust.lua");
const CONCAT_SCRIPT: &str = include_str!("scripts/concat.lua");

/// A connection to a Redis server speaking RESP2.
///
/// Requests are strictly sequential: every command waits for its reply before the next one is
/// sent, and every round trip is bounded by the configured timeout.
pub struct RedisConnection {
    framed: Framed<TcpStream, RespCodec>,
    timeout: Duration,
}

impl RedisConnection {
    pub async fn connect(address: &str, timeout: Duration) -> Result<Self, Error> {
        let stream = with_timeout(timeout, dial(address)).await?;
        stream.set_nodelay(true)?;

        Ok(Self {
            framed: Framed::new(stream, RespCodec),
            timeout,
        })
    }

    pub async fn auth(&mut self, username: Option<&str>, password: &str) -> Result<(), Error> {
        let reply = match username {
            Some(username) => {
                self.query(&[b"AUTH", username.as_bytes(), password.as_bytes()])
                    .await?
            }
            None => self.query(&[b"AUTH", password.as_bytes()]).await?,
        };
        expect_ok(reply)
    }

    pub async fn select(&mut self, database: u32) -> Result<(), Error> {
        let database = database.to_string();
        let reply = self.query(&[b"SELECT", database.as_bytes()]).await?;
        expect_ok(reply)
    }

    pub async fn ping(&mut self) -> Result<(), Error> {
        match self.query(&[b"PING"]).await? {
            Frame::Simple(s) if s == "PONG" => Ok(()),
            frame => Err(unexpected(frame)),
        }
    }

    /// Sends one command and returns its reply, turning error replies into [`Error::Server`].
    pub async fn query(&mut self, args: &[&[u8]]) -> Result<Frame, Error> {
        match self.call(args).await? {
            Frame::Error(msg) => Err(Error::Server(msg)),
            frame => Ok(frame),
        }
    }

    async fn call(&mut self, args: &[&[u8]]) -> Result<Frame, Error> {
        let mut replies = self.pipeline(&[args]).await?;
        replies.pop().ok_or(Error::Closed)
    }

    /// Writes all `commands` at once, then reads one reply per command.
    async fn pipeline(&mut self, commands: &[&[&[u8]]]) -> Result<Vec<Frame>, Error> {
        let timeout = self.timeout;
        let framed = &mut self.framed;

        with_timeout(timeout, async move {
            for args in commands {
                framed.feed(Frame::command(args)).await?;
            }
            framed.flush().await?;

            let mut replies = Vec::with_capacity(commands.len());
            for _ in commands {
                match framed.next().await {
                    Some(frame) => replies.push(frame?),
                    None => return Err(Error::Closed),
                }
            }
            Ok(replies)
        })
        .await
    }

    /// Runs `script` with one key and its arguments. Values that cannot hold a flags header
    /// come back as their length.
    async fn eval(&mut self, script: &str, key: &[u8], args: &[&[u8]]) -> Result<Frame, Error> {
        let mut command: Vec<&[u8]> = Vec::with_capacity(args.len() + 4);
        command.push(b"EVAL");
        command.push(script.as_bytes());
        command.push(b"1");
        command.push(key);
        command.extend_from_slice(args);

        match self.query(&command).await? {
            Frame::Integer(length) if length >= 0 => Err(Error::Malformed(length as usize)),
            frame => Ok(frame),
        }
    }
}

async fn dial(address: &str) -> Result<TcpStream, Error> {
    let mut last_error = None;

    for addr in lookup_host(address).await? {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;

        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(err) => last_error = Some(err),
        }
    }

    Err(last_error
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "address did not resolve"))
        .into())
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| Error::Timeout(timeout))?
}

fn expect_ok(frame: Frame) -> Result<(), Error> {
    match frame {
        Frame::Simple(s) if s == "OK" => Ok(()),
        frame => Err(unexpected(frame)),
    }
}

fn integer(frame: Frame) -> Result<i64, Error> {
    match frame {
        Frame::Integer(i) => Ok(i),
        frame => Err(unexpected(frame)),
    }
}

fn unexpected(frame: Frame) -> Error {
    Error::UnexpectedReply(frame.to_string())
}

impl Backend for RedisConnection {
    async fn fetch(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Item>>, Error> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"MGET");
        args.extend(keys.iter().map(|key| &key[..]));

        let values = match self.query(&args).await? {
            Frame::Array(values) if values.len() == keys.len() => values,
            frame => return Err(unexpected(frame)),
        };

        values
            .into_iter()
            .map(|value| match value {
                Frame::Null => Ok(None),
                Frame::Bulk(raw) => Item::decode(raw).map(Some),
                frame => Err(unexpected(frame)),
            })
            .collect()
    }

    async fn store(
        &mut self,
        key: Bytes,
        item: Item,
        expiry: Expiry,
        condition: Condition,
    ) -> Result<bool, Error> {
        let encoded = item.encode();
        // Redis rejects a zero expiration.
        let seconds = match expiry {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(ttl.as_secs().max(1).to_string()),
        };

        let mut args: Vec<&[u8]> = Vec::with_capacity(6);
        args.push(b"SET");
        args.push(&key);
        args.push(&encoded);
        if let Some(seconds) = &seconds {
            args.push(b"EX");
            args.push(seconds.as_bytes());
        }
        match condition {
            Condition::Always => {}
            Condition::IfAbsent => args.push(b"NX"),
            Condition::IfPresent => args.push(b"XX"),
        }

        match self.query(&args).await? {
            Frame::Simple(s) if s == "OK" => Ok(true),
            Frame::Null => Ok(false),
            frame => Err(unexpected(frame)),
        }
    }

    async fn adjust(&mut self, key: Bytes, delta: Delta) -> Result<Adjusted, Error> {
        let (op, amount): (&[u8], u64) = match delta {
            Delta::Incr(amount) => (&b"incr"[..], amount),
            Delta::Decr(amount) => (&b"decr"[..], amount),
        };
        let amount = amount.to_string();

        match self
            .eval(ADJUST_SCRIPT, &key, &[amount.as_bytes(), op])
            .await?
        {
            Frame::Null => Ok(Adjusted::Missing),
            Frame::Integer(-1) => Ok(Adjusted::NonNumeric),
            Frame::Bulk(value) => match counter(&value) {
                Some(value) => Ok(Adjusted::Value(value)),
                None => Err(unexpected(Frame::Bulk(value))),
            },
            frame => Err(unexpected(frame)),
        }
    }

    async fn concat(&mut self, key: Bytes, data: Bytes, end: End) -> Result<bool, Error> {
        let end: &[u8] = match end {
            End::Front => &b"front"[..],
            End::Back => &b"back"[..],
        };

        match self.eval(CONCAT_SCRIPT, &key, &[&data[..], end]).await? {
            Frame::Null => Ok(false),
            Frame::Simple(s) if s == "OK" => Ok(true),
            frame => Err(unexpected(frame)),
        }
    }

    async fn delete(&mut self, key: Bytes) -> Result<bool, Error> {
        let deleted = integer(self.query(&[b"DEL", &key]).await?)?;
        Ok(deleted > 0)
    }

    async fn touch(&mut self, key: Bytes, expiry: Expiry) -> Result<bool, Error> {
        match expiry {
            Expiry::After(ttl) => {
                let seconds = ttl.as_secs().max(1).to_string();
                let touched = integer(self.query(&[b"EXPIRE", &key, seconds.as_bytes()]).await?)?;
                Ok(touched == 1)
            }
            // PERSIST answers 0 for keys without expiration, so existence is checked separately.
            Expiry::Never => {
                let replies = self
                    .pipeline(&[&[b"EXISTS", &key], &[b"PERSIST", &key]])
                    .await?;
                match replies.into_iter().next() {
                    Some(Frame::Integer(exists)) => Ok(exists > 0),
                    Some(Frame::Error(msg)) => Err(Error::Server(msg)),
                    Some(frame) => Err(unexpected(frame)),
                    None => Err(Error::Closed),
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<(), Error> {
        let reply = self.query(&[b"FLUSHDB"]).await?;
        expect_ok(reply)
    }
}
