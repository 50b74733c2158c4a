use bytes::{Buf, BytesMut};
use std::io;
use thiserror::Error as ThisError;
use tokio_util::codec::{Decoder, Encoder};

use crate::commands::{Command, Line, Pending};
use crate::error::ProtocolError;
use crate::reply::Reply;

/// Command lines longer than this without a terminator end the session.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default for the largest data block a storage command may announce.
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("command line exceeds {MAX_LINE_LENGTH} bytes")]
    LineTooLong,
}

/// Server side memcache text protocol codec.
///
/// Decoding yields one item per request. Malformed requests are decoded into a
/// [`ProtocolError`] rather than failing the stream, so the session can answer them and keep
/// reading: the offending line is consumed, together with its data block when the block length is
/// known.
#[derive(Debug)]
pub struct MemcacheCodec {
    max_value_size: usize,
    /// A storage command waiting for its data block.
    pending: Option<Pending>,
    /// Bytes of an oversized data block still to be thrown away.
    skip: usize,
    /// Set after a corrupt data block: input is discarded up to the next line terminator.
    resync: bool,
}

impl MemcacheCodec {
    pub fn new(max_value_size: usize) -> Self {
        Self {
            max_value_size,
            pending: None,
            skip: 0,
            resync: false,
        }
    }

    fn decode_block(
        &mut self,
        pending: Pending,
        src: &mut BytesMut,
    ) -> Option<Result<Command, ProtocolError>> {
        let length = pending.bytes + 2;
        if src.len() < length {
            src.reserve(length - src.len());
            self.pending = Some(pending);
            return None;
        }

        let block = src.split_to(length).freeze();
        if &block[pending.bytes..] != b"\r\n" {
            self.resync = block[length - 1] != b'\n';
            return Some(Err(ProtocolError::BadDataChunk));
        }

        let data = block.slice(..pending.bytes);
        Some(Ok(pending.complete(data)))
    }
}

impl Default for MemcacheCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_SIZE)
    }
}

impl Decoder for MemcacheCodec {
    type Item = Result<Command, ProtocolError>;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.skip > 0 {
            let n = self.skip.min(src.len());
            src.advance(n);
            self.skip -= n;
            if self.skip > 0 {
                return Ok(None);
            }
        }

        if self.resync {
            match src.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    src.advance(end + 1);
                    self.resync = false;
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }

        if let Some(pending) = self.pending.take() {
            return Ok(self.decode_block(pending, src));
        }

        let end = match src.iter().position(|b| *b == b'\n') {
            Some(end) => end,
            None if src.len() > MAX_LINE_LENGTH => return Err(Error::LineTooLong),
            None => return Ok(None),
        };

        let mut line = src.split_to(end + 1).freeze();
        line.truncate(end);
        if line.last() == Some(&b'\r') {
            line.truncate(end - 1);
        }

        let pending = match Command::parse(line) {
            Ok(Line::Complete(command)) => return Ok(Some(Ok(command))),
            Ok(Line::Pending(pending)) => pending,
            Err(err) => return Ok(Some(Err(err))),
        };

        if pending.bytes > self.max_value_size {
            // The block is swallowed by the following calls as it arrives.
            self.skip = pending.bytes + 2;
            return Ok(Some(Err(ProtocolError::TooLarge)));
        }

        Ok(self.decode_block(pending, src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        if src.is_empty() && self.pending.is_none() {
            return Ok(None);
        }

        src.clear();
        self.pending = None;
        self.skip = 0;
        self.resync = false;
        Ok(Some(Err(ProtocolError::Truncated)))
    }
}

impl Encoder<Reply> for MemcacheCodec {
    type Error = Error;

    fn encode(&mut self, reply: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        reply.write_to(dst);
        Ok(())
    }
}
