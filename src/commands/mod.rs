pub mod add;
pub mod append;
pub mod decr;
pub mod delete;
pub mod executable;
pub mod exptime;
pub mod flush_all;
pub mod get;
pub mod incr;
pub mod prepend;
pub mod replace;
pub mod set;
pub mod storage;
pub mod touch;

use bytes::Bytes;
use std::str::{self, FromStr};
use std::vec;
use strum_macros::{EnumString, IntoStaticStr};

use crate::error::ProtocolError;

use add::Add;
use append::Append;
use decr::Decr;
use delete::Delete;
use flush_all::FlushAll;
use get::Get;
use incr::Incr;
use prepend::Prepend;
use replace::Replace;
use set::Set;
use storage::Storage;
use touch::Touch;

/// Longest key memcached accepts.
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest `<bytes>` a storage command may announce, whatever the value size limit.
const MAX_BLOCK_LENGTH: usize = i32::MAX as usize - 2;

/// Command names, spelled the way clients send them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Name {
    Get,
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Delete,
    Incr,
    Decr,
    Touch,
    FlushAll,
    Version,
    Stats,
    Quit,
}

impl Name {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Get(Get),
    Set(Set),
    Add(Add),
    Replace(Replace),
    Append(Append),
    Prepend(Prepend),
    Delete(Delete),
    Incr(Incr),
    Decr(Decr),
    Touch(Touch),
    FlushAll(FlushAll),
    Version,
    Stats,
    Quit,
}

/// A parsed command line.
#[derive(Debug, PartialEq)]
pub enum Line {
    Complete(Command),
    /// A storage command whose data block has not been read yet.
    Pending(Pending),
}

#[derive(Debug, PartialEq)]
pub struct Pending {
    pub name: Name,
    pub storage: Storage,
    /// Length of the data block announced on the command line.
    pub bytes: usize,
}

impl Pending {
    pub fn complete(self, data: Bytes) -> Command {
        let storage = Storage { data, ..self.storage };

        match self.name {
            Name::Add => Command::Add(Add(storage)),
            Name::Replace => Command::Replace(Replace(storage)),
            Name::Append => Command::Append(Append(storage)),
            Name::Prepend => Command::Prepend(Prepend(storage)),
            _ => Command::Set(Set(storage)),
        }
    }
}

impl Command {
    /// Parses a command line, without its terminator.
    pub fn parse(line: Bytes) -> Result<Line, ProtocolError> {
        let parser = &mut CommandParser::new(line);

        let name = parser.parse_command_name()?;

        let command = match name {
            Name::Set | Name::Add | Name::Replace | Name::Append | Name::Prepend => {
                let (storage, bytes) = Storage::parse(parser)?;
                return Ok(Line::Pending(Pending {
                    name,
                    storage,
                    bytes,
                }));
            }
            Name::Get => Get::try_from(parser).map(Command::Get)?,
            Name::Delete => Delete::try_from(parser).map(Command::Delete)?,
            Name::Incr => Incr::try_from(parser).map(Command::Incr)?,
            Name::Decr => Decr::try_from(parser).map(Command::Decr)?,
            Name::Touch => Touch::try_from(parser).map(Command::Touch)?,
            Name::FlushAll => FlushAll::try_from(parser).map(Command::FlushAll)?,
            Name::Version => parser.finish().map(|_| Command::Version)?,
            Name::Stats => parser.finish().map(|_| Command::Stats)?,
            Name::Quit => parser.finish().map(|_| Command::Quit)?,
        };

        Ok(Line::Complete(command))
    }

    pub fn name(&self) -> Name {
        match self {
            Command::Get(_) => Name::Get,
            Command::Set(_) => Name::Set,
            Command::Add(_) => Name::Add,
            Command::Replace(_) => Name::Replace,
            Command::Append(_) => Name::Append,
            Command::Prepend(_) => Name::Prepend,
            Command::Delete(_) => Name::Delete,
            Command::Incr(_) => Name::Incr,
            Command::Decr(_) => Name::Decr,
            Command::Touch(_) => Name::Touch,
            Command::FlushAll(_) => Name::FlushAll,
            Command::Version => Name::Version,
            Command::Stats => Name::Stats,
            Command::Quit => Name::Quit,
        }
    }

    /// Whether the client asked not to receive a reply.
    pub fn noreply(&self) -> bool {
        match self {
            Command::Set(Set(storage))
            | Command::Add(Add(storage))
            | Command::Replace(Replace(storage))
            | Command::Append(Append(storage))
            | Command::Prepend(Prepend(storage)) => storage.noreply,
            Command::Delete(cmd) => cmd.noreply,
            Command::Incr(cmd) => cmd.noreply,
            Command::Decr(cmd) => cmd.noreply,
            Command::Touch(cmd) => cmd.noreply,
            Command::FlushAll(cmd) => cmd.noreply,
            Command::Get(_) | Command::Version | Command::Stats | Command::Quit => false,
        }
    }

    /// Number of keys the command reads or writes.
    pub fn key_count(&self) -> usize {
        match self {
            Command::Get(cmd) => cmd.keys.len(),
            Command::FlushAll(_) | Command::Version | Command::Stats | Command::Quit => 0,
            _ => 1,
        }
    }
}

/// Walks the space separated tokens of a command line.
pub(crate) struct CommandParser {
    parts: vec::IntoIter<Bytes>,
}

impl CommandParser {
    fn new(line: Bytes) -> Self {
        let parts: Vec<Bytes> = line
            .split(|b| *b == b' ')
            .filter(|token| !token.is_empty())
            .map(|token| line.slice_ref(token))
            .collect();

        Self {
            parts: parts.into_iter(),
        }
    }

    fn parse_command_name(&mut self) -> Result<Name, ProtocolError> {
        let token = self.parts.next().unwrap_or_default();
        let name = String::from_utf8_lossy(&token);

        Name::from_str(&name).map_err(|_: strum::ParseError| {
            ProtocolError::UnknownCommand(name.into_owned())
        })
    }

    fn next_token(&mut self) -> Result<Bytes, ProtocolError> {
        self.parts.next().ok_or(ProtocolError::BadFormat)
    }

    pub(crate) fn has_next(&self) -> bool {
        self.parts.len() > 0
    }

    pub(crate) fn next_key(&mut self) -> Result<Bytes, ProtocolError> {
        let key = self.next_token()?;

        if key.len() > MAX_KEY_LENGTH || key.iter().any(|b| b.is_ascii_control()) {
            return Err(ProtocolError::InvalidKey);
        }

        Ok(key)
    }

    pub(crate) fn next_flags(&mut self) -> Result<u32, ProtocolError> {
        let token = self.next_token()?;
        parse_number(&token).ok_or(ProtocolError::BadFormat)
    }

    pub(crate) fn next_exptime(&mut self) -> Result<i64, ProtocolError> {
        let token = self.next_token()?;
        parse_number(&token).ok_or(ProtocolError::InvalidExptime)
    }

    pub(crate) fn next_delta(&mut self) -> Result<u64, ProtocolError> {
        let token = self.next_token()?;
        parse_number(&token).ok_or(ProtocolError::InvalidDelta)
    }

    pub(crate) fn next_length(&mut self) -> Result<usize, ProtocolError> {
        let token = self.next_token()?;
        parse_number(&token)
            .filter(|bytes| *bytes <= MAX_BLOCK_LENGTH)
            .ok_or(ProtocolError::BadFormat)
    }

    /// Consumes an optional trailing `noreply`, then expects the end of the line.
    pub(crate) fn noreply(&mut self) -> Result<bool, ProtocolError> {
        let noreply = match self.parts.next() {
            Some(token) if &token[..] == b"noreply" => true,
            Some(_) => return Err(ProtocolError::BadFormat),
            None => false,
        };

        self.finish()?;
        Ok(noreply)
    }

    pub(crate) fn finish(&mut self) -> Result<(), ProtocolError> {
        match self.parts.next() {
            Some(_) => Err(ProtocolError::BadFormat),
            None => Ok(()),
        }
    }
}

/// Parses a decimal number; memcached accepts neither spaces nor an empty field.
pub(crate) fn parse_number<T: FromStr>(token: &[u8]) -> Option<T> {
    str::from_utf8(token).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(line: &'static [u8]) -> Command {
        match Command::parse(Bytes::from_static(line)).unwrap() {
            Line::Complete(command) => command,
            line => panic!("expected a complete command, got {:?}", line),
        }
    }

    fn error(line: &'static [u8]) -> ProtocolError {
        Command::parse(Bytes::from_static(line)).unwrap_err()
    }

    #[test]
    fn parse_get_with_many_keys() {
        assert_eq!(
            complete(b"get a  b c"),
            Command::Get(Get {
                keys: vec![Bytes::from("a"), Bytes::from("b"), Bytes::from("c")]
            })
        );
    }

    #[test]
    fn parse_set_announces_data() {
        let line = Command::parse(Bytes::from_static(b"set foo 5 100 3 noreply")).unwrap();

        assert_eq!(
            line,
            Line::Pending(Pending {
                name: Name::Set,
                storage: Storage {
                    key: Bytes::from("foo"),
                    flags: 5,
                    exptime: 100,
                    data: Bytes::new(),
                    noreply: true,
                },
                bytes: 3,
            })
        );
    }

    #[test]
    fn pending_completes_into_its_command() {
        let line = Command::parse(Bytes::from_static(b"prepend k 0 0 2")).unwrap();
        let Line::Pending(pending) = line else {
            panic!("expected a pending command");
        };

        let command = pending.complete(Bytes::from("ab"));

        assert_eq!(command.name(), Name::Prepend);
        assert_eq!(
            command,
            Command::Prepend(Prepend(Storage {
                key: Bytes::from("k"),
                flags: 0,
                exptime: 0,
                data: Bytes::from("ab"),
                noreply: false,
            }))
        );
    }

    #[test]
    fn parse_flush_all() {
        assert_eq!(complete(b"flush_all"), Command::FlushAll(FlushAll { noreply: false }));
        assert!(complete(b"flush_all noreply").noreply());
        assert_eq!(error(b"flush_all 10"), ProtocolError::BadFormat);
    }

    #[test]
    fn parse_commands_without_arguments() {
        assert_eq!(complete(b"version"), Command::Version);
        assert_eq!(complete(b"stats"), Command::Stats);
        assert_eq!(complete(b"quit"), Command::Quit);
        assert_eq!(error(b"version now"), ProtocolError::BadFormat);
    }

    #[test]
    fn unknown_commands() {
        assert_eq!(
            error(b"gets foo"),
            ProtocolError::UnknownCommand("gets".to_string())
        );
        assert_eq!(
            error(b"GET foo"),
            ProtocolError::UnknownCommand("GET".to_string())
        );
        assert_eq!(error(b""), ProtocolError::UnknownCommand(String::new()));
    }

    #[test]
    fn invalid_keys() {
        let long = format!("get {}", "k".repeat(MAX_KEY_LENGTH + 1));
        assert_eq!(
            Command::parse(Bytes::from(long)).unwrap_err(),
            ProtocolError::InvalidKey
        );
        assert_eq!(error(b"delete a\x01b"), ProtocolError::InvalidKey);

        let longest = format!("get {}", "k".repeat(MAX_KEY_LENGTH));
        assert!(Command::parse(Bytes::from(longest)).is_ok());
    }

    #[test]
    fn invalid_numbers() {
        assert_eq!(error(b"set k x 0 1"), ProtocolError::BadFormat);
        assert_eq!(error(b"set k 0 soon 1"), ProtocolError::InvalidExptime);
        assert_eq!(error(b"set k 0 0 -1"), ProtocolError::BadFormat);
        assert_eq!(error(b"set k 4294967296 0 1"), ProtocolError::BadFormat);
        assert_eq!(error(b"incr k -1"), ProtocolError::InvalidDelta);
        assert_eq!(error(b"touch k never"), ProtocolError::InvalidExptime);
    }

    #[test]
    fn missing_and_extra_arguments() {
        assert_eq!(error(b"get"), ProtocolError::NoKeys);
        assert_eq!(error(b"set k 0 0"), ProtocolError::BadFormat);
        assert_eq!(error(b"incr k"), ProtocolError::BadFormat);
        assert_eq!(error(b"incr k 1 noreply extra"), ProtocolError::BadFormat);
        assert_eq!(error(b"set k 0 0 1 please"), ProtocolError::BadFormat);
    }

    #[test]
    fn names_round_trip() {
        assert_eq!(Name::FlushAll.as_str(), "flush_all");
        assert_eq!(Name::from_str("flush_all"), Ok(Name::FlushAll));
        assert!(Name::from_str("flushall").is_err());
    }
}
