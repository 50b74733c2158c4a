use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use uuid::Uuid;

use crate::codec::{self, MemcacheCodec};
use crate::commands::Command;
use crate::error::ProtocolError;
use crate::reply::Reply;

/// A memcache client connection.
pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    framed: Framed<TcpStream, MemcacheCodec>,
}

impl Connection {
    pub fn new(stream: TcpStream, client_address: SocketAddr, max_value_size: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_address,
            framed: Framed::new(stream, MemcacheCodec::new(max_value_size)),
        }
    }

    /// Reads the next request, `None` once the client closed the connection.
    ///
    /// Malformed requests are returned as `Some(Err(_))` and leave the connection usable.
    pub async fn read_request(
        &mut self,
    ) -> Result<Option<Result<Command, ProtocolError>>, codec::Error> {
        self.framed.next().await.transpose()
    }

    pub async fn write_reply(&mut self, reply: Reply) -> Result<(), codec::Error> {
        self.framed.send(reply).await
    }
}
