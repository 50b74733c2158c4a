use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::pool::{Pool, RedisPool};
use crate::codec::DEFAULT_MAX_VALUE_SIZE;
use crate::commands::Command;
use crate::config::Config;
use crate::connection::Connection;
use crate::reply::Reply;
use crate::stats::{Instrumented, Stats};
use crate::translator::{Processor, Translator};
use crate::Error;

/// Per client connection settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub max_value_size: usize,
    /// Clients silent for longer than this are disconnected.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            idle_timeout: None,
        }
    }
}

pub async fn run(config: Config) -> Result<(), Error> {
    config.validate()?;

    let pool = RedisPool::new(config.pool_config())?;
    pool.spawn_reaper();

    let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;

    info!(
        "Memcache proxy listening on {}, backed by Redis at {}:{}",
        listener.local_addr()?,
        config.redis_host,
        config.redis_port
    );

    serve(listener, pool, config.session()).await
}

/// Accepts memcache clients on `listener` until the process ends.
pub async fn serve<P: Pool>(
    listener: TcpListener,
    pool: P,
    session: SessionConfig,
) -> Result<(), Error> {
    let stats = Arc::new(Stats::new());
    let processor = Arc::new(Instrumented::new(
        Translator::new(stats.clone()),
        stats.clone(),
    ));

    loop {
        let (socket, client_address) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Usually out of file descriptors, give other connections a chance to close.
                error!("Failed to accept connection: {}", e);
                sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        info!("Accepted connection from {:?}", client_address);

        let pool = pool.clone();
        let processor = processor.clone();
        let connection = stats.connection_opened();

        tokio::spawn(async move {
            if let Err(e) =
                handle_connection(socket, client_address, pool, processor, session).await
            {
                error!("Connection failed: {}", e);
            }
            drop(connection);
        });
    }
}

#[instrument(
    name = "connection",
    skip(stream, pool, processor, session),
    fields(connection_id)
)]
async fn handle_connection<P, R>(
    stream: TcpStream,
    client_address: SocketAddr,
    pool: P,
    processor: Arc<R>,
    session: SessionConfig,
) -> Result<(), Error>
where
    P: Pool,
    R: Processor<P::Backend> + 'static,
{
    let mut conn = Connection::new(stream, client_address, session.max_value_size);

    tracing::Span::current().record("connection_id", conn.id.to_string());

    // The backend connection stays with this client until it disconnects.
    let mut backend = match pool.acquire().await {
        Ok(backend) => backend,
        Err(e) => {
            let _ = conn.write_reply(Reply::ServerError(e.to_string())).await;
            return Err(e.into());
        }
    };

    loop {
        let request = match session.idle_timeout {
            Some(idle_timeout) => match timeout(idle_timeout, conn.read_request()).await {
                Ok(request) => request?,
                Err(_) => {
                    info!("Closing idle connection");
                    break;
                }
            },
            None => conn.read_request().await?,
        };

        let command = match request {
            Some(Ok(command)) => command,
            Some(Err(err)) => {
                warn!("Invalid request: {}", err);
                conn.write_reply(err.into()).await?;
                continue;
            }
            None => break,
        };

        debug!("Received {} command", command.name().as_str());

        if matches!(command, Command::Quit) {
            break;
        }

        let noreply = command.noreply();
        match processor.process(&mut *backend, command).await {
            Ok(reply) => {
                debug!("Sending reply to client: {}", reply);
                if !noreply {
                    conn.write_reply(reply).await?;
                }
            }
            Err(e) => {
                pool.discard(backend);
                if !noreply {
                    let _ = conn.write_reply(Reply::ServerError(e.to_string())).await;
                }
                return Err(e.into());
            }
        }
    }

    info!("Connection closed");
    Ok(())
}
