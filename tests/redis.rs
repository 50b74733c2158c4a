//! End to end tests against a Redis server listening on 127.0.0.1:6379.
//!
//! Run them with `cargo test -- --ignored`. They flush database 15.

use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serial_test::serial;
use std::net::SocketAddr;
use std::time::Duration;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use memdis::backend::pool::{PoolConfig, RedisPool};
use memdis::server::{serve, SessionConfig};

const DATABASE: u32 = 15;

async fn start() -> (SocketAddr, MultiplexedConnection) {
    let pool = RedisPool::new(PoolConfig {
        address: "127.0.0.1:6379".to_string(),
        username: None,
        password: None,
        database: DATABASE,
        max_idle: 2,
        max_connections: 32,
        timeout: Duration::from_secs(2),
    })
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, pool, SessionConfig::default()));

    let client = redis::Client::open(format!("redis://127.0.0.1:6379/{}", DATABASE)).unwrap();
    let mut redis = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = redis::cmd("FLUSHDB").query_async(&mut redis).await.unwrap();

    (address, redis)
}

async fn connect() -> (TcpStream, MultiplexedConnection) {
    let (address, redis) = start().await;
    let memcache = TcpStream::connect(address).await.unwrap();

    (memcache, redis)
}

async fn request(stream: &mut TcpStream, request: &[u8], expected: &[u8]) {
    stream.write_all(request).await.unwrap();

    let mut buf = vec![0; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();

    assert_eq!(
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_items_carry_their_flags() {
    let (mut memcache, mut redis) = connect().await;

    request(&mut memcache, b"set greeting 258 0 5\r\nhello\r\n", b"STORED\r\n").await;

    let raw: Vec<u8> = redis.get("greeting").await.unwrap();
    assert_eq!(raw, b"\x00\x00\x01\x02hello");

    request(
        &mut memcache,
        b"get greeting\r\n",
        b"VALUE greeting 258 5\r\nhello\r\nEND\r\n",
    )
    .await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_expiration_is_set() {
    let (mut memcache, mut redis) = connect().await;

    request(&mut memcache, b"set k 0 100 1\r\nv\r\n", b"STORED\r\n").await;
    let ttl: i64 = redis.ttl("k").await.unwrap();
    assert!(ttl > 0 && ttl <= 100);

    request(&mut memcache, b"touch k 0\r\n", b"TOUCHED\r\n").await;
    let ttl: i64 = redis.ttl("k").await.unwrap();
    assert_eq!(ttl, -1);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_incr_keeps_ttl_and_flags() {
    let (mut memcache, mut redis) = connect().await;

    request(&mut memcache, b"set n 7 100 2\r\n41\r\n", b"STORED\r\n").await;
    request(&mut memcache, b"incr n 1\r\n", b"42\r\n").await;
    request(&mut memcache, b"append n 0 0 1\r\n0\r\n", b"STORED\r\n").await;
    request(&mut memcache, b"decr n 400\r\n", b"20\r\n").await;

    let raw: Vec<u8> = redis.get("n").await.unwrap();
    assert_eq!(raw, b"\x00\x00\x00\x0720");

    let ttl: i64 = redis.ttl("n").await.unwrap();
    assert!(ttl > 0);
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_foreign_values_are_server_errors() {
    let (mut memcache, mut redis) = connect().await;

    let _: () = redis.set("short", "ab").await.unwrap();

    request(
        &mut memcache,
        b"get short\r\n",
        b"SERVER_ERROR stored value is malformed (2 bytes)\r\n",
    )
    .await;
    request(&mut memcache, b"version\r\n", b"VERSION ").await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_conditional_stores() {
    let (mut memcache, _redis) = connect().await;

    request(&mut memcache, b"add k 0 0 1\r\na\r\n", b"STORED\r\n").await;
    request(&mut memcache, b"add k 0 0 1\r\nb\r\n", b"NOT_STORED\r\n").await;
    request(&mut memcache, b"replace missing 0 0 1\r\nc\r\n", b"NOT_STORED\r\n").await;
    request(&mut memcache, b"delete k\r\n", b"DELETED\r\n").await;
    request(&mut memcache, b"flush_all\r\n", b"OK\r\n").await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_incr_wraps_and_decr_stops_at_zero() {
    let (mut memcache, mut redis) = connect().await;

    request(
        &mut memcache,
        b"set n 3 0 20\r\n18446744073709551615\r\n",
        b"STORED\r\n",
    )
    .await;
    request(&mut memcache, b"incr n 2\r\n", b"1\r\n").await;
    request(&mut memcache, b"incr n 9999999999\r\n", b"10000000000\r\n").await;
    request(&mut memcache, b"decr n 1\r\n", b"9999999999\r\n").await;
    request(&mut memcache, b"decr n 18446744073709551615\r\n", b"0\r\n").await;

    let raw: Vec<u8> = redis.get("n").await.unwrap();
    assert_eq!(raw, b"\x00\x00\x00\x030");

    request(&mut memcache, b"set s 0 0 3\r\nabc\r\n", b"STORED\r\n").await;
    request(
        &mut memcache,
        b"incr s 1\r\n",
        b"CLIENT_ERROR cannot increment or decrement non-numeric value\r\n",
    )
    .await;
    request(&mut memcache, b"incr missing 1\r\n", b"NOT_FOUND\r\n").await;
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_prepend_keeps_flags() {
    let (mut memcache, mut redis) = connect().await;

    request(&mut memcache, b"set p 9 0 5\r\nworld\r\n", b"STORED\r\n").await;
    request(&mut memcache, b"prepend p 0 0 6\r\nhello \r\n", b"STORED\r\n").await;
    request(&mut memcache, b"prepend q 0 0 1\r\nx\r\n", b"NOT_STORED\r\n").await;

    let raw: Vec<u8> = redis.get("p").await.unwrap();
    assert_eq!(raw, b"\x00\x00\x00\x09hello world");
}

#[tokio::test]
#[serial]
#[ignore]
async fn test_concurrent_incr_on_one_key() {
    let (address, mut redis) = start().await;

    let mut memcache = TcpStream::connect(address).await.unwrap();
    request(&mut memcache, b"set hot 0 0 1\r\n0\r\n", b"STORED\r\n").await;

    let deltas: Vec<Vec<u64>> = (0..16)
        .map(|_| {
            let mut rng = rand::thread_rng();
            (0..50).map(|_| rng.gen_range(1..1000)).collect()
        })
        .collect();
    let total: u64 = deltas.iter().flatten().sum();

    let mut tasks = Vec::new();
    for deltas in deltas {
        tasks.push(tokio::spawn(async move {
            let stream = TcpStream::connect(address).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut reader = BufReader::new(reader);

            for delta in deltas {
                writer
                    .write_all(format!("incr hot {}\r\n", delta).as_bytes())
                    .await
                    .unwrap();

                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                assert!(
                    line.trim_end().chars().all(|c| c.is_ascii_digit()),
                    "unexpected reply {:?}",
                    line
                );
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let raw: Vec<u8> = redis.get("hot").await.unwrap();
    assert_eq!(&raw[4..], total.to_string().as_bytes());
}
