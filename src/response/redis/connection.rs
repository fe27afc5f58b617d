//! The two TCP connections to Redis: a subscriber carrying the pub/sub feed
//! and a secondary connection for the `subscribed:` marker keys.
use super::msg::{parse_redis_reply, RedisParseErr, RedisReply};
use super::resp_cmd;
use crate::config::Redis;
use crate::event::Event;

use std::convert::TryFrom;
use std::fmt;
use std::io;
use std::str;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

type Result<T> = std::result::Result<T, RedisConnErr>;

const CONNECTION_NAME: &str = "spillway";

/// The write side: SUBSCRIBE/UNSUBSCRIBE on the subscriber connection plus
/// marker-key maintenance on the secondary one.  This half owns the
/// namespace; every channel it accepts is unprefixed.
pub(crate) struct RedisWriter {
    control: OwnedWriteHalf,
    marker: TcpStream,
    namespace: Option<String>,
}

/// The read side of the subscriber connection; owned exclusively by the
/// dispatch task.
pub struct RedisReader {
    feed: OwnedReadHalf,
    buffer: Vec<u8>,
    filled: usize,
    namespace: Option<String>,
}

pub(crate) async fn connect(cfg: &Redis) -> Result<(RedisReader, RedisWriter)> {
    let addr = format!("{}:{}", &*cfg.host, *cfg.port);
    let subscriber = new_connection(&addr, cfg.password.as_ref()).await?;
    let marker = new_connection(&addr, cfg.password.as_ref()).await?;
    let (feed, control) = subscriber.into_split();
    let namespace = cfg.namespace.clone().0;

    Ok((
        RedisReader {
            feed,
            buffer: vec![0; 16 * 1024],
            filled: 0,
            namespace: namespace.clone(),
        },
        RedisWriter {
            control,
            marker,
            namespace,
        },
    ))
}

impl RedisWriter {
    /// SUBSCRIBE to every listed channel, in one command.
    pub(crate) async fn subscribe(&mut self, channels: &[String]) -> Result<()> {
        self.pubsub_cmd("SUBSCRIBE", channels).await
    }

    pub(crate) async fn unsubscribe(&mut self, channels: &[String]) -> Result<()> {
        self.pubsub_cmd("UNSUBSCRIBE", channels).await
    }

    async fn pubsub_cmd(&mut self, cmd: &str, channels: &[String]) -> Result<()> {
        let prefixed: Vec<String> = channels.iter().map(|c| self.prefixed(c)).collect();
        let mut args: Vec<&str> = Vec::with_capacity(prefixed.len() + 1);
        args.push(cmd);
        args.extend(prefixed.iter().map(String::as_str));
        self.control.write_all(&resp_cmd(&args)).await?;
        Ok(())
    }

    /// Write a short-TTL `subscribed:` marker for each channel, so producers
    /// know somebody is still listening.  Letting the TTL lapse is the whole
    /// "nobody is listening" signal; nothing is ever deleted here.
    pub(crate) async fn refresh_markers(&mut self, channels: &[String], ttl_secs: u64) -> Result<()> {
        if channels.is_empty() {
            return Ok(());
        }
        let ttl = ttl_secs.to_string();
        let mut cmd = Vec::new();
        for channel in channels {
            let key = self.prefixed(&format!("subscribed:{}", channel));
            cmd.extend_from_slice(&resp_cmd(&["SETEX", &key, &ttl, "1"]));
        }
        self.marker.write_all(&cmd).await?;
        self.drain_marker_replies(channels.len()).await
    }

    /// The secondary connection answers every SETEX; those replies have to be
    /// consumed or the socket's buffer eventually fills.
    async fn drain_marker_replies(&mut self, count: usize) -> Result<()> {
        let mut seen = 0;
        let mut scratch = [0_u8; 512];
        while seen < count {
            let n = self.marker.read(&mut scratch).await?;
            if n == 0 {
                return Err(RedisConnErr::ConnectionLost);
            }
            for line in scratch[..n].split(|byte| *byte == b'\n') {
                if line.starts_with(b"-") {
                    log::warn!("marker write failed: {}", String::from_utf8_lossy(line));
                }
            }
            seen += scratch[..n].iter().filter(|byte| **byte == b'\n').count();
        }
        Ok(())
    }

    fn prefixed(&self, channel: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, channel),
            None => channel.to_string(),
        }
    }
}

impl RedisReader {
    /// The next message published to a channel in our namespace.  Acks,
    /// foreign-namespace messages, and unparseable events are skipped.
    pub(crate) async fn next(&mut self) -> Result<(String, Event)> {
        loop {
            while self.filled > 0 {
                let (msg, consumed) = {
                    let valid = valid_utf8_prefix(&self.buffer[..self.filled]);
                    match parse_redis_reply(valid) {
                        Ok((reply, consumed)) => (digest(&self.namespace, reply), consumed),
                        Err(RedisParseErr::Incomplete) => break,
                        Err(e) => {
                            log::error!("dropping unparseable input from Redis: {}", e);
                            (None, self.filled)
                        }
                    }
                };
                self.buffer.copy_within(consumed..self.filled, 0);
                self.filled -= consumed;
                if let Some(msg) = msg {
                    return Ok(msg);
                }
            }

            if self.filled == self.buffer.len() {
                self.buffer.resize(self.buffer.len() * 2, 0);
                log::info!("Resized the Redis input buffer to {} bytes", self.buffer.len());
            }
            let n = self.feed.read(&mut self.buffer[self.filled..]).await?;
            if n == 0 {
                return Err(RedisConnErr::ConnectionLost);
            }
            self.filled += n;
        }
    }
}

fn log_queue_time(channel: &str, event: &Event) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    if let (Some(queued_at), Ok(now)) = (
        event.queued_at,
        std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH),
    ) {
        let waited = (now.as_millis() as i64).saturating_sub(queued_at);
        log::debug!("message on {} spent {} ms in the queue", channel, waited);
    }
}

/// A read can end mid-codepoint; parse only the prefix that is valid UTF-8
/// and leave the tail for the next read.
fn valid_utf8_prefix(bytes: &[u8]) -> &str {
    match str::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => str::from_utf8(&bytes[..e.valid_up_to()]).expect("Guaranteed by valid_up_to"),
    }
}

fn digest(namespace: &Option<String>, reply: RedisReply) -> Option<(String, Event)> {
    match reply {
        RedisReply::Message { channel, body } => {
            let channel = match namespace {
                Some(ns) => channel.strip_prefix(&format!("{}:", ns))?,
                None => channel,
            };
            match Event::try_from(body) {
                Ok(event) => {
                    log_queue_time(channel, &event);
                    Some((channel.to_string(), event))
                }
                Err(e) => {
                    log::error!("dropping malformed event on {}: {}", channel, e);
                    None
                }
            }
        }
        RedisReply::Failure(line) => {
            log::warn!("error reply from Redis: {}", line);
            None
        }
        RedisReply::Ack => None,
    }
}

async fn new_connection(addr: &str, pass: Option<&String>) -> Result<TcpStream> {
    let mut conn = TcpStream::connect(addr)
        .await
        .map_err(|e| RedisConnErr::with_addr(addr, e))?;
    if let Some(password) = pass {
        auth_connection(&mut conn, addr, password).await?;
    }
    validate_connection(&mut conn, addr).await?;
    set_connection_name(&mut conn, addr).await?;
    Ok(conn)
}

async fn auth_connection(conn: &mut TcpStream, addr: &str, pass: &str) -> Result<()> {
    let reply = exchange(conn, &resp_cmd(&["AUTH", pass]), addr).await?;
    if !reply.starts_with("+OK") {
        Err(RedisConnErr::IncorrectPassword(pass.to_string()))?
    }
    Ok(())
}

async fn validate_connection(conn: &mut TcpStream, addr: &str) -> Result<()> {
    let reply = exchange(conn, b"PING\r\n", addr).await?;
    match reply.as_str() {
        r if r.starts_with("+PONG") => Ok(()),
        r if r.starts_with("-NOAUTH") => Err(RedisConnErr::MissingPassword),
        r if r.starts_with("HTTP/1.") => Err(RedisConnErr::NotRedis(addr.to_string())),
        _ => Err(RedisConnErr::InvalidRedisReply(reply)),
    }
}

async fn set_connection_name(conn: &mut TcpStream, addr: &str) -> Result<()> {
    let reply = exchange(conn, &resp_cmd(&["CLIENT", "SETNAME", CONNECTION_NAME]), addr).await?;
    match reply.as_str() {
        r if r.starts_with("+OK") => Ok(()),
        _ => Err(RedisConnErr::InvalidRedisReply(reply)),
    }
}

async fn exchange(conn: &mut TcpStream, cmd: &[u8], addr: &str) -> Result<String> {
    conn.write_all(cmd)
        .await
        .map_err(|e| RedisConnErr::with_addr(addr, e))?;
    let mut buffer = vec![0_u8; 256];
    let n = conn
        .read(&mut buffer)
        .await
        .map_err(|e| RedisConnErr::with_addr(addr, e))?;
    Ok(String::from_utf8_lossy(&buffer[..n]).into_owned())
}

#[derive(Debug)]
pub enum RedisConnErr {
    ConnectionErr { addr: String, inner: io::Error },
    Io(io::Error),
    ConnectionLost,
    InvalidRedisReply(String),
    IncorrectPassword(String),
    MissingPassword,
    NotRedis(String),
}

impl RedisConnErr {
    fn with_addr(addr: &str, inner: io::Error) -> Self {
        Self::ConnectionErr {
            addr: addr.to_string(),
            inner,
        }
    }
}

impl std::error::Error for RedisConnErr {}

impl fmt::Display for RedisConnErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use RedisConnErr::*;
        match self {
            ConnectionErr { addr, inner } => write!(
                f,
                "Could not connect to Redis at {}.\n             Error detail: {}",
                addr, inner
            ),
            Io(e) => write!(f, "lost contact with Redis: {}", e),
            ConnectionLost => write!(f, "Redis closed the connection"),
            InvalidRedisReply(reply) => write!(f, "unexpected reply from Redis: {}", reply),
            IncorrectPassword(pass) => write!(f, "Incorrect Redis password: `{}`", pass),
            MissingPassword => write!(f, "Redis requires a password, but none was supplied"),
            NotRedis(addr) => write!(f, "{} is not a Redis server (it speaks HTTP)", addr),
        }
    }
}

impl From<io::Error> for RedisConnErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
