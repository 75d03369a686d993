use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{config::NodeConfig, message::Message};
use crate::{
    common::{time::clock_face, Result, SyncError},
    protocol::{berkeley, cristian, lamport::{self, LogicalClock}},
};

/*
    A node owns one wall clock and serves peers over TCP. Every connection
    carries a single request line; the listener spawns one task per accepted
    connection, so the clock is read and written concurrently by those tasks
    and by whichever protocol the driver is running. All clock access goes
    through the guard below and never holds it across an await.
*/

pub struct Node {
    name: String,
    address: String,
    peers: Vec<String>,
    clock: Mutex<DateTime<Utc>>,
    running: AtomicBool,
    logical_clock: Option<Arc<LogicalClock>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self::with_clock(config, Utc::now())
    }

    pub fn with_clock(config: NodeConfig, clock: DateTime<Utc>) -> Self {
        Node {
            name: config.name,
            address: config.address,
            peers: config.peers,
            clock: Mutex::new(clock),
            running: AtomicBool::new(true),
            logical_clock: None,
        }
    }

    /// Routes inbound `LAMPORT` messages to a caller-owned logical clock.
    pub fn with_logical_clock(mut self, clock: Arc<LogicalClock>) -> Self {
        self.logical_clock = Some(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Configured peers, minus this node's own address.
    pub fn remote_peers(&self) -> impl Iterator<Item = &str> {
        self.peers
            .iter()
            .map(String::as_str)
            .filter(move |peer| *peer != self.address)
    }

    pub fn clock(&self) -> DateTime<Utc> {
        *self.clock.lock()
    }

    pub fn set_clock(&self, time: DateTime<Utc>) {
        *self.clock.lock() = time;
    }

    /// Shifts the clock by `delta` in a single guarded step and returns the
    /// (previous, new) pair. A shift past chrono's date range leaves the
    /// clock unchanged.
    pub fn adjust_clock(&self, delta: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let mut clock = self.clock.lock();
        let previous = *clock;
        let new = previous
            .checked_add_signed(delta)
            .ok_or_else(|| SyncError::ClockOutOfRange(format!("{} shifted by {}", previous, delta)))?;
        *clock = new;
        Ok((previous, new))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Only observed between accepts; a pending accept keeps waiting.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.address)
            .await
            .map_err(|source| SyncError::Bind {
                address: self.address.clone(),
                source,
            })
    }

    /// Binds the node's address and serves connections until stopped.
    /// Fails only if the address cannot be bound.
    pub async fn start_listener(self: Arc<Self>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await;
        Ok(())
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        info!(node = %self.name, address = %self.address, "listening");

        while self.is_running() {
            let (stream, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(node = %self.name, "failed to accept connection: {}", e);
                    continue;
                }
            };

            debug!(node = %self.name, %remote, "accepted connection");
            let node = self.clone();
            tokio::spawn(async move {
                if let Err(e) = node.handle_connection(stream).await {
                    warn!(node = %node.name, %remote, "connection failed: {}", e);
                }
            });
        }

        info!(node = %self.name, "listener stopped");
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);

        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            debug!(node = %self.name, "connection closed before sending a message");
            return Ok(());
        }

        debug!(node = %self.name, line = %line.trim(), "received");
        match line.parse::<Message>() {
            Ok(message) => self.handle_message(message, &mut writer).await,
            Err(e) => {
                debug!(node = %self.name, "ignoring malformed message: {}", e);
                Ok(())
            }
        }
    }

    /// Acts on one inbound message, writing the reply (if any) to `conn`.
    pub async fn handle_message<W>(&self, message: Message, conn: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        match message {
            Message::SetClock(time) => {
                self.set_clock(time);
                info!(node = %self.name, clock = %clock_face(&time), "clock set");
            }
            Message::TimeRequest => cristian::respond_to_time_request(self, conn).await?,
            Message::GetTime | Message::AdjustTime(_) => {
                berkeley::respond_to_berkeley(self, &message, conn).await?
            }
            Message::Lamport { counter, content } => match &self.logical_clock {
                Some(clock) => {
                    if let Err(e) = lamport::receive_logical_message(self, clock, counter, &content) {
                        warn!(node = %self.name, "discarding lamport message: {}", e);
                    }
                }
                None => {
                    debug!(node = %self.name, counter, "no logical clock attached, dropping lamport message");
                }
            },
            Message::Unknown(raw) => {
                debug!(node = %self.name, message = %raw, "dropping unrecognized message");
            }
        }

        Ok(())
    }

    /// Dials `to`, writes one message line and closes.
    pub async fn send_message(&self, to: &str, message: &Message) -> Result<()> {
        let mut stream = connect(to).await?;
        write_line(&mut stream, message).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Sends `message` to every remote peer concurrently. Delivery is not
    /// checked; failures are only logged.
    pub fn broadcast(self: &Arc<Self>, message: Message) -> Vec<JoinHandle<()>> {
        self.remote_peers()
            .map(|peer| {
                let node = self.clone();
                let peer = peer.to_string();
                let message = message.clone();
                tokio::spawn(async move {
                    if let Err(e) = node.send_message(&peer, &message).await {
                        warn!(node = %node.name, %peer, "broadcast failed: {}", e);
                    }
                })
            })
            .collect()
    }
}

pub(crate) async fn connect(address: &str) -> Result<TcpStream> {
    TcpStream::connect(address)
        .await
        .map_err(|source| SyncError::Connect {
            address: address.to_string(),
            source,
        })
}

pub(crate) async fn write_line<W>(conn: &mut W, message: &impl std::fmt::Display) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    conn.write_all(format!("{}\n", message).as_bytes()).await?;
    conn.flush().await?;
    Ok(())
}
