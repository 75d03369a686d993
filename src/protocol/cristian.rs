use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use tokio::io::{AsyncReadExt, AsyncWrite};
use tracing::{debug, info, warn};

use crate::{
    common::{
        time::{clock_face, format_timestamp, parse_timestamp},
        Result, SyncError,
    },
    network::{
        node::{connect, write_line},
        Message, Node,
    },
};

/*
    Cristian's algorithm. The client asks a time server for its clock and
    assumes the reply spent half of the measured round trip in flight, so it
    sets its own clock to server_time + rtt / 2. The jump is applied
    unconditionally, whatever its size.
*/

/// Upper bound on the reply read; a timestamp line is 20 bytes.
const REPLY_BUFFER_SIZE: usize = 128;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CristianSample {
    pub initial: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
    pub round_trip: Duration,
    pub estimated: DateTime<Utc>,
}

impl CristianSample {
    pub fn latency(&self) -> Duration {
        self.round_trip / 2
    }

    /// How far the local clock moved; positive means it was behind.
    pub fn offset(&self) -> Duration {
        self.estimated - self.initial
    }
}

pub fn estimate_server_time(server_time: DateTime<Utc>, round_trip: Duration) -> DateTime<Utc> {
    server_time + round_trip / 2
}

/// Runs one request/reply exchange with `server` and sets the node's clock
/// to the latency-corrected server time. Any failure leaves the clock alone.
pub async fn synchronize_with(client: &Node, server: &str) -> Result<CristianSample> {
    info!(node = %client.name(), %server, "cristian: synchronizing");

    let initial = client.clock();
    let t0 = Instant::now();

    let mut stream = connect(server).await?;
    write_line(&mut stream, &Message::TimeRequest).await?;

    // Single bounded read, not line buffered.
    let mut buffer = [0u8; REPLY_BUFFER_SIZE];
    let n = stream.read(&mut buffer).await?;
    if n == 0 {
        return Err(SyncError::EmptyReply(server.to_string()));
    }
    let t1 = Instant::now();

    let reply = String::from_utf8_lossy(&buffer[..n]);
    let server_time = parse_timestamp(&reply)?;

    let round_trip = Duration::from_std(t1 - t0).unwrap_or_else(|_| Duration::zero());
    let estimated = estimate_server_time(server_time, round_trip);
    client.set_clock(estimated);

    let sample = CristianSample {
        initial,
        server_time,
        round_trip,
        estimated,
    };

    debug!(
        node = %client.name(),
        rtt_ms = sample.round_trip.num_milliseconds(),
        latency_ms = sample.latency().num_milliseconds(),
        "cristian: round trip measured"
    );
    info!(
        node = %client.name(),
        %server,
        previous = %clock_face(&initial),
        new = %clock_face(&estimated),
        offset_ms = sample.offset().num_milliseconds(),
        "cristian: clock adjusted"
    );

    Ok(sample)
}

/// Server side: replies with the node's clock as a timestamp line.
pub async fn respond_to_time_request<W>(server: &Node, conn: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let now = format_timestamp(&server.clock());
    if let Err(e) = write_line(conn, &now).await {
        warn!(node = %server.name(), "cristian: failed to send time: {}", e);
        return Err(e);
    }
    debug!(node = %server.name(), time = %now, "cristian: time sent");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{
        node::tests::{fixed_time, spawn_node},
        NodeConfig,
    };
    use tokio::{io::AsyncWriteExt, net::TcpListener};

    #[test]
    fn test_estimate_adds_half_round_trip() {
        let server_time = fixed_time(10, 0, 0);
        let estimated = estimate_server_time(server_time, Duration::milliseconds(200));
        assert_eq!(estimated, server_time + Duration::milliseconds(100));
    }

    #[test]
    fn test_estimate_with_zero_round_trip() {
        let server_time = fixed_time(10, 0, 0);
        assert_eq!(estimate_server_time(server_time, Duration::zero()), server_time);
    }

    #[test]
    fn test_sample_offset() {
        let sample = CristianSample {
            initial: fixed_time(9, 59, 0),
            server_time: fixed_time(10, 0, 0),
            round_trip: Duration::milliseconds(200),
            estimated: fixed_time(10, 0, 0) + Duration::milliseconds(100),
        };
        assert_eq!(sample.latency(), Duration::milliseconds(100));
        assert_eq!(sample.offset(), Duration::milliseconds(60_100));
    }

    #[tokio::test]
    async fn test_synchronize_with_server_node() {
        let server = spawn_node("server", fixed_time(18, 30, 0), vec![]).await;
        let client = Node::with_clock(
            NodeConfig::new("client", "127.0.0.1:1", vec![server.address().to_string()]),
            fixed_time(6, 0, 0),
        );

        let sample = synchronize_with(&client, server.address()).await.unwrap();

        assert_eq!(sample.initial, fixed_time(6, 0, 0));
        assert_eq!(sample.server_time, fixed_time(18, 30, 0));
        assert_eq!(sample.estimated, fixed_time(18, 30, 0) + sample.latency());
        assert_eq!(client.clock(), sample.estimated);
        // Loopback round trips are far below a second.
        assert!(client.clock() - fixed_time(18, 30, 0) < Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_unreachable_server_leaves_clock_alone() {
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let client = Node::with_clock(NodeConfig::new("client", "127.0.0.1:1", vec![]), fixed_time(6, 0, 0));

        let err = synchronize_with(&client, &address).await.unwrap_err();
        assert!(matches!(err, SyncError::Connect { .. }));
        assert_eq!(client.clock(), fixed_time(6, 0, 0));
    }

    #[tokio::test]
    async fn test_malformed_reply_leaves_clock_alone() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"half past nine\n").await.unwrap();
        });
        let client = Node::with_clock(NodeConfig::new("client", "127.0.0.1:1", vec![]), fixed_time(6, 0, 0));

        let err = synchronize_with(&client, &address).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidTimestamp(_)));
        assert_eq!(client.clock(), fixed_time(6, 0, 0));
    }

    #[tokio::test]
    async fn test_closed_without_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });
        let client = Node::with_clock(NodeConfig::new("client", "127.0.0.1:1", vec![]), fixed_time(6, 0, 0));

        assert!(synchronize_with(&client, &address).await.is_err());
        assert_eq!(client.clock(), fixed_time(6, 0, 0));
    }

    #[tokio::test]
    async fn test_respond_to_time_request() {
        let node = Node::with_clock(NodeConfig::new("server", "127.0.0.1:1", vec![]), fixed_time(7, 8, 9));
        let mut reply = Vec::new();

        respond_to_time_request(&node, &mut reply).await.unwrap();
        assert_eq!(reply, b"2024-03-01 07:08:09\n");
    }
}
