use std::collections::BTreeMap;

use chrono::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
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
    Berkeley's algorithm. The coordinator polls every peer for its clock,
    records each peer's offset from its own clock, adds itself with a zero
    offset and averages. Every member is then told how far to move so that
    all of them land on the average. Peers that fail to answer are left out
    of the average and are not adjusted. The wire only carries whole
    seconds, so peers lose the sub-second part of their adjustment.

    The survey and the adjustments are not atomic: a SETCLOCK or ADJUST_TIME
    arriving mid-round is applied in between.
*/

/// Peer address -> (peer clock - coordinator clock) at poll time.
pub type TimeDifferences = BTreeMap<String, Duration>;

const NANOS_PER_SEC: i128 = 1_000_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BerkeleyRound {
    pub average: Duration,
    /// Adjustment computed for every member that took part, coordinator included.
    pub adjustments: BTreeMap<String, Duration>,
    /// Peers that could not be polled or could not receive their adjustment.
    pub skipped: Vec<String>,
}

/// Mean of all differences, truncated toward zero at nanosecond precision.
pub fn average_difference(differences: &TimeDifferences) -> Result<Duration> {
    if differences.is_empty() {
        return Err(SyncError::EmptyRound);
    }

    let total: i128 = differences.values().map(|diff| as_nanos(*diff)).sum();
    Ok(from_nanos(total / differences.len() as i128))
}

/// Per-member adjustment `average - diff`, alongside the average itself.
pub fn compute_adjustments(differences: &TimeDifferences) -> Result<(Duration, BTreeMap<String, Duration>)> {
    let average = average_difference(differences)?;
    let adjustments = differences
        .iter()
        .map(|(peer, diff)| (peer.clone(), average - *diff))
        .collect();
    Ok((average, adjustments))
}

/// Whole seconds carried by `ADJUST_TIME`, truncated toward zero.
pub fn wire_seconds(adjustment: Duration) -> i64 {
    adjustment.num_seconds()
}

fn as_nanos(duration: Duration) -> i128 {
    duration
        .num_nanoseconds()
        .map(i128::from)
        .unwrap_or_else(|| i128::from(duration.num_milliseconds()) * 1_000_000)
}

fn from_nanos(nanos: i128) -> Duration {
    Duration::seconds((nanos / NANOS_PER_SEC) as i64) + Duration::nanoseconds((nanos % NANOS_PER_SEC) as i64)
}

/// Runs one full round with `coordinator` polling and adjusting every
/// remote peer it is configured with.
pub async fn synchronize_as_coordinator(coordinator: &Node) -> Result<BerkeleyRound> {
    info!(node = %coordinator.name(), "berkeley: starting round as coordinator");

    let mut differences = TimeDifferences::new();
    let mut skipped = Vec::new();

    for peer in coordinator.remote_peers() {
        match poll_peer(coordinator, peer).await {
            Ok(diff) => {
                debug!(node = %coordinator.name(), %peer, diff_ms = diff.num_milliseconds(), "berkeley: peer polled");
                differences.insert(peer.to_string(), diff);
            }
            Err(e) => {
                warn!(node = %coordinator.name(), %peer, "berkeley: skipping peer: {}", e);
                skipped.push(peer.to_string());
            }
        }
    }

    differences.insert(coordinator.address().to_string(), Duration::zero());

    let (average, adjustments) = compute_adjustments(&differences)?;
    info!(
        node = %coordinator.name(),
        responses = differences.len(),
        average_ms = average.num_milliseconds(),
        "berkeley: average difference computed"
    );

    for (peer, adjustment) in &adjustments {
        if peer == coordinator.address() {
            match coordinator.adjust_clock(*adjustment) {
                Ok((previous, new)) => info!(
                    node = %coordinator.name(),
                    previous = %clock_face(&previous),
                    new = %clock_face(&new),
                    adjustment_ms = adjustment.num_milliseconds(),
                    "berkeley: own clock adjusted"
                ),
                Err(e) => warn!(node = %coordinator.name(), "berkeley: own clock left unadjusted: {}", e),
            }
            continue;
        }

        let message = Message::AdjustTime(wire_seconds(*adjustment));
        match coordinator.send_message(peer, &message).await {
            Ok(()) => debug!(node = %coordinator.name(), %peer, %message, "berkeley: adjustment sent"),
            Err(e) => {
                warn!(node = %coordinator.name(), %peer, "berkeley: failed to send adjustment: {}", e);
                skipped.push(peer.clone());
            }
        }
    }

    info!(node = %coordinator.name(), "berkeley: round complete");

    Ok(BerkeleyRound {
        average,
        adjustments,
        skipped,
    })
}

async fn poll_peer(coordinator: &Node, peer: &str) -> Result<Duration> {
    let mut stream = connect(peer).await?;
    write_line(&mut stream, &Message::GetTime).await?;

    let mut line = String::new();
    if BufReader::new(&mut stream).read_line(&mut line).await? == 0 {
        return Err(SyncError::EmptyReply(peer.to_string()));
    }

    let remote = parse_timestamp(&line)?;
    Ok(remote - coordinator.clock())
}

/// Participant side of a round: answers `GET_TIME` and applies `ADJUST_TIME`.
pub async fn respond_to_berkeley<W>(participant: &Node, message: &Message, conn: &mut W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match message {
        Message::GetTime => {
            let now = format_timestamp(&participant.clock());
            write_line(conn, &now).await?;
            debug!(node = %participant.name(), time = %now, "berkeley: time sent");
        }
        Message::AdjustTime(seconds) => {
            let adjusted = Duration::try_seconds(*seconds)
                .ok_or_else(|| SyncError::ClockOutOfRange(format!("{} seconds", seconds)))
                .and_then(|delta| participant.adjust_clock(delta));
            match adjusted {
                Ok((previous, new)) => info!(
                    node = %participant.name(),
                    previous = %clock_face(&previous),
                    new = %clock_face(&new),
                    seconds,
                    "berkeley: clock adjusted by coordinator"
                ),
                // Ignored like any other unusable adjustment; no reply either way.
                Err(e) => warn!(node = %participant.name(), "berkeley: ignoring adjustment: {}", e),
            }
        }
        other => {
            debug!(node = %participant.name(), kind = other.kind(), "berkeley: not a berkeley message");
        }
    }

    Ok(())
}
