use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    common::{Result, SyncError},
    network::{Message, Node},
};

/*
    Lamport logical clock. A send bumps the counter before the message is
    built; a receive moves the counter to max(local, remote) + 1. The counter
    never decreases, and the receiver always ends up strictly past the value
    the sender stamped on the message.

    The clock belongs to the caller, not to the node: whoever wants logical
    ordering creates one and passes it to the send and receive paths.
*/

#[derive(Debug, Default)]
pub struct LogicalClock {
    value: Mutex<u64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        *self.value.lock()
    }

    /// Fails without touching the counter once it would pass `u64::MAX`.
    pub fn increment(&self) -> Result<u64> {
        let mut value = self.value.lock();
        *value = value.checked_add(1).ok_or(SyncError::CounterOverflow {
            local: *value,
            remote: *value,
        })?;
        Ok(*value)
    }

    pub fn synchronize(&self, remote: u64) -> Result<u64> {
        let mut value = self.value.lock();
        *value = (*value)
            .max(remote)
            .checked_add(1)
            .ok_or(SyncError::CounterOverflow { local: *value, remote })?;
        Ok(*value)
    }
}

/// Stamps `content` with the next counter value and sends it to `to`.
/// Returns the counter the message carried.
pub async fn send_logical_message(from: &Node, to: &str, clock: &LogicalClock, content: &str) -> Result<u64> {
    let counter = clock.increment()?;
    from.send_message(to, &Message::lamport(counter, content)).await?;

    info!(node = %from.name(), %to, counter, "lamport: message sent");
    Ok(counter)
}

/// Parses a raw `LAMPORT:<counter>:<content>` line and applies it.
pub fn handle_logical_message(node: &Node, clock: &LogicalClock, raw: &str) -> Result<u64> {
    match raw.parse::<Message>()? {
        Message::Lamport { counter, content } => receive_logical_message(node, clock, counter, &content),
        _ => Err(SyncError::InvalidLamport(raw.trim().to_string())),
    }
}

/// Applies a received counter; a value that would overflow the clock is
/// discarded and leaves it unchanged.
pub fn receive_logical_message(node: &Node, clock: &LogicalClock, remote: u64, content: &str) -> Result<u64> {
    let local = clock.synchronize(remote)?;
    info!(node = %node.name(), remote, local, "lamport: message received");
    debug!(node = %node.name(), %content, "lamport: payload");
    Ok(local)
}
