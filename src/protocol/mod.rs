pub mod berkeley;
pub mod cristian;
pub mod lamport;

pub use berkeley::*;
pub use cristian::*;
pub use lamport::*;

use std::fmt;

use tracing::{info, warn};

use crate::network::Node;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Cristian,
    Berkeley,
    Logical,
    /// Reserved; not implemented.
    Vector,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Cristian => "cristian",
            Algorithm::Berkeley => "berkeley",
            Algorithm::Logical => "logical",
            Algorithm::Vector => "vector",
        };
        f.write_str(name)
    }
}

/// What a driver run achieved: peers that synchronized and peers skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synchronized: Vec<String>,
    pub skipped: Vec<String>,
}

/// Runs `algorithm` from `node` against its remote peers, one at a time.
/// A peer that fails is logged and skipped. `logical_clock` is only used by
/// `Algorithm::Logical`.
pub async fn synchronize(node: &Node, algorithm: Algorithm, logical_clock: &LogicalClock) -> SyncReport {
    let mut report = SyncReport::default();

    match algorithm {
        Algorithm::Cristian => {
            for peer in node.remote_peers() {
                match cristian::synchronize_with(node, peer).await {
                    Ok(_) => report.synchronized.push(peer.to_string()),
                    Err(e) => {
                        warn!(node = %node.name(), %peer, "cristian: skipping peer: {}", e);
                        report.skipped.push(peer.to_string());
                    }
                }
            }
        }
        Algorithm::Berkeley => match berkeley::synchronize_as_coordinator(node).await {
            Ok(round) => {
                report.synchronized = round
                    .adjustments
                    .into_keys()
                    .filter(|peer| peer != node.address() && !round.skipped.contains(peer))
                    .collect();
                report.skipped = round.skipped;
            }
            Err(e) => warn!(node = %node.name(), "berkeley: round aborted: {}", e),
        },
        Algorithm::Logical => {
            let content = format!("Hello from {}", node.name());
            for peer in node.remote_peers() {
                match lamport::send_logical_message(node, peer, logical_clock, &content).await {
                    Ok(_) => report.synchronized.push(peer.to_string()),
                    Err(e) => {
                        warn!(node = %node.name(), %peer, "lamport: skipping peer: {}", e);
                        report.skipped.push(peer.to_string());
                    }
                }
            }
        }
        Algorithm::Vector => {
            info!(node = %node.name(), "vector clocks are not implemented");
        }
    }

    report
}
