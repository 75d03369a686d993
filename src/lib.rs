/*
    Clock synchronization between peer nodes over a line-based TCP protocol.

    Three strategies are provided: Cristian's algorithm (a client estimates a
    server's clock from one round trip), Berkeley's algorithm (a coordinator
    averages every member's offset and pushes corrections) and Lamport
    logical clocks (a counter carried on messages that orders events
    causally). Each node serves its peers from a background listener while a
    driver runs one of the strategies against them.
*/

pub mod common;
pub mod network;
pub mod protocol;

pub use common::{Result, SyncError};
pub use network::{Message, Node, NodeConfig};
pub use protocol::{Algorithm, LogicalClock, SyncReport};
