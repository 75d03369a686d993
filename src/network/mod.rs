pub mod config;
pub mod message;
pub mod node;

pub use config::*;
pub use message::*;
pub use node::Node;

/*
    Transport is plain TCP with one request line per connection. Delivery is
    best effort: a peer that cannot be dialed is skipped for the current
    round and nothing is retried. No timeouts are configured, so a peer that
    accepts but never answers stalls the caller on that exchange.
*/
