pub mod crypto;
pub mod error;
pub mod time;

pub use error::{Result, SyncError};
