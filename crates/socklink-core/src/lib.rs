pub mod config;
pub mod errors;
pub mod types;

pub use config::{SessionConfig, DEFAULT_ENDPOINT};
pub use errors::{SessionError, TransportError};
pub use types::*;
