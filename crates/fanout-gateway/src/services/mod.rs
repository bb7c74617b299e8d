//! Gateway services

mod config_source;

pub use config_source::{ConfigSource, DEFAULT_FETCH_TIMEOUT, DEFAULT_POLL_INTERVAL};
