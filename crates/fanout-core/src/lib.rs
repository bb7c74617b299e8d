//! # mcp-fanout Core Library
//!
//! Domain types and rules shared by the gateway and the binary.
//!
//! ## Modules
//!
//! - `branding` - Product naming and environment variable names
//! - `domain` - Backend descriptors and configuration snapshots
//! - `category` - Fixed list/follow-up operation table used for routing
//! - `error` - Proxy and backend error taxonomy
//! - `retry` - Exponential backoff policy

pub mod branding;
pub mod category;
pub mod domain;
pub mod error;
pub mod retry;

// Re-export commonly used types
pub use category::OperationCategory;
pub use domain::*;
pub use error::{BackendError, ProxyError, ProxyResult};
pub use retry::RetryPolicy;
