//! MCP server side
//!
//! `handler` implements rmcp's `ServerHandler` over the aggregator; the
//! endpoints in `server` decide how it is exposed.

pub mod handler;

pub use handler::FanoutHandler;
