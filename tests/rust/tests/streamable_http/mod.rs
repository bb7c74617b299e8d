//! Streamable HTTP end-to-end tests
//!
//! Real rmcp servers on ephemeral ports: backends reached through the
//! connector, and the proxy itself served over its HTTP endpoint.

mod connector;
