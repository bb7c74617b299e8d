//! Proxy lifecycle tests
//!
//! Start, live reconfiguration, stop conditions and disposal, with a
//! wiremock configuration endpoint, mock backends and a mock endpoint.

mod start;
