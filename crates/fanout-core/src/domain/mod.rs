//! Domain types

mod config;
mod descriptor;

pub use config::Configuration;
pub use descriptor::BackendDescriptor;
