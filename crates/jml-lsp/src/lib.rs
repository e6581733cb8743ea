pub mod cache;
pub mod config;
pub mod publisher;
pub mod server;
pub mod session;

#[cfg(test)]
mod test_utils;

// Re-export from jml-core
pub use jml_core::{JmlError, Result};

pub use config::JmlConfig;
pub use server::Backend;
pub use session::Session;
