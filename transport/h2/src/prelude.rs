//! Prelude module for convenient imports

pub use crate::config::H2Config;
pub use crate::transport::H2Transport;
