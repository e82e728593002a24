//! HTTP/2 transport for the WebPush client

pub mod config;
pub mod prelude;
pub mod transport;

pub use config::H2Config;
pub use transport::H2Transport;
