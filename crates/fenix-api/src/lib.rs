// fenix-api: Async Rust client for the Fenix sauna cloud REST API.

pub mod auth;
pub mod client;
pub mod command;
pub mod devices;
pub mod endpoints;
pub mod error;
pub mod transport;

pub use auth::{TokenListener, TokenState, EXPIRY_SKEW_SECS};
pub use client::CloudClient;
pub use command::{DeviceCommand, DeviceCommandSink};
pub use endpoints::{EndpointResolver, EndpointSet, Service};
pub use error::Error;
pub use transport::TransportConfig;

// Re-exported so hosts can name HTTP methods for raw `call`s without
// depending on reqwest directly.
pub use reqwest::Method;
