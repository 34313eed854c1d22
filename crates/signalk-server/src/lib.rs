//! # signalk-server
//!
//! Gateway runtime on tokio: the ingest actor, the WebSocket delta stream,
//! the NMEA 0183 TCP server and the stream inputs.
//!
//! Enable features based on target platform:
//! - `tokio-runtime` (default) - For Linux/desktop

#[cfg(feature = "tokio-runtime")]
pub mod gateway;
#[cfg(feature = "tokio-runtime")]
pub mod inputs;
#[cfg(feature = "tokio-runtime")]
pub mod nmea_tcp;
#[cfg(feature = "tokio-runtime")]
pub mod server;
pub mod subscription;

pub use signalk_core::{Delta, SignalKStore};

#[cfg(feature = "tokio-runtime")]
pub use gateway::{Ingest, ServerEvent, SharedSources, SharedStore};
#[cfg(feature = "tokio-runtime")]
pub use nmea_tcp::{run_regenerator, NmeaTcpConfig, NmeaTcpServer};
#[cfg(feature = "tokio-runtime")]
pub use server::{Outbound, ServerConfig, SignalKServer};
pub use subscription::{ClientSubscriptions, SubscribedClients};

/// Error type of the server tasks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
