pub mod breakpoint;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod eval;
pub mod host;
pub mod log;
pub mod protocol;
pub mod session;

pub use error::Error;

/// Name the engine reports in the `init` handshake packet.
pub const ENGINE_NAME: &str = "dbgp-engine";
/// Engine version reported in the `init` handshake packet.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Version of the DBGp protocol this engine implements.
pub const PROTOCOL_VERSION: &str = "1.0";
