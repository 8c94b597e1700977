//! The IM Gateway: owns the TCP listen socket, authenticates and multiplexes
//! connections through [`imcore_connmgr::ConnManager`], and persists/fans
//! out chat messages via the API Gateway RPC client.

pub mod connection;
pub mod error;
pub mod seq;
pub mod server;
pub mod state;

pub use error::{Error, Result};
pub use server::{ImGatewayRpcService, serve};
pub use state::GatewayState;
