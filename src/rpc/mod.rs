//! gRPC flavour of the ingestion protocol
//!
//! - [`proto`]: messages and stubs generated from `proto/metrics.proto`
//! - [`client`]: the unary client used by the agent's RPC transport
//! - [`handler`]: maps requests onto the aggregation service
//! - [`server`]: serves the handler next to the REST API

pub mod client;
pub mod handler;
pub mod proto;
pub mod server;

pub use client::MetricsRpcClient;
pub use handler::MetricsRpcHandler;
pub use server::spawn_rpc_server;
