//! gRPC listener of the hub

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{error, info};

use crate::service::MetricService;

use super::handler::MetricsRpcHandler;
use super::proto::metrics_server::MetricsServer;

/// Serve `metrics.Metrics` on `bind_addr` until `shutdown` resolves.
///
/// Returns the bound address and the task running the server; the task ends
/// once in-flight calls have completed after the shutdown signal.
pub async fn spawn_rpc_server<F>(
    bind_addr: &str,
    service: Arc<MetricService>,
    shutdown: F,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;
    info!("RPC server listening on {}", addr);

    let handler = MetricsRpcHandler::new(service);
    let task = tokio::spawn(async move {
        let result = Server::builder()
            .add_service(MetricsServer::new(handler))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await;

        match result {
            Ok(()) => info!("RPC server stopped"),
            Err(e) => error!("RPC server error: {}", e),
        }
    });

    Ok((addr, task))
}
