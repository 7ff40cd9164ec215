//! Unary client for the `metrics.Metrics` service

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Response, Status};

use super::proto::metrics_client::MetricsClient;
use super::proto::{AddMetricsRequest, AddMetricsResponse};

/// Generated client bound to a lazily connecting channel
#[derive(Debug, Clone)]
pub struct MetricsRpcClient {
    inner: MetricsClient<Channel>,
    timeout: Duration,
}

impl MetricsRpcClient {
    /// Client for `address`, `http://` is assumed when no scheme is given.
    /// Every call is bounded by `timeout`.
    pub fn new(address: &str, timeout: Duration) -> Result<Self, tonic::transport::Error> {
        let endpoint = Endpoint::from_shared(endpoint_uri(address))?
            .connect_timeout(timeout)
            .timeout(timeout);

        Ok(Self {
            inner: MetricsClient::new(endpoint.connect_lazy()),
            timeout,
        })
    }

    pub async fn add_metrics(
        &self,
        message: AddMetricsRequest,
    ) -> Result<Response<AddMetricsResponse>, Status> {
        let mut request = Request::new(message);
        request.set_timeout(self.timeout);

        // the generated client needs `&mut`, clones share the channel
        self.inner.clone().add_metrics(request).await
    }
}

fn endpoint_uri(address: &str) -> String {
    let address = address.trim_end_matches('/');
    if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_is_added_only_when_missing() {
        assert_eq!(endpoint_uri("localhost:3200"), "http://localhost:3200");
        assert_eq!(endpoint_uri("http://10.0.0.1:3200/"), "http://10.0.0.1:3200");
        assert_eq!(endpoint_uri("https://hub.internal:443"), "https://hub.internal:443");
    }

    #[tokio::test]
    async fn test_address_with_scheme_is_accepted() {
        assert!(MetricsRpcClient::new("http://127.0.0.1:3200", Duration::from_secs(1)).is_ok());
        assert!(MetricsRpcClient::new("127.0.0.1:3200", Duration::from_secs(1)).is_ok());
    }
}
