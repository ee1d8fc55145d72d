//! Endpoint probes decide whether a registered server answers.

use crate::registry::records::ServerRecord;
use crate::types::{Error, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Checks that a registered server's endpoint is reachable.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn probe(&self, server: &ServerRecord) -> Result<()>;
}

/// Treats every endpoint as reachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeReachable;

#[async_trait]
impl EndpointProbe for AssumeReachable {
    async fn probe(&self, _server: &ServerRecord) -> Result<()> {
        Ok(())
    }
}

/// Issues a GET against HTTP(S) endpoints; a 5xx or transport error is a
/// failure. Non-HTTP endpoints (stdio commands, sockets) are not probed.
#[derive(Debug, Clone)]
pub struct HttpEndpointProbe {
    client: reqwest::Client,
}

impl HttpEndpointProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn is_http(endpoint: &str) -> bool {
    let lower = endpoint.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[async_trait]
impl EndpointProbe for HttpEndpointProbe {
    async fn probe(&self, server: &ServerRecord) -> Result<()> {
        if !is_http(&server.endpoint) {
            tracing::trace!(server = %server.name, endpoint = %server.endpoint, "endpoint_not_probed");
            return Ok(());
        }

        let response = self.client.get(&server.endpoint).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(Error::internal(format!(
                "{} answered {}",
                server.endpoint, status
            )));
        }
        Ok(())
    }
}
