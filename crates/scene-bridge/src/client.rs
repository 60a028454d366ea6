//! Controller-side client for the bridge.
//!
//! Connects to the host's endpoint and exchanges strictly alternating
//! request/response pairs. The host often starts a beat later than the
//! controller, so connecting retries with exponential backoff before giving
//! up.
//!
//! # Thread Safety
//!
//! A tokio `Mutex` serializes access to the stream, so the client can be
//! shared across tasks; each exchange owns the connection from first write
//! to final read.

use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{BridgeError, Result};
use crate::framing;
use crate::protocol::{Request, ResourceDescriptor, Response};
use crate::transport::{Endpoint, Stream};

/// Client connection to a running bridge server.
#[derive(Debug)]
pub struct BridgeClient {
    stream: Mutex<Stream>,
    endpoint: Endpoint,
    config: ClientConfig,
}

impl BridgeClient {
    /// Connect with default settings.
    pub async fn connect(endpoint: Endpoint) -> Result<Self> {
        Self::connect_with(endpoint, ClientConfig::default()).await
    }

    /// Connect, retrying with exponential backoff while the host side is
    /// still coming up.
    pub async fn connect_with(endpoint: Endpoint, config: ClientConfig) -> Result<Self> {
        let attempts = config.connect_attempts.max(1);
        let mut backoff = config.initial_backoff;
        let mut last_error: Option<BridgeError> = None;

        for attempt in 1..=attempts {
            match tokio::time::timeout(config.connect_timeout, Stream::connect(&endpoint)).await {
                Ok(Ok(stream)) => {
                    debug!(%endpoint, attempt, "bridge client connected");
                    return Ok(Self {
                        stream: Mutex::new(stream),
                        endpoint,
                        config,
                    });
                }
                Ok(Err(e)) => {
                    debug!(%endpoint, attempt, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
                Err(_elapsed) => {
                    debug!(%endpoint, attempt, "connect attempt timed out");
                    last_error =
                        Some(BridgeError::connection(format!("connect to {endpoint} timed out")));
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
        }

        let detail = match last_error {
            Some(e) => e.to_string(),
            None => "no attempts made".to_string(),
        };
        Err(BridgeError::connection(format!(
            "failed to connect to {endpoint} after {attempts} attempts: {detail}"
        )))
    }

    /// One request/response exchange.
    ///
    /// A timed-out or failed exchange leaves the connection in an unknown
    /// framing state; drop the client and reconnect rather than retrying on
    /// the same socket.
    pub async fn request(&self, request: &Request) -> Result<Response> {
        let payload = serde_json::to_value(request)?;
        let mut stream = self.stream.lock().await;

        let exchange = async {
            framing::write_message(&mut *stream, &payload).await?;
            framing::read_message(&mut *stream).await
        };

        let reply = tokio::time::timeout(self.config.io_timeout, exchange)
            .await
            .map_err(|_| {
                BridgeError::connection(format!(
                    "timed out waiting for {} response",
                    request.action()
                ))
            })??
            .ok_or_else(|| BridgeError::connection("connection closed by server"))?;

        serde_json::from_value(reply)
            .map_err(|e| BridgeError::framing(format!("malformed response envelope: {e}")))
    }

    /// Enumerate the host's resources.
    pub async fn list_resources(&self) -> Result<Vec<ResourceDescriptor>> {
        let result = self.expect_success(&Request::ListResources).await?;
        let resources = result
            .get("resources")
            .cloned()
            .ok_or_else(|| BridgeError::framing("list_resources result missing resources field"))?;
        serde_json::from_value(resources)
            .map_err(|e| BridgeError::framing(format!("malformed resource list: {e}")))
    }

    /// Fetch the detail map for one resource.
    pub async fn read_resource(&self, resource_type: &str, id: &str) -> Result<Value> {
        self.expect_success(&Request::ReadResource {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        })
        .await
    }

    /// Invoke a tool on the host, returning its result map.
    pub async fn call_tool(&self, tool: &str, arguments: Map<String, Value>) -> Result<Value> {
        self.expect_success(&Request::CallTool {
            tool: tool.to_string(),
            arguments,
        })
        .await
    }

    /// Probe for a scene object by exact name.
    pub async fn check_object_exists(&self, object_name: &str) -> Result<bool> {
        let result = self
            .expect_success(&Request::CheckObjectExists {
                object_name: object_name.to_string(),
            })
            .await?;
        result
            .get("exists")
            .and_then(Value::as_bool)
            .ok_or_else(|| BridgeError::framing("check_object_exists result missing exists field"))
    }

    async fn expect_success(&self, request: &Request) -> Result<Value> {
        match self.request(request).await? {
            Response::Success { result } => Ok(result),
            Response::Error { message } => Err(BridgeError::Remote { message }),
        }
    }

    /// The endpoint this client connected to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Close the connection cleanly.
    pub async fn close(self) -> Result<()> {
        let mut stream = self.stream.into_inner();
        match stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(BridgeError::connection(format!("close failed: {e}"))),
        }
    }
}
