//! Request routing between the wire and the host main loop.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::host::{ResourceProvider, ToolError, ToolRegistry};
use crate::mainloop::MainLoopHandle;
use crate::protocol::{Request, Response};

/// Routes decoded requests to the host and shapes the reply envelope.
///
/// One dispatcher is shared by every connection. All host access funnels
/// through the main loop handle, so tool handlers and resource providers
/// only ever run on the thread the host drives.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    registry: Arc<ToolRegistry>,
    provider: Arc<dyn ResourceProvider>,
    main_loop: MainLoopHandle,
    call_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<ToolRegistry>,
        provider: Arc<dyn ResourceProvider>,
        main_loop: MainLoopHandle,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            provider,
            main_loop,
            call_timeout,
        }
    }

    /// Answer one decoded payload.
    ///
    /// Always produces an envelope. Whatever goes wrong here is a request
    /// error; the connection it arrived on stays open.
    pub(crate) async fn handle(&self, payload: Value) -> Response {
        let request = match Request::from_payload(payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "rejected request");
                return Response::error(e.to_string());
            }
        };

        let action = request.action();
        debug!(action, "dispatching request");
        match self.execute(request).await {
            Ok(result) => Response::success(result),
            Err(e) => {
                debug!(action, error = %e, "request failed");
                Response::error(e.to_string())
            }
        }
    }

    async fn execute(&self, request: Request) -> Result<Value> {
        match request {
            Request::ListResources => {
                let provider = self.provider.clone();
                self.submit("list_resources", move || {
                    let descriptors = provider.list_resources()?;
                    let resources = serde_json::to_value(descriptors)
                        .map_err(|e| ToolError::new(e.to_string()))?;
                    Ok(json!({ "resources": resources }))
                })
                .await
            }
            Request::ReadResource { resource_type, id } => {
                let provider = self.provider.clone();
                self.submit("read_resource", move || {
                    provider.read_resource(&resource_type, &id)
                })
                .await
            }
            Request::CheckObjectExists { object_name } => {
                let provider = self.provider.clone();
                self.submit("check_object_exists", move || {
                    let exists = provider.check_object_exists(&object_name)?;
                    Ok(json!({ "exists": exists }))
                })
                .await
            }
            Request::CallTool { tool, arguments } => {
                // Resolve the tool before anything reaches the queue, so an
                // unknown name fails without a main-loop round trip.
                let handler = self
                    .registry
                    .get(&tool)
                    .ok_or_else(|| BridgeError::UnknownTool { tool: tool.clone() })?;
                self.submit(tool, move || handler.call(&arguments)).await
            }
        }
    }

    async fn submit<F>(&self, label: impl Into<String>, work: F) -> Result<Value>
    where
        F: FnOnce() -> std::result::Result<Value, ToolError> + Send + 'static,
    {
        self.main_loop.submit(label, self.call_timeout, work).await
    }
}
