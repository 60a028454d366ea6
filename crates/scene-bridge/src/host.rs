//! Host-side integration surface.
//!
//! The embedding application describes itself to the bridge through two
//! seams: a [`ToolRegistry`] of named mutating operations and a
//! [`ResourceProvider`] for read access to the object graph. Both run
//! exclusively on the host main loop, so implementations may touch
//! thread-affine host state freely and should return promptly.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::{BridgeError, Result};
use crate::protocol::ResourceDescriptor;

/// Failure reported by a tool or resource handler.
///
/// The message travels back to the controller verbatim inside an error
/// envelope, so it should describe the problem, not the host's internals.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ToolError {
    message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for ToolError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ToolError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// What a tool invocation produces: a JSON result map or a failure.
pub type ToolResult = std::result::Result<Value, ToolError>;

/// A named operation the controller may invoke via `call_tool`.
pub trait ToolHandler: Send + Sync {
    /// Invoked on the host main loop with the request's argument map.
    fn call(&self, arguments: &Map<String, Value>) -> ToolResult;
}

impl<F> ToolHandler for F
where
    F: Fn(&Map<String, Value>) -> ToolResult + Send + Sync,
{
    fn call(&self, arguments: &Map<String, Value>) -> ToolResult {
        self(arguments)
    }
}

/// Read access to the host's object graph.
pub trait ResourceProvider: Send + Sync {
    /// Descriptors for everything currently addressable.
    fn list_resources(&self) -> std::result::Result<Vec<ResourceDescriptor>, ToolError>;

    /// Detail map for a single resource, or an error if it does not exist.
    fn read_resource(&self, resource_type: &str, id: &str) -> ToolResult;

    /// Whether a scene object with this exact name exists right now.
    fn check_object_exists(&self, object_name: &str) -> std::result::Result<bool, ToolError>;
}

/// Immutable lookup table of registered tools.
///
/// Populated before the server starts and never mutated afterwards, so
/// lookups need no locking. Duplicate names are rejected at registration
/// rather than silently overwriting an earlier handler.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool under a unique name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl ToolHandler + 'static,
    ) -> Result<()> {
        let name = name.into();
        if self.tools.contains_key(&name) {
            return Err(BridgeError::DuplicateTool { tool: name });
        }
        self.tools.insert(name, Arc::new(handler));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names in stable order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
