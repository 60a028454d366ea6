//! Request and response types carried inside framed messages.
//!
//! Requests are tagged by an `action` field and responses by a `status`
//! field, so each side deserializes straight into an enum and matching on it
//! is exhaustive. An unrecognized action is answered with an error envelope
//! rather than tearing the connection down, which means the discriminator has
//! to be inspected before the typed decode runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};

/// A request from the controller, tagged by its `action` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Enumerate every addressable resource in the host scene.
    ListResources,
    /// Fetch the detail map for one resource.
    ReadResource {
        #[serde(rename = "type")]
        resource_type: String,
        id: String,
    },
    /// Invoke a registered tool on the host main loop.
    CallTool {
        tool: String,
        #[serde(default)]
        arguments: Map<String, Value>,
    },
    /// Cheap existence probe for a named scene object.
    CheckObjectExists { object_name: String },
}

impl Request {
    /// Every action name the bridge understands.
    pub const KNOWN_ACTIONS: &'static [&'static str] = &[
        "list_resources",
        "read_resource",
        "call_tool",
        "check_object_exists",
    ];

    /// Decode a request from an already-parsed payload.
    ///
    /// The `action` discriminator is checked before the typed decode so an
    /// unknown action and a known action with malformed fields produce
    /// distinct errors. Both are request errors, not connection errors.
    pub fn from_payload(payload: Value) -> Result<Self> {
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidRequest {
                message: "missing or non-string action field".to_string(),
            })?;

        if !Self::KNOWN_ACTIONS.contains(&action) {
            return Err(BridgeError::UnknownAction {
                action: action.to_string(),
            });
        }

        let action = action.to_string();
        serde_json::from_value(payload).map_err(|e| BridgeError::InvalidRequest {
            message: format!("malformed {action} request: {e}"),
        })
    }

    /// The wire name of this request's action.
    pub fn action(&self) -> &'static str {
        match self {
            Request::ListResources => "list_resources",
            Request::ReadResource { .. } => "read_resource",
            Request::CallTool { .. } => "call_tool",
            Request::CheckObjectExists { .. } => "check_object_exists",
        }
    }
}

/// A reply to the controller, tagged by its `status` field.
///
/// Every request is answered with exactly one of these; nothing else ever
/// travels server-to-client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Success { result: Value },
    Error { message: String },
}

impl Response {
    /// Wrap a result map in a success envelope.
    pub fn success(result: Value) -> Self {
        Response::Success { result }
    }

    /// Wrap a human-readable message in an error envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

/// One entry in a `list_resources` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub id: String,
    pub name: String,
}
