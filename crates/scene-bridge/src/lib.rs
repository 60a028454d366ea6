//! Local IPC bridge between a controller process and a single-threaded 3D
//! host application.
//!
//! The host embeds the server half: it registers tools in a [`ToolRegistry`],
//! hands the bridge a [`ResourceProvider`] for read access, and drives a
//! [`MainLoopRunner`] from its own tick callback so every host API call
//! happens on the host's main thread. The controller embeds [`BridgeClient`]
//! and issues requests over a local socket; each request is answered with
//! exactly one success or error envelope.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scene_bridge::{BridgeServer, MainLoopConfig, ServerConfig, ToolRegistry};
//!
//! // Host side: wire the bridge into the application.
//! let mut registry = ToolRegistry::new();
//! registry.register("create_object", create_object_tool)?;
//!
//! let (handle, runner) = scene_bridge::mainloop::channel(MainLoopConfig::default());
//! let server = BridgeServer::new(
//!     ServerConfig::default(),
//!     Arc::new(registry),
//!     Arc::new(scene), // impl ResourceProvider
//!     handle,
//! );
//! let endpoint = server.start().await?;
//!
//! // Host tick, called from the application's own main loop:
//! //     let ran = runner.run_pending();
//! //     schedule_next_tick(runner.suggested_delay(ran));
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod host;
pub mod mainloop;
pub mod protocol;
pub mod server;
pub mod transport;

mod dispatch;

// Re-export commonly used types
pub use client::BridgeClient;
pub use config::{ClientConfig, MainLoopConfig, ServerConfig, TransportDefaults, WireConfig};
pub use error::{BridgeError, Result};
pub use host::{ResourceProvider, ToolError, ToolHandler, ToolRegistry, ToolResult};
pub use mainloop::{MainLoopHandle, MainLoopRunner};
pub use protocol::{Request, ResourceDescriptor, Response};
pub use server::BridgeServer;
pub use transport::Endpoint;
