//! Demo host - serve an in-memory scene from a tick loop
//!
//! Simulates a host application whose data may only be touched from its main
//! thread. The tokio runtime runs on background threads; the main thread
//! ticks the loop and executes whatever tool calls arrived since last tick.
//!
//! Pass an endpoint as the first argument ("port:27015", "127.0.0.1:9100"
//! or a socket file path). Stop with Ctrl-C.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde_json::{json, Map, Value};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scene_bridge::{
    mainloop, BridgeServer, Endpoint, MainLoopConfig, ResourceDescriptor, ResourceProvider,
    ServerConfig, ToolError, ToolRegistry, ToolResult,
};

#[derive(Clone)]
struct DemoObject {
    name: String,
    object_type: String,
}

/// Scene state that only the main thread touches.
///
/// The mutex is never contended at runtime: every access is scheduled onto
/// the tick loop below. It only satisfies the Sync bound that sharing the
/// provider with the listener requires.
#[derive(Default)]
struct DemoScene {
    objects: Mutex<Vec<DemoObject>>,
}

impl ResourceProvider for DemoScene {
    fn list_resources(&self) -> Result<Vec<ResourceDescriptor>, ToolError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|o| ResourceDescriptor {
                resource_type: "object".into(),
                id: o.name.clone(),
                name: o.name.clone(),
            })
            .collect())
    }

    fn read_resource(&self, resource_type: &str, id: &str) -> ToolResult {
        if resource_type != "object" {
            return Err(ToolError::new(format!(
                "unknown resource type {resource_type}"
            )));
        }
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        match objects.iter().find(|o| o.name == id) {
            Some(o) => Ok(json!({
                "type": "object",
                "id": o.name,
                "name": o.name,
                "object_type": o.object_type,
            })),
            None => Err(ToolError::new(format!("no object with id {id}"))),
        }
    }

    fn check_object_exists(&self, object_name: &str) -> Result<bool, ToolError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|o| o.name == object_name))
    }
}

fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let endpoint = match std::env::args().nth(1) {
        Some(raw) => Endpoint::parse(&raw)?,
        None => Endpoint::default_for_platform(),
    };

    let scene = Arc::new(DemoScene::default());
    let mut registry = ToolRegistry::new();

    let create_scene = scene.clone();
    registry.register(
        "create_object",
        move |arguments: &Map<String, Value>| -> ToolResult {
            let name = arguments
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::new("missing name argument"))?;
            let object_type = arguments
                .get("object_type")
                .and_then(Value::as_str)
                .unwrap_or("cube");

            let mut objects = create_scene.objects.lock().unwrap_or_else(|e| e.into_inner());
            if objects.iter().any(|o| o.name == name) {
                return Err(ToolError::new(format!("object {name} already exists")));
            }
            objects.push(DemoObject {
                name: name.to_string(),
                object_type: object_type.to_string(),
            });
            info!("created {} ({})", name, object_type);
            Ok(json!({"object_name": name, "object_type": object_type}))
        },
    )?;

    let delete_scene = scene.clone();
    registry.register(
        "delete_object",
        move |arguments: &Map<String, Value>| -> ToolResult {
            let name = arguments
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::new("missing name argument"))?;

            let mut objects = delete_scene.objects.lock().unwrap_or_else(|e| e.into_inner());
            let before = objects.len();
            objects.retain(|o| o.name != name);
            if objects.len() == before {
                return Err(ToolError::new(format!("no object named {name}")));
            }
            info!("deleted {}", name);
            Ok(json!({"deleted": name}))
        },
    )?;

    let (handle, runner) = mainloop::channel(MainLoopConfig::default());

    let config = ServerConfig {
        endpoint,
        ..Default::default()
    };
    let server = BridgeServer::new(config, Arc::new(registry), scene, handle);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let bound = runtime.block_on(server.start())?;
    info!("demo host ready on {}", bound);

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    // The tick loop a real host application would already have.
    while !shutdown.load(Ordering::Relaxed) {
        let executed = runner.run_pending();
        thread::sleep(runner.suggested_delay(executed));
    }

    info!("shutting down");
    runtime.block_on(server.stop());
    Ok(())
}
