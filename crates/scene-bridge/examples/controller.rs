//! Demo controller - drive a running demo host
//!
//! Connects to the endpoint given as the first argument (defaults to the
//! platform endpoint), creates an object, then reads the scene back.
//! Start `demo_host` first.

use serde_json::{json, Map};

use scene_bridge::{BridgeClient, Endpoint};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let endpoint = match std::env::args().nth(1) {
        Some(raw) => Endpoint::parse(&raw)?,
        None => Endpoint::default_for_platform(),
    };

    println!("Connecting to {}", endpoint);
    let client = BridgeClient::connect(endpoint).await?;

    let mut arguments = Map::new();
    arguments.insert("name".into(), json!("Demo"));
    arguments.insert("object_type".into(), json!("sphere"));
    let result = client.call_tool("create_object", arguments).await?;
    println!("create_object -> {}", result);

    let exists = client.check_object_exists("Demo").await?;
    println!("Demo exists: {}", exists);

    let resources = client.list_resources().await?;
    println!("Scene contains {} resource(s):", resources.len());
    for resource in &resources {
        println!("  - {} ({})", resource.name, resource.resource_type);
    }

    let detail = client.read_resource("object", "Demo").await?;
    println!("read_resource -> {}", detail);

    client.close().await?;
    Ok(())
}
