//! Add a member to a list and print the resulting envelope.
//!
//! Run with: cargo run -p member-cli -- <folder> <list> <email>
//!
//! Configuration comes from `LISTMEMBER_*` variables (a `.env` file is
//! loaded when present). Set `LISTMEMBER_DEMO_MEMORY=1` to run against the
//! in-process transport instead of a live endpoint.

use std::sync::Arc;

use anyhow::{Context, bail};
use listmember_client::Client;
use listmember_core::{ClientConfig, InteractObject, Transport};
use listmember_transport::{HttpTransport, MemoryTransport};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [folder, list, email] = args.as_slice() else {
        bail!("usage: member-cli <folder> <list> <email>");
    };
    let list = InteractObject::new(folder, list);

    let in_memory = std::env::var("LISTMEMBER_DEMO_MEMORY").is_ok_and(|v| v == "1");
    if in_memory {
        let config = ClientConfig::from_lookup(|key| match key {
            "LISTMEMBER_ENDPOINT" => Some("http://localhost/rpc".to_string()),
            "LISTMEMBER_USERNAME" => Some("demo".to_string()),
            "LISTMEMBER_PASSWORD" => Some("demo".to_string()),
            _ => std::env::var(key).ok(),
        })
        .context("invalid configuration")?;
        let transport = Arc::new(MemoryTransport::new());
        transport.set_default_result(json!({"riid": "1"}));
        run(config, transport, &list, email).await
    } else {
        let config = ClientConfig::from_env().context("invalid configuration")?;
        let transport = Arc::new(HttpTransport::new(&config).context("cannot build HTTP client")?);
        run(config, transport, &list, email).await
    }
}

async fn run<T: Transport>(
    config: ClientConfig,
    transport: Arc<T>,
    list: &InteractObject,
    email: &str,
) -> anyhow::Result<()> {
    tracing::info!(endpoint = %config.endpoint, pool_size = config.pool_size, "Starting client");
    let client = Client::new(config, transport);

    let envelope = client.member(email, None).add_to_list(list).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    client.shutdown().await;
    Ok(())
}
