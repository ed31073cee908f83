mod api;
mod cli;
mod cloud;
mod config;
mod gateway;
mod registry;
mod store;
mod util;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use api::Api;
use cloud::{CloudProxy, TokenCache};
use config::Config;
use gateway::Gateway;
use registry::DeviceRegistry;
use store::LogStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for human-readable logs
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or(
                EnvFilter::default()
                    .add_directive("info".parse()?)
                    .add_directive("hyper=error".parse()?),
            ),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_span_events(FmtSpan::CLOSE)
                .event_format(fmt::format().compact().with_target(false).without_time()),
        )
        .init();

    info!("Service started");

    let config = Config::from_cli(cli::parse());

    let registry = Arc::new(DeviceRegistry::new());
    registry
        .load(&config.devices_path)
        .await
        .with_context(|| {
            format!(
                "loading device mapping from {}",
                config.devices_path.display()
            )
        })?;

    if config.local.auth_token.is_none() {
        tracing::warn!("no auth token configured, caller authorization is disabled");
    }

    let tokens = Arc::new(TokenCache::new(config.cloud.clone()));
    let cloud = CloudProxy::new(config.cloud.clone(), tokens);
    let store = LogStore::new(config.store.clone(), Arc::clone(&registry));
    let gateway = Arc::new(Gateway::new(registry, cloud, store));

    let api = Api::new(config.local.clone(), gateway);
    api.start().await
}
