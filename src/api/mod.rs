mod auth;
mod control;
mod logs;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::LocalConfig;
use crate::gateway::Gateway;

#[derive(Clone)]
pub struct ApiState {
    /// Operation surface all handlers delegate to
    gateway: Arc<Gateway>,

    /// Shared secret for caller authorization; `None` disables the check
    auth_token: Option<String>,
}

pub struct Api {
    config: LocalConfig,
    state: ApiState,
}

impl Api {
    pub fn new(config: LocalConfig, gateway: Arc<Gateway>) -> Self {
        let state = ApiState {
            gateway,
            auth_token: config.auth_token.clone(),
        };
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(|| async { "ok" }))
            .route("/devices", get(control::list_devices))
            .route("/set/:device/:direction", get(control::trigger))
            .route(
                "/devicelog/:device",
                get(control::read_device_log).delete(control::clear_device_log),
            )
            .route("/logs", get(logs::list))
            .route(
                "/log/:name",
                post(logs::append).get(logs::tail).delete(logs::clear),
            )
            .route("/logid/:device_id", post(logs::append_by_device_id))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(self.config.listen_address).await?;
        info!("API listening on {}", self.config.listen_address);

        axum::serve(listener, app).await?;
        Ok(())
    }
}
