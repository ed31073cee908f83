use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::cli::Cli;

/// Listener and caller-authorization settings.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    pub listen_address: SocketAddr,
    pub auth_token: Option<String>,
}

/// Cloud platform endpoints and credentials.
#[derive(Clone, Debug)]
pub struct CloudConfig {
    pub api_endpoint: Url,
    pub token_endpoint: Url,
    pub audience: String,
    pub client_id: String,
    pub client_secret: String,
    pub organization: Option<String>,
    pub request_timeout: Duration,
}

/// Local log store layout and trim thresholds.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
    pub trim_tail_lines: usize,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub devices_path: PathBuf,
    pub local: LocalConfig,
    pub cloud: CloudConfig,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Self {
        Self {
            devices_path: cli.devices_config,
            local: LocalConfig {
                listen_address: cli.listen_address,
                auth_token: cli.auth_token.filter(|token| !token.is_empty()),
            },
            cloud: CloudConfig {
                api_endpoint: cli.cloud_api_endpoint,
                token_endpoint: cli.cloud_token_endpoint,
                audience: cli.cloud_audience,
                client_id: cli.cloud_client_id,
                client_secret: cli.cloud_client_secret,
                organization: cli
                    .cloud_organization
                    .map(|org| org.trim().to_string())
                    .filter(|org| !org.is_empty()),
                request_timeout: cli.cloud_request_timeout,
            },
            store: StoreConfig {
                dir: cli.log_dir,
                max_bytes: cli.log_max_bytes,
                trim_tail_lines: cli.log_trim_tail_lines,
            },
        }
    }
}

/// Cloud config pointed at a mock server; token endpoint under `/token`.
#[cfg(test)]
pub fn test_cloud_config(base_url: &str) -> CloudConfig {
    let api_endpoint: Url = base_url.parse().expect("valid test URL");
    let token_endpoint = api_endpoint.join("/token").expect("valid token URL");
    CloudConfig {
        api_endpoint,
        token_endpoint,
        audience: "https://cloud.test/aud".to_string(),
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
        organization: None,
        request_timeout: Duration::from_secs(10),
    }
}
