use std::net::SocketAddr;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

fn parse_duration(s: &str) -> Result<Duration, ParseIntError> {
    let millis: u64 = s.parse()?;
    Ok(Duration::from_millis(millis))
}

fn parse_base_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|err| err.to_string())?;
    if url.cannot_be_a_base() {
        return Err("must be an http(s) base URL".to_string());
    }
    Ok(url)
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)] // read from Cargo.toml
pub struct Cli {
    /// Address for the gateway API to listen on
    #[arg(
        env = "IRIS_LISTEN_ADDRESS",
        long = "listen-address",
        value_name = "addr",
        default_value = "0.0.0.0:8080"
    )]
    pub listen_address: SocketAddr,

    /// Shared secret required from callers; omit to disable authorization
    #[arg(env = "IRIS_AUTH_TOKEN", long = "auth-token", value_name = "secret")]
    pub auth_token: Option<String>,

    /// Path of the device mapping file
    #[arg(
        env = "IRIS_DEVICES_CONFIG",
        long = "devices-config",
        value_name = "path",
        default_value = "devices.config.json"
    )]
    pub devices_config: PathBuf,

    /// OAuth2 client id for the cloud platform
    #[arg(env = "IRIS_CLOUD_CLIENT_ID", long = "cloud-client-id", value_name = "id")]
    pub cloud_client_id: String,

    /// OAuth2 client secret for the cloud platform
    #[arg(
        env = "IRIS_CLOUD_CLIENT_SECRET",
        long = "cloud-client-secret",
        value_name = "secret"
    )]
    pub cloud_client_secret: String,

    /// Organization context sent with every cloud call
    #[arg(
        env = "IRIS_CLOUD_ORGANIZATION",
        long = "cloud-organization",
        value_name = "org"
    )]
    pub cloud_organization: Option<String>,

    /// Base URL of the cloud platform's REST API
    #[arg(
        env = "IRIS_CLOUD_API_ENDPOINT",
        long = "cloud-api-endpoint",
        value_name = "url",
        value_parser = parse_base_url,
        default_value = "https://api2.arduino.cc/iot/v2"
    )]
    pub cloud_api_endpoint: Url,

    /// URL of the cloud platform's OAuth2 token endpoint
    #[arg(
        env = "IRIS_CLOUD_TOKEN_ENDPOINT",
        long = "cloud-token-endpoint",
        value_name = "url",
        value_parser = parse_base_url,
        default_value = "https://api2.arduino.cc/iot/v1/clients/token"
    )]
    pub cloud_token_endpoint: Url,

    /// Audience value for the client-credentials token exchange
    #[arg(
        env = "IRIS_CLOUD_AUDIENCE",
        long = "cloud-audience",
        value_name = "uri",
        default_value = "https://api2.arduino.cc/iot"
    )]
    pub cloud_audience: String,

    /// Cloud request timeout in milliseconds
    #[arg(
        env = "IRIS_CLOUD_REQUEST_TIMEOUT_MS",
        long = "cloud-request-timeout-ms",
        value_name = "ms",
        value_parser = parse_duration,
        default_value = "59000"
    )]
    pub cloud_request_timeout: Duration,

    /// Directory holding per-device log files
    #[arg(
        env = "IRIS_LOG_DIR",
        long = "log-dir",
        value_name = "dir",
        default_value = "logs"
    )]
    pub log_dir: PathBuf,

    /// Size threshold in bytes above which a log file is trimmed
    #[arg(
        env = "IRIS_LOG_MAX_BYTES",
        long = "log-max-bytes",
        value_name = "bytes",
        default_value_t = 5 * 1024 * 1024
    )]
    pub log_max_bytes: u64,

    /// Number of most recent lines kept when a log file is trimmed
    #[arg(
        env = "IRIS_LOG_TRIM_TAIL_LINES",
        long = "log-trim-tail-lines",
        value_name = "lines",
        default_value_t = 5000
    )]
    pub log_trim_tail_lines: usize,
}

pub fn parse() -> Cli {
    Parser::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let cli = Cli::try_parse_from([
            "iris",
            "--cloud-client-id",
            "id",
            "--cloud-client-secret",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.listen_address.port(), 8080);
        assert_eq!(cli.log_max_bytes, 5 * 1024 * 1024);
        assert_eq!(cli.log_trim_tail_lines, 5000);
        assert_eq!(cli.cloud_request_timeout, Duration::from_secs(59));
        assert!(cli.auth_token.is_none());
    }

    #[test]
    fn rejects_non_base_endpoint() {
        let result = Cli::try_parse_from([
            "iris",
            "--cloud-client-id",
            "id",
            "--cloud-client-secret",
            "secret",
            "--cloud-api-endpoint",
            "mailto:root@localhost",
        ]);
        assert!(result.is_err());
    }
}
