use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

fn default_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9966
}
fn default_max_connection() -> usize {
    1024
}
fn default_conn_read_buffer_size() -> usize {
    32768
}
fn default_max_frame_size() -> usize {
    1024 * 1024
}
fn default_outbound_queue_size() -> usize {
    256
}

/// Host configuration, injected explicitly into every `SocketHost`.
///
/// Loaded from a TOML file via [`NetConfig::from_file`]; every field has a
/// default so a partial file (or none at all) works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetConfig {
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_connection")]
    pub max_connection: usize,
    /// Initial per-connection receive buffer capacity.
    #[serde(default = "default_conn_read_buffer_size")]
    pub conn_read_buffer_size: usize,
    /// Hard cap on header-plus-payload size; larger declared frames are a
    /// fatal framing error.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            ip: default_ip(),
            port: default_port(),
            max_connection: default_max_connection(),
            conn_read_buffer_size: default_conn_read_buffer_size(),
            max_frame_size: default_max_frame_size(),
            outbound_queue_size: default_outbound_queue_size(),
        }
    }
}

impl NetConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<NetConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;
        let net_config: NetConfig = config.try_deserialize()?;
        Ok(net_config)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
