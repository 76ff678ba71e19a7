pub use app_error::{AppError, AppResult};
pub use config::NetConfig;
pub use host::SocketHost;
pub use tracing_config::{setup_local_tracing, setup_tracing};

mod app_error;
mod config;
mod host;
mod tracing_config;
