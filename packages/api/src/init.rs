//! Server initialization.

use std::path::PathBuf;

use dispatch::{Server, ServerConfig};
use stream_core::ConfigError;

use crate::error::ApiError;
use crate::example::ExamplePlugin;

/// Environment variable naming the JSON config file.
pub const CONFIG_ENV: &str = "DOCSTREAM_CONFIG";

/// Load the server config from `DOCSTREAM_CONFIG`, or defaults when unset.
pub fn load_config() -> Result<ServerConfig, ConfigError> {
    load_config_from(std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Load the server config from `path`, or defaults when `None`.
pub fn load_config_from(path: Option<PathBuf>) -> Result<ServerConfig, ConfigError> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ServerConfig::load(path)
        }
        None => {
            tracing::info!("No {} set; using default configuration", CONFIG_ENV);
            Ok(ServerConfig::default())
        }
    }
}

/// Start the server with the bundled plugins.
///
/// This should be called once at startup before handling requests.
pub async fn init_server(config: ServerConfig) -> Result<Server, ApiError> {
    tracing::info!("Initializing document stream server...");

    let server = Server::builder(config).with_plugin(ExamplePlugin).start().await?;

    tracing::info!(
        "Document stream server initialized with streams {:?}",
        server.streams().names()
    );
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_path_uses_defaults() {
        let config = load_config_from(None).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn reads_stream_settings_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"streams": {{"example": {{"workers": 3}}}}}}"#).unwrap();

        let config = load_config_from(Some(file.path().to_path_buf())).unwrap();
        let example = config.stream_config_with("example", |_| None).unwrap();
        assert_eq!(example.workers, 3);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config_from(Some(dir.path().join("missing.json")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
