use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// OpenAI-compatible API root. Request paths are joined under `/v1`.
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ai.sumopod.com".to_string(),
            request_timeout_seconds: 60,
        }
    }
}

/// Admin credentials are supplied by the operator. There is deliberately no
/// baked-in fallback pair.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

impl AdminConfig {
    pub fn from_env() -> Result<Self, Error> {
        let username = std::env::var("ADMIN_USERNAME").unwrap_or_default();
        let password = std::env::var("ADMIN_PASSWORD").unwrap_or_default();
        if username.trim().is_empty() || password.trim().is_empty() {
            return Err(Error::Config(
                "ADMIN_USERNAME and ADMIN_PASSWORD must be set".to_string(),
            ));
        }
        Ok(Self { username, password })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FileConfig {
    listen: ListenConfig,
    upstream: UpstreamConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: ListenConfig,
    pub upstream: UpstreamConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Read listen/upstream settings from `path` (missing file means
    /// defaults) and admin credentials from the environment.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = if path.exists() {
            let txt = std::fs::read_to_string(path)?;
            toml::from_str::<FileConfig>(&txt)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            FileConfig::default()
        };

        Ok(Self {
            listen: file.listen,
            upstream: file.upstream,
            admin: AdminConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let file: FileConfig = toml::from_str("").unwrap();
        assert_eq!(file.listen.port, 4000);
        assert_eq!(file.upstream.base_url, "https://ai.sumopod.com");
        assert_eq!(file.upstream.request_timeout_seconds, 60);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file: FileConfig = toml::from_str(
            r#"
            [listen]
            host = "0.0.0.0"
            port = 8080
            "#,
        )
        .unwrap();
        assert_eq!(file.listen.host, "0.0.0.0");
        assert_eq!(file.listen.port, 8080);
        assert_eq!(file.upstream.request_timeout_seconds, 60);
    }
}
