//! Layered application configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, an optional TOML file
//! (`leadpilot.toml`, or the path in `LEADPILOT_CONFIG`), then `LEADPILOT_*`
//! environment variables with nested keys split on `__`
//! (for example `LEADPILOT_SERVER__PORT=9000`).

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "leadpilot.toml";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub drive: DriveConfig,
    pub llm: LlmConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. When absent the in-memory store is used.
    pub url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            run_migrations: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub secure_cookies: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 7,
            secure_cookies: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveBackend {
    #[default]
    Local,
    S3,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub backend: DriveBackend,
    pub local_root: String,
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL objects are publicly reachable under. Defaults to `{base_url}/storage`
    /// for the local backend.
    pub public_base_url: Option<String>,
    pub max_avatar_bytes: usize,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            backend: DriveBackend::Local,
            local_root: "./data/storage".to_string(),
            bucket: "avatars".to_string(),
            endpoint: None,
            region: "auto".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            public_base_url: None,
            max_avatar_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 15,
            max_tokens: 200,
        }
    }
}

impl AppConfig {
    pub fn figment() -> Figment {
        let file = std::env::var("LEADPILOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("LEADPILOT_").split("__"))
    }

    pub fn load() -> Result<Self, anyhow::Error> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, anyhow::Error> {
        let mut config: AppConfig = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
        if config.database.url.is_none() {
            config.database.url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty());
        }
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn drive_public_base_url(&self) -> String {
        match &self.drive.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match self.drive.backend {
                DriveBackend::Local => {
                    format!("{}/storage", self.server.base_url.trim_end_matches('/'))
                }
                DriveBackend::S3 => {
                    let endpoint = self
                        .drive
                        .endpoint
                        .clone()
                        .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.drive.region));
                    format!("{}/{}", endpoint.trim_end_matches('/'), self.drive.bucket)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert!(!config.llm.enabled);
        assert_eq!(config.drive.backend, DriveBackend::Local);
        assert_eq!(config.drive_public_base_url(), "http://localhost:8080/storage");
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "leadpilot.toml",
                r#"
                [server]
                port = 9000
                base_url = "https://crm.example.com/"

                [llm]
                enabled = true
                model = "file-model"
                "#,
            )?;
            jail.set_env("LEADPILOT_LLM__MODEL", "env-model");
            jail.set_env("DATABASE_URL", "postgres://pilot:pw@db/leadpilot");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.server.port, 9000);
            assert!(config.llm.enabled);
            assert_eq!(config.llm.model, "env-model");
            assert_eq!(
                config.database.url.as_deref(),
                Some("postgres://pilot:pw@db/leadpilot")
            );
            assert_eq!(
                config.drive_public_base_url(),
                "https://crm.example.com/storage"
            );
            Ok(())
        });
    }

    #[test]
    fn test_s3_public_url_uses_endpoint_and_bucket() {
        let mut config = AppConfig::default();
        config.drive.backend = DriveBackend::S3;
        config.drive.endpoint = Some("http://localhost:9000/".to_string());
        config.drive.bucket = "lp-avatars".to_string();
        assert_eq!(
            config.drive_public_base_url(),
            "http://localhost:9000/lp-avatars"
        );
    }
}
