use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Deserialize;

const DEFAULT_SETTINGS: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Keeps everything in process memory instead of connecting to postgres
    pub use_in_memory: bool,
    pub host: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub max_cover_bytes: usize,
}

/// Scope in which an ISBN has to be unique
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IsbnScope {
    #[default]
    Global,
    PerUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    pub isbn_scope: IsbnScope,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub catalog: CatalogSettings,
}

impl Settings {
    /// Loads settings from the embedded defaults, an optional `bookapp.toml`,
    /// an optional file pointed by `BOOKAPP_CONFIG` and finally `BOOKAPP__*` environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_SETTINGS,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("bookapp").required(false));

        if let Ok(custom_path) = std::env::var("BOOKAPP_CONFIG") {
            builder = builder.add_source(config::File::with_name(&custom_path).required(false));
        }

        let settings: Settings = builder
            .add_source(config::Environment::with_prefix("BOOKAPP").separator("__"))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be > 0");
        }
        if self.auth.jwt_secret.trim().is_empty() {
            bail!("auth.jwt_secret must not be empty");
        }
        if self.auth.token_ttl_seconds <= 0 {
            bail!("auth.token_ttl_seconds must be > 0");
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            bail!("auth.bcrypt_cost must be in 4..=31");
        }
        if self.storage.max_cover_bytes == 0 {
            bail!("storage.max_cover_bytes must be > 0");
        }
        if self.catalog.max_page_size == 0 {
            bail!("catalog.max_page_size must be > 0");
        }
        if self.catalog.default_page_size == 0
            || self.catalog.default_page_size > self.catalog.max_page_size
        {
            bail!("catalog.default_page_size must be in 1..=max_page_size");
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_SETTINGS,
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|config| config.try_deserialize())
            .expect("Embedded default configuration is invalid")
    }
}
