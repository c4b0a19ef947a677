use common::config::{GeneratorSettings, StorageSettings, SweepSettings};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub generator: GeneratorSettings,
    #[serde(default)]
    pub sweep: SweepSettings,
    pub storage: StorageSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("storage.bucket", "assets")?
            .set_default("storage.root_dir", "./data")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., PIMENTO__DATABASE__URL)
            .add_source(Environment::with_prefix("PIMENTO").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
