use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

fn default_max_catalog_files() -> usize {
    100_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub root_path: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_max_catalog_files")]
    pub max_catalog_files: usize,
}

pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
