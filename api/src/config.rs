use std::path::PathBuf;

use config::{Environment, File, FileFormat};

const CONFIG_FILE: &str = "phonebook.toml";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Postgres connection string. The in-memory store is used when unset.
    pub database_url: Option<String>,
    pub static_dir: PathBuf,
}

impl Config {
    /// Layers `phonebook.toml` (optional) and then the process environment
    /// over the built-in defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::builder()?
            .add_source(File::new(CONFIG_FILE, FileFormat::Toml).required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError>
    {
        ::config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3001)?
            .set_default("static_dir", "build")
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
