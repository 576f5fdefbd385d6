use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct ChainCfg {
    pub rpc_url: String,
    pub chain_id: Option<u64>, // Verified against the node when set
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingCfg {
    pub start_block: u64,
    pub end_block: u64, // Inclusive
    pub batch_size: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PgCfg {
    pub dsn: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportCfg {
    #[serde(default = "default_top_tokens_limit")]
    pub top_tokens_limit: u32,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for ReportCfg {
    fn default() -> Self {
        Self {
            top_tokens_limit: default_top_tokens_limit(),
            window_days: default_window_days(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiCfg {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogCfg {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppCfg {
    pub chain: ChainCfg,
    pub indexing: IndexingCfg,
    pub postgres: PgCfg,
    pub contracts_config: Option<String>, // Path to the contracts JSON file
    #[serde(default)]
    pub report: ReportCfg,
    pub api: Option<ApiCfg>,
    #[serde(default)]
    pub log: LogCfg,
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_top_tokens_limit() -> u32 {
    10
}

fn default_window_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppCfg {
    /// YAML file, overridden by `CRAWLER__SECTION__KEY` environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(
                config::Environment::with_prefix("CRAWLER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config_builder.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(ConfigError::Invalid("chain.rpc_url is empty".to_string()));
        }
        if self.postgres.dsn.trim().is_empty() {
            return Err(ConfigError::Invalid("postgres.dsn is empty".to_string()));
        }
        if self.indexing.batch_size == 0 {
            return Err(ConfigError::Invalid("indexing.batch_size must be positive".to_string()));
        }
        if self.indexing.start_block > self.indexing.end_block {
            return Err(ConfigError::Invalid(format!(
                "indexing.start_block {} is after indexing.end_block {}",
                self.indexing.start_block, self.indexing.end_block
            )));
        }
        if self.report.top_tokens_limit == 0 || self.report.window_days == 0 {
            return Err(ConfigError::Invalid(
                "report.top_tokens_limit and report.window_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.indexing.batch_delay_ms)
    }
}
