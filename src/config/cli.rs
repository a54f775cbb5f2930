//! Command line and environment overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{read_config, ConfigError};
use crate::config::schema::RuntimeConfig;
use crate::config::validation::validate_config;
use crate::observability::logging::LogFormat;

#[derive(Debug, Default, Parser)]
#[command(name = "proxy", version, about = "Runs the service system and its health endpoint")]
pub struct Cli {
    /// Address to send OTLP traces [default: localhost:4317]
    #[arg(long = "o11y-otlp", env = "O11Y_OTLP")]
    pub o11y_otlp: Option<String>,

    /// The address for healthchecks to listen on [default: :10001]
    #[arg(long, env = "HEALTH_ADDR")]
    pub health_addr: Option<String>,

    /// Optional TOML config file
    #[arg(long, env = "PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds to wait after a termination signal before shutting down
    #[arg(long, env = "TERMINATION_DELAY_SECS")]
    pub termination_delay_secs: Option<u64>,

    /// Log output format (pretty or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

impl Cli {
    /// Resolve the final config: file (or defaults), then flags and env.
    pub fn into_config(self) -> Result<RuntimeConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => RuntimeConfig::default(),
        };

        if let Some(endpoint) = self.o11y_otlp {
            config.observability.otlp_endpoint = endpoint;
        }
        if let Some(addr) = self.health_addr {
            config.health.addr = addr;
        }
        if let Some(delay) = self.termination_delay_secs {
            config.lifecycle.termination_delay_secs = delay;
        }
        if let Some(format) = self.log_format {
            config.observability.log_format = format;
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
