//! Framework configuration is represented by [ApplicationConfig], which
//! [Application](crate::application::Application) uses to configure itself.
//!
//! By default, the config is created with opinionated default values, which can then be overwritten
//! by environment variables prefixed with `IGNITION_` or `ignition.json` file.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use ignition_service::scheduler::{SchedulerConfig, DEFAULT_SHUTDOWN_GRACE_PERIOD};
use serde::Deserialize;
use std::time::Duration;

const CONFIG_ENV_PREFIX: &str = "IGNITION";

/// Name of the default config file.
pub const CONFIG_FILE: &str = "ignition.json";

/// Framework configuration.
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ApplicationConfig {
    /// Should a default tracing logger be installed in the scope of the application.
    pub install_tracing_logger: bool,
    /// How long should shutdown wait for services which are still starting.
    pub shutdown_grace_period: Duration,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            install_tracing_logger: true,
            shutdown_grace_period: DEFAULT_SHUTDOWN_GRACE_PERIOD,
        }
    }
}

impl From<OptionalApplicationConfig> for ApplicationConfig {
    fn from(value: OptionalApplicationConfig) -> Self {
        let default = Self::default();
        Self {
            install_tracing_logger: value
                .install_tracing_logger
                .unwrap_or(default.install_tracing_logger),
            shutdown_grace_period: value
                .shutdown_grace_period_ms
                .map(Duration::from_millis)
                .unwrap_or(default.shutdown_grace_period),
        }
    }
}

impl ApplicationConfig {
    /// Loads the config from [CONFIG_FILE] and the environment, falling back to defaults.
    pub fn init_from_environment() -> Result<Self, ConfigError> {
        Self::init_from_builder(
            Config::builder()
                .add_source(File::with_name(CONFIG_FILE).required(false))
                .add_source(Environment::with_prefix(CONFIG_ENV_PREFIX)),
        )
    }

    fn init_from_builder(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigError> {
        builder
            .build()
            .and_then(|config| config.try_deserialize::<OptionalApplicationConfig>())
            .map(|config| config.into())
    }

    pub fn with_install_tracing_logger(mut self, install_tracing_logger: bool) -> Self {
        self.install_tracing_logger = install_tracing_logger;
        self
    }

    pub fn with_shutdown_grace_period(mut self, shutdown_grace_period: Duration) -> Self {
        self.shutdown_grace_period = shutdown_grace_period;
        self
    }

    /// Creates a [SchedulerConfig] reflecting this config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default().with_shutdown_grace_period(self.shutdown_grace_period)
    }
}

#[derive(Deserialize)]
struct OptionalApplicationConfig {
    install_tracing_logger: Option<bool>,
    shutdown_grace_period_ms: Option<u64>,
}
