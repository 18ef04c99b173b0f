// Engine configuration
//
// Layered resolution: compiled defaults, then an optional TOML file, then ONBOARDING_*
// environment variables. Hosts that embed the engine directly can skip all of this and
// construct the option structs by hand.

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::persistence::autosave::AutoSaveOptions;
use crate::persistence::http::HttpDraftServiceOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Silence window in milliseconds before a dirty session is saved.
    pub debounce_ms: u64,
    /// Base URL of the CRM backend, e.g. "https://api.example.com".
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub retry_max_attempts: usize,
    /// Local mirror path. `None` selects the platform default under the user data dir.
    pub cache_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            api_base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: 12,
            retry_max_attempts: 3,
            cache_file: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from defaults, an optional config file, and the environment.
    /// A missing file is not an error; a malformed one is.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("debounce_ms", 2000_i64)?
            .set_default("api_base_url", "http://localhost:8080")?
            .set_default("request_timeout_secs", 12_i64)?
            .set_default("retry_max_attempts", 3_i64)?;

        if let Some(path) = config_file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder
            .add_source(Environment::with_prefix("ONBOARDING"))
            .build()?
            .try_deserialize()
    }

    pub fn autosave_options(&self) -> AutoSaveOptions {
        AutoSaveOptions {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn http_options(&self) -> HttpDraftServiceOptions {
        HttpDraftServiceOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry_max_attempts: self.retry_max_attempts,
        }
    }
}

// =========================
// TESTS
// =========================
