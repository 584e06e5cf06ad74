use serde::Deserialize;
use std::env;

use crate::services::scoring::UnansweredPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub bind_addr: String,
    pub grading: GradingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradingConfig {
    pub unanswered_policy: UnansweredPolicy,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            // Fallback to current directory .env for backward compatibility
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "assessment".to_string());

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let unanswered_policy = settings
            .get_string("grading.unanswered_policy")
            .or_else(|_| env::var("GRADING_UNANSWERED_POLICY"))
            .ok()
            .map(|raw| {
                raw.parse::<UnansweredPolicy>().map_err(|reason| {
                    config::ConfigError::Message(format!(
                        "grading.unanswered_policy: {reason}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            mongo_uri,
            mongo_database,
            bind_addr,
            grading: GradingConfig { unanswered_policy },
        })
    }
}
