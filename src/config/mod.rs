//! Application configuration module
//!
//! Typed configuration loaded from environment variables with the `config`
//! and `dotenvy` crates. Variables use the `TOKEN_RECONCILER` prefix and
//! nested values are separated by double underscores.
//!
//! # Example
//!
//! ```no_run
//! use token_reconciler::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod database;
mod error;
mod payment;
mod server;

pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;
use std::path::Path;

const ENV_PREFIX: &str = "TOKEN_RECONCILER";

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub payment: PaymentConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first when present.
    ///
    /// - `TOKEN_RECONCILER__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `TOKEN_RECONCILER__DATABASE__URL=...` -> `database.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or a value
    /// cannot be parsed into its field type.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_environment()
    }

    /// Load configuration after reading an explicit env file.
    ///
    /// Unlike [`AppConfig::load`], a missing or unreadable file is an error.
    pub fn load_from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Self::from_environment()
    }

    fn from_environment() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(self.is_production())?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::env;
    use std::io::Write;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "TOKEN_RECONCILER__DATABASE__URL",
        "TOKEN_RECONCILER__PAYMENT__STRIPE_API_KEY",
        "TOKEN_RECONCILER__PAYMENT__STRIPE_WEBHOOK_SECRET",
        "TOKEN_RECONCILER__PAYMENT__REQUIRE_LIVEMODE",
        "TOKEN_RECONCILER__PAYMENT__SIGNATURE_TOLERANCE_SECS",
        "TOKEN_RECONCILER__SERVER__PORT",
        "TOKEN_RECONCILER__SERVER__ENVIRONMENT",
    ];

    fn set_minimal_env() {
        env::set_var("TOKEN_RECONCILER__DATABASE__URL", "postgresql://test@localhost/test");
        env::set_var("TOKEN_RECONCILER__PAYMENT__STRIPE_API_KEY", "sk_test_xxx");
        env::set_var("TOKEN_RECONCILER__PAYMENT__STRIPE_WEBHOOK_SECRET", "whsec_xxx");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.expect("config should load");
        assert_eq!(config.database.url, "postgresql://test@localhost/test");
        assert_eq!(config.payment.stripe_api_key.expose_secret(), "sk_test_xxx");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payment_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.payment.payment_gateway_id, "stripe");
        assert_eq!(config.payment.signature_tolerance_secs, 300);
        assert_eq!(config.payment.stripe_api_base_url, "https://api.stripe.com");
        assert!(!config.payment.require_livemode);
    }

    #[test]
    fn test_server_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_overrides_are_parsed() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("TOKEN_RECONCILER__SERVER__PORT", "3000");
        env::set_var("TOKEN_RECONCILER__SERVER__ENVIRONMENT", "production");
        env::set_var("TOKEN_RECONCILER__PAYMENT__REQUIRE_LIVEMODE", "true");
        env::set_var("TOKEN_RECONCILER__PAYMENT__SIGNATURE_TOLERANCE_SECS", "60");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.server.port, 3000);
        assert!(config.is_production());
        assert!(config.payment.require_livemode);
        assert_eq!(config.payment.signature_tolerance_secs, 60);
    }

    #[test]
    fn test_missing_payment_section_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("TOKEN_RECONCILER__DATABASE__URL", "postgresql://test@localhost/test");
        let result = AppConfig::from_environment();
        clear_env();

        assert!(matches!(result, Err(ConfigError::LoadError(_))));
    }

    #[test]
    fn test_load_from_env_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "TOKEN_RECONCILER__DATABASE__URL=postgres://file@localhost/ledger").unwrap();
        writeln!(file, "TOKEN_RECONCILER__PAYMENT__STRIPE_API_KEY=sk_test_file").unwrap();
        writeln!(file, "TOKEN_RECONCILER__PAYMENT__STRIPE_WEBHOOK_SECRET=whsec_file").unwrap();
        file.flush().unwrap();

        let result = AppConfig::load_from_env_file(file.path());
        clear_env();

        let config = result.expect("config should load from file");
        assert_eq!(config.database.url, "postgres://file@localhost/ledger");
        assert_eq!(config.payment.stripe_webhook_secret.expose_secret(), "whsec_file");
    }

    #[test]
    fn test_missing_env_file_is_an_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load_from_env_file(dir.path().join("absent.env"));
        assert!(matches!(result, Err(ConfigError::EnvFile(_))));
    }
}
