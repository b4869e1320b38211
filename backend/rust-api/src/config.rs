use serde::Deserialize;
use std::env;

const DEV_JWT_SECRET: &str = "dev-secret-only-for-local-testing";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    /// Upper bound for one write unit, retries included.
    pub cascade_deadline_ms: u64,
    pub transaction_max_attempts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mongo_uri: "mongodb://localhost:27017/?replicaSet=rs0".to_string(),
            mongo_database: "medquiz".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            bind_addr: "0.0.0.0:8081".to_string(),
            cascade_deadline_ms: 5_000,
            transaction_max_attempts: 5,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load environment variables from root .env file (two levels up)
        // Try root .env first, then fallback to local .env
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;
        let defaults = Config::default();

        // Extract values with fallbacks to ENV or defaults
        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or(defaults.mongo_uri);

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or(defaults.mongo_database);

        let jwt_secret = match settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
        {
            Ok(secret) => secret,
            Err(_) if env == "prod" => {
                return Err(config::ConfigError::Message(
                    "JWT_SECRET must be set in production".to_string(),
                ));
            }
            Err(_) => {
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                defaults.jwt_secret
            }
        };

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or(defaults.bind_addr);

        let cascade_deadline_ms = numeric_setting(
            &settings,
            "content.cascade_deadline_ms",
            "CASCADE_DEADLINE_MS",
        )?
        .unwrap_or(defaults.cascade_deadline_ms);

        let transaction_max_attempts = numeric_setting(
            &settings,
            "content.transaction_max_attempts",
            "TRANSACTION_MAX_ATTEMPTS",
        )?
        .map(|attempts| attempts.max(1) as usize)
        .unwrap_or(defaults.transaction_max_attempts);

        Ok(Config {
            mongo_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            cascade_deadline_ms,
            transaction_max_attempts,
        })
    }
}

fn numeric_setting(
    settings: &config::Config,
    key: &str,
    env_key: &str,
) -> Result<Option<u64>, config::ConfigError> {
    if let Ok(value) = settings.get_int(key) {
        return u64::try_from(value)
            .map(Some)
            .map_err(|_| config::ConfigError::Message(format!("{} must not be negative", key)));
    }

    match env::var(env_key) {
        Ok(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| {
            config::ConfigError::Message(format!("{} is not a valid number: {}", env_key, e))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_for_local_runs() {
        let config = Config::default();
        assert_eq!(config.mongo_database, "medquiz");
        assert!(config.cascade_deadline_ms > 0);
        assert!(config.transaction_max_attempts >= 1);
    }

    #[test]
    fn numeric_setting_reads_config_values() {
        let settings = config::Config::builder()
            .set_override("content.cascade_deadline_ms", 250)
            .unwrap()
            .build()
            .unwrap();

        let value = numeric_setting(&settings, "content.cascade_deadline_ms", "UNSET_TEST_KEY")
            .unwrap();
        assert_eq!(value, Some(250));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let settings = config::Config::builder()
            .set_override("content.cascade_deadline_ms", -1)
            .unwrap()
            .build()
            .unwrap();

        assert!(numeric_setting(&settings, "content.cascade_deadline_ms", "UNSET_TEST_KEY").is_err());
    }
}
