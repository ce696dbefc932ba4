use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub host: String,
    pub port: u16,

    // Paystack payment gateway
    pub paystack_secret_key: Secret<String>,
    pub paystack_webhook_secret: Secret<String>,
    pub paystack_initialize_url: String,
    pub paystack_verify_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            database_url: config.get("database_url")?,
            redis_url: config
                .get("redis_url")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            paystack_secret_key: Secret::new(config.get("paystack_secret_key")?),
            paystack_webhook_secret: Secret::new(config.get("paystack_webhook_secret")?),
            paystack_initialize_url: config
                .get("paystack_initialize_url")
                .unwrap_or_else(|_| "https://api.paystack.co/transaction/initialize".to_string()),
            paystack_verify_url: config
                .get("paystack_verify_url")
                .unwrap_or_else(|_| "https://api.paystack.co/transaction/verify".to_string()),
        })
    }
}
