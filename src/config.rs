//! Service configuration from environment variables

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub nats_url: Option<String>,
    pub port: u16,
    pub currency: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let nats_url = std::env::var("NATS_URL").ok();
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8083".to_string())
            .parse()
            .context("PORT must be a number")?;
        let currency = std::env::var("CURRENCY").unwrap_or_else(|_| "GHS".to_string());
        Ok(Self { database_url, nats_url, port, currency })
    }
}
