use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::status::GoldLayer;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub worker_poll_interval: Duration,
    pub gold_a_sink_url: Option<Url>,
    pub gold_b_sink_url: Option<Url>,
    pub gold_c_sink_url: Option<Url>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let poll_secs: u64 = env::var("WORKER_POLL_INTERVAL_SECS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("WORKER_POLL_INTERVAL_SECS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            worker_poll_interval: Duration::from_secs(poll_secs.max(1)),
            gold_a_sink_url: sink_url("GOLD_A_SINK_URL")?,
            gold_b_sink_url: sink_url("GOLD_B_SINK_URL")?,
            gold_c_sink_url: sink_url("GOLD_C_SINK_URL")?,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    pub fn sink_url(&self, layer: GoldLayer) -> Option<&Url> {
        match layer {
            GoldLayer::Analytics => self.gold_a_sink_url.as_ref(),
            GoldLayer::Graph => self.gold_b_sink_url.as_ref(),
            GoldLayer::Vector => self.gold_c_sink_url.as_ref(),
        }
    }
}

fn sink_url(key: &str) -> Result<Option<Url>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            let url = parse_sink_url(&raw).with_context(|| format!("{key} must be a valid URL"))?;
            Ok(Some(url))
        }
        _ => Ok(None),
    }
}

fn parse_sink_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported scheme '{other}'"),
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("*****"));
            }
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
