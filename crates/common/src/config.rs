use serde::Deserialize;

/// Global application configuration loaded from environment variables.
///
/// Built once at startup and handed out by reference; nothing downstream
/// reads the environment on its own.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Telegram bot token
    pub telegram_bot_token: Option<String>,

    /// Telegram Bot API base URL (default: https://api.telegram.org)
    pub telegram_api_url: String,

    /// Optional HTTPS proxy for transport calls
    pub https_proxy: Option<String>,

    /// Upper bound on a single transport call, in seconds (default: 10)
    pub transport_timeout_secs: u64,

    /// Flat pause between two delivery attempts, in milliseconds (default: 100)
    pub dispatch_send_interval_ms: u64,

    /// Number of dispatch runs allowed in flight at once (default: 4)
    pub dispatch_workers: usize,

    /// How often the scheduler looks for due pushes, in seconds (default: 30)
    pub scheduler_poll_interval_secs: u64,

    /// JWT secret for operator authentication
    pub jwt_secret: String,

    /// HTTP port of the API server (default: 3000)
    pub api_port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: lookup("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            telegram_bot_token: lookup("TELEGRAM_BOT_TOKEN"),
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            https_proxy: lookup("HTTPS_PROXY").filter(|p| !p.is_empty()),
            transport_timeout_secs: lookup("TRANSPORT_TIMEOUT_SECS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TRANSPORT_TIMEOUT_SECS must be a valid u64"))?,
            dispatch_send_interval_ms: lookup("DISPATCH_SEND_INTERVAL_MS")
                .unwrap_or_else(|| "100".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_SEND_INTERVAL_MS must be a valid u64"))?,
            dispatch_workers: lookup("DISPATCH_WORKERS")
                .unwrap_or_else(|| "4".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DISPATCH_WORKERS must be a valid usize"))?,
            scheduler_poll_interval_secs: lookup("SCHEDULER_POLL_INTERVAL_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SCHEDULER_POLL_INTERVAL_SECS must be a valid u64"))?,
            jwt_secret: lookup("JWT_SECRET")
                .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            api_port: lookup("API_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("API_PORT must be a valid port number"))?,
        };

        if config.dispatch_workers == 0 {
            anyhow::bail!("DISPATCH_WORKERS must be at least 1");
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pushcast"),
            ("JWT_SECRET", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.db_max_connections, 20);
        assert_eq!(config.telegram_api_url, "https://api.telegram.org");
        assert_eq!(config.transport_timeout_secs, 10);
        assert_eq!(config.dispatch_send_interval_ms, 100);
        assert_eq!(config.dispatch_workers, 4);
        assert_eq!(config.api_port, 3000);
        assert!(config.telegram_bot_token.is_none());
        assert!(config.https_proxy.is_none());
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "secret")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_number_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pushcast"),
            ("JWT_SECRET", "secret"),
            ("DISPATCH_SEND_INTERVAL_MS", "fast"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pushcast"),
            ("JWT_SECRET", "secret"),
            ("DISPATCH_WORKERS", "0"),
        ]));
        assert!(result.is_err());
    }
}
