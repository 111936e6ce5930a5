use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_url: String,
    pub store_service_key: String,
    pub jwt_secret: String,
    pub port: u16,
    pub store_timeout_seconds: u64,
    pub max_queue_length: u32,
    pub average_slot_minutes: u32,
    pub chat_history_limit: u32,
    pub room_ttl_hours: i64,
    pub max_connections: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            store_url: env::var("STORE_URL").unwrap_or_else(|_| {
                warn!("STORE_URL not set, using empty value");
                String::new()
            }),
            store_service_key: env::var("STORE_SERVICE_KEY").unwrap_or_else(|_| {
                warn!("STORE_SERVICE_KEY not set, using empty value");
                String::new()
            }),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| {
                warn!("JWT_SECRET not set, using empty value");
                String::new()
            }),
            port: parse_env("PORT", 3000),
            store_timeout_seconds: parse_env("STORE_TIMEOUT_SECONDS", 5),
            max_queue_length: parse_env("MAX_QUEUE_LENGTH", 50),
            average_slot_minutes: parse_env("AVERAGE_SLOT_MINUTES", 15),
            chat_history_limit: parse_env("CHAT_HISTORY_LIMIT", 200),
            room_ttl_hours: parse_env("ROOM_TTL_HOURS", 2),
            max_connections: parse_env("MAX_CONNECTIONS", 10_000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.store_url.is_empty()
            && !self.store_service_key.is_empty()
            && !self.jwt_secret.is_empty()
    }

    pub fn is_store_configured(&self) -> bool {
        !self.store_url.is_empty() && !self.store_service_key.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_url: String::new(),
            store_service_key: String::new(),
            jwt_secret: String::new(),
            port: 3000,
            store_timeout_seconds: 5,
            max_queue_length: 50,
            average_slot_minutes: 15,
            chat_history_limit: 200,
            room_ttl_hours: 2,
            max_connections: 10_000,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an unparseable value, using default", key);
            default
        }),
        Err(_) => default,
    }
}
