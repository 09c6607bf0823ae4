#[derive(Clone, Debug)]
pub struct Config {
    pub mongodb_uri: String,
    pub db_name: String,

    pub jwt_secret: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,

    /// On detected refresh-token reuse, revoke every active session of the
    /// owner (conservative default) instead of only the replayed chain.
    pub reuse_revokes_all: bool,

    pub store_timeout_ms: u64,

    pub purge_interval_seconds: u64,
    /// How long a record must be past `expires_at` before the purge sweep
    /// may delete it.
    pub purge_retention_seconds: i64,

    /// `Secure` attribute on the refresh cookie. Disable only for local
    /// plain-HTTP development.
    pub cookie_secure: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let mongodb_uri = std::env::var("MONGODB_URI").expect("MONGODB_URI is required");
        let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "sessiond".to_string());

        let jwt_secret = std::env::var("JWT_SECRET").expect("JWT_SECRET is required");

        Self {
            mongodb_uri,
            db_name,
            jwt_secret,
            access_ttl_seconds: env_parse("ACCESS_TTL_SECONDS", 15 * 60),
            refresh_ttl_seconds: env_parse("REFRESH_TTL_SECONDS", 30 * 24 * 60 * 60),
            reuse_revokes_all: env_parse("REUSE_REVOKES_ALL", true),
            store_timeout_ms: env_parse("STORE_TIMEOUT_MS", 3_000),
            purge_interval_seconds: env_parse("PURGE_INTERVAL_SECONDS", 60 * 60),
            purge_retention_seconds: env_parse("PURGE_RETENTION_SECONDS", 7 * 24 * 60 * 60),
            cookie_secure: env_parse("COOKIE_SECURE", true),
        }
    }
}
