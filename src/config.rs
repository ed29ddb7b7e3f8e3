use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBackend {
    Memory,
    S3,
}

impl BlobBackend {
    fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "s3" => Self::S3,
            _ => Self::Memory,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::S3 => "s3",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub auth_jwt_secret: Option<String>,
    pub staff_profile_cache_ttl_seconds: u64,
    pub staff_profile_cache_max_entries: u64,
    pub blob_backend: BlobBackend,
    pub s3_bucket: Option<String>,
    pub s3_public_base_url: Option<String>,
    pub s3_url_ttl_seconds: u64,
    pub intake_public_url: String,
    pub intake_default_expires_hours: i64,
    pub timezone: chrono_tz::Tz,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Hannam Back-office API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            staff_profile_cache_ttl_seconds: env_parse_or("STAFF_PROFILE_CACHE_TTL_SECONDS", 30),
            staff_profile_cache_max_entries: env_parse_or(
                "STAFF_PROFILE_CACHE_MAX_ENTRIES",
                1000,
            ),
            blob_backend: BlobBackend::from_env(env_opt("BLOB_BACKEND")),
            s3_bucket: env_opt("S3_BUCKET"),
            s3_public_base_url: env_opt("S3_PUBLIC_BASE_URL"),
            s3_url_ttl_seconds: env_parse_or("S3_URL_TTL_SECONDS", 7 * 24 * 3600),
            intake_public_url: env_or(
                "INTAKE_PUBLIC_URL",
                "http://localhost:3000/intake.html",
            ),
            intake_default_expires_hours: env_parse_or("INTAKE_DEFAULT_EXPIRES_HOURS", 24 * 14),
            timezone: env_opt("TIMEZONE")
                .and_then(|raw| raw.parse::<chrono_tz::Tz>().ok())
                .unwrap_or(chrono_tz::Asia::Seoul),
            max_upload_bytes: env_parse_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    /// Defaults for tests: dev overrides on, in-memory collaborators.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            app_name: "Hannam Back-office API".to_string(),
            environment: "test".to_string(),
            api_prefix: "/v1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["http://localhost:3000".to_string()],
            dev_auth_overrides_enabled: true,
            rate_limit_enabled: false,
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            database_url: None,
            db_pool_max_connections: 1,
            db_pool_min_connections: 0,
            db_pool_acquire_timeout_seconds: 1,
            db_pool_idle_timeout_seconds: 60,
            auth_jwt_secret: Some("test-secret-that-is-long-enough-for-hmac".to_string()),
            staff_profile_cache_ttl_seconds: 30,
            staff_profile_cache_max_entries: 100,
            blob_backend: BlobBackend::Memory,
            s3_bucket: None,
            s3_public_base_url: None,
            s3_url_ttl_seconds: 3600,
            intake_public_url: "https://intake.example.test/intake.html".to_string(),
            intake_default_expires_hours: 24 * 14,
            timezone: chrono_tz::Asia::Seoul,
            max_upload_bytes: 1024 * 1024,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    parse_bool(env_opt(key).as_deref()).unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Option<bool> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        Some("1" | "true" | "yes" | "on") => Some(true),
        Some("0" | "false" | "no" | "off") => Some(false),
        _ => None,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_bool, parse_csv, AppConfig, BlobBackend};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_bool_flags() {
        assert_eq!(parse_bool(Some("ON")), Some(true));
        assert_eq!(parse_bool(Some("0")), Some(false));
        assert_eq!(parse_bool(Some("maybe")), None);
        assert_eq!(parse_bool(None), None);
    }

    #[test]
    fn splits_csv_and_drops_blanks() {
        assert_eq!(
            parse_csv(" http://a.test , ,http://b.test"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn blob_backend_defaults_to_memory() {
        assert_eq!(BlobBackend::from_env(None), BlobBackend::Memory);
        assert_eq!(BlobBackend::from_env(Some(" S3 ".to_string())), BlobBackend::S3);
        assert_eq!(BlobBackend::S3.as_str(), "s3");
    }

    #[test]
    fn dev_overrides_are_disabled_in_production() {
        let mut config = AppConfig::for_tests();
        assert!(config.auth_dev_overrides_enabled());
        config.environment = "Production".to_string();
        assert!(!config.auth_dev_overrides_enabled());
    }
}
