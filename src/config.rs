use dotenvy::dotenv;
use std::env;

/// Ten years. Anything longer is a typo, and far larger values overflow the token expiry.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365 * 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} missing, it is required")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Without one the server keeps everything in memory.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub log_json: bool,
    pub cors_origin: Option<String>,
    pub seed_user: Option<SeedUser>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(get("PORT"), "PORT", 3000, "a valid u16 number")?;
        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let token_ttl_hours = parse_or(get("TOKEN_TTL_HOURS"), "TOKEN_TTL_HOURS", 24, "a whole number of hours")?;
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_HOURS",
                value: token_ttl_hours.to_string(),
                expected: "a number of hours between 1 and 87600",
            });
        }
        let log_json = match get("LOG_JSON") {
            None => false,
            Some(v) => parse_bool(&v).ok_or(ConfigError::Invalid {
                name: "LOG_JSON",
                value: v,
                expected: "true or false",
            })?,
        };
        let seed_user = match (get("SEED_USERNAME"), get("SEED_PASSWORD")) {
            (Some(username), Some(password)) => Some(SeedUser { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SEED_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("SEED_USERNAME")),
        };

        Ok(Self {
            host,
            port,
            database_url: get("DATABASE_URL"),
            jwt_secret,
            token_ttl_hours,
            log_json,
            cors_origin: get("CORS_ORIGIN"),
            seed_user,
        })
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value, expected }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
        _ => None,
    }
}
