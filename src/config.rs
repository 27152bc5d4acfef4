use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

/// Signing secret used when `JWT_SECRET` is unset. Never rely on it outside development.
pub const DEFAULT_JWT_SECRET: &str = "user-management-secret-2025";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_seconds: i64,
}

/// Credentials of an account created on first start.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    /// True when the password came from the built-in default.
    pub default_password: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
    pub production: bool,
    pub cors_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub static_dir: String,
    pub admin: SeedAccount,
    pub test_user: SeedAccount,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let secret = match lookup("JWT_SECRET") {
            Some(s) if !s.is_empty() => s,
            _ => {
                warn!("JWT_SECRET not set; using the built-in default secret. Override it in any real deployment");
                DEFAULT_JWT_SECRET.to_string()
            }
        };
        let jwt = JwtConfig {
            secret,
            issuer: var("JWT_ISSUER", "usermgmt"),
            audience: var("JWT_AUDIENCE", "usermgmt-users"),
            ttl_seconds: parse_or(&lookup, "JWT_EXPIRATION", 3600)?,
        };
        anyhow::ensure!(jwt.ttl_seconds > 0, "JWT_EXPIRATION must be positive");

        let production = lookup("APP_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None if production => vec!["https://yourdomain.com".to_string()],
            None => vec!["http://localhost:3000".to_string()],
        };

        let port = match lookup("APP_PORT").or_else(|| lookup("PORT")) {
            Some(p) => p.parse().with_context(|| format!("invalid port {p:?}"))?,
            None => 3000,
        };

        Ok(Self {
            database_url,
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            jwt,
            host: var("APP_HOST", "0.0.0.0"),
            port,
            production,
            cors_origins,
            rate_limit: RateLimitConfig {
                max_requests: parse_or(&lookup, "RATE_LIMIT_MAX", 500)?,
                window_secs: parse_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 15 * 60)?,
            },
            static_dir: var("STATIC_DIR", "public"),
            admin: seed_account(
                &lookup,
                ("ADMIN_USERNAME", "admin"),
                ("ADMIN_EMAIL", "admin@example.com"),
                ("ADMIN_DEFAULT_PASSWORD", "Admin_Secure_Pwd_2025!"),
            ),
            test_user: seed_account(
                &lookup,
                ("TEST_USERNAME", "user"),
                ("TEST_EMAIL", "user@example.com"),
                ("USER_DEFAULT_PASSWORD", "User_Secure_Pwd_2025!"),
            ),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

fn seed_account<F>(
    lookup: &F,
    username: (&str, &str),
    email: (&str, &str),
    password: (&str, &str),
) -> SeedAccount
where
    F: Fn(&str) -> Option<String>,
{
    let supplied_password = lookup(password.0);
    SeedAccount {
        username: lookup(username.0).unwrap_or_else(|| username.1.to_string()),
        email: lookup(email.0).unwrap_or_else(|| email.1.to_string()),
        default_password: supplied_password.is_none(),
        password: supplied_password.unwrap_or_else(|| password.1.to_string()),
    }
}
