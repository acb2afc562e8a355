use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub action_ttl_minutes: i64,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    None,
    StartTls,
    Tls,
}

impl SmtpSecurity {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" => Ok(Self::Tls),
            other => anyhow::bail!("unknown SMTP_SECURITY value: {other}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: SmtpSecurity,
    pub from: String,
    pub workers: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub public_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    /// Answer 400 for unknown emails on password reset requests.
    pub reveal_unknown_email: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let public_url = std::env::var("PUBLIC_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "scribe".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "scribe-users".into()),
            ttl_minutes: env_or("JWT_TTL_MINUTES", 60 * 24 * 7),
            action_ttl_minutes: env_or("ACTION_TOKEN_TTL_MINUTES", 60 * 24 * 7),
        };

        let mail = MailConfig {
            host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".into()),
            port: env_or("SMTP_PORT", 25),
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            security: SmtpSecurity::parse(
                &std::env::var("SMTP_SECURITY").unwrap_or_else(|_| "none".into()),
            )?,
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "info@example.com".into()),
            workers: env_or("MAIL_WORKERS", 4usize).max(1),
            queue_capacity: env_or("MAIL_QUEUE_CAPACITY", 256usize).max(1),
        };

        Ok(Self {
            database_url,
            public_url,
            jwt,
            mail,
            reveal_unknown_email: env_or("PASSWORD_RESET_REVEAL_UNKNOWN", true),
        })
    }
}
