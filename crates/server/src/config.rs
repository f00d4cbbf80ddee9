use std::env;

/// Whether a freelancer may apply to a job that already has someone working on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyPolicy {
    /// Applications are only admitted while the job is `open`.
    #[default]
    OpenOnly,
    /// Applications are admitted until the job is `done`.
    AnyUnfinished,
}

impl ApplyPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open_only" | "open" => Some(Self::OpenOnly),
            "any_unfinished" | "any" => Some(Self::AnyUnfinished),
            _ => None,
        }
    }
}

/// Rules the domain operations consult; kept separate so tests can build them directly.
#[derive(Debug, Clone, Copy)]
pub struct MarketPolicy {
    pub apply: ApplyPolicy,
    pub single_accepted_application: bool,
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            apply: ApplyPolicy::OpenOnly,
            single_accepted_application: true,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub upload_path: String,
    pub static_path: String,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
    pub max_upload_bytes: usize,
    pub policy: MarketPolicy,
    pub allow_email_cookie: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/gigboard.db?mode=rwc".to_string()),
            upload_path: env::var("UPLOAD_PATH").unwrap_or_else(|_| "./data/uploads".to_string()),
            static_path: env::var("STATIC_PATH").unwrap_or_else(|_| "./static".to_string()),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "development-secret-change-in-production".to_string()),
            token_ttl_minutes: env::var("TOKEN_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10 * 1024 * 1024),
            policy: MarketPolicy {
                apply: env::var("APPLY_POLICY")
                    .ok()
                    .and_then(|v| ApplyPolicy::parse(&v))
                    .unwrap_or_default(),
                single_accepted_application: env_flag("SINGLE_ACCEPTED_APPLICATION", true),
            },
            allow_email_cookie: env_flag("ALLOW_EMAIL_COOKIE", false),
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|v| !v.is_empty()),
            admin_password: env::var("ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
