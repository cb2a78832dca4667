use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown APP_ENV: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub environment: Environment,
    pub app_base_url: String,
    pub api_public_url: String,
    pub allowed_email_domains: Vec<String>,
    pub admin_emails: Vec<String>,
    pub bcrypt_cost: u32,
    pub session_ttl_secs: u64,
    pub verification_token_ttl_secs: u64,
    pub reset_token_ttl_secs: u64,
    pub login_max_attempts: u32,
    pub login_window_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub auth_rate_limit_requests: u32,
    pub admin_rate_limit_requests: u32,
    pub cookie_secure: bool,
    /// Take the client IP from `X-Real-IP`/`X-Forwarded-For`. Only safe when
    /// a reverse proxy overwrites those headers.
    pub trust_proxy_headers: bool,
    pub trophy_top_n: usize,
    pub trophy_cron_enabled: bool,
    pub trophy_webhook_secret: Option<String>,
    pub mail_api_url: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            server_host: "0.0.0.0".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            environment: Environment::Production,
            app_base_url: "http://localhost:5173".into(),
            api_public_url: "http://localhost:3000/api".into(),
            allowed_email_domains: vec![
                "gmail.com".into(),
                "hotmail.com".into(),
                "outlook.com".into(),
                "yahoo.com".into(),
            ],
            admin_emails: Vec::new(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
            session_ttl_secs: 24 * 3600,
            verification_token_ttl_secs: 24 * 3600,
            reset_token_ttl_secs: 3600,
            login_max_attempts: 5,
            login_window_secs: 15 * 60,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            auth_rate_limit_requests: 20,
            admin_rate_limit_requests: 30,
            cookie_secure: true,
            trust_proxy_headers: false,
            trophy_top_n: 10,
            trophy_cron_enabled: true,
            trophy_webhook_secret: None,
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "Toloni Pescarias <no-reply@tolonipescarias.com.br>".into(),
        }
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn hours_or(key: &str, default_secs: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().trim_end_matches('h').parse::<u64>().ok())
        .map(|h| h * 3600)
        .unwrap_or(default_secs)
}

fn list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let environment = match env::var("APP_ENV") {
            Ok(v) => v.parse().unwrap_or_else(|e: String| {
                tracing::warn!("{}, assuming production", e);
                Environment::Production
            }),
            Err(_) => Environment::Production,
        };

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parsed_or("SERVER_PORT", defaults.server_port),
            api_base_uri: env::var("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            environment,
            app_base_url: env::var("APP_BASE_URL").unwrap_or(defaults.app_base_url),
            api_public_url: env::var("API_PUBLIC_URL").unwrap_or(defaults.api_public_url),
            allowed_email_domains: list("ALLOWED_EMAIL_DOMAINS")
                .unwrap_or(defaults.allowed_email_domains),
            admin_emails: list("ADMIN_EMAILS").unwrap_or_default(),
            bcrypt_cost: parsed_or("BCRYPT_COST", defaults.bcrypt_cost),
            session_ttl_secs: hours_or("SESSION_TTL", defaults.session_ttl_secs),
            verification_token_ttl_secs: hours_or(
                "VERIFICATION_TOKEN_TTL",
                defaults.verification_token_ttl_secs,
            ),
            reset_token_ttl_secs: parsed_or::<u64>("RESET_TOKEN_TTL", 60) * 60,
            login_max_attempts: parsed_or("LOGIN_MAX_ATTEMPTS", defaults.login_max_attempts),
            login_window_secs: parsed_or("LOGIN_WINDOW", defaults.login_window_secs),
            rate_limit_window_secs: parsed_or("RATE_LIMIT_WINDOW", defaults.rate_limit_window_secs),
            rate_limit_requests: parsed_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            auth_rate_limit_requests: parsed_or(
                "AUTH_RATE_LIMIT_REQUESTS",
                defaults.auth_rate_limit_requests,
            ),
            admin_rate_limit_requests: parsed_or(
                "ADMIN_RATE_LIMIT_REQUESTS",
                defaults.admin_rate_limit_requests,
            ),
            cookie_secure: parsed_or("COOKIE_SECURE", defaults.cookie_secure),
            trust_proxy_headers: parsed_or("TRUST_PROXY_HEADERS", defaults.trust_proxy_headers),
            trophy_top_n: parsed_or("TROPHY_TOP_N", defaults.trophy_top_n),
            trophy_cron_enabled: parsed_or("TROPHY_CRON_ENABLED", defaults.trophy_cron_enabled),
            trophy_webhook_secret: optional("TROPHY_WEBHOOK_SECRET"),
            mail_api_url: optional("MAIL_API_URL"),
            mail_api_key: optional("MAIL_API_KEY"),
            mail_from: env::var("MAIL_FROM").unwrap_or(defaults.mail_from),
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn login_window(&self) -> Duration {
        Duration::from_secs(self.login_window_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }

    pub fn is_allowed_domain(&self, email: &str) -> bool {
        match email.rsplit_once('@') {
            Some((_, domain)) => {
                let domain = domain.to_ascii_lowercase();
                self.allowed_email_domains.iter().any(|d| *d == domain)
            }
            None => false,
        }
    }
}
