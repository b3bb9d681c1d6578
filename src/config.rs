use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// A test login that skips the member lookup. `community_id` is handed to
/// the session as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowListedLogin {
    pub email: String,
    pub community_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: String,
    pub db_namespace: String,
    pub db_name: String,
    pub db_user: String,
    pub db_pass: String,
    pub http_addr: String,
    pub session_secret: Option<String>,
    pub session_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    /// When set, admin login also needs this passphrase.
    pub admin_secret: Option<String>,
    pub login_allow_list: Vec<AllowListedLogin>,
    pub smtp: SmtpConfig,
    pub birthday_window_days: i64,
    pub whatsapp_pause_secs: u64,
    pub name_match_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_url: "ws://127.0.0.1:8000".to_string(),
            db_namespace: "heyjack".to_string(),
            db_name: "app".to_string(),
            db_user: "root".to_string(),
            db_pass: "root".to_string(),
            http_addr: "127.0.0.1:8080".to_string(),
            session_secret: None,
            session_ttl_hours: 12,
            admin_emails: Vec::new(),
            admin_secret: None,
            login_allow_list: Vec::new(),
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                username: None,
                password: None,
                from: "Hey Jack <no-reply@heyjack.app>".to_string(),
            },
            birthday_window_days: 15,
            whatsapp_pause_secs: 3,
            name_match_threshold: 0.92,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let db_url = env::var("HEYJACK_DB_URL").unwrap_or(defaults.db_url);
        let db_namespace = env::var("HEYJACK_DB_NS").unwrap_or(defaults.db_namespace);
        let db_name = env::var("HEYJACK_DB_NAME").unwrap_or(defaults.db_name);
        let db_user = env::var("HEYJACK_DB_USER").unwrap_or(defaults.db_user);
        let db_pass = env::var("HEYJACK_DB_PASS").unwrap_or(defaults.db_pass);
        let http_addr = env::var("HEYJACK_HTTP_ADDR").unwrap_or(defaults.http_addr);

        // Required by `serve`; no default.
        let session_secret = env::var("HEYJACK_SESSION_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let session_ttl_hours = parse_var("HEYJACK_SESSION_TTL_HOURS", defaults.session_ttl_hours)?;

        let admin_emails = env::var("HEYJACK_ADMIN_EMAILS")
            .map(|v| parse_email_list(&v))
            .unwrap_or_default();
        let admin_secret = env::var("HEYJACK_ADMIN_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let login_allow_list = env::var("HEYJACK_LOGIN_ALLOW_LIST")
            .map(|v| parse_allow_list(&v))
            .unwrap_or_default();

        let smtp = SmtpConfig {
            host: env::var("HEYJACK_SMTP_HOST").unwrap_or(defaults.smtp.host),
            port: parse_var("HEYJACK_SMTP_PORT", defaults.smtp.port)?,
            username: env::var("HEYJACK_SMTP_USER").ok(),
            password: env::var("HEYJACK_SMTP_PASS").ok(),
            from: env::var("HEYJACK_SMTP_FROM").unwrap_or(defaults.smtp.from),
        };

        let birthday_window_days =
            parse_var("HEYJACK_BIRTHDAY_WINDOW_DAYS", defaults.birthday_window_days)?;
        let whatsapp_pause_secs =
            parse_var("HEYJACK_WHATSAPP_PAUSE_SECS", defaults.whatsapp_pause_secs)?;
        let name_match_threshold =
            parse_var("HEYJACK_NAME_MATCH_THRESHOLD", defaults.name_match_threshold)?;

        Ok(Self {
            db_url,
            db_namespace,
            db_name,
            db_user,
            db_pass,
            http_addr,
            session_secret,
            session_ttl_hours,
            admin_emails,
            admin_secret,
            login_allow_list,
            smtp,
            birthday_window_days,
            whatsapp_pause_secs,
            name_match_threshold,
        })
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.admin_emails.iter().any(|a| *a == email)
    }

    pub fn allow_listed(&self, email: &str) -> Option<&AllowListedLogin> {
        let email = normalize_email(email);
        self.login_allow_list.iter().find(|l| l.email == email)
    }

    pub fn uses_memory_store(&self) -> bool {
        self.db_url == "memory" || self.db_url.starts_with("memory://")
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .collect()
}

fn parse_allow_list(raw: &str) -> Vec<AllowListedLogin> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (email, community_id) = match entry.split_once(':') {
                Some((email, community)) => {
                    let community = community.trim();
                    (email, (!community.is_empty()).then(|| community.to_string()))
                }
                None => (entry, None),
            };
            Some(AllowListedLogin {
                email: normalize_email(email),
                community_id,
            })
        })
        .collect()
}
