//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::pipeline::types::{ContactStatus, CreateFailurePolicy, DedupPolicy};

/// Placeholder values shipped in sample `.env` files.
const PLACEHOLDER_VALUES: &[&str] = &[
    "your-email@gmail.com",
    "your-app-password",
    "your-notion-api-key",
    "your-database-id",
];

/// Upper bound for `EMAIL_LOOKBACK_DAYS` (about ten years).
pub const MAX_LOOKBACK_DAYS: i64 = 3650;

/// Mailbox (IMAP) settings for the single configured owner.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Display name of the mailbox owner.
    pub user_name: String,
    /// Mailbox address. Also the owner key in the ledger and the only
    /// webhook recipient that is accepted.
    pub email: String,
    pub password: SecretString,
    /// IMAP folder (Gmail label) that holds recruiter mail.
    pub label: String,
    pub imap_host: String,
    pub imap_port: u16,
}

impl MailboxConfig {
    /// Domain part of the mailbox address, lower-cased.
    pub fn domain(&self) -> Option<String> {
        self.email
            .rsplit_once('@')
            .map(|(_, d)| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
    }
}

/// Tracking-store (Notion) settings.
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_key: SecretString,
    pub database_id: String,
    pub api_url: String,
}

/// Pipeline behaviour knobs.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub dedup_policy: DedupPolicy,
    pub create_failure_policy: CreateFailurePolicy,
    pub default_status: ContactStatus,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub check_interval: Duration,
    /// How far back the first run for a source looks.
    pub lookback_days: i64,
    pub http_host: String,
    pub http_port: u16,
    pub log_dir: PathBuf,
    pub mailbox: MailboxConfig,
    pub notion: NotionConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let interval_minutes: u64 = parse_or(&get, "CHECK_INTERVAL_MINUTES", 20)?;
        if interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CHECK_INTERVAL_MINUTES".into(),
                message: "must be at least 1".into(),
            });
        }

        let lookback_days: i64 = parse_or(&get, "EMAIL_LOOKBACK_DAYS", 3)?;
        if !(0..=MAX_LOOKBACK_DAYS).contains(&lookback_days) {
            return Err(ConfigError::InvalidValue {
                key: "EMAIL_LOOKBACK_DAYS".into(),
                message: format!("must be between 0 and {MAX_LOOKBACK_DAYS}"),
            });
        }

        let mailbox = MailboxConfig {
            user_name: get("USER_NAME").unwrap_or_else(|| "Your Name".into()),
            email: required("GMAIL_EMAIL")?,
            password: SecretString::from(required("GMAIL_PASSWORD")?),
            label: get("GMAIL_LABEL").unwrap_or_else(|| "Recruiters".into()),
            imap_host: get("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".into()),
            imap_port: parse_or(&get, "IMAP_PORT", 993)?,
        };

        let notion = NotionConfig {
            api_key: SecretString::from(required("NOTION_API_KEY")?),
            database_id: required("DATABASE_ID")?,
            api_url: get("NOTION_API_URL")
                .unwrap_or_else(|| "https://api.notion.com".into())
                .trim_end_matches('/')
                .to_string(),
        };

        let pipeline = PipelineConfig {
            dedup_policy: parse_or(&get, "DEDUP_POLICY", DedupPolicy::Company)?,
            create_failure_policy: parse_or(&get, "ON_CREATE_FAILURE", CreateFailurePolicy::Drop)?,
            default_status: parse_or(&get, "DEFAULT_STATUS", ContactStatus::Applied)?,
        };

        Ok(Self {
            database_path: PathBuf::from(
                get("DATABASE_PATH").unwrap_or_else(|| "./data/recruiter-sync.db".into()),
            ),
            check_interval: Duration::from_secs(interval_minutes * 60),
            lookback_days,
            http_host: get("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            http_port: parse_or(&get, "HTTP_PORT", 5001)?,
            log_dir: PathBuf::from(get("LOG_DIR").unwrap_or_else(|| "./logs".into())),
            mailbox,
            notion,
            pipeline,
        })
    }

    /// Non-fatal problems worth reporting at startup and on `/health`.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let checks = [
            ("GMAIL_EMAIL", self.mailbox.email.as_str()),
            ("GMAIL_PASSWORD", self.mailbox.password.expose_secret()),
            ("NOTION_API_KEY", self.notion.api_key.expose_secret()),
            ("DATABASE_ID", self.notion.database_id.as_str()),
        ];
        for (key, value) in checks {
            if PLACEHOLDER_VALUES.contains(&value) {
                warnings.push(format!("{key} still has its placeholder value"));
            }
        }
        if self.mailbox.domain().is_none() {
            warnings.push("GMAIL_EMAIL has no domain; every sender will be treated as external".into());
        }
        if self.lookback_days == 0 {
            warnings.push("EMAIL_LOOKBACK_DAYS is 0; first runs start from now".into());
        }
        warnings
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("GMAIL_EMAIL", "me@gmail.com"),
        ("GMAIL_PASSWORD", "app-pass"),
        ("NOTION_API_KEY", "secret_abc"),
        ("DATABASE_ID", "db123"),
    ];

    #[test]
    fn defaults_apply() {
        let config = AppConfig::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.check_interval, Duration::from_secs(20 * 60));
        assert_eq!(config.lookback_days, 3);
        assert_eq!(config.http_port, 5001);
        assert_eq!(config.mailbox.label, "Recruiters");
        assert_eq!(config.mailbox.user_name, "Your Name");
        assert_eq!(config.mailbox.imap_port, 993);
        assert_eq!(config.notion.api_url, "https://api.notion.com");
        assert_eq!(config.pipeline.dedup_policy, DedupPolicy::Company);
        assert_eq!(config.pipeline.create_failure_policy, CreateFailurePolicy::Drop);
        assert_eq!(config.pipeline.default_status, ContactStatus::Applied);
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn missing_required_is_an_error() {
        let err = AppConfig::from_lookup(lookup(&[("GMAIL_EMAIL", "me@gmail.com")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "GMAIL_PASSWORD"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DEDUP_POLICY", "by-vibes"));
        let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "DEDUP_POLICY"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("CHECK_INTERVAL_MINUTES", "0"));
        assert!(AppConfig::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn lookback_outside_bounds_is_rejected() {
        for raw in ["100000000", "-1", "3651"] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push(("EMAIL_LOOKBACK_DAYS", raw));
            let err = AppConfig::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "EMAIL_LOOKBACK_DAYS"),
                "{raw} accepted"
            );
        }

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EMAIL_LOOKBACK_DAYS", "3650"));
        assert_eq!(AppConfig::from_lookup(lookup(&pairs)).unwrap().lookback_days, MAX_LOOKBACK_DAYS);

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("EMAIL_LOOKBACK_DAYS", "0"));
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("DEDUP_POLICY", "recruiter_email"),
            ("ON_CREATE_FAILURE", "retry"),
            ("DEFAULT_STATUS", "recruiter_screen"),
            ("NOTION_API_URL", "http://127.0.0.1:9000/"),
            ("CHECK_INTERVAL_MINUTES", "5"),
        ]);
        let config = AppConfig::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.pipeline.dedup_policy, DedupPolicy::RecruiterEmail);
        assert_eq!(config.pipeline.create_failure_policy, CreateFailurePolicy::Retry);
        assert_eq!(config.pipeline.default_status, ContactStatus::RecruiterScreen);
        assert_eq!(config.notion.api_url, "http://127.0.0.1:9000");
        assert_eq!(config.check_interval, Duration::from_secs(300));
    }

    #[test]
    fn placeholders_produce_warnings() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GMAIL_EMAIL", "your-email@gmail.com"),
            ("GMAIL_PASSWORD", "your-app-password"),
            ("NOTION_API_KEY", "secret_abc"),
            ("DATABASE_ID", "db123"),
        ]))
        .unwrap();
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("GMAIL_EMAIL"));
    }

    #[test]
    fn mailbox_domain_is_lowercased() {
        let config = AppConfig::from_lookup(lookup(&[
            ("GMAIL_EMAIL", "Me@Example.COM"),
            ("GMAIL_PASSWORD", "p"),
            ("NOTION_API_KEY", "k"),
            ("DATABASE_ID", "d"),
        ]))
        .unwrap();
        assert_eq!(config.mailbox.domain().as_deref(), Some("example.com"));
    }
}
