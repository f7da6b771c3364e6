use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder salts that MUST NOT be used.
const PLACEHOLDER_SALTS: &[&str] = &[
    "change-me-to-a-random-string",
    "CHANGE_ME_RANDOM_SECRET",
    "dev-salt-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub deeplink_salt: String,
    pub operator_chat: Option<i64>,
    pub db_path: PathBuf,
    pub policy_path: PathBuf,
    pub api_url: String,
    pub poll_timeout_secs: u64,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(bot_token) = var("OVERHEARD_BOT_TOKEN") else {
            bail!("OVERHEARD_BOT_TOKEN is unset");
        };
        let deeplink_salt = var("OVERHEARD_DEEPLINK_SALT").unwrap_or_default();
        if deeplink_salt.is_empty() || PLACEHOLDER_SALTS.contains(&deeplink_salt.as_str()) {
            bail!("OVERHEARD_DEEPLINK_SALT is unset or still a placeholder");
        }

        let operator_chat = var("OVERHEARD_OPERATOR_CHAT_ID")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("OVERHEARD_OPERATOR_CHAT_ID must be a numeric chat id")?;

        let poll_timeout_secs: u64 = var("OVERHEARD_POLL_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".into())
            .parse()
            .context("OVERHEARD_POLL_TIMEOUT_SECS must be a number of seconds")?;
        let http_timeout_secs: u64 = var("OVERHEARD_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "45".into())
            .parse()
            .context("OVERHEARD_HTTP_TIMEOUT_SECS must be a number of seconds")?;
        if http_timeout_secs <= poll_timeout_secs {
            bail!(
                "OVERHEARD_HTTP_TIMEOUT_SECS ({}) must exceed OVERHEARD_POLL_TIMEOUT_SECS ({})",
                http_timeout_secs,
                poll_timeout_secs
            );
        }

        Ok(Self {
            bot_token,
            deeplink_salt,
            operator_chat,
            db_path: var("OVERHEARD_DB_PATH")
                .unwrap_or_else(|| "overheard.db".into())
                .into(),
            policy_path: var("OVERHEARD_POLICY_PATH")
                .unwrap_or_else(|| "privacy_anon.md".into())
                .into(),
            api_url: var("OVERHEARD_API_URL").unwrap_or_else(|| "https://api.telegram.org".into()),
            poll_timeout_secs,
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}
