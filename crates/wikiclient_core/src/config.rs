use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::namespace::NamespaceTable;

pub const DEFAULT_USER_AGENT: &str = "wikiclient/0.2 (wikibot; Rust)";
pub const DEFAULT_SCRIPT_PATH: &str = "/w";
pub const DEFAULT_BASE_URL: &str = "//en.wikipedia.org";
pub const DEFAULT_THROTTLE_SECS: f64 = 10.0;
pub const DEFAULT_MAXLAG_SECS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: usize = 3;
pub const DEFAULT_INITIAL_IDLE_SECS: f64 = 5.0;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default)]
    pub session: SessionSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub project: Option<String>,
    pub lang: Option<String>,
    pub script_path: Option<String>,
    pub article_path: Option<String>,
    pub secure: Option<bool>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub namespaces: Vec<NamespaceEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct SessionSection {
    pub throttle_secs: Option<f64>,
    pub maxlag_secs: Option<u64>,
    pub max_retries: Option<usize>,
    pub initial_idle_secs: Option<f64>,
    pub timeout_ms: Option<u64>,
}

/// Where the API lives: an explicit base address, or a project + language
/// pair such as `wikipedia` / `en`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLocator {
    BaseUrl(String),
    Project { project: String, lang: String },
}

impl SiteLocator {
    pub fn base_url(&self) -> String {
        match self {
            Self::BaseUrl(url) => url.trim_end_matches('/').to_string(),
            Self::Project { project, lang } => format!("//{lang}.{project}.org"),
        }
    }
}

/// Fixed per-session tuning, read-only after construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub throttle: Duration,
    pub maxlag: u64,
    pub max_retries: usize,
    pub initial_idle: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_secs_f64(DEFAULT_THROTTLE_SECS),
            maxlag: DEFAULT_MAXLAG_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_idle: Duration::from_secs_f64(DEFAULT_INITIAL_IDLE_SECS),
        }
    }
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub site: SiteLocator,
    pub secure: bool,
    pub script_path: String,
    pub article_path: Option<String>,
    pub name: Option<String>,
    pub namespaces: Option<NamespaceTable>,
    pub credentials: Option<(String, String)>,
    pub config: SessionConfig,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            site: SiteLocator::BaseUrl(DEFAULT_BASE_URL.to_string()),
            secure: true,
            script_path: DEFAULT_SCRIPT_PATH.to_string(),
            article_path: None,
            name: None,
            namespaces: None,
            credentials: None,
            config: SessionConfig::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl SessionOptions {
    /// `scheme:` + base + script path + `/api.php`. A base that already
    /// carries a scheme is used as-is.
    pub fn api_url(&self) -> String {
        let base = self.site.base_url();
        let base = if base.starts_with("//") {
            let scheme = if self.secure { "https:" } else { "http:" };
            format!("{scheme}{base}")
        } else if base.starts_with("http://") || base.starts_with("https://") {
            base
        } else {
            let scheme = if self.secure { "https://" } else { "http://" };
            format!("{scheme}{base}")
        };
        format!("{base}{}/api.php", self.script_path.trim_end_matches('/'))
    }
}

impl WikiConfig {
    /// Resolve session options: env > config file > defaults.
    pub fn session_options(&self) -> Result<SessionOptions> {
        let mut options = SessionOptions::default();

        let url = env_string("WIKI_URL").or_else(|| self.wiki.url.clone());
        options.site = match (url, &self.wiki.project, &self.wiki.lang) {
            (Some(url), _, _) => SiteLocator::BaseUrl(url),
            (None, Some(project), Some(lang)) => SiteLocator::Project {
                project: project.clone(),
                lang: lang.clone(),
            },
            (None, Some(_), None) | (None, None, Some(_)) => {
                bail!("[wiki] project and lang must be set together")
            }
            (None, None, None) => SiteLocator::BaseUrl(DEFAULT_BASE_URL.to_string()),
        };
        if let Some(secure) = self.wiki.secure {
            options.secure = secure;
        }
        if let Some(script_path) = &self.wiki.script_path {
            options.script_path = script_path.clone();
        }
        options.article_path = self.wiki.article_path.clone();
        options.user_agent = self.user_agent();
        options.namespaces = self.namespace_table()?;

        let session = &self.session;
        let throttle = env_parse::<f64>("WIKI_THROTTLE")
            .or(session.throttle_secs)
            .unwrap_or(DEFAULT_THROTTLE_SECS);
        let initial_idle = session.initial_idle_secs.unwrap_or(DEFAULT_INITIAL_IDLE_SECS);
        if !throttle.is_finite() || throttle < 0.0 {
            bail!("throttle must be a non-negative number of seconds, got {throttle}");
        }
        if !initial_idle.is_finite() || initial_idle < 0.0 {
            bail!("initial_idle_secs must be a non-negative number, got {initial_idle}");
        }
        options.config = SessionConfig {
            throttle: Duration::from_secs_f64(throttle),
            maxlag: env_parse("WIKI_MAXLAG")
                .or(session.maxlag_secs)
                .unwrap_or(DEFAULT_MAXLAG_SECS),
            max_retries: env_parse("WIKI_MAX_RETRIES")
                .or(session.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            initial_idle: Duration::from_secs_f64(initial_idle),
        };
        options.timeout = Duration::from_millis(
            env_parse("WIKI_HTTP_TIMEOUT_MS")
                .or(session.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );
        Ok(options)
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_string("WIKI_USER_AGENT")
            .or_else(|| self.wiki.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Pre-supplied namespace table, if the config lists any namespaces.
    pub fn namespace_table(&self) -> Result<Option<NamespaceTable>> {
        if self.wiki.namespaces.is_empty() {
            return Ok(None);
        }
        let mut table = NamespaceTable::new();
        for entry in &self.wiki.namespaces {
            if entry.id != 0 && entry.name.trim().is_empty() {
                bail!("namespace {} needs a non-empty name", entry.id);
            }
            table.insert(entry.id, entry.name.clone());
            for alias in &entry.aliases {
                table.insert(entry.id, alias.clone());
            }
        }
        Ok(Some(table))
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Credentials from WIKI_BOT_USER / WIKI_BOT_PASS, when both are set.
pub fn credentials_from_env() -> Option<(String, String)> {
    let user = env_string("WIKI_BOT_USER")?;
    let pass = env_string("WIKI_BOT_PASS")?;
    Some((user, pass))
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|value| value.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/config.toml")).expect("load config");
        assert!(config.wiki.url.is_none());
        assert!(config.wiki.namespaces.is_empty());
    }

    #[test]
    fn load_config_parses_wiki_and_session_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[wiki]
project = "wikipedia"
lang = "de"
secure = false
script_path = "/w"
user_agent = "test-agent/1.0"

[[wiki.namespaces]]
id = 3000
name = "Lore"
aliases = ["LR"]

[session]
throttle_secs = 0.5
maxlag_secs = 5
max_retries = 2
initial_idle_secs = 1.0
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.wiki.project.as_deref(), Some("wikipedia"));
        assert_eq!(config.wiki.namespaces.len(), 1);
        assert_eq!(config.session.max_retries, Some(2));

        let table = config
            .namespace_table()
            .expect("namespaces")
            .expect("non-empty");
        assert_eq!(table.name_to_id("lr").expect("alias"), 3000);
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("config.toml");
        fs::write(&config_path, "[wiki\nurl = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn project_and_lang_build_the_api_url() {
        let options = SessionOptions {
            site: SiteLocator::Project {
                project: "wikipedia".to_string(),
                lang: "en".to_string(),
            },
            secure: true,
            ..SessionOptions::default()
        };
        assert_eq!(options.api_url(), "https://en.wikipedia.org/w/api.php");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let options = SessionOptions {
            site: SiteLocator::BaseUrl("http://localhost:8080/".to_string()),
            script_path: String::new(),
            ..SessionOptions::default()
        };
        assert_eq!(options.api_url(), "http://localhost:8080/api.php");
    }

    #[test]
    fn insecure_protocol_relative_base() {
        let options = SessionOptions {
            site: SiteLocator::BaseUrl("//wiki.example.org".to_string()),
            secure: false,
            ..SessionOptions::default()
        };
        assert_eq!(options.api_url(), "http://wiki.example.org/w/api.php");
    }

    #[test]
    fn project_without_lang_is_rejected() {
        let config = WikiConfig {
            wiki: WikiSection {
                project: Some("wikipedia".to_string()),
                ..WikiSection::default()
            },
            ..WikiConfig::default()
        };
        if std::env::var("WIKI_URL").is_err() {
            assert!(config.session_options().is_err());
        }
    }

    #[test]
    fn default_session_config_matches_documented_values() {
        let config = SessionConfig::default();
        assert_eq!(config.throttle, Duration::from_secs(10));
        assert_eq!(config.maxlag, 10);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_idle, Duration::from_secs(5));
    }
}
