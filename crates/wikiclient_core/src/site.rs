use reqwest::Url;
use serde::Serialize;
use serde_json::Value;

use crate::config::{SessionOptions, SiteLocator};
use crate::error::{Result, WikiError};

/// Immutable description of the remote site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub project: String,
    pub lang: String,
    pub base_url: String,
    pub script_path: String,
    pub article_path: String,
    pub secure: bool,
}

impl Endpoint {
    /// Endpoint described entirely by the caller, when every attribute is
    /// known up front and no `siteinfo` round trip is needed.
    pub fn from_options(options: &SessionOptions) -> Option<Self> {
        let SiteLocator::Project { project, lang } = &options.site else {
            return None;
        };
        Some(Self {
            name: options.name.clone()?,
            project: project.clone(),
            lang: lang.clone(),
            base_url: options.site.base_url(),
            script_path: options.script_path.clone(),
            article_path: options.article_path.clone()?,
            secure: options.secure,
        })
    }

    /// Build from the `query.general` block of a `siteinfo` response.
    pub fn from_siteinfo(query: &Value, secure: bool) -> Result<Self> {
        let general = query
            .get("general")
            .ok_or_else(|| WikiError::Decode("siteinfo response has no general block".to_string()))?;
        let field = |key: &str| -> Result<String> {
            general
                .get(key)
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| WikiError::Decode(format!("siteinfo general block lacks {key}")))
        };
        let base_url = field("server")?;
        let secure = if base_url.starts_with("https://") {
            true
        } else if base_url.starts_with("http://") {
            false
        } else {
            secure
        };
        Ok(Self {
            name: field("wikiid")?,
            project: field("sitename")?.to_lowercase(),
            lang: field("lang")?,
            base_url,
            script_path: field("scriptpath")?,
            article_path: field("articlepath")?,
            secure,
        })
    }

    /// Web domain, like `en.wikipedia.org`.
    pub fn domain(&self) -> Option<String> {
        let absolute = if self.base_url.starts_with("//") {
            format!("https:{}", self.base_url)
        } else {
            self.base_url.clone()
        };
        Url::parse(&absolute)
            .ok()
            .and_then(|url| url.host_str().map(ToString::to_string))
    }

    /// Absolute URL of an article, built from the article path.
    pub fn article_url(&self, title: &str) -> String {
        let scheme = if self.secure { "https:" } else { "http:" };
        let base = if self.base_url.starts_with("//") {
            format!("{scheme}{}", self.base_url)
        } else {
            self.base_url.clone()
        };
        let encoded = title.replace(' ', "_");
        format!("{base}{}", self.article_path.replace("$1", &encoded))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Endpoint;
    use crate::config::{SessionOptions, SiteLocator};

    fn endpoint() -> Endpoint {
        Endpoint::from_siteinfo(
            &json!({"general": {
                "wikiid": "enwiki",
                "sitename": "Wikipedia",
                "lang": "en",
                "server": "//en.wikipedia.org",
                "scriptpath": "/w",
                "articlepath": "/wiki/$1"
            }}),
            true,
        )
        .expect("endpoint")
    }

    #[test]
    fn siteinfo_populates_every_attribute() {
        let endpoint = endpoint();
        assert_eq!(endpoint.name, "enwiki");
        assert_eq!(endpoint.project, "wikipedia");
        assert_eq!(endpoint.lang, "en");
        assert_eq!(endpoint.script_path, "/w");
        assert_eq!(endpoint.domain().as_deref(), Some("en.wikipedia.org"));
    }

    #[test]
    fn incomplete_siteinfo_is_rejected() {
        let result = Endpoint::from_siteinfo(&json!({"general": {"wikiid": "x"}}), true);
        assert!(result.is_err());
    }

    #[test]
    fn article_url_uses_article_path() {
        assert_eq!(
            endpoint().article_url("Main Page"),
            "https://en.wikipedia.org/wiki/Main_Page"
        );
    }

    #[test]
    fn fully_specified_options_skip_siteinfo() {
        let mut options = SessionOptions {
            site: SiteLocator::Project {
                project: "wikipedia".to_string(),
                lang: "fr".to_string(),
            },
            ..SessionOptions::default()
        };
        assert!(Endpoint::from_options(&options).is_none());
        options.name = Some("frwiki".to_string());
        options.article_path = Some("/wiki/$1".to_string());
        let endpoint = Endpoint::from_options(&options).expect("complete");
        assert_eq!(endpoint.base_url, "//fr.wikipedia.org");
    }
}
