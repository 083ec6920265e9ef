use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, WikiError};
use crate::markup::{MarkupParser, ParsedMarkup, WikitextScanner, is_excluded, parse_redirect};
use crate::namespace::{NS_CATEGORY, NS_FILE, NS_MEDIA, split_title};
use crate::params::Params;
use crate::response::first_page;
use crate::session::{QueryOptions, Session};

const ILLEGAL_TITLE_CHARS: &[char] = &['#', '<', '>', '[', ']', '|', '{', '}'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Protection {
    pub level: String,
    pub expiry: String,
}

/// How a page is addressed on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PageIdentity {
    Title(String),
    Id(u64),
}

/// Everything learned about a page by `load`. Reset to the default ("unknown")
/// whenever a mutation is submitted.
#[derive(Debug, Clone, Default)]
struct LoadedState {
    exists: Option<bool>,
    is_redirect: bool,
    last_revid: Option<u64>,
    last_editor: Option<String>,
    last_edited: Option<String>,
    creator: Option<String>,
    start_timestamp: Option<String>,
    full_url: Option<String>,
    protection: BTreeMap<String, Protection>,
    content: Option<String>,
    markup: ParsedMarkup,
    langlinks: BTreeMap<String, String>,
    extlinks: Vec<String>,
}

/// A page on the wiki and the last view of it the client loaded.
#[derive(Debug, Clone)]
pub struct Page {
    identity: PageIdentity,
    namespace: Option<i32>,
    follow_redirects: bool,
    load_content: bool,
    state: LoadedState,
}

impl Page {
    pub fn new(title: impl Into<String>) -> Result<Self> {
        let title = normalize_title(&title.into())?;
        Ok(Self::with_identity(PageIdentity::Title(title)))
    }

    pub fn from_id(pageid: u64) -> Result<Self> {
        if pageid == 0 {
            return Err(WikiError::InvalidIdentity(
                "page ids start at 1".to_string(),
            ));
        }
        Ok(Self::with_identity(PageIdentity::Id(pageid)))
    }

    fn with_identity(identity: PageIdentity) -> Self {
        Self {
            identity,
            namespace: None,
            follow_redirects: false,
            load_content: true,
            state: LoadedState::default(),
        }
    }

    /// Resolve redirects when loading, so the page becomes the target.
    pub fn following_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }

    /// Skip the revision text and link tables when loading.
    pub fn without_content(mut self) -> Self {
        self.load_content = false;
        self
    }

    pub fn identity(&self) -> &PageIdentity {
        &self.identity
    }

    pub fn title(&self) -> Option<&str> {
        match &self.identity {
            PageIdentity::Title(title) => Some(title),
            PageIdentity::Id(_) => None,
        }
    }

    pub fn pageid(&self) -> Option<u64> {
        match self.identity {
            PageIdentity::Id(id) => Some(id),
            PageIdentity::Title(_) => None,
        }
    }

    /// `None` until loaded or after a mutation.
    pub fn exists(&self) -> Option<bool> {
        self.state.exists
    }

    pub fn namespace(&self) -> Option<i32> {
        self.namespace
    }

    pub fn is_talk_page(&self) -> Option<bool> {
        self.namespace.map(|ns| ns >= 0 && ns % 2 == 1)
    }

    pub fn is_redirect(&self) -> bool {
        self.visible() && self.state.is_redirect
    }

    pub fn last_revid(&self) -> Option<u64> {
        self.visible().then_some(self.state.last_revid).flatten()
    }

    pub fn last_editor(&self) -> Option<&str> {
        self.visible_str(&self.state.last_editor)
    }

    /// Timestamp of the latest revision, as reported by the server.
    pub fn last_edited(&self) -> Option<&str> {
        self.visible_str(&self.state.last_edited)
    }

    /// Author of the oldest revision.
    pub fn creator(&self) -> Option<&str> {
        self.visible_str(&self.state.creator)
    }

    /// Server time when the page was loaded.
    pub fn start_timestamp(&self) -> Option<&str> {
        self.visible_str(&self.state.start_timestamp)
    }

    pub fn full_url(&self) -> Option<&str> {
        self.visible_str(&self.state.full_url)
    }

    pub fn protection(&self) -> Option<&BTreeMap<String, Protection>> {
        self.visible().then_some(&self.state.protection)
    }

    pub fn content(&self) -> Option<&str> {
        self.visible_str(&self.state.content)
    }

    pub fn templates(&self) -> &[String] {
        if self.visible() { &self.state.markup.templates } else { &[] }
    }

    pub fn external_links(&self) -> &[String] {
        if self.visible() { &self.state.extlinks } else { &[] }
    }

    /// URLs written literally in the wikitext. Unlike `external_links`, this
    /// misses links produced by templates.
    pub fn inline_external_links(&self) -> &[String] {
        if self.visible() { &self.state.markup.external_links } else { &[] }
    }

    /// Language code → title on the other wiki.
    pub fn language_links(&self) -> Option<&BTreeMap<String, String>> {
        self.visible().then_some(&self.state.langlinks)
    }

    /// Internal link targets, excluding category memberships and embedded
    /// files.
    pub fn links(&self, session: &Session) -> Vec<String> {
        self.classified_links(session, |ns, colon| colon || !is_attachment(ns))
    }

    pub fn categories(&self, session: &Session) -> Vec<String> {
        self.classified_links(session, |ns, colon| !colon && ns == Some(NS_CATEGORY))
    }

    pub fn files(&self, session: &Session) -> Vec<String> {
        self.classified_links(session, |ns, colon| {
            !colon && matches!(ns, Some(NS_FILE) | Some(NS_MEDIA))
        })
    }

    /// Target named by the `#REDIRECT` line, or `None` when this is not a
    /// redirect or the content is unknown.
    pub fn redirect_target(&self) -> Option<Page> {
        if !self.is_redirect() {
            return None;
        }
        let target = parse_redirect(self.content()?)?;
        Page::new(target).ok()
    }

    /// Whether `{{bots}}`/`{{nobots}}` in the content shuts out `username`.
    pub fn bots_excluded(&self, username: &str) -> Option<bool> {
        self.content().map(|content| is_excluded(content, username))
    }

    /// Drop everything learned by `load`. Called after every submitted
    /// mutation.
    pub fn invalidate(&mut self) {
        self.state = LoadedState::default();
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.state = LoadedState {
            exists: Some(false),
            ..LoadedState::default()
        };
    }

    /// `("title", ..)` or `("pageid", ..)` for single-page actions.
    pub(crate) fn target_param(&self) -> (&'static str, String) {
        match &self.identity {
            PageIdentity::Title(title) => ("title", title.clone()),
            PageIdentity::Id(id) => ("pageid", id.to_string()),
        }
    }

    /// Name used in error messages.
    pub(crate) fn describe(&self) -> String {
        match &self.identity {
            PageIdentity::Title(title) => title.clone(),
            PageIdentity::Id(id) => format!("page id {id}"),
        }
    }

    pub fn load(&mut self, session: &Session) -> Result<()> {
        self.load_with(session, &WikitextScanner)
    }

    pub fn load_with(&mut self, session: &Session, parser: &dyn MarkupParser) -> Result<()> {
        let mut params = Params::new();
        params.set("action", "query");
        params.set("inprop", "protection|url");
        params.set("curtimestamp", "1");
        match &self.identity {
            PageIdentity::Title(title) => params.set("titles", title.as_str()),
            PageIdentity::Id(id) => params.set("pageids", id.to_string()),
        }
        if self.follow_redirects {
            params.set("redirects", "1");
        }
        let options = if self.load_content {
            params.set("prop", "info|revisions|langlinks|extlinks");
            params.set("rvprop", "ids|timestamp|user|content");
            params.set("rvslots", "main");
            QueryOptions::continued().with_limit("ll").with_limit("el")
        } else {
            params.set("prop", "info|revisions");
            params.set("rvprop", "ids|timestamp|user");
            QueryOptions::single()
        };

        let response = session.query_params(&params, &options)?;
        self.apply(session, &response, parser)?;
        if self.visible() && self.state.creator.is_none() {
            self.state.creator = self.load_creator(session)?;
        }
        Ok(())
    }

    /// Load when the cached view is unknown, then return the content.
    pub fn fetch_content(&mut self, session: &Session) -> Result<Option<&str>> {
        if self.state.exists.is_none() || (self.state.exists == Some(true) && self.state.content.is_none()) {
            self.load_content = true;
            self.load(session)?;
        }
        Ok(self.content())
    }

    /// Talk page for a subject page, or subject page for a talk page.
    pub fn toggle_talk(&self, session: &Session) -> Result<Page> {
        let title = self.title().ok_or_else(|| {
            WikiError::InvalidIdentity("load the page before asking for its talk page".to_string())
        })?;
        let (namespace, body) = split_title(session.namespaces(), title);
        if namespace < 0 {
            return Err(WikiError::InvalidOption(format!(
                "pages in namespace {namespace} cannot have talk pages"
            )));
        }
        let counterpart = if namespace % 2 == 1 {
            namespace - 1
        } else {
            namespace + 1
        };
        let prefix = session.namespaces().id_to_name(counterpart)?;
        let mut page = if prefix.is_empty() {
            Page::new(body)?
        } else {
            Page::new(format!("{prefix}:{body}"))?
        };
        page.namespace = Some(counterpart);
        page.follow_redirects = self.follow_redirects;
        Ok(page)
    }

    fn load_creator(&self, session: &Session) -> Result<Option<String>> {
        let target = match &self.identity {
            PageIdentity::Title(title) => ("titles", title.clone()),
            PageIdentity::Id(id) => ("pageids", id.to_string()),
        };
        let response = session.query(
            &[
                ("action", "query".to_string()),
                ("prop", "revisions".to_string()),
                target,
                ("rvprop", "user".to_string()),
                ("rvdir", "newer".to_string()),
                ("rvlimit", "1".to_string()),
            ],
            &QueryOptions::single(),
        )?;
        Ok(first_page(&response)
            .and_then(|page| page.get("revisions"))
            .and_then(Value::as_array)
            .and_then(|revisions| revisions.first())
            .and_then(|revision| string_field(revision, "user")))
    }

    fn apply(&mut self, session: &Session, response: &Value, parser: &dyn MarkupParser) -> Result<()> {
        let page = first_page(response)
            .ok_or_else(|| WikiError::Decode("page query returned no pages".to_string()))?;

        if page.get("invalid").is_some() {
            let reason = page
                .get("invalidreason")
                .and_then(Value::as_str)
                .unwrap_or("invalid title");
            return Err(WikiError::InvalidIdentity(format!("{}: {reason}", self.describe())));
        }

        let mut state = LoadedState::default();
        if let Some(title) = page.get("title").and_then(Value::as_str) {
            if self.title() != Some(title) {
                debug!(from = %self.describe(), to = %title, "page title normalized");
            }
            self.identity = PageIdentity::Title(title.to_string());
        }
        self.namespace = match page.get("ns").and_then(Value::as_i64) {
            Some(ns) => i32::try_from(ns).ok(),
            None => self
                .title()
                .map(|title| split_title(session.namespaces(), title).0),
        };

        if page.get("missing").is_some() {
            if matches!(self.identity, PageIdentity::Id(_)) {
                return Err(WikiError::NotFound(self.describe()));
            }
            state.exists = Some(false);
            self.state = state;
            return Ok(());
        }

        state.exists = Some(true);
        state.is_redirect = page.get("redirect").is_some_and(truthy);
        state.full_url = string_field(page, "fullurl");
        state.last_revid = page.get("lastrevid").and_then(Value::as_u64);
        state.start_timestamp = string_field(response, "curtimestamp")
            .or_else(|| string_field(page, "starttimestamp"));
        state.protection = parse_protection(page);

        if let Some(revision) = page
            .get("revisions")
            .and_then(Value::as_array)
            .and_then(|revisions| revisions.first())
        {
            state.last_editor = string_field(revision, "user");
            state.last_edited = string_field(revision, "timestamp");
            state.content = revision_content(revision);
            // A first revision has no parent; its author created the page.
            if revision.get("parentid").and_then(Value::as_u64) == Some(0) {
                state.creator = state.last_editor.clone();
            }
        }
        if let Some(content) = &state.content {
            state.markup = parser.parse(content);
        }
        state.langlinks = parse_langlinks(page);
        state.extlinks = parse_extlinks(page);
        self.state = state;
        Ok(())
    }

    fn visible(&self) -> bool {
        self.state.exists == Some(true)
    }

    fn visible_str<'a>(&self, field: &'a Option<String>) -> Option<&'a str> {
        if self.visible() {
            field.as_deref()
        } else {
            None
        }
    }

    fn classified_links<F>(&self, session: &Session, keep: F) -> Vec<String>
    where
        F: Fn(Option<i32>, bool) -> bool,
    {
        if !self.visible() {
            return Vec::new();
        }
        self.state
            .markup
            .links
            .iter()
            .filter(|link| {
                let ns = link
                    .prefix()
                    .and_then(|prefix| session.namespaces().name_to_id(prefix).ok());
                keep(ns, link.leading_colon)
            })
            .map(|link| link.title.clone())
            .collect()
    }
}

fn is_attachment(ns: Option<i32>) -> bool {
    matches!(ns, Some(NS_CATEGORY) | Some(NS_FILE) | Some(NS_MEDIA))
}

fn normalize_title(raw: &str) -> Result<String> {
    let title = raw.replace('_', " ");
    let title = title.trim();
    if title.is_empty() {
        return Err(WikiError::InvalidIdentity("page title is empty".to_string()));
    }
    if let Some(bad) = title.chars().find(|ch| ILLEGAL_TITLE_CHARS.contains(ch)) {
        return Err(WikiError::InvalidIdentity(format!(
            "page title {title:?} contains illegal character {bad:?}"
        )));
    }
    Ok(title.to_string())
}

fn truthy(value: &Value) -> bool {
    !matches!(value, Value::Bool(false) | Value::Null)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(ToString::to_string)
}

fn revision_content(revision: &Value) -> Option<String> {
    let slot = revision.pointer("/slots/main");
    slot.and_then(|slot| slot.get("content").or_else(|| slot.get("*")))
        .or_else(|| revision.get("content"))
        .or_else(|| revision.get("*"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn parse_protection(page: &Value) -> BTreeMap<String, Protection> {
    let mut out = BTreeMap::new();
    for item in page
        .get("protection")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let (Some(kind), Some(level)) = (
            item.get("type").and_then(Value::as_str),
            item.get("level").and_then(Value::as_str),
        ) else {
            continue;
        };
        out.insert(
            kind.to_string(),
            Protection {
                level: level.to_string(),
                expiry: string_field(item, "expiry").unwrap_or_else(|| "infinity".to_string()),
            },
        );
    }
    out
}

fn parse_langlinks(page: &Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for item in page
        .get("langlinks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let lang = item.get("lang").and_then(Value::as_str);
        let title = item
            .get("title")
            .or_else(|| item.get("*"))
            .and_then(Value::as_str);
        if let (Some(lang), Some(title)) = (lang, title) {
            out.insert(lang.to_string(), title.to_string());
        }
    }
    out
}

fn parse_extlinks(page: &Value) -> Vec<String> {
    page.get("extlinks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| {
            item.get("url")
                .or_else(|| item.get("*"))
                .and_then(Value::as_str)
                .map(ToString::to_string)
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::fixtures::{loaded_page, missing_page};
    use super::{Page, PageIdentity, Protection};
    use crate::error::WikiError;
    use crate::testing::{fast_config, session};

    #[test]
    fn titles_are_validated_locally() {
        assert!(matches!(Page::new("  "), Err(WikiError::InvalidIdentity(_))));
        assert!(matches!(Page::new("A|B"), Err(WikiError::InvalidIdentity(_))));
        assert!(matches!(Page::from_id(0), Err(WikiError::InvalidIdentity(_))));
        assert_eq!(Page::new("Main_Page").expect("title").title(), Some("Main Page"));
    }

    #[test]
    fn unloaded_page_exposes_nothing() {
        let page = Page::new("Example").expect("page");
        assert_eq!(page.exists(), None);
        assert!(page.content().is_none());
        assert!(page.last_edited().is_none());
        assert!(page.templates().is_empty());
    }

    #[test]
    fn load_populates_metadata_and_markup() {
        let (session, transport, _) = session(fast_config());
        let mut response = loaded_page(
            "Example",
            "{{Infobox}} See [[Other page]], [[Category:Things]] and [[File:X.png]]. https://example.org",
        );
        response["query"]["pages"][0]["protection"] =
            json!([{"type": "edit", "level": "autoconfirmed", "expiry": "infinity"}]);
        response["query"]["pages"][0]["langlinks"] = json!([{"lang": "de", "title": "Beispiel"}]);
        response["query"]["pages"][0]["extlinks"] = json!([{"url": "https://example.org"}]);
        transport.reply(response);

        let mut page = Page::new("Example").expect("page");
        page.load(&session).expect("load");

        let request = &transport.requests()[0];
        assert_eq!(request.get("titles"), Some("Example"));
        assert_eq!(request.get("lllimit"), Some("max"));
        assert_eq!(request.get("ellimit"), Some("max"));
        assert!(request.get("rvlimit").is_none());

        assert_eq!(page.exists(), Some(true));
        assert_eq!(page.namespace(), Some(0));
        assert_eq!(page.last_revid(), Some(900));
        assert_eq!(page.last_editor(), Some("Editor"));
        assert_eq!(page.last_edited(), Some("2024-04-30T08:00:00Z"));
        assert_eq!(page.start_timestamp(), Some("2024-05-01T12:00:00Z"));
        assert_eq!(page.templates(), ["Infobox".to_string()]);
        assert_eq!(page.links(&session), vec!["Other page"]);
        assert_eq!(page.categories(&session), vec!["Category:Things"]);
        assert_eq!(page.files(&session), vec!["File:X.png"]);
        assert_eq!(page.external_links(), ["https://example.org".to_string()]);
        assert_eq!(page.inline_external_links(), ["https://example.org".to_string()]);
        assert_eq!(
            page.language_links().expect("langlinks").get("de").map(String::as_str),
            Some("Beispiel")
        );
        assert_eq!(
            page.protection().expect("protection").get("edit"),
            Some(&Protection {
                level: "autoconfirmed".to_string(),
                expiry: "infinity".to_string()
            })
        );
    }

    #[test]
    fn missing_page_has_no_content() {
        let (session, transport, _) = session(fast_config());
        transport.reply(missing_page("User:Nobody here", 2));
        let mut page = Page::new("User:Nobody here").expect("page");
        page.load(&session).expect("load");
        assert_eq!(page.exists(), Some(false));
        assert_eq!(page.namespace(), Some(2));
        assert!(page.content().is_none());
    }

    #[test]
    fn missing_page_id_is_not_found() {
        let (session, transport, _) = session(fast_config());
        transport.reply(json!({"query": {"pages": [{"pageid": 77, "missing": true}]}}));
        let mut page = Page::from_id(77).expect("page");
        let error = page.load(&session).expect_err("missing id");
        assert!(matches!(error, WikiError::NotFound(_)));
        assert_eq!(transport.requests()[0].get("pageids"), Some("77"));
    }

    #[test]
    fn invalid_title_reported_by_server_is_an_identity_error() {
        let (session, transport, _) = session(fast_config());
        transport.reply(json!({"query": {"pages": [{"title": "Talk:", "invalid": true, "invalidreason": "empty title"}]}}));
        let mut page = Page::new("Talk:").expect("page");
        let error = page.load(&session).expect_err("invalid");
        assert!(matches!(error, WikiError::InvalidIdentity(ref text) if text.contains("empty title")));
    }

    #[test]
    fn loading_by_id_adopts_the_canonical_title() {
        let (session, transport, _) = session(fast_config());
        transport.reply(loaded_page("Resolved title", "text"));
        let mut page = Page::from_id(42).expect("page");
        page.load(&session).expect("load");
        assert_eq!(page.identity(), &PageIdentity::Title("Resolved title".to_string()));
    }

    #[test]
    fn redirect_target_comes_from_content() {
        let (session, transport, _) = session(fast_config());
        let mut response = loaded_page("Old name", "#REDIRECT [[New name#Top]]");
        response["query"]["pages"][0]["redirect"] = json!(true);
        transport.reply(response);
        let mut page = Page::new("Old name").expect("page");
        page.load(&session).expect("load");
        assert!(page.is_redirect());
        let target = page.redirect_target().expect("target");
        assert_eq!(target.title(), Some("New name"));
    }

    #[test]
    fn following_redirects_asks_the_server_to_resolve() {
        let (session, transport, _) = session(fast_config());
        transport.reply(loaded_page("New name", "body"));
        let mut page = Page::new("Old name").expect("page").following_redirects();
        page.load(&session).expect("load");
        assert_eq!(transport.requests()[0].get("redirects"), Some("1"));
        assert_eq!(page.title(), Some("New name"));
    }

    #[test]
    fn talk_pages_toggle_between_namespaces() {
        let (session, _, _) = session(fast_config());
        let talk = Page::new("User:Example").expect("page").toggle_talk(&session).expect("talk");
        assert_eq!(talk.title(), Some("User talk:Example"));
        let subject = talk.toggle_talk(&session).expect("subject");
        assert_eq!(subject.title(), Some("User:Example"));
        let article_talk = Page::new("Example").expect("page").toggle_talk(&session).expect("talk");
        assert_eq!(article_talk.title(), Some("Talk:Example"));
        let back = article_talk.toggle_talk(&session).expect("article");
        assert_eq!(back.title(), Some("Example"));
        assert!(Page::new("Special:Random").expect("page").toggle_talk(&session).is_err());
    }

    #[test]
    fn bots_exclusion_reads_loaded_content() {
        let (session, transport, _) = session(fast_config());
        transport.reply(loaded_page("Example", "{{bots|deny=ExampleBot}}"));
        let mut page = Page::new("Example").expect("page");
        assert_eq!(page.bots_excluded("ExampleBot"), None);
        page.load(&session).expect("load");
        assert_eq!(page.bots_excluded("ExampleBot"), Some(true));
        assert_eq!(page.bots_excluded("OtherBot"), Some(false));
    }

    #[test]
    fn fetch_content_reloads_after_invalidation() {
        let (session, transport, _) = session(fast_config());
        transport
            .reply(loaded_page("Example", "first"))
            .reply(loaded_page("Example", "second"));
        let mut page = Page::new("Example").expect("page");
        assert_eq!(page.fetch_content(&session).expect("load"), Some("first"));
        assert_eq!(page.fetch_content(&session).expect("cached"), Some("first"));
        assert_eq!(transport.request_count(), 1);

        page.invalidate();
        assert!(page.content().is_none());
        assert_eq!(page.fetch_content(&session).expect("reload"), Some("second"));
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn metadata_only_load_skips_content() {
        let (session, transport, _) = session(fast_config());
        transport.reply(json!({"query": {"pages": [{
            "pageid": 1, "ns": 0, "title": "Example", "lastrevid": 5,
            "revisions": [{"revid": 5, "parentid": 0, "user": "Someone", "timestamp": "2024-01-01T00:00:00Z"}]
        }]}}));
        let mut page = Page::new("Example").expect("page").without_content();
        page.load(&session).expect("load");
        let request = &transport.requests()[0];
        assert_eq!(request.get("rvprop"), Some("ids|timestamp|user"));
        assert_eq!(page.last_editor(), Some("Someone"));
        assert_eq!(page.creator(), Some("Someone"));
        assert!(page.content().is_none());
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn creator_comes_from_the_oldest_revision() {
        let (session, transport, _) = session(fast_config());
        let mut response = loaded_page("Example", "body");
        response["query"]["pages"][0]["revisions"][0]["parentid"] = json!(899);
        transport.reply(response).reply(json!({"query": {"pages": [{
            "pageid": 42, "ns": 0, "title": "Example",
            "revisions": [{"user": "Founder"}]
        }]}}));

        let mut page = Page::new("Example").expect("page");
        assert_eq!(page.creator(), None);
        page.load(&session).expect("load");

        let request = &transport.requests()[1];
        assert_eq!(request.get("prop"), Some("revisions"));
        assert_eq!(request.get("titles"), Some("Example"));
        assert_eq!(request.get("rvdir"), Some("newer"));
        assert_eq!(request.get("rvlimit"), Some("1"));
        assert_eq!(request.get("rvprop"), Some("user"));
        assert_eq!(page.last_editor(), Some("Editor"));
        assert_eq!(page.creator(), Some("Founder"));

        page.invalidate();
        assert_eq!(page.creator(), None);
    }

    #[test]
    fn missing_page_skips_the_creator_lookup() {
        let (session, transport, _) = session(fast_config());
        transport.reply(missing_page("Nothing", 0));
        let mut page = Page::new("Nothing").expect("page");
        page.load(&session).expect("load");
        assert_eq!(page.creator(), None);
        assert_eq!(transport.request_count(), 1);
    }
}
