use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Result, WikiError};
use crate::page::Page;
use crate::params::Params;
use crate::session::{QueryOptions, Session};

const PERMISSION_CODES: &[&str] = &[
    "noedit-anon",
    "noedit",
    "cantcreate-anon",
    "cantcreate",
    "protectedtitle",
    "protectedpage",
    "cascadeprotected",
    "noimageredirect-anon",
    "noimageredirect",
    "permissiondenied",
    "blocked",
    "autoblocked",
    "emptypage",
    "emptynewsection",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditMode {
    #[default]
    Replace,
    Append,
    Prepend,
    Create,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    /// Existing section by index; `0` is the lead.
    Index(u32),
    /// Start a new section at the end of the page.
    New,
}

impl Section {
    fn as_param(&self) -> String {
        match self {
            Self::Index(index) => index.to_string(),
            Self::New => "new".to_string(),
        }
    }
}

/// One requested change to a page's text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EditIntent {
    pub text: String,
    pub summary: String,
    pub mode: EditMode,
    pub section: Option<Section>,
    pub section_title: Option<String>,
    pub bot: bool,
    pub minor: bool,
    /// Skip the conflict guards and recreate the page if it was deleted.
    pub force: bool,
}

impl EditIntent {
    pub fn new(text: impl Into<String>, mode: EditMode) -> Self {
        Self {
            text: text.into(),
            mode,
            ..Self::default()
        }
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.section = Some(section);
        self
    }

    pub fn section_title(mut self, title: impl Into<String>) -> Self {
        self.section_title = Some(title.into());
        self
    }

    pub fn bot(mut self) -> Self {
        self.bot = true;
        self
    }

    pub fn minor(mut self) -> Self {
        self.minor = true;
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == EditMode::Create && self.section.is_some() {
            return Err(WikiError::InvalidOption(
                "a page cannot be created into a section".to_string(),
            ));
        }
        if self.section_title.is_some() && self.section.is_none() {
            return Err(WikiError::InvalidOption(
                "a section title requires a section".to_string(),
            ));
        }
        Ok(())
    }

    fn text_param(&self) -> &'static str {
        match self.mode {
            EditMode::Append => "appendtext",
            EditMode::Prepend => "prependtext",
            EditMode::Replace | EditMode::Create => "text",
        }
    }
}

/// Which way a mutation should touch the caller's watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Watchlist {
    Watch,
    Unwatch,
    #[default]
    Preferences,
    NoChange,
}

impl Watchlist {
    pub(crate) fn as_param(self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Unwatch => "unwatch",
            Self::Preferences => "preferences",
            Self::NoChange => "nochange",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveFlags {
    pub move_talk: bool,
    pub move_subpages: bool,
    pub no_redirect: bool,
    pub watchlist: Watchlist,
}

/// Submit `intent` against `page`.
///
/// The page's cached view is dropped whatever the outcome once the request
/// has been sent. Validation and the create-on-existing guard fail before
/// any network traffic.
pub fn submit_edit(session: &Session, page: &mut Page, intent: &EditIntent) -> Result<Value> {
    intent.validate()?;
    if intent.mode == EditMode::Create && !intent.force && page.exists() == Some(true) {
        return Err(WikiError::PageExists(page.describe()));
    }
    let token = session.assert_ability("edit")?;

    let mut params = Params::new();
    params.set("action", "edit");
    let (key, value) = page.target_param();
    params.set(key, value);
    params.set("summary", intent.summary.as_str());
    if let Some(section) = &intent.section {
        params.set("section", section.as_param());
    }
    if let Some(title) = &intent.section_title {
        params.set("sectiontitle", title.as_str());
    }
    if intent.bot {
        params.set("bot", "1");
    }
    if intent.minor {
        params.set("minor", "1");
    }
    if intent.force {
        params.set("recreate", "1");
    } else {
        if let Some(base) = page.last_edited() {
            params.set("basetimestamp", base);
        }
        if let Some(start) = page.start_timestamp() {
            params.set("starttimestamp", start);
        }
        if intent.mode == EditMode::Create {
            params.set("createonly", "1");
        }
    }
    params.set(intent.text_param(), intent.text.as_str());
    params.set("md5", content_digest(&intent.text));
    params.set("token", token);

    let outcome = session.query_params(&params, &QueryOptions::single());
    page.invalidate();
    let response = outcome.map_err(|error| map_mutation_error(error, &page.describe()))?;

    let result = response
        .pointer("/edit/result")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    if result != "Success" {
        let detail = response.get("edit").map(Value::to_string).unwrap_or_default();
        warn!(page = %page.describe(), result, "edit was not applied");
        return Err(WikiError::api(result, detail));
    }
    info!(page = %page.describe(), mode = ?intent.mode, "edit saved");
    Ok(response)
}

pub fn delete(session: &Session, page: &mut Page, reason: &str, watchlist: Watchlist) -> Result<Value> {
    let token = session.assert_ability("delete")?;
    let mut params = Params::new();
    params.set("action", "delete");
    let (key, value) = page.target_param();
    params.set(key, value);
    params.set("reason", reason);
    params.set("watchlist", watchlist.as_param());
    params.set("token", token);

    match session.query_params(&params, &QueryOptions::single()) {
        Ok(response) => {
            page.mark_deleted();
            info!(page = %page.describe(), "page deleted");
            Ok(response)
        }
        Err(error) => {
            page.invalidate();
            Err(map_mutation_error(error, &page.describe()))
        }
    }
}

pub fn move_page(
    session: &Session,
    page: &mut Page,
    target: &str,
    reason: &str,
    flags: MoveFlags,
) -> Result<Value> {
    let target = Page::new(target)?;
    let token = session.assert_ability("move")?;
    let mut params = Params::new();
    params.set("action", "move");
    match page.target_param() {
        ("pageid", id) => params.set("fromid", id),
        (_, title) => params.set("from", title),
    }
    params.set("to", target.describe());
    params.set("reason", reason);
    if flags.move_talk {
        params.set("movetalk", "1");
    }
    if flags.move_subpages {
        params.set("movesubpages", "1");
    }
    if flags.no_redirect {
        params.set("noredirect", "1");
    }
    params.set("watchlist", flags.watchlist.as_param());
    params.set("token", token);

    let outcome = session.query_params(&params, &QueryOptions::single());
    page.invalidate();
    let response = outcome.map_err(|error| map_mutation_error(error, &page.describe()))?;
    info!(from = %page.describe(), to = %target.describe(), "page moved");
    Ok(response)
}

pub fn watch(session: &Session, page: &Page) -> Result<Value> {
    set_watched(session, page, true)
}

pub fn unwatch(session: &Session, page: &Page) -> Result<Value> {
    set_watched(session, page, false)
}

fn set_watched(session: &Session, page: &Page, watched: bool) -> Result<Value> {
    let token = session.assert_ability("watch")?;
    let mut params = Params::new();
    params.set("action", "watch");
    match page.target_param() {
        ("pageid", id) => params.set("pageids", id),
        (_, title) => params.set("titles", title),
    }
    if !watched {
        params.set("unwatch", "1");
    }
    params.set("token", token);
    session
        .query_params(&params, &QueryOptions::single())
        .map_err(|error| map_mutation_error(error, &page.describe()))
}

/// Hex MD5 of the UTF-8 payload, sent as the `md5` parameter.
pub fn content_digest(text: &str) -> String {
    format!("{:x}", md5::compute(text.as_bytes()))
}

/// Re-type a server failure of a mutating request.
pub fn map_mutation_error(error: WikiError, target: &str) -> WikiError {
    let WikiError::Api { code, info } = error else {
        return error;
    };
    match code.as_str() {
        "editconflict" | "pagedeleted" | "articleexists" => {
            warn!(page = %target, code = %code, "mutation rejected as a conflict");
            WikiError::EditConflict { code, info }
        }
        "contenttoobig" => WikiError::ContentTooLarge(info),
        "spamdetected" => WikiError::SpamRejected(info),
        "filtered" | "abusefilter-disallowed" => WikiError::FilterRejected(info),
        code if PERMISSION_CODES.contains(&code) => WikiError::Permission(info),
        _ => WikiError::Api { code, info },
    }
}
