use serde::Serialize;
use serde_json::Value;

use crate::continuation::Continuation;
use crate::error::{Result, WikiError};
use crate::namespace::{NS_CATEGORY, NS_FILE};
use crate::page::Page;
use crate::response::first_page;
use crate::session::{QueryOptions, Session};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub pageid: Option<u64>,
    pub ns: i32,
    pub title: String,
}

/// Category members, split the way the wiki presents them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Members {
    pub pages: Vec<Member>,
    pub subcategories: Vec<Member>,
    pub files: Vec<Member>,
}

impl Members {
    pub fn len(&self) -> usize {
        self.pages.len() + self.subcategories.len() + self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, member: Member) {
        match member.ns {
            NS_CATEGORY => self.subcategories.push(member),
            NS_FILE => self.files.push(member),
            _ => self.pages.push(member),
        }
    }
}

/// Server-side counts from `prop=categoryinfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub size: u64,
    pub pages: u64,
    pub files: u64,
    pub subcats: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Size,
    Pages,
    Files,
    Subcats,
}

impl MemberKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "size" => Ok(Self::Size),
            "pages" => Ok(Self::Pages),
            "files" => Ok(Self::Files),
            "subcats" => Ok(Self::Subcats),
            other => Err(WikiError::InvalidOption(format!(
                "unknown category member kind: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Category {
    pub page: Page,
    members: Option<Members>,
    counts: Option<CategoryCounts>,
}

impl Category {
    /// `title` may omit the namespace prefix.
    pub fn new(session: &Session, title: &str) -> Result<Self> {
        let page = Page::new(title)?;
        let title = page.title().unwrap_or(title);
        let qualified = match session.namespaces().name_to_id(title.split(':').next().unwrap_or("")) {
            Ok(NS_CATEGORY) if title.contains(':') => title.to_string(),
            _ => format!("{}:{title}", session.namespaces().id_to_name(NS_CATEGORY)?),
        };
        Ok(Self {
            page: Page::new(qualified)?,
            members: None,
            counts: None,
        })
    }

    pub fn title(&self) -> &str {
        self.page.title().unwrap_or_default()
    }

    /// Fetch page metadata, members and counts. `all` follows continuation
    /// to the end instead of stopping at the default budget.
    pub fn load(&mut self, session: &Session, all: bool) -> Result<()> {
        self.page.load(session)?;
        self.load_members(session, all)?;
        self.load_counts(session)
    }

    pub fn load_members(&mut self, session: &Session, all: bool) -> Result<()> {
        let continuation = if all {
            Continuation::Exhaustive
        } else {
            Continuation::bounded()
        };
        let items = session.iterate(
            &[
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", self.title().to_string()),
                ("cmprop", "ids|title".to_string()),
            ],
            "categorymembers",
            &QueryOptions::single()
                .with_continuation(continuation)
                .with_limit("cm"),
        )?;

        let mut members = Members::default();
        for item in items {
            let Some(title) = item.get("title").and_then(Value::as_str) else {
                continue;
            };
            let ns = item
                .get("ns")
                .and_then(Value::as_i64)
                .and_then(|ns| i32::try_from(ns).ok())
                .unwrap_or_default();
            members.push(Member {
                pageid: item.get("pageid").and_then(Value::as_u64),
                ns,
                title: title.to_string(),
            });
        }
        self.members = Some(members);
        Ok(())
    }

    pub fn load_counts(&mut self, session: &Session) -> Result<()> {
        let response = session.query(
            &[
                ("action", "query".to_string()),
                ("prop", "categoryinfo".to_string()),
                ("titles", self.title().to_string()),
            ],
            &QueryOptions::single(),
        )?;
        let info = first_page(&response).and_then(|page| page.get("categoryinfo"));
        let count = |key: &str| {
            info.and_then(|info| info.get(key))
                .and_then(Value::as_u64)
                .unwrap_or_default()
        };
        self.counts = Some(CategoryCounts {
            size: count("size"),
            pages: count("pages"),
            files: count("files"),
            subcats: count("subcats"),
        });
        Ok(())
    }

    pub fn members(&self) -> Option<&Members> {
        self.members.as_ref()
    }

    pub fn counts(&self) -> Option<CategoryCounts> {
        self.counts
    }

    /// Count reported by the server for one kind of member.
    pub fn size(&self, kind: MemberKind) -> Option<u64> {
        self.counts.map(|counts| match kind {
            MemberKind::Size => counts.size,
            MemberKind::Pages => counts.pages,
            MemberKind::Files => counts.files,
            MemberKind::Subcats => counts.subcats,
        })
    }

    /// `None` until members are loaded.
    pub fn is_empty(&self) -> Option<bool> {
        self.members.as_ref().map(Members::is_empty)
    }
}
