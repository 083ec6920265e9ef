use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, WikiError};
use crate::params::Params;
use crate::response::{first_page, warnings};

pub const TOKEN_ACTIONS: &[&str] = &[
    "block", "delete", "edit", "email", "import", "move", "options", "patrol", "protect", "unblock",
    "watch",
];

static NOT_ALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Action '?([A-Za-z]+)'? is not allowed for the current user")
        .expect("static regex is valid")
});

/// Cached state of one action token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Present(String),
    /// The current user lacks this permission.
    Absent,
}

impl TokenState {
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Present(token) => Some(token),
            Self::Absent => None,
        }
    }
}

/// Per-action authorization tokens for one session.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    entries: BTreeMap<String, TokenState>,
    fetches: usize,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` means the action has not been looked up yet.
    pub fn lookup(&self, action: &str) -> Option<&TokenState> {
        self.entries.get(action)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of bulk fetches absorbed since the session started.
    pub fn fetch_count(&self) -> usize {
        self.fetches
    }

    /// Actions from `requested` that still need a server round trip.
    pub fn uncached(&self, requested: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        for action in requested {
            if !self.entries.contains_key(action) && !out.contains(action) {
                out.push(action.clone());
            }
        }
        out
    }

    /// Parameters of the single bulk request covering `actions`.
    pub fn fetch_params(actions: &[String]) -> Params {
        let mut params = Params::new();
        params.set("action", "query");
        params.set("prop", "info");
        params.set("titles", "Main Page");
        params.set("intoken", actions.join("|"));
        params
    }

    /// Record the outcome of a bulk fetch. Every requested action ends up
    /// cached, either with its token or as `Absent`.
    pub fn absorb(&mut self, requested: &[String], response: &Value) {
        self.fetches += 1;
        let mut found = BTreeMap::new();
        if let Some(page) = first_page(response)
            && let Some(fields) = page.as_object()
        {
            for (key, value) in fields {
                if let Some(action) = key.strip_suffix("token")
                    && let Some(token) = value.as_str()
                    && !action.is_empty()
                {
                    found.insert(action.to_string(), token.to_string());
                }
            }
        }

        for (_, message) in warnings(response) {
            for capture in NOT_ALLOWED.captures_iter(&message) {
                found.remove(&capture[1].to_ascii_lowercase());
            }
        }

        for action in requested {
            let state = match found.remove(action) {
                Some(token) => TokenState::Present(token),
                None => TokenState::Absent,
            };
            self.entries.insert(action.clone(), state);
        }
    }

    /// Full mapping for `requested`; every entry must already be cached.
    pub fn collect(&self, requested: &[String]) -> BTreeMap<String, TokenState> {
        requested
            .iter()
            .filter_map(|action| {
                self.entries
                    .get(action)
                    .map(|state| (action.clone(), state.clone()))
            })
            .collect()
    }
}

pub fn validate_actions(actions: &[&str]) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(actions.len());
    for action in actions {
        let normalized = action.trim().to_ascii_lowercase();
        if !TOKEN_ACTIONS.contains(&normalized.as_str()) {
            return Err(WikiError::InvalidOption(format!(
                "unknown token action: {action}"
            )));
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    Ok(out)
}
