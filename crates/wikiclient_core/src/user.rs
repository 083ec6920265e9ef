use std::net::IpAddr;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::edit::map_mutation_error;
use crate::error::{Result, WikiError};
use crate::namespace::NS_USER;
use crate::page::Page;
use crate::session::{QueryOptions, Session};

const USER_PROPS: &str = "blockinfo|groups|rights|editcount|registration|emailable|gender";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub by: Option<String>,
    pub reason: Option<String>,
    pub expiry: Option<String>,
}

/// Account attributes from `list=users`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub userid: Option<u64>,
    pub block: Option<BlockInfo>,
    pub groups: Vec<String>,
    pub rights: Vec<String>,
    pub edit_count: Option<u64>,
    pub registration: Option<String>,
    pub emailable: bool,
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockFlags {
    pub anon_only: bool,
    pub no_create: bool,
    pub autoblock: bool,
    pub no_email: bool,
}

#[derive(Debug, Clone)]
pub struct User {
    name: String,
    exists: Option<bool>,
    info: Option<UserInfo>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into().replace('_', " ").trim().to_string();
        if name.is_empty() || name.contains(['#', '<', '>', '[', ']', '|', '{', '}', '/']) {
            return Err(WikiError::InvalidIdentity(format!("invalid user name {name:?}")));
        }
        Ok(Self {
            name,
            exists: None,
            info: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` until loaded. Anonymous (IP) users never exist as accounts.
    pub fn exists(&self) -> Option<bool> {
        self.exists
    }

    pub fn info(&self) -> Option<&UserInfo> {
        self.info.as_ref()
    }

    pub fn is_blocked(&self) -> Option<bool> {
        self.info.as_ref().map(|info| info.block.is_some())
    }

    pub fn is_ip(&self) -> bool {
        self.name.parse::<IpAddr>().is_ok()
    }

    pub fn load(&mut self, session: &Session) -> Result<()> {
        let users = session.iterate(
            &[
                ("action", "query".to_string()),
                ("list", "users".to_string()),
                ("ususers", self.name.clone()),
                ("usprop", USER_PROPS.to_string()),
            ],
            "users",
            &QueryOptions::single(),
        )?;
        let entry = users
            .first()
            .ok_or_else(|| WikiError::Decode("users query returned no entries".to_string()))?;

        if let Some(name) = entry.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if entry.get("invalid").is_some() {
            return Err(WikiError::InvalidIdentity(format!("invalid user name {:?}", self.name)));
        }
        let Some(userid) = entry.get("userid").and_then(Value::as_u64) else {
            self.exists = Some(false);
            self.info = None;
            return Ok(());
        };

        let text = |key: &str| entry.get(key).and_then(Value::as_str).map(ToString::to_string);
        let block = entry.get("blockid").is_some().then(|| BlockInfo {
            by: text("blockedby"),
            reason: text("blockreason"),
            expiry: text("blockexpiry"),
        });
        self.exists = Some(true);
        self.info = Some(UserInfo {
            userid: Some(userid),
            block,
            groups: string_list(entry.get("groups")),
            rights: string_list(entry.get("rights")),
            edit_count: entry.get("editcount").and_then(Value::as_u64),
            registration: text("registration"),
            emailable: entry.get("emailable").is_some_and(|value| value != &Value::Bool(false)),
            gender: text("gender"),
        });
        Ok(())
    }

    pub fn reload(&mut self, session: &Session) -> Result<()> {
        self.exists = None;
        self.info = None;
        self.load(session)
    }

    pub fn user_page(&self, session: &Session) -> Result<Page> {
        let prefix = session.namespaces().id_to_name(NS_USER)?;
        Page::new(format!("{prefix}:{}", self.name))
    }

    pub fn talk_page(&self, session: &Session) -> Result<Page> {
        let prefix = session.namespaces().id_to_name(NS_USER + 1)?;
        Page::new(format!("{prefix}:{}", self.name))
    }

    /// Send an email through the wiki. `cc_self` sends a copy to the caller.
    pub fn email(&self, session: &Session, subject: &str, text: &str, cc_self: bool) -> Result<Value> {
        if let Some(info) = &self.info
            && !info.emailable
        {
            return Err(WikiError::Permission(format!(
                "{} does not accept email",
                self.name
            )));
        }
        let token = session.assert_ability("email")?;
        let mut params = vec![
            ("action", "emailuser".to_string()),
            ("target", self.name.clone()),
            ("subject", subject.to_string()),
            ("text", text.to_string()),
            ("token", token),
        ];
        if cc_self {
            params.push(("ccme", "1".to_string()));
        }
        let response = self.mutate(session, &params)?;
        info!(user = %self.name, "email sent");
        Ok(response)
    }

    pub fn block(
        &mut self,
        session: &Session,
        expiry: &str,
        reason: &str,
        flags: BlockFlags,
    ) -> Result<Value> {
        if expiry.trim().is_empty() {
            return Err(WikiError::InvalidOption("a block needs an expiry".to_string()));
        }
        let token = session.assert_ability("block")?;
        let mut params = vec![
            ("action", "block".to_string()),
            ("user", self.name.clone()),
            ("expiry", expiry.to_string()),
            ("reason", reason.to_string()),
            ("token", token),
        ];
        for (enabled, key) in [
            (flags.anon_only, "anononly"),
            (flags.no_create, "nocreate"),
            (flags.autoblock, "autoblock"),
            (flags.no_email, "noemail"),
        ] {
            if enabled {
                params.push((key, "1".to_string()));
            }
        }
        let outcome = self.mutate(session, &params);
        self.info = None;
        let response = outcome?;
        info!(user = %self.name, expiry, "user blocked");
        Ok(response)
    }

    pub fn unblock(&mut self, session: &Session, reason: &str) -> Result<Value> {
        let token = session.assert_ability("unblock")?;
        let params = vec![
            ("action", "unblock".to_string()),
            ("user", self.name.clone()),
            ("reason", reason.to_string()),
            ("token", token),
        ];
        let outcome = self.mutate(session, &params);
        self.info = None;
        let response = outcome?;
        info!(user = %self.name, "user unblocked");
        Ok(response)
    }

    fn mutate(&self, session: &Session, params: &[(&str, String)]) -> Result<Value> {
        session
            .query(params, &QueryOptions::single())
            .map_err(|error| map_mutation_error(error, &self.name))
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        Some(Value::Object(map)) => map
            .values()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
