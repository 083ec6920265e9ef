use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{Result, WikiError};

pub const NS_MEDIA: i32 = -2;
pub const NS_SPECIAL: i32 = -1;
pub const NS_MAIN: i32 = 0;
pub const NS_USER: i32 = 2;
pub const NS_FILE: i32 = 6;
pub const NS_CATEGORY: i32 = 14;

/// Namespace id → display names. The first name is the local name, the rest
/// are the canonical name (when it differs) and aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTable {
    names: BTreeMap<i32, Vec<String>>,
}

impl NamespaceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: i32, name: impl Into<String>) {
        let name = name.into();
        let entry = self.names.entry(id).or_default();
        if !entry.contains(&name) {
            entry.push(name);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.names.keys().copied()
    }

    /// Case-insensitive lookup over every name and alias.
    pub fn name_to_id(&self, name: &str) -> Result<i32> {
        let wanted = normalize(name);
        self.names
            .iter()
            .find(|(_, names)| names.iter().any(|candidate| normalize(candidate) == wanted))
            .map(|(id, _)| *id)
            .ok_or_else(|| WikiError::NotFound(format!("no namespace named {name}")))
    }

    pub fn id_to_name(&self, id: i32) -> Result<&str> {
        self.names_for(id)?
            .first()
            .map(String::as_str)
            .ok_or_else(|| WikiError::NotFound(format!("no namespace with id {id}")))
    }

    pub fn names_for(&self, id: i32) -> Result<&[String]> {
        self.names
            .get(&id)
            .map(Vec::as_slice)
            .ok_or_else(|| WikiError::NotFound(format!("no namespace with id {id}")))
    }

    /// Build the table from a `siteinfo` response carrying
    /// `siprop=namespaces|namespacealiases`.
    pub fn from_siteinfo(query: &Value) -> Result<Self> {
        let namespaces = query
            .get("namespaces")
            .and_then(Value::as_object)
            .ok_or_else(|| WikiError::Decode("siteinfo response has no namespaces".to_string()))?;

        let mut table = Self::new();
        for item in namespaces.values() {
            let Some(id) = item.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let id = i32::try_from(id)
                .map_err(|_| WikiError::Decode(format!("namespace id out of range: {id}")))?;
            let name = item
                .get("name")
                .or_else(|| item.get("*"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            table.insert(id, name);
            if let Some(canonical) = item.get("canonical").and_then(Value::as_str) {
                table.insert(id, canonical);
            }
        }

        if let Some(aliases) = query.get("namespacealiases").and_then(Value::as_array) {
            for item in aliases {
                let id = item.get("id").and_then(Value::as_i64).and_then(|id| i32::try_from(id).ok());
                let alias = item
                    .get("alias")
                    .or_else(|| item.get("*"))
                    .and_then(Value::as_str);
                if let (Some(id), Some(alias)) = (id, alias) {
                    table.insert(id, alias);
                }
            }
        }
        Ok(table)
    }
}

/// Split `Prefix:Rest` when `Prefix` names a known namespace.
pub fn split_title<'a>(table: &NamespaceTable, title: &'a str) -> (i32, &'a str) {
    if let Some((prefix, rest)) = title.split_once(':')
        && let Ok(id) = table.name_to_id(prefix)
    {
        return (id, rest.trim_start());
    }
    (NS_MAIN, title)
}

fn normalize(name: &str) -> String {
    name.trim().replace('_', " ").to_lowercase()
}
