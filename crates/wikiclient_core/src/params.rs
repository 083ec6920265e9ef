use serde_json::Value;

/// Ordered request parameters. Insertion order is kept so wire requests are
/// deterministic; keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(&str, String)]) -> Self {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.set(*key, value.clone());
        }
        params
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(existing, _)| *existing == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key, value)),
        }
    }

    /// Set `key` only when the caller has not supplied it already.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if !self.contains(&key) {
            self.pairs.push((key, value.into()));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(existing, _)| existing == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.pairs.iter().position(|(existing, _)| existing == key)?;
        Some(self.pairs.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Render a JSON scalar the way it must be echoed back as a parameter.
pub fn value_to_param(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
