use serde_json::{Map, Value};

use crate::params::{Params, value_to_param};

pub const DEFAULT_CONTINUATION_BUDGET: usize = 5;

/// How far a query may follow `continue` markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Continuation {
    /// Exactly one request; a `continue` marker is returned untouched.
    #[default]
    Off,
    /// At most this many requests, counting the first.
    Bounded(usize),
    /// Follow markers until the server stops sending them.
    Exhaustive,
}

impl Continuation {
    pub fn bounded() -> Self {
        Self::Bounded(DEFAULT_CONTINUATION_BUDGET)
    }

    fn max_requests(self) -> Option<usize> {
        match self {
            Self::Off => Some(1),
            Self::Bounded(limit) => Some(limit.max(1)),
            Self::Exhaustive => None,
        }
    }
}

/// Produces the sequence of request parameter sets for one logical query.
///
/// The engine never talks to the network itself: the session asks it for the
/// next request, performs it, and feeds the response back through `absorb`.
#[derive(Debug, Clone)]
pub struct ContinuationEngine {
    base: Params,
    budget: Continuation,
    issued: usize,
    marker: Option<Map<String, Value>>,
    finished: bool,
}

impl ContinuationEngine {
    pub fn new(mut base: Params, budget: Continuation) -> Self {
        if base.get("action") == Some("query") {
            base.set_default("continue", "");
        }
        Self {
            base,
            budget,
            issued: 0,
            marker: None,
            finished: false,
        }
    }

    pub fn next_request(&mut self) -> Option<Params> {
        if self.finished || self.budget_spent() {
            return None;
        }
        let mut params = self.base.clone();
        if let Some(marker) = &self.marker {
            for (key, value) in marker {
                params.set(key.clone(), value_to_param(value));
            }
        }
        self.issued += 1;
        Some(params)
    }

    pub fn absorb(&mut self, response: &Value) {
        self.marker = response.get("continue").and_then(Value::as_object).cloned();
        if self.marker.is_none() {
            self.finished = true;
        }
    }

    /// Stop issuing requests, e.g. after a failure.
    pub fn abort(&mut self) {
        self.finished = true;
    }

    /// Start over from the first page with a fresh budget.
    pub fn restart(&mut self) {
        self.issued = 0;
        self.marker = None;
        self.finished = false;
    }

    pub fn issued(&self) -> usize {
        self.issued
    }

    pub fn is_exhausted(&self) -> bool {
        self.finished
    }

    /// Marker left over when the budget ran out before the result set did.
    pub fn pending_marker(&self) -> Option<&Map<String, Value>> {
        if self.finished {
            None
        } else {
            self.marker.as_ref()
        }
    }

    fn budget_spent(&self) -> bool {
        self.budget
            .max_requests()
            .is_some_and(|limit| self.issued >= limit)
    }
}

/// Accumulates partial responses into one result.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    merged: Option<Value>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut response: Value) {
        if let Some(object) = response.as_object_mut() {
            object.remove("continue");
        }
        match &mut self.merged {
            Some(merged) => merge_value(merged, response, None),
            None => self.merged = Some(response),
        }
    }

    pub fn finish(self, pending: Option<&Map<String, Value>>) -> Value {
        let mut merged = self.merged.unwrap_or_else(|| Value::Object(Map::new()));
        if let (Some(marker), Some(object)) = (pending, merged.as_object_mut()) {
            object.insert("continue".to_string(), Value::Object(marker.clone()));
        }
        merged
    }
}

/// Keyed union of two response fragments.
///
/// Objects merge key by key, arrays under `pages` unify entries that describe
/// the same page, other arrays append in arrival order, and scalars take the
/// newer value.
pub fn merge_value(target: &mut Value, incoming: Value, key: Option<&str>) {
    match (target, incoming) {
        (Value::Object(existing), Value::Object(update)) => {
            for (child_key, child_value) in update {
                match existing.get_mut(&child_key) {
                    Some(slot) => merge_value(slot, child_value, Some(&child_key)),
                    None => {
                        existing.insert(child_key, child_value);
                    }
                }
            }
        }
        (Value::Array(existing), Value::Array(update)) if key == Some("pages") => {
            merge_pages(existing, update);
        }
        (Value::Array(existing), Value::Array(update)) => existing.extend(update),
        (slot, update) => *slot = update,
    }
}

fn merge_pages(existing: &mut Vec<Value>, update: Vec<Value>) {
    for page in update {
        let identity = page_identity(&page);
        let position = identity.as_ref().and_then(|identity| {
            existing
                .iter()
                .position(|candidate| page_identity(candidate).as_ref() == Some(identity))
        });
        match position {
            Some(index) => merge_value(&mut existing[index], page, None),
            None => existing.push(page),
        }
    }
}

fn page_identity(page: &Value) -> Option<String> {
    if let Some(id) = page.get("pageid").and_then(Value::as_i64) {
        return Some(format!("id:{id}"));
    }
    page.get("title")
        .and_then(Value::as_str)
        .map(|title| format!("title:{title}"))
}
