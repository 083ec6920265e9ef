use serde_json::Value;

use crate::error::WikiError;

/// Classification of one decoded API response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiOutcome {
    Ok(Value),
    Retryable(RetryReason),
    Fatal { code: String, info: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryReason {
    MaxLag { info: String },
}

impl ApiOutcome {
    pub fn into_result(self) -> Result<Value, WikiError> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::Retryable(RetryReason::MaxLag { info }) => Err(WikiError::api("maxlag", info)),
            Self::Fatal { code, info } => Err(WikiError::Api { code, info }),
        }
    }
}

pub fn classify(payload: Value) -> ApiOutcome {
    let Some(error) = payload.get("error") else {
        return ApiOutcome::Ok(payload);
    };
    let code = error
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error")
        .to_string();
    let info = error
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or("unknown info")
        .to_string();
    if code == "maxlag" {
        ApiOutcome::Retryable(RetryReason::MaxLag { info })
    } else {
        ApiOutcome::Fatal { code, info }
    }
}

/// Flatten the `warnings` side channel into `(module, message)` pairs.
///
/// Handles both the `formatversion=2` shape (`{"module": {"warnings": "…"}}`)
/// and the legacy shape (`{"module": {"*": "…"}}`). Multi-line messages are
/// split into one entry per line.
pub fn warnings(payload: &Value) -> Vec<(String, String)> {
    let Some(modules) = payload.get("warnings").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (module, body) in modules {
        let text = body
            .get("warnings")
            .or_else(|| body.get("*"))
            .and_then(Value::as_str)
            .or_else(|| body.as_str());
        let Some(text) = text else {
            continue;
        };
        for line in text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                out.push((module.clone(), line.to_string()));
            }
        }
    }
    out
}

/// Entries under `query.pages`, in response order. Accepts both the
/// `formatversion=2` array and the legacy id-keyed object.
pub fn query_pages(response: &Value) -> Vec<&Value> {
    match response.get("query").and_then(|query| query.get("pages")) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

pub fn first_page(response: &Value) -> Option<&Value> {
    query_pages(response).into_iter().next()
}
