//! Request Context: state shared by every stage of one request
use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;

/// Fallback identity when the caller supplies none
pub const ANONYMOUS_USER: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: String,
    pub trace_id: String,
    /// Reference date for relative expressions ("last week")
    pub today: NaiveDate,
    /// Categories known to the store, used by the commit gate
    pub known_categories: Option<Vec<String>>,
    pub metadata: HashMap<String, Value>,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
            today: Local::now().date_naive(),
            known_categories: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_known_categories(mut self, categories: Vec<String>) -> Self {
        self.known_categories = Some(categories);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }
}

/// Coerce any JSON user id into a non-empty string
pub fn normalize_user_id(raw: &Value) -> String {
    let text = match raw {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        ANONYMOUS_USER.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_user_id() {
        assert_eq!(normalize_user_id(&json!("  u42 ")), "u42");
        assert_eq!(normalize_user_id(&json!(7)), "7");
        assert_eq!(normalize_user_id(&json!("")), ANONYMOUS_USER);
        assert_eq!(normalize_user_id(&Value::Null), ANONYMOUS_USER);
    }

    #[test]
    fn test_context_builder() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 9).unwrap();
        let ctx = RequestContext::new("u1")
            .with_today(today)
            .with_known_categories(vec!["Food".into()]);
        assert_eq!(ctx.today, today);
        assert_eq!(ctx.known_categories.as_deref(), Some(&["Food".to_string()][..]));
        assert!(!ctx.trace_id.is_empty());
    }
}
