use std::collections::BTreeMap;

/// Context key carrying the authenticated user id.
pub const USER_ID: &str = "userId";

/// Identity values attached to a single inbound request.
///
/// Built at the request boundary (HTTP header, CLI flag) and passed down to
/// the dispatcher. Never shared between requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    values: BTreeMap<String, String>,
}

impl CallerContext {
    /// An empty context (anonymous caller).
    pub fn new() -> Self {
        Self::default()
    }

    /// A context carrying only the given user id.
    pub fn user(id: impl Into<String>) -> Self {
        Self::new().with(USER_ID, id)
    }

    /// Add or replace a value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
