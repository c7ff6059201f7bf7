//! Context grants and injection.

use crate::{CallerContext, Error, Result, USER_ID};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Which caller-context keys each tool is allowed to receive.
///
/// Loaded from TOML:
///
/// ```toml
/// [grants]
/// get_balances = ["userId"]
/// get_transactions = ["userId"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Tool name to granted context keys.
    #[serde(default)]
    pub grants: BTreeMap<String, BTreeSet<String>>,
}

impl ContextPolicy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let policy: Self = toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// A policy that grants nothing to anyone.
    pub fn restrictive() -> Self {
        Self::default()
    }

    /// Grants for the built-in toolbox catalog: account-scoped tools receive
    /// the user id, market data tools receive nothing.
    pub fn toolbox_defaults() -> Self {
        Self::restrictive()
            .grant("get_balances", USER_ID)
            .grant("get_transactions", USER_ID)
    }

    /// Grant a context key to a tool.
    pub fn grant(mut self, tool: impl Into<String>, key: impl Into<String>) -> Self {
        self.grants.entry(tool.into()).or_default().insert(key.into());
        self
    }

    /// Reject empty tool names and empty keys.
    pub fn validate(&self) -> Result<()> {
        for (tool, keys) in &self.grants {
            if tool.trim().is_empty() {
                return Err(Error::Invalid("grant with empty tool name".into()));
            }
            if keys.iter().any(|k| k.trim().is_empty()) {
                return Err(Error::Invalid(format!("empty context key granted to {tool}")));
            }
        }
        Ok(())
    }

    /// Keys the model may never supply for this tool.
    pub fn reserved_keys(&self, tool: &str) -> Vec<&str> {
        self.grants
            .get(tool)
            .map(|keys| keys.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Context values this tool receives. Granted keys absent from the
    /// context are skipped.
    pub fn inject(&self, tool: &str, ctx: &CallerContext) -> Vec<(String, String)> {
        let Some(keys) = self.grants.get(tool) else {
            return Vec::new();
        };

        keys.iter()
            .filter_map(|key| ctx.get(key).map(|value| (key.clone(), value.to_string())))
            .collect()
    }

    /// Merge another policy's grants into this one.
    pub fn merge(mut self, other: ContextPolicy) -> Self {
        for (tool, keys) in other.grants {
            self.grants.entry(tool).or_default().extend(keys);
        }
        self
    }
}
