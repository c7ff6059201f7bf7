//! Static tool catalog.

use std::collections::HashMap;

use super::schema::{ArgumentSchema, FieldSpec};
use crate::{Error, Result};

const PAIR_PATTERN: &str = "[A-Z0-9]{2,10}/[A-Z0-9]{2,10}";
const ASSET_PATTERN: &str = "[A-Z0-9]{2,10}";

/// A tool definition exposed to the model.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
}

impl ToolSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ArgumentSchema,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
        }
    }
}

/// Read-only catalog of available tools.
///
/// Built once at startup and shared between requests; there is no way to
/// change it afterwards.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    specs: Vec<ToolSpec>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry, rejecting empty or duplicate names.
    pub fn new(specs: Vec<ToolSpec>) -> Result<Self> {
        let mut index = HashMap::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(Error::Config("tool with empty name".into()));
            }
            if index.insert(spec.name.clone(), position).is_some() {
                return Err(Error::Config(format!("duplicate tool: {}", spec.name)));
            }
        }
        Ok(Self { specs, index })
    }

    /// The toolbox catalog: account balances and history, plus market data.
    pub fn toolbox() -> Result<Self> {
        let pair = |description: &str| -> Result<FieldSpec> {
            FieldSpec::string("symbol", description)
                .required()
                .with_pattern(PAIR_PATTERN)
                .map_err(|e| Error::Config(e.to_string()))
        };

        let asset = FieldSpec::string("asset", "The asset to withdraw, e.g., BTC, USDT")
            .required()
            .with_pattern(ASSET_PATTERN)
            .map_err(|e| Error::Config(e.to_string()))?;

        Self::new(vec![
            ToolSpec::new(
                "get_balances",
                "Retrieve user balances",
                ArgumentSchema::new(),
            ),
            ToolSpec::new(
                "get_transactions",
                "Retrieve user transactions",
                ArgumentSchema::new(),
            ),
            ToolSpec::new(
                "get_exchange_rates",
                "Retrieve exchange rates for a given symbol",
                ArgumentSchema::new().field(pair(
                    "The trading symbol, e.g., BTC/USDT, ETH/USD, SOL/GEL",
                )?),
            ),
            ToolSpec::new(
                "get_exchange_fees",
                "Retrieve trading fees for a given symbol",
                ArgumentSchema::new().field(pair("The trading symbol, e.g., BTC/USDT")?),
            ),
            ToolSpec::new(
                "get_exchange_pairs",
                "List the available trading pairs",
                ArgumentSchema::new(),
            ),
            ToolSpec::new(
                "get_withdrawal_fees",
                "Retrieve withdrawal fees for an asset, optionally on a specific network",
                ArgumentSchema::new()
                    .field(asset)
                    .field(FieldSpec::string("network", "The network, e.g., ERC20, TRC20")),
            ),
        ])
    }

    /// Find a tool by name.
    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    /// All tools, in registration order.
    pub fn list(&self) -> &[ToolSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
