//! Toolbox backend client.
//!
//! The toolbox is the external service that actually answers tool calls
//! (balances, transactions, exchange data). Each tool name maps to a fixed
//! route; arguments travel as URL query parameters and the response body is
//! returned untouched.
//!
//! # Example
//!
//! ```no_run
//! use toolbox::{Client, ClientConfig};
//!
//! # async fn example() -> toolbox::Result<()> {
//! let client = Client::new(ClientConfig::new("http://localhost:8082"))?;
//!
//! let body = client
//!     .call(
//!         "get_exchange_rates",
//!         &[("symbol".to_string(), "BTC/USDT".to_string())],
//!         toolbox::DEFAULT_TIMEOUT,
//!     )
//!     .await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{Client, ClientConfig, DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, default_routes};
pub use error::{Error, Result};
