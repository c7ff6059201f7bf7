//! Caller identity context and context-injection policy.
//!
//! Core principle: **a tool only receives the identity values it was
//! explicitly granted.**
//!
//! The model never supplies identity. Values such as the authenticated user
//! id travel with each request in a [`CallerContext`], and a
//! [`ContextPolicy`] decides which of those keys a given tool may receive.
//! Any key a tool is granted is reserved: a same-named argument from the
//! model is discarded and replaced by the context value.
//!
//! # Example
//!
//! ```
//! use policy::{CallerContext, ContextPolicy};
//!
//! let policy = ContextPolicy::parse(r#"
//! [grants]
//! get_balances = ["userId"]
//! "#)?;
//!
//! let ctx = CallerContext::user("42");
//! let injected = policy.inject("get_balances", &ctx);
//! assert_eq!(injected, vec![("userId".to_string(), "42".to_string())]);
//!
//! // Tools without a grant receive nothing.
//! assert!(policy.inject("get_exchange_rates", &ctx).is_empty());
//! # Ok::<(), policy::Error>(())
//! ```

mod context;
mod error;
mod policy;

pub use context::{CallerContext, USER_ID};
pub use error::{Error, Result};
pub use policy::ContextPolicy;
