//! Inbound and outbound message shapes of the gateway endpoint.

use serde::{Deserialize, Serialize};

use crate::model::ModelError;
use crate::orchestrator::Completion;
use crate::{Error, Result};

pub const UNAVAILABLE: &str = "the assistant is temporarily unavailable";
pub const TIMED_OUT: &str = "the assistant timed out";
pub const CANCELLED: &str = "request cancelled";

/// A caller's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    pub request_text: String,
}

impl GatewayRequest {
    pub fn new(request_text: impl Into<String>) -> Self {
        Self {
            request_text: request_text.into(),
        }
    }

    /// Reject blank requests before they reach the planner.
    pub fn validate(&self) -> Result<&str> {
        if self.request_text.trim().is_empty() {
            return Err(Error::EmptyRequest);
        }
        Ok(&self.request_text)
    }
}

/// The answer returned to the caller. Exactly one field is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GatewayResponse {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            response_text: Some(text.into()),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            response_text: None,
            error: Some(message.into()),
        }
    }

    /// Translate the outcome of a run into what the caller sees.
    ///
    /// Provider details never leak: they are logged, not returned.
    pub fn from_result(result: &Result<Completion>) -> Self {
        match result {
            Ok(completion) => Self::success(&completion.text),
            Err(err) => Self::failure(error_message(err)),
        }
    }
}

fn error_message(err: &Error) -> String {
    match err {
        Error::EmptyRequest => err.to_string(),
        Error::Cancelled => CANCELLED.to_string(),
        Error::Model(ModelError::Timeout) => TIMED_OUT.to_string(),
        Error::Model(_) => UNAVAILABLE.to_string(),
        Error::RoundLimitExceeded {
            max_rounds,
            partial: Some(partial),
        } => format!(
            "could not finish the request within {max_rounds} tool rounds; \
             partial answer: {partial}"
        ),
        Error::RoundLimitExceeded { max_rounds, .. } => {
            format!("could not finish the request within {max_rounds} tool rounds")
        }
        Error::Config(_) | Error::InvalidState(_) => "internal error".to_string(),
    }
}
