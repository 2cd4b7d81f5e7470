//! Per-request context.
//!
//! The gateway stamps every inbound call with a request id and the verified
//! caller subject. Services receive this as an explicit argument rather than
//! reading it from ambient task-local state, so the call chain stays portable
//! and testable.

use uuid::Uuid;

/// Context for one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for log lines across services.
    pub request_id: String,
    /// The verified `sub` claim of the caller, if the route is authenticated.
    pub caller_sub: Option<String>,
}

impl RequestContext {
    /// Context for an authenticated call.
    #[must_use]
    pub fn authenticated(request_id: impl Into<String>, caller_sub: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            caller_sub: Some(caller_sub.into()),
        }
    }

    /// Context with a freshly generated request id, for internal or test calls.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            caller_sub: None,
        }
    }
}
