//! Caller identity and assignment context.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Identity attached to every outbound request.
///
/// Both channels are optional client-side. The bearer token authenticates the
/// caller; the actor id is sent separately for audit attribution because
/// intermediaries may strip the `Authorization` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub bearer_token: Option<String>,
    pub actor_id: Option<String>,
}

impl Identity {
    pub fn new(bearer_token: Option<String>, actor_id: Option<String>) -> Self {
        Self {
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
            actor_id: actor_id.filter(|a| !a.trim().is_empty()),
        }
    }

    /// Identity with neither header, e.g. for local development servers.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

/// The (company, assignment, identity) tuple a session is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct AssignmentContext {
    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub company_id: String,

    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub assignment_id: String,

    pub identity: Identity,
}

impl AssignmentContext {
    pub fn new(
        company_id: impl Into<String>,
        assignment_id: impl Into<String>,
        identity: Identity,
    ) -> Self {
        Self {
            company_id: company_id.into(),
            assignment_id: assignment_id.into(),
            identity,
        }
    }
}
