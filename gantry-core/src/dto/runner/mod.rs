//! Runner DTOs
//!
//! Data transfer objects for runner registration.

use serde::{Deserialize, Serialize};

use crate::domain::runner::RunnerIdentity;

/// Form body of `POST /runners`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRunner {
    /// Registration token, not the runner token
    pub token: String,

    pub description: String,

    /// Comma separated tags
    pub tag_list: String,
}

impl RegisterRunner {
    pub fn new(token: impl Into<String>, identity: &RunnerIdentity) -> Self {
        Self {
            token: token.into(),
            description: identity.name.clone(),
            tag_list: identity.tag_list(),
        }
    }
}

/// Response of a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub id: i64,
    pub token: String,
}
