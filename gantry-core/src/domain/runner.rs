//! Runner domain model
//!
//! The identity this agent presents to the coordination server.

use std::time::Duration;

/// Identity of a runner
///
/// Built once from configuration at startup and never mutated afterwards.
/// The token is replaced only by the one-shot registration command, which
/// persists it outside the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerIdentity {
    /// Human readable name, also used as the registration description
    pub name: String,

    /// Base URL of the coordination API (e.g., "https://gitlab.com/api/v4")
    pub url: String,

    /// Runner token issued by registration
    pub token: String,

    /// Executor registry key (e.g., "shell")
    pub executor: String,

    pub tags: Vec<String>,

    pub poll_interval: Duration,
}

impl RunnerIdentity {
    /// Whether the runner still needs to be registered
    pub fn is_registered(&self) -> bool {
        !self.token.is_empty()
    }

    /// Tags joined the way the registration form expects them
    pub fn tag_list(&self) -> String {
        self.tags.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> RunnerIdentity {
        RunnerIdentity {
            name: "my".to_string(),
            url: "https://gitlab.com/api/v4".to_string(),
            token: String::new(),
            executor: "shell".to_string(),
            tags: vec!["docker".to_string(), "linux".to_string()],
            poll_interval: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_tag_list() {
        assert_eq!(identity().tag_list(), "docker, linux");
    }

    #[test]
    fn test_is_registered() {
        let mut identity = identity();
        assert!(!identity.is_registered());

        identity.token = "runner-token".to_string();
        assert!(identity.is_registered());
    }
}
