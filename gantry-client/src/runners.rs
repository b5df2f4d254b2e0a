//! Runner registration endpoint

use crate::CoordinatorClient;
use crate::error::Result;
use gantry_core::domain::runner::RunnerIdentity;
use gantry_core::dto::runner::{RegisterResponse, RegisterRunner};
use tracing::debug;

impl CoordinatorClient {
    // =============================================================================
    // Runner Registration
    // =============================================================================

    /// Register a runner with the coordination server
    ///
    /// Sends the registration token together with the runner name and tags as
    /// a form-encoded body. Any status up to 202 is a success.
    ///
    /// # Arguments
    /// * `token` - The registration token obtained from the server admin
    /// * `identity` - Identity whose name and tags describe this runner
    ///
    /// # Returns
    /// The runner token to use for all subsequent job requests
    pub async fn register_runner(&self, token: &str, identity: &RunnerIdentity) -> Result<String> {
        let url = format!("{}/runners", self.base_url);
        debug!(name = %identity.name, "Registering runner");

        let response = self
            .client
            .post(&url)
            .form(&RegisterRunner::new(token, identity))
            .send()
            .await?;

        let response = Self::ensure_status(response, 202).await?;
        let registered: RegisterResponse = Self::parse_json(response).await?;

        Ok(registered.token)
    }
}
