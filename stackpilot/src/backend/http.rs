//! `reqwest`-backed HTTP reachability prober.

use async_trait::async_trait;
use std::time::Duration;

use super::HttpProber;
use crate::errors::BackendError;

/// An [`HttpProber`] backed by a shared `reqwest` client.
///
/// Redirects are followed; only the final status code is reported.
#[derive(Debug, Clone)]
pub struct ReqwestProber {
    client: reqwest::Client,
}

impl ReqwestProber {
    /// Creates a prober with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Transport`] if the client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::transport(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for ReqwestProber {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get_status(&self, url: &str) -> Result<u16, BackendError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| BackendError::transport(err.to_string()))?;
        Ok(response.status().as_u16())
    }
}
