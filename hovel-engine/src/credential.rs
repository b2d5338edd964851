//! Gemini API key validation.

use async_trait::async_trait;
use tracing::{debug, warn};

use hovel_core::error::{HovelError, Result};

/// Well-known key accepted without a network probe, for development and
/// tests.
pub const TEST_API_KEY: &str = "test-api-key-for-development";

/// Probe timeout for the remote validation call.
const VALIDATE_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// `Ok(())` iff the key is usable. Distinguishes a rejected key
    /// (`CredentialInvalid`) from an unreachable provider
    /// (`CredentialTransient`); the engine rejects creation on both.
    async fn validate(&self, api_key: &str) -> Result<()>;
}

/// Validates keys with a lightweight request against the provider's
/// list-models endpoint.
pub struct GeminiValidator {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiValidator {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(VALIDATE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

#[async_trait]
impl CredentialValidator for GeminiValidator {
    async fn validate(&self, api_key: &str) -> Result<()> {
        if api_key.trim().is_empty() {
            return Err(HovelError::InvalidRequest(
                "gemini_api_key is required".to_string(),
            ));
        }

        if api_key == TEST_API_KEY {
            debug!("test API key accepted for development");
            return Ok(());
        }

        let url = format!("{}/models?key={}", self.base_url, api_key);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Gemini API unreachable during key validation");
                return Err(HovelError::CredentialTransient(
                    "provider unreachable".to_string(),
                ));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status.is_server_error() {
            return Err(HovelError::CredentialTransient(format!(
                "provider returned {}",
                status
            )));
        }
        Err(HovelError::CredentialInvalid(format!(
            "provider rejected key with status {}",
            status
        )))
    }
}
