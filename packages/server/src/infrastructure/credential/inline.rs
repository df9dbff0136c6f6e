//! Session ids that carry the bundle themselves.
//!
//! `CLOUD-AI~<base64 of creds.json>`

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::domain::{CredentialError, CredentialFetcher, SessionId};

#[derive(Debug, Default, Clone, Copy)]
pub struct InlineCredentialFetcher;

#[async_trait]
impl CredentialFetcher for InlineCredentialFetcher {
    async fn fetch(&self, session_id: &SessionId) -> Result<Vec<u8>, CredentialError> {
        let bundle = STANDARD
            .decode(session_id.payload())
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        // The library expects a JSON document
        serde_json::from_slice::<serde_json::Value>(&bundle)
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        Ok(bundle)
    }
}
