//! JSON-over-HTTP envelope store.
//!
//! Behind the `remote-http` feature flag.  Talks to a blob server with
//! four routes:
//!
//! ```text
//! GET    /entries        -> {"entries": {"<id>": {"kind": "...", "version": n}}}
//! GET    /entries/<id>   -> {"blob": "<base64 envelope>"}
//! PUT    /entries/<id>   <- {"blob": "<base64 envelope>", "expected_version": n}
//! DELETE /entries/<id>
//! ```
//!
//! Every request carries `X-Vault-Auth: <token>`, a hash of an HKDF
//! sub-key.  The server compares it and stores bytes; it cannot decrypt.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use ureq::Agent;

use super::{RemoteStore, StoreError};
use crate::crypto::Envelope;
use crate::vault::EntryMeta;

/// Per-request timeout.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Header carrying the store auth token.
const AUTH_HEADER: &str = "X-Vault-Auth";

#[derive(Deserialize)]
struct ListResponse {
    entries: BTreeMap<String, EntryMeta>,
}

#[derive(Serialize, Deserialize)]
struct BlobResponse {
    blob: String,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    blob: &'a str,
    expected_version: u64,
}

#[derive(Deserialize)]
struct ConflictResponse {
    #[serde(default)]
    current_version: Option<u64>,
}

/// HTTP client for a remote blob server.
pub struct HttpStore {
    base_url: String,
    auth_token: String,
    agent: Agent,
}

impl HttpStore {
    pub fn new(base_url: &str, auth_token: String) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
            .http_status_as_error(false)
            .build()
            .into();
        Self::with_agent(base_url, auth_token, agent)
    }

    /// Use a caller-configured agent.  It must have
    /// `http_status_as_error(false)` so 404 and 409 reach the mapping.
    pub fn with_agent(base_url: &str, auth_token: String, agent: Agent) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            agent,
        }
    }

    fn entry_url(&self, id: &str) -> String {
        format!("{}/entries/{id}", self.base_url)
    }
}

impl RemoteStore for HttpStore {
    fn put(&self, id: &str, envelope: &Envelope, expected_version: u64) -> Result<(), StoreError> {
        let blob = BASE64.encode(envelope.to_bytes());
        let mut resp = self
            .agent
            .put(&self.entry_url(id))
            .header(AUTH_HEADER, &self.auth_token)
            .send_json(&PutRequest {
                blob: &blob,
                expected_version,
            })
            .map_err(transient)?;

        match resp.status().as_u16() {
            200..=299 => Ok(()),
            409 => {
                let current = resp
                    .body_mut()
                    .read_json::<ConflictResponse>()
                    .ok()
                    .and_then(|c| c.current_version);
                Err(StoreError::Conflict { current })
            }
            404 => Err(StoreError::NotFound),
            code => Err(status_error(code)),
        }
    }

    fn get(&self, id: &str) -> Result<Envelope, StoreError> {
        let mut resp = self
            .agent
            .get(&self.entry_url(id))
            .header(AUTH_HEADER, &self.auth_token)
            .call()
            .map_err(transient)?;

        match resp.status().as_u16() {
            200 => {
                let body: BlobResponse = resp.body_mut().read_json().map_err(transient)?;
                let bytes = BASE64
                    .decode(body.blob.as_bytes())
                    .map_err(|e| StoreError::Corrupt(format!("{id}: {e}")))?;
                Envelope::from_bytes(&bytes).map_err(|e| StoreError::Corrupt(format!("{id}: {e}")))
            }
            404 => Err(StoreError::NotFound),
            code => Err(status_error(code)),
        }
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let resp = self
            .agent
            .delete(&self.entry_url(id))
            .header(AUTH_HEADER, &self.auth_token)
            .call()
            .map_err(transient)?;

        match resp.status().as_u16() {
            200..=299 => Ok(()),
            404 => Err(StoreError::NotFound),
            code => Err(status_error(code)),
        }
    }

    fn list_meta(&self) -> Result<BTreeMap<String, EntryMeta>, StoreError> {
        let mut resp = self
            .agent
            .get(&format!("{}/entries", self.base_url))
            .header(AUTH_HEADER, &self.auth_token)
            .call()
            .map_err(transient)?;

        match resp.status().as_u16() {
            200 => {
                let body: ListResponse = resp.body_mut().read_json().map_err(transient)?;
                Ok(body.entries)
            }
            code => Err(status_error(code)),
        }
    }
}

fn transient(e: ureq::Error) -> StoreError {
    StoreError::Transient(e.to_string())
}

/// Any status other than success, 404 or 409.
fn status_error(code: u16) -> StoreError {
    match code {
        408 | 429 | 500..=599 => StoreError::Transient(format!("store returned HTTP {code}")),
        401 | 403 => StoreError::Failed(format!("store rejected credentials (HTTP {code})")),
        _ => StoreError::Failed(format!("store returned HTTP {code}")),
    }
}
