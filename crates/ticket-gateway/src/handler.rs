//! # Request Handler
//!
//! Runs one submission through the pipeline:
//!
//! ```text
//! decode ─► decrypt ─► parse ─► verify ─► expiry ─► organization
//!                                                        │
//!                             ┌──────────────────────────┘
//!                             ▼   (per task, independently)
//!               validate ─► partition ─► rewrite URIs ─► route
//! ```
//!
//! Ticket-level failures end the request with an Answer carrying only the
//! top-level error. Per-task failures are collected and never stop sibling
//! tasks. The Answer is encrypted under the request's key whenever that key
//! was recovered; otherwise a plaintext error record is returned.

use crate::domain::acl::{AccessPolicy, OrgPolicy, Partition};
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::validation::validate_task;
use crate::router::TaskRouter;
use crate::ticket_crypto::{DecryptedEnvelope, ResponseKey, TicketCrypto};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use shared_types::{Answer, Envelope, ErrorRecord, Task, TaskError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Transport form of an envelope: the fields of a `/task/` submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeRequest {
    /// Selects the gateway decryption key
    #[serde(rename = "KeyFingerprint", default)]
    pub key_fingerprint: String,
    /// Base64 RSA-OAEP wrapped AES key
    #[serde(rename = "EncryptedKey", default)]
    pub encrypted_key: String,
    /// Base64 AES-CBC encrypted ticket
    #[serde(rename = "Encrypted", default)]
    pub encrypted: String,
    /// Base64 CBC IV
    #[serde(rename = "IV", default)]
    pub iv: String,
}

impl EnvelopeRequest {
    /// Encode an envelope for transport (client side).
    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self {
            key_fingerprint: envelope.key_fingerprint.clone(),
            encrypted_key: STANDARD.encode(&envelope.encrypted_key),
            encrypted: STANDARD.encode(&envelope.encrypted),
            iv: STANDARD.encode(&envelope.iv),
        }
    }

    /// Decode the base64 fields.
    ///
    /// # Errors
    ///
    /// `MalformedRequest` for a missing field or invalid base64.
    pub fn decode(&self) -> GatewayResult<Envelope> {
        if self.key_fingerprint.is_empty() {
            return Err(GatewayError::MalformedRequest(
                "KeyFingerprint missing".into(),
            ));
        }
        Ok(Envelope {
            key_fingerprint: self.key_fingerprint.clone(),
            encrypted_key: decode_field("EncryptedKey", &self.encrypted_key)?,
            encrypted: decode_field("Encrypted", &self.encrypted)?,
            iv: decode_field("IV", &self.iv)?,
        })
    }
}

fn decode_field(name: &str, value: &str) -> GatewayResult<Vec<u8>> {
    if value.is_empty() {
        return Err(GatewayError::MalformedRequest(format!("{name} missing")));
    }
    STANDARD
        .decode(value)
        .map_err(|e| GatewayError::MalformedRequest(format!("{name}: {e}")))
}

/// Body returned to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayResponse {
    /// Answer JSON encrypted under the request's key
    Encrypted(Vec<u8>),
    /// Plaintext JSON error record; no key was recovered
    Plain(Vec<u8>),
}

impl GatewayResponse {
    /// Response body bytes.
    pub fn body(&self) -> &[u8] {
        match self {
            GatewayResponse::Encrypted(body) | GatewayResponse::Plain(body) => body,
        }
    }

    /// HTTP content type of the body.
    pub fn content_type(&self) -> &'static str {
        match self {
            GatewayResponse::Encrypted(_) => "application/octet-stream",
            GatewayResponse::Plain(_) => "application/json",
        }
    }

    fn plain(error: &GatewayError) -> Self {
        GatewayResponse::Plain(record_json(&error.to_record()))
    }
}

fn record_json(record: &ErrorRecord) -> Vec<u8> {
    serde_json::to_vec(record).unwrap_or_else(|_| b"{}".to_vec())
}

/// Orchestrates the pipeline for each request.
pub struct RequestHandler {
    crypto: TicketCrypto,
    acl: AccessPolicy,
    router: Arc<TaskRouter>,
    sample_storage_uri: String,
}

impl RequestHandler {
    /// Create a handler.
    pub fn new(
        crypto: TicketCrypto,
        acl: AccessPolicy,
        router: Arc<TaskRouter>,
        sample_storage_uri: impl Into<String>,
    ) -> Self {
        Self {
            crypto,
            acl,
            router,
            sample_storage_uri: sample_storage_uri.into(),
        }
    }

    /// Handle one transport-level submission.
    pub async fn handle(&self, request: &EnvelopeRequest) -> GatewayResponse {
        match request.decode() {
            Ok(envelope) => self.handle_envelope(&envelope).await,
            Err(e) => {
                warn!(error = %e, "Rejecting malformed request");
                GatewayResponse::plain(&e)
            }
        }
    }

    /// Handle one decoded envelope.
    pub async fn handle_envelope(&self, envelope: &Envelope) -> GatewayResponse {
        let decrypted = match self.crypto.open_envelope(envelope).await {
            Ok(decrypted) => decrypted,
            Err(failure) => {
                warn!(
                    fingerprint = %envelope.key_fingerprint,
                    error = %failure.error,
                    "Envelope decryption failed"
                );
                return match failure.response_key {
                    Some(key) => respond(&key, &Answer::failed(failure.error.to_record())),
                    None => GatewayResponse::plain(&failure.error),
                };
            }
        };

        let DecryptedEnvelope {
            plaintext,
            response_key,
        } = decrypted;
        let answer = self.process(plaintext).await;
        respond(&response_key, &answer)
    }

    /// Everything after decryption; the result is always sent encrypted.
    async fn process(&self, plaintext: Vec<u8>) -> Answer {
        let ticket = match self.crypto.authenticate(plaintext).await {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(error = %e, "Ticket rejected");
                return Answer::failed(e.to_record());
            }
        };

        let policy = match self.acl.policy_for(&ticket.signer_key_id) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(signer = %ticket.signer_key_id, "Ticket from unknown organization");
                return Answer::failed(e.to_record());
            }
        };

        let mut task_errors = Vec::new();
        for task in &ticket.tasks {
            task_errors.extend(self.dispatch(task, policy).await);
        }

        info!(
            signer = %ticket.signer_key_id,
            tasks = ticket.tasks.len(),
            failed = task_errors.len(),
            "Ticket processed"
        );
        Answer::with_task_errors(task_errors)
    }

    /// Validate, authorize and route one task. Returns its errors, if any.
    ///
    /// Error records always carry the task as submitted: original URIs and
    /// only the analyses the error is about.
    async fn dispatch(&self, task: &Task, policy: &OrgPolicy) -> Vec<TaskError> {
        if let Err(e) = validate_task(task) {
            debug!(error = %e, "Task failed validation");
            return vec![TaskError::new(task.clone(), e.to_record())];
        }

        let Partition { accepted, rejected } = policy.partition(&task.tasks);
        let mut errors = Vec::new();

        if !accepted.is_empty() {
            let submitted = task.with_tasks(accepted);
            if let Err(e) = self.router.route(&self.rewrite_locations(&submitted)).await {
                warn!(filename = %task.filename, error = %e, "Task routing failed");
                errors.push(TaskError::new(submitted, e.to_record()));
            }
        }

        if !rejected.is_empty() {
            debug!(analyses = rejected.len(), "Analyses not allowed");
            errors.push(TaskError::new(
                task.with_tasks(rejected),
                GatewayError::NotAllowed.to_record(),
            ));
        }

        errors
    }

    /// Prefix the task's locations with the sample storage base.
    pub fn rewrite_locations(&self, task: &Task) -> Task {
        let mut rewritten = task.clone();
        rewritten.primary_uri = format!("{}{}", self.sample_storage_uri, task.primary_uri);
        if task.has_secondary_uri() {
            rewritten.secondary_uri = format!("{}{}", self.sample_storage_uri, task.secondary_uri);
        }
        rewritten
    }
}

fn respond(key: &ResponseKey, answer: &Answer) -> GatewayResponse {
    let sealed = serde_json::to_vec(answer)
        .map_err(|e| GatewayError::Encryption(format!("cannot serialize answer: {e}")))
        .and_then(|json| key.seal(&json));

    match sealed {
        Ok(body) => GatewayResponse::Encrypted(body),
        Err(e) => {
            warn!(error = %e, "Answer encryption failed");
            GatewayResponse::plain(&e)
        }
    }
}
