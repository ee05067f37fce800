//! # Core Domain Entities
//!
//! Tickets, tasks and the answer returned to the submitting client.
//!
//! ## Clusters
//!
//! - **Work**: `Task`, `TaskMap`
//! - **Submission**: `Ticket`
//! - **Outcome**: `TaskError`, `Answer`

use crate::errors::ErrorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from analysis name (e.g. `"YARA"`, `"PEID"`) to its argument list.
///
/// Ordered so that serialization is canonical.
pub type TaskMap = BTreeMap<String, Vec<String>>;

/// One unit of requested work: a resource to fetch plus the analyses to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Task {
    /// Location of the sample, relative to the sample storage.
    #[serde(rename = "primaryURI", default)]
    pub primary_uri: String,
    /// Optional second location. Empty means absent.
    #[serde(rename = "secondaryURI", default)]
    pub secondary_uri: String,
    /// Original filename of the sample.
    #[serde(default)]
    pub filename: String,
    /// Requested analyses.
    #[serde(default, deserialize_with = "null_as_empty::task_map")]
    pub tasks: TaskMap,
    /// Free-form tags, order preserved.
    #[serde(default, deserialize_with = "null_as_empty::deserialize")]
    pub tags: Vec<String>,
    /// Number of delivery attempts so far. Signed so that negative values can
    /// be parsed and rejected by validation.
    #[serde(default)]
    pub attempts: i64,
    /// Originating organization or feed.
    #[serde(default)]
    pub source: String,
    /// Whether the worker should download the sample itself.
    #[serde(default)]
    pub download: bool,
    /// Free-text comment.
    #[serde(default)]
    pub comment: String,
}

impl Task {
    /// Same task with a different analysis mapping.
    pub fn with_tasks(&self, tasks: TaskMap) -> Self {
        Self {
            tasks,
            ..self.clone()
        }
    }

    /// Whether a secondary location was supplied.
    pub fn has_secondary_uri(&self) -> bool {
        !self.secondary_uri.is_empty()
    }
}

/// Signed, expiring bundle of tasks submitted by one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Instant after which the ticket is no longer accepted.
    pub expiration: DateTime<Utc>,
    /// Tasks in submission order.
    #[serde(default, deserialize_with = "null_as_empty::deserialize")]
    pub tasks: Vec<Task>,
    /// Identifier of the signing organization's verification key.
    #[serde(rename = "signerKeyId")]
    pub signer_key_id: String,
    /// PKCS#1 v1.5 signature over [`Ticket::signing_payload`].
    #[serde(default, with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl Ticket {
    /// Build an unsigned ticket.
    pub fn new(expiration: DateTime<Utc>, signer_key_id: impl Into<String>, tasks: Vec<Task>) -> Self {
        Self {
            expiration,
            tasks,
            signer_key_id: signer_key_id.into(),
            signature: Vec::new(),
        }
    }

    /// Canonical bytes the signature is computed over: this ticket serialized
    /// with its signature field cleared.
    pub fn signing_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        let unsigned = Ticket {
            signature: Vec::new(),
            ..self.clone()
        };
        serde_json::to_vec(&unsigned)
    }
}

/// A task that could not be (fully) dispatched and the reason why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// The offending task, with locations in their submitted form.
    #[serde(rename = "TaskStruct")]
    pub task: Task,
    /// What went wrong.
    #[serde(rename = "Error")]
    pub error: ErrorRecord,
}

impl TaskError {
    /// Pair a task with the reason it failed.
    pub fn new(task: Task, error: ErrorRecord) -> Self {
        Self { task, error }
    }
}

/// The unit returned to the caller for every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Answer {
    /// Ticket-level failure, if any.
    #[serde(rename = "Error")]
    pub error: Option<ErrorRecord>,
    /// Per-task failures in ticket order.
    #[serde(rename = "TskErrors", default)]
    pub task_errors: Vec<TaskError>,
}

impl Answer {
    /// Answer for a request that failed as a whole.
    pub fn failed(error: ErrorRecord) -> Self {
        Self {
            error: Some(error),
            task_errors: Vec::new(),
        }
    }

    /// Answer for a processed ticket.
    pub fn with_task_errors(task_errors: Vec<TaskError>) -> Self {
        Self {
            error: None,
            task_errors,
        }
    }

    /// True when neither the ticket nor any task failed.
    pub fn is_clean(&self) -> bool {
        self.error.is_none() && self.task_errors.is_empty()
    }
}

/// Accepts `null` wherever an empty list or map is meant.
///
/// Issuers may write absent collections as `null`; the canonical form always
/// writes them empty.
mod null_as_empty {
    use super::TaskMap;
    use serde::{Deserialize, Deserializer};
    use std::collections::BTreeMap;

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// Null map, and null argument lists inside it.
    pub fn task_map<'de, D>(deserializer: D) -> Result<TaskMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<BTreeMap<String, Option<Vec<String>>>>::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(name, args)| (name, args.unwrap_or_default()))
            .collect())
    }
}

/// Serde adapter for byte fields carried as standard base64.
///
/// An empty byte string is written as `null`, the zero value of the field.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_none()
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(encoded) => STANDARD.decode(encoded).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use chrono::TimeZone;

    fn sample_task() -> Task {
        let mut tasks = TaskMap::new();
        tasks.insert("YARA".to_string(), vec![]);
        tasks.insert("PEID".to_string(), vec!["--fast".to_string()]);
        Task {
            primary_uri: "abc123".to_string(),
            filename: "sample.exe".to_string(),
            tasks,
            tags: vec!["apt".to_string()],
            source: "feed".to_string(),
            ..Task::default()
        }
    }

    #[test]
    fn test_task_field_names() {
        let json = serde_json::to_value(sample_task()).unwrap();
        for field in [
            "primaryURI",
            "secondaryURI",
            "filename",
            "tasks",
            "tags",
            "attempts",
            "source",
            "download",
            "comment",
        ] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn test_task_map_is_sorted() {
        let json = serde_json::to_string(&sample_task().tasks).unwrap();
        assert_eq!(json, r#"{"PEID":["--fast"],"YARA":[]}"#);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let task: Task =
            serde_json::from_str(r#"{"primaryURI":"x","filename":"f","tasks":{"YARA":[]}}"#)
                .unwrap();
        assert_eq!(task.secondary_uri, "");
        assert!(!task.has_secondary_uri());
        assert_eq!(task.attempts, 0);
    }

    #[test]
    fn test_null_collections_read_as_empty() {
        let task: Task = serde_json::from_str(
            r#"{"primaryURI":"x","filename":"f","tasks":{"YARA":null,"PEID":["-v"]},"tags":null}"#,
        )
        .unwrap();
        assert!(task.tags.is_empty());
        assert_eq!(task.tasks["YARA"], Vec::<String>::new());
        assert_eq!(task.tasks["PEID"], vec!["-v".to_string()]);

        let task: Task = serde_json::from_str(r#"{"primaryURI":"x","tasks":null}"#).unwrap();
        assert!(task.tasks.is_empty());

        let ticket: Ticket = serde_json::from_str(
            r#"{"expiration":"2030-01-01T00:00:00Z","tasks":null,"signerKeyId":"org","signature":null}"#,
        )
        .unwrap();
        assert!(ticket.tasks.is_empty());

        // The canonical form writes them back as empty collections
        let json = serde_json::to_value(&ticket).unwrap();
        assert_eq!(json["tasks"], serde_json::json!([]));
    }

    #[test]
    fn test_signing_payload_clears_signature() {
        let expiration = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let mut ticket = Ticket::new(expiration, "org", vec![sample_task()]);
        let unsigned = ticket.signing_payload().unwrap();

        ticket.signature = vec![1, 2, 3, 4];
        assert_eq!(ticket.signing_payload().unwrap(), unsigned);

        let text = String::from_utf8(unsigned).unwrap();
        assert!(text.contains(r#""signature":null"#));
        assert!(text.contains(r#""signerKeyId":"org""#));
    }

    #[test]
    fn test_signature_base64_roundtrip() {
        let expiration = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let mut ticket = Ticket::new(expiration, "org", vec![]);
        ticket.signature = vec![0xde, 0xad, 0xbe, 0xef];

        let json = serde_json::to_string(&ticket).unwrap();
        assert!(json.contains(r#""signature":"3q2+7w==""#));

        let parsed: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ticket);
    }

    #[test]
    fn test_answer_wire_names() {
        let answer = Answer::with_task_errors(vec![TaskError {
            task: sample_task(),
            error: ErrorRecord::new(ErrorCode::NotAllowed, "Rejected"),
        }]);
        let json = serde_json::to_value(&answer).unwrap();
        assert!(json["Error"].is_null());
        assert_eq!(json["TskErrors"][0]["Error"]["Code"], 4);
        assert_eq!(json["TskErrors"][0]["TaskStruct"]["filename"], "sample.exe");
        assert!(!answer.is_clean());
    }
}
