//! End-to-end tests: a client seals a signed ticket, the gateway processes it
//! and the client opens the encrypted answer.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use shared_crypto::PrivateKey;
use shared_types::{Answer, ErrorCode, ErrorRecord, Task, TaskMap, Ticket};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use ticket_gateway::ports::FixedTimeSource;
use ticket_gateway::{
    build_router, seal_envelope, sign_ticket, AccessPolicy, Destination, EnvelopeRequest,
    GatewayResponse, InMemoryBroker, KeyRegistry, RequestHandler, ResponseKey, RetryPolicy,
    RoutingTable, TaskRouter, TicketCrypto,
};
use tower::ServiceExt;

const FINGERPRINT: &str = "gw-2026";
const ORG: &str = "acme";
const STORAGE: &str = "http://storage.local/";

fn gateway_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).unwrap())
}

fn org_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| PrivateKey::generate(1024).unwrap())
}

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-05-04T10:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

struct Gateway {
    handler: Arc<RequestHandler>,
    keys: Arc<KeyRegistry>,
    broker: InMemoryBroker,
}

async fn gateway() -> Gateway {
    let keys = Arc::new(KeyRegistry::new());
    keys.decryption_keys()
        .insert(FINGERPRINT, gateway_key().clone());
    keys.verification_keys()
        .insert(ORG, org_key().public_key());

    let mut allowed = HashMap::new();
    allowed.insert(
        ORG.to_string(),
        vec!["YARA".to_string(), "PEID".to_string()],
    );

    let mut overrides = HashMap::new();
    overrides.insert(
        "YARA".to_string(),
        Destination::new("yara_input", "yara", "work.static.yara"),
    );
    let table = RoutingTable::new(
        Destination::new("totem_input", "totem", "work.static.totem"),
        overrides,
    );

    let broker = InMemoryBroker::new();
    let router = TaskRouter::connect(table, Arc::new(broker.clone()), RetryPolicy::default())
        .await
        .unwrap();

    let handler = RequestHandler::new(
        TicketCrypto::new(Arc::clone(&keys), Arc::new(FixedTimeSource(now()))),
        AccessPolicy::from_allowed_tasks(&allowed),
        Arc::new(router),
        STORAGE,
    );

    Gateway {
        handler: Arc::new(handler),
        keys,
        broker,
    }
}

fn task(primary: &str, analyses: &[&str]) -> Task {
    let tasks: TaskMap = analyses
        .iter()
        .map(|name| (name.to_string(), Vec::new()))
        .collect();
    Task {
        primary_uri: primary.to_string(),
        filename: format!("{primary}.bin"),
        tasks,
        source: ORG.to_string(),
        ..Task::default()
    }
}

fn signed_ticket(tasks: Vec<Task>, expiration: DateTime<Utc>) -> Ticket {
    sign_ticket(Ticket::new(expiration, ORG, tasks), org_key()).unwrap()
}

fn seal(ticket: &Ticket) -> (EnvelopeRequest, ResponseKey) {
    seal_bytes(&serde_json::to_vec(ticket).unwrap())
}

fn seal_bytes(plaintext: &[u8]) -> (EnvelopeRequest, ResponseKey) {
    let (envelope, key) =
        seal_envelope(plaintext, &gateway_key().public_key(), FINGERPRINT).unwrap();
    (EnvelopeRequest::from_envelope(&envelope), key)
}

fn open(response: &GatewayResponse, key: &ResponseKey) -> Answer {
    let GatewayResponse::Encrypted(body) = response else {
        panic!("expected an encrypted answer, got {response:?}");
    };
    serde_json::from_slice(&key.open(body).unwrap()).unwrap()
}

#[tokio::test]
async fn test_ticket_is_routed_and_answer_decrypts() {
    let gw = gateway().await;
    let ticket = signed_ticket(
        vec![task("abc", &["YARA", "PEID"])],
        now() + Duration::hours(1),
    );
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert!(answer.is_clean(), "unexpected errors: {answer:?}");

    let published = gw.broker.published();
    assert_eq!(published.len(), 2);

    // Overrides first, then the default remainder
    assert_eq!(published[0].exchange, "yara");
    assert_eq!(published[0].routing_key, "work.static.yara");
    let yara = published[0].json().unwrap();
    assert_eq!(yara["primaryURI"], "http://storage.local/abc");
    assert_eq!(yara["tasks"], serde_json::json!({"YARA": []}));

    assert_eq!(published[1].exchange, "totem");
    let rest = published[1].json().unwrap();
    assert_eq!(rest["tasks"], serde_json::json!({"PEID": []}));
}

#[tokio::test(start_paused = true)]
async fn test_publish_failure_is_retried_once() {
    let gw = gateway().await;
    gw.broker.fail_next_publishes(1);

    let ticket = signed_ticket(vec![task("abc", &["PEID"])], now() + Duration::hours(1));
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert!(answer.is_clean());

    let published = gw.broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].connection, 2);
    assert_eq!(gw.broker.publish_attempts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_broker_outage_reports_task_with_submitted_uris() {
    let gw = gateway().await;
    gw.broker.fail_next_publishes(2);

    let ticket = signed_ticket(vec![task("abc", &["PEID"])], now() + Duration::hours(1));
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert!(answer.error.is_none());
    assert_eq!(answer.task_errors.len(), 1);

    let failed = &answer.task_errors[0];
    assert_eq!(failed.error.code, ErrorCode::OtherRecoverable);
    assert_eq!(failed.task.primary_uri, "abc");
    assert!(gw.broker.published().is_empty());
}

#[tokio::test]
async fn test_disallowed_analysis_is_rejected_alone() {
    let gw = gateway().await;
    let ticket = signed_ticket(
        vec![task("abc", &["YARA", "CUCKOO"])],
        now() + Duration::hours(1),
    );
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert_eq!(answer.task_errors.len(), 1);

    let rejected = &answer.task_errors[0];
    assert_eq!(rejected.error.code, ErrorCode::NotAllowed);
    assert_eq!(rejected.task.tasks.keys().collect::<Vec<_>>(), vec!["CUCKOO"]);

    let published = gw.broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].exchange, "yara");
}

#[tokio::test]
async fn test_expired_ticket() {
    let gw = gateway().await;
    let ticket = signed_ticket(vec![task("abc", &["YARA"])], now() - Duration::seconds(1));
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    let error = answer.error.unwrap();
    assert_eq!(error.code, ErrorCode::OtherRecoverable);
    assert!(answer.task_errors.is_empty());
    assert!(gw.broker.published().is_empty());
}

#[tokio::test]
async fn test_tampered_ticket_fails_verification() {
    let gw = gateway().await;
    let mut ticket = signed_ticket(vec![task("abc", &["YARA"])], now() + Duration::hours(1));
    ticket.tasks[0].primary_uri = "evil".to_string();
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert_eq!(answer.error.unwrap().code, ErrorCode::OtherRecoverable);
    assert!(gw.broker.published().is_empty());
}

#[tokio::test]
async fn test_unknown_signer() {
    let gw = gateway().await;
    let ticket = sign_ticket(
        Ticket::new(now() + Duration::hours(1), "stranger", vec![task("abc", &["YARA"])]),
        org_key(),
    )
    .unwrap();
    let (request, key) = seal(&ticket);

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert_eq!(answer.error.unwrap().code, ErrorCode::KeyUnknown);
}

#[tokio::test]
async fn test_unreadable_ticket_gets_encrypted_error() {
    let gw = gateway().await;
    let (request, key) = seal_bytes(b"not json at all");

    let answer = open(&gw.handler.handle(&request).await, &key);
    assert_eq!(answer.error.unwrap().code, ErrorCode::OtherRecoverable);
}

#[tokio::test]
async fn test_http_roundtrip() {
    let gw = gateway().await;
    let ticket = signed_ticket(vec![task("abc", &["YARA"])], now() + Duration::hours(1));
    let (request, key) = seal(&ticket);

    let form = serde_urlencoded::to_string(&request).unwrap();
    let response = build_router(Arc::clone(&gw.handler), Arc::clone(&gw.keys))
        .oneshot(
            Request::post("/task/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(form))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let answer: Answer = serde_json::from_slice(&key.open(&body).unwrap()).unwrap();
    assert!(answer.is_clean());
    assert_eq!(gw.broker.published().len(), 1);
}

#[tokio::test]
async fn test_http_unknown_fingerprint_is_plaintext() {
    let gw = gateway().await;
    let ticket = signed_ticket(vec![task("abc", &["YARA"])], now() + Duration::hours(1));
    let (mut request, _) = seal(&ticket);
    request.key_fingerprint = "retired".to_string();

    let response = build_router(Arc::clone(&gw.handler), Arc::clone(&gw.keys))
        .oneshot(
            Request::post("/task/")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(serde_urlencoded::to_string(&request).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let record: ErrorRecord = serde_json::from_slice(&body).unwrap();
    assert_eq!(record.code, ErrorCode::KeyUnknown);
    assert!(gw.broker.published().is_empty());
}
