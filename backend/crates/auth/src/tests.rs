//! Router-level scenarios driven through `tower::ServiceExt::oneshot`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::routing::get;
use chrono::{DateTime, Duration, Utc};
use kernel::id::UserId;
use serde_json::{Value, json};
use tasks::handlers::TASK_SEND_VERIFY_EMAIL;
use tasks::{EnqueueOptions, EnqueueReceipt, QueueClass, QueueError, QueueResult, TaskQueue};
use tower::ServiceExt;

use crate::application::config::AuthConfig;
use crate::domain::credential::{CredentialPayload, TokenError, TokenIssuer, TokenVerifier};
use crate::domain::entity::email_verification::{EmailVerification, VERIFICATION_TTL};
use crate::domain::entity::user::User;
use crate::domain::repository::{DirectoryError, DirectoryResult, UserDirectory};
use crate::domain::value_object::email::Email;
use crate::infra::token::AeadTokenMaker;
use crate::presentation::{AuthAppState, AuthIdentity, auth_router};

const KEY: &[u8; 32] = b"an-example-very-secret-32b-key!!";

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct MemoryDirectory {
    users: Mutex<Vec<User>>,
    verifications: Mutex<Vec<EmailVerification>>,
}

impl MemoryDirectory {
    /// What the send-verify-email task would have stored
    fn record_verification(
        &self,
        email: &Email,
        secret_code: &str,
    ) -> DirectoryResult<EmailVerification> {
        let user_id = {
            let users = self.users.lock().unwrap();
            users
                .iter()
                .find(|u| &u.email == email)
                .map(|u| u.user_id)
                .ok_or(DirectoryError::NotFound)?
        };

        let mut verifications = self.verifications.lock().unwrap();
        let now = Utc::now();
        let verification = EmailVerification {
            id: verifications.len() as i64 + 1,
            user_id,
            email: email.clone(),
            secret_code: secret_code.to_string(),
            is_used: false,
            created_at: now,
            expires_at: now + VERIFICATION_TTL,
        };
        verifications.push(verification.clone());
        Ok(verification)
    }
}

impl UserDirectory for MemoryDirectory {
    async fn create(&self, user: &User) -> DirectoryResult<()> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == user.email) {
            return Err(DirectoryError::DuplicateIdentity);
        }
        users.push(user.clone());
        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> DirectoryResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| &u.user_id == user_id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> DirectoryResult<Option<User>> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| &u.email == email).cloned())
    }

    async fn update(&self, user: &User) -> DirectoryResult<User> {
        let mut users = self.users.lock().unwrap();
        let stored = users
            .iter_mut()
            .find(|u| u.user_id == user.user_id)
            .ok_or(DirectoryError::NotFound)?;
        stored.first_name = user.first_name.clone();
        stored.last_name = user.last_name.clone();
        stored.password = user.password.clone();
        stored.updated_at = user.updated_at;
        Ok(stored.clone())
    }

    async fn confirm_email(
        &self,
        verification_id: i64,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> DirectoryResult<User> {
        let mut verifications = self.verifications.lock().unwrap();
        let verification = verifications
            .iter_mut()
            .find(|v| v.id == verification_id && v.is_redeemable_at(secret_code, now))
            .ok_or(DirectoryError::NotFound)?;
        verification.is_used = true;

        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.user_id == verification.user_id)
            .ok_or(DirectoryError::NotFound)?;
        user.email_verified = true;
        user.updated_at = now;
        Ok(user.clone())
    }
}

#[derive(Default)]
struct RecordingQueue {
    down: AtomicBool,
    enqueued: Mutex<Vec<(String, Vec<u8>, EnqueueOptions)>>,
}

impl TaskQueue for RecordingQueue {
    async fn enqueue(
        &self,
        kind: &str,
        payload: Vec<u8>,
        options: EnqueueOptions,
    ) -> QueueResult<EnqueueReceipt> {
        if self.down.load(Ordering::SeqCst) {
            return Err(QueueError::BrokerUnavailable("connection refused".into()));
        }
        self.enqueued
            .lock()
            .unwrap()
            .push((kind.to_string(), payload, options));

        Ok(EnqueueReceipt {
            id: Default::default(),
            kind: kind.to_string(),
            queue: options.queue,
            max_retry: options.max_retry,
            ready_at: Utc::now(),
        })
    }
}

/// Counts how often the gate actually reached the verifier
struct CountingVerifier {
    inner: AeadTokenMaker,
    calls: AtomicUsize,
}

impl TokenVerifier for CountingVerifier {
    fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<CredentialPayload, TokenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify_at(token, now)
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    router: Router,
    directory: Arc<MemoryDirectory>,
    queue: Arc<RecordingQueue>,
    tokens: Arc<AeadTokenMaker>,
    verifier: Arc<CountingVerifier>,
}

impl Harness {
    fn new() -> Self {
        let directory = Arc::new(MemoryDirectory::default());
        let queue = Arc::new(RecordingQueue::default());
        let tokens = Arc::new(AeadTokenMaker::new(KEY).unwrap());
        let verifier = Arc::new(CountingVerifier {
            inner: AeadTokenMaker::new(KEY).unwrap(),
            calls: AtomicUsize::new(0),
        });

        let state = AuthAppState {
            directory: directory.clone(),
            queue: queue.clone(),
            issuer: tokens.clone(),
            verifier: verifier.clone(),
            config: Arc::new(AuthConfig::default()),
        };

        Self {
            router: Router::new().nest("/v1/auth", auth_router(state)),
            directory,
            queue,
            tokens,
            verifier,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn me(&self, authorization: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::get("/v1/auth/me");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        self.send(request.body(Body::empty()).unwrap()).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/v1/auth/sign-up",
            json!({
                "email": email,
                "password": password,
                "firstName": "Ada",
                "lastName": "Lovelace",
            }),
        )
        .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/v1/auth/sign-in",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn update_me(&self, authorization: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::patch("/v1/auth/me")
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        self.send(request.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn bearer_for(&self, email: &str, password: &str) -> String {
        let (_, body) = self.sign_in(email, password).await;
        format!("Bearer {}", body["accessToken"].as_str().unwrap())
    }

    fn verifier_calls(&self) -> usize {
        self.verifier.calls.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Sign Up
// ============================================================================

#[tokio::test]
async fn test_sign_up_queues_verification_email() {
    let h = Harness::new();

    let (status, body) = h.sign_up("Ada@Example.com", "correct horse battery").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "ada@example.com");
    assert_eq!(body["verificationQueued"], true);

    let enqueued = h.queue.enqueued.lock().unwrap();
    assert_eq!(enqueued.len(), 1);
    let (kind, payload, options) = &enqueued[0];
    assert_eq!(kind, TASK_SEND_VERIFY_EMAIL);
    assert_eq!(
        serde_json::from_slice::<Value>(payload).unwrap(),
        json!({ "email": "ada@example.com" })
    );
    assert_eq!(options.queue, QueueClass::Critical);
    assert_eq!(options.max_retry, 10);
    assert_eq!(options.process_in, Some(StdDuration::from_secs(10)));

    let users = h.directory.users.lock().unwrap();
    assert_eq!(users.len(), 1);
    assert!(!users[0].email_verified);
    assert_eq!(users[0].role.code(), "user");
}

#[tokio::test]
async fn test_sign_up_survives_queue_outage() {
    let h = Harness::new();
    h.queue.down.store(true, Ordering::SeqCst);

    let (status, body) = h.sign_up("ada@example.com", "correct horse battery").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["verificationQueued"], false);
    assert_eq!(h.directory.users.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_sign_up_rejects_duplicates_and_bad_input() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;

    let (status, _) = h.sign_up("ADA@example.com", "another password").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = h.sign_up("not-an-email", "correct horse battery").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.sign_up("bob@example.com", "short").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.queue.enqueued.lock().unwrap().len(), 1);
}

// ============================================================================
// Sign In + Gate
// ============================================================================

#[tokio::test]
async fn test_sign_in_then_profile() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;

    let (status, body) = h.sign_in("ada@example.com", "correct horse battery").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tokenType"], "Bearer");
    let token = body["accessToken"].as_str().unwrap().to_string();
    assert!(token.starts_with("v1.local."));

    let payload = h.tokens.verify(&token).unwrap();
    assert_eq!(payload.role(), "user");
    assert_eq!(payload.expires_at() - payload.issued_at(), Duration::minutes(15));

    let (status, body) = h.me(Some(&format!("Bearer {token}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["id"], payload.subject_id().to_string());

    // Scheme is case-insensitive
    let (status, _) = h.me(Some(&format!("bearer {token}"))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_sign_in_failures_are_indistinguishable() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;

    let (wrong_status, wrong_body) = h.sign_in("ada@example.com", "wrong horse battery").await;
    let (unknown_status, unknown_body) =
        h.sign_in("bob@example.com", "correct horse battery").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body["detail"], unknown_body["detail"]);
}

#[tokio::test]
async fn test_bad_header_never_reaches_verifier() {
    let h = Harness::new();

    for header_value in [
        None,
        Some("Bearer"),
        Some("Basic abc"),
        Some("Bearer a b"),
        Some("Bearer  abc"),
    ] {
        let (status, body) = h.me(header_value).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{header_value:?}");
        assert_eq!(body["detail"], "Authorization header must be 'Bearer <token>'");
    }
    assert_eq!(h.verifier_calls(), 0);
}

#[tokio::test]
async fn test_forged_and_expired_tokens_look_the_same() {
    let h = Harness::new();

    let expired = h
        .tokens
        .issue_at(
            UserId::new(),
            "user",
            Duration::minutes(15),
            Utc::now() - Duration::hours(1),
        )
        .unwrap();
    let (expired_status, expired_body) = h.me(Some(&format!("Bearer {}", expired.token()))).await;

    let foreign = AeadTokenMaker::new(&[9u8; 32])
        .unwrap()
        .issue(UserId::new(), "admin", Duration::minutes(15))
        .unwrap();
    let (forged_status, forged_body) = h.me(Some(&format!("Bearer {}", foreign.token()))).await;

    let (garbage_status, garbage_body) = h.me(Some("Bearer not-a-token")).await;

    assert_eq!(h.verifier_calls(), 3);
    for status in [expired_status, forged_status, garbage_status] {
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    assert_eq!(expired_body, forged_body);
    assert_eq!(forged_body, garbage_body);
    assert_ne!(
        expired_body["detail"],
        "Authorization header must be 'Bearer <token>'"
    );
}

#[tokio::test]
async fn test_identity_extractor_requires_gate() {
    async fn whoami(identity: AuthIdentity) -> String {
        identity.subject_id.to_string()
    }

    let router: Router = Router::new().route("/whoami", get(whoami));
    let response = router
        .oneshot(Request::get("/whoami").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_of_deleted_account_is_not_found() {
    let h = Harness::new();
    let orphan = h
        .tokens
        .issue(UserId::new(), "user", Duration::minutes(5))
        .unwrap();

    let (status, _) = h.me(Some(&format!("Bearer {}", orphan.token()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Profile Update
// ============================================================================

#[tokio::test]
async fn test_update_profile_changes_names_and_password() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;
    let bearer = h.bearer_for("ada@example.com", "correct horse battery").await;

    let (status, body) = h
        .update_me(
            Some(&bearer),
            json!({ "firstName": "  Augusta ", "password": "analytical engine" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["firstName"], "Augusta");
    assert_eq!(body["user"]["lastName"], "Lovelace");
    assert_eq!(body["user"]["email"], "ada@example.com");

    let (status, _) = h.sign_in("ada@example.com", "correct horse battery").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = h.sign_in("ada@example.com", "analytical engine").await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = h.me(Some(&bearer)).await;
    assert_eq!(body["user"]["firstName"], "Augusta");
}

#[tokio::test]
async fn test_update_profile_requires_a_change() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;
    let bearer = h.bearer_for("ada@example.com", "correct horse battery").await;

    let (status, body) = h.update_me(Some(&bearer), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Nothing to update");

    // Rejected password leaves the names alone too
    let (status, _) = h
        .update_me(Some(&bearer), json!({ "firstName": "Augusta", "password": "short" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.directory.users.lock().unwrap()[0].first_name, "Ada");
}

#[tokio::test]
async fn test_update_profile_is_gated() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;

    let (status, _) = h.update_me(None, json!({ "firstName": "Mallory" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
        .update_me(Some("Bearer not-a-token"), json!({ "firstName": "Mallory" }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.directory.users.lock().unwrap()[0].first_name, "Ada");
}

// ============================================================================
// Verify Email
// ============================================================================

#[tokio::test]
async fn test_verify_email_link_is_single_use() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;

    let email = Email::new("ada@example.com").unwrap();
    let verification = h
        .directory
        .record_verification(&email, "0123456789abcdefghijklmnopqrstuv")
        .unwrap();

    let uri = format!(
        "/v1/auth/verify-email?email_id={}&secret_code=0123456789abcdefghijklmnopqrstuv",
        verification.id
    );
    let (status, body) = h
        .send(Request::get(&uri).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isVerified"], true);
    assert!(h.directory.users.lock().unwrap()[0].email_verified);

    let (status, _) = h
        .send(Request::get(&uri).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_verify_email_wrong_secret() {
    let h = Harness::new();
    h.sign_up("ada@example.com", "correct horse battery").await;
    let email = Email::new("ada@example.com").unwrap();
    let verification = h
        .directory
        .record_verification(&email, "right")
        .unwrap();

    let uri = format!(
        "/v1/auth/verify-email?email_id={}&secret_code=wrong",
        verification.id
    );
    let (status, _) = h
        .send(Request::get(&uri).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!h.directory.users.lock().unwrap()[0].email_verified);
}
