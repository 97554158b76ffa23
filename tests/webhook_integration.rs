//! Integration tests for the Twilio webhook endpoints.
//!
//! Each test spins up an Axum server on a random port backed by an in-memory
//! database, and drives it with form posts the way Twilio does.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use aicon::config::ServiceConfig;
use aicon::flow::{CallerIdentity, Line};
use aicon::store::{Database, LibSqlBackend};
use aicon::webhook::{WebhookState, webhook_routes};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const ONBOARDING_LINE: &str = "+18005550100";
const MAIN_LINE: &str = "+18005550199";

/// Start an Axum server on a random port, return (port, db).
async fn start_server() -> (u16, Arc<LibSqlBackend>) {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let config = ServiceConfig {
        onboarding_number: Some(ONBOARDING_LINE.to_string()),
        ..ServiceConfig::default()
    };
    let app = webhook_routes(WebhookState::new(db.clone(), config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (port, db)
}

/// Helper: post a form and return (content-type, body).
async fn post(port: u16, path: &str, form: &[(&str, &str)]) -> (String, String) {
    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}{path}"))
        .form(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (content_type, resp.text().await.unwrap())
}

async fn sms(port: u16, from: &str, to: &str, body: &str) -> String {
    post(
        port,
        "/sms",
        &[("From", from), ("To", to), ("Body", body), ("MessageSid", "SM123")],
    )
    .await
    .1
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "aicon");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn onboarding_sms_yes_reaches_support_menu() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let caller = "+15551234567";

        let first = sms(port, caller, ONBOARDING_LINE, "hi").await;
        assert!(first.contains("Do you already have an account?"));

        let (content_type, body) = post(
            port,
            "/sms",
            &[("From", caller), ("To", ONBOARDING_LINE), ("Body", "1"), ("MessageSid", "SM124")],
        )
        .await;
        assert!(content_type.starts_with("text/xml"));
        assert!(body.contains("<Message>"));
        assert!(body.contains("assigned number"));

        let identity = CallerIdentity::new(caller, Line::Onboarding);
        let state = db.load_flow_state(&identity).await.unwrap().unwrap();
        assert_eq!(state.current_step, "ask_support");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn full_sms_signup_creates_user() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let caller = "+15550102030";

        sms(port, caller, MAIN_LINE, "sign up").await;
        sms(port, caller, MAIN_LINE, "no").await;
        let body = sms(port, caller, MAIN_LINE, "Jordan Lee").await;
        assert!(body.contains("Got it, Jordan Lee."));
        sms(port, caller, MAIN_LINE, "48213").await;
        let body = sms(port, caller, MAIN_LINE, "skip").await;
        assert!(body.contains("All set, Jordan Lee!"));

        let identity = CallerIdentity::new(caller, Line::Normal);
        assert!(db.load_flow_state(&identity).await.unwrap().is_none());

        let profile = db.get_profile(caller).await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Jordan Lee"));
        assert_eq!(profile.prison_id.as_deref(), Some("48213"));
        assert!(profile.affiliate_code.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn voice_digits_follow_same_branches_as_sms() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;
        let caller = "+15550405060";
        let call = |digits: &'static str| {
            let form = vec![("From", caller), ("To", ONBOARDING_LINE), ("Digits", digits)];
            async move { post(port, "/voice", &form).await.1 }
        };

        let (_, greeting) = post(port, "/voice", &[("From", caller), ("To", ONBOARDING_LINE)]).await;
        assert!(greeting.contains(r#"<Gather input="speech dtmf" action="/voice""#));

        let menu = call("1").await;
        assert!(menu.contains("press 3"));
        assert!(menu.contains("<Gather"));

        let close = call("3").await;
        assert!(close.contains("assigned number"));
        assert!(close.contains("<Hangup/>"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unified_endpoint_dispatches_by_message_sid() {
    timeout(TEST_TIMEOUT, async {
        let (port, _db) = start_server().await;

        let (_, as_sms) = post(
            port,
            "/twilio",
            &[("From", "+15557770000"), ("To", MAIN_LINE), ("Body", "help"), ("SmsSid", "SM9")],
        )
        .await;
        assert!(as_sms.contains("<Message>"));
        assert!(as_sms.contains("Text SIGNUP"));

        let (_, as_voice) = post(
            port,
            "/onboard",
            &[("From", "+15557770001"), ("To", ONBOARDING_LINE), ("SpeechResult", "")],
        )
        .await;
        assert!(as_voice.contains("<Gather"));
        assert!(as_voice.contains("<Say"));
        assert!(!as_voice.contains("<Message>"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cancel_mid_flow_then_idle() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let caller = "+15558889999";

        sms(port, caller, MAIN_LINE, "signup").await;
        let body = sms(port, caller, MAIN_LINE, "cancel").await;
        assert!(body.contains("I&apos;ve stopped"));
        let identity = CallerIdentity::new(caller, Line::Normal);
        assert!(db.load_flow_state(&identity).await.unwrap().is_none());

        let body = sms(port, caller, MAIN_LINE, "what time is it").await;
        assert!(body.contains("Text SIGNUP to create an account"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn voice_choice_by_sms_carries_into_calls() {
    timeout(TEST_TIMEOUT, async {
        let (port, db) = start_server().await;
        let caller = "+15553334444";

        let list = sms(port, caller, MAIN_LINE, "voice list").await;
        assert!(list.contains("amy, brian, joanna, matthew"));

        let chosen = sms(port, caller, MAIN_LINE, "Voice Brian").await;
        assert!(chosen.contains("use the brian voice"));
        assert_eq!(
            db.get_preference(caller, "voice").await.unwrap().as_deref(),
            Some("brian")
        );

        let (_, call) = post(port, "/voice", &[("From", caller), ("To", MAIN_LINE)]).await;
        assert!(call.contains(r#"<Say voice="Polly.Brian">"#));

        let (_, other) = post(port, "/voice", &[("From", "+15553335555"), ("To", MAIN_LINE)]).await;
        assert!(!other.contains("Polly.Brian"));
    })
    .await
    .expect("test timed out");
}
