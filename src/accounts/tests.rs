//! End-to-end account flows over HTTP against the in-memory state.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};

use crate::{app::build_app, notify::mailer::testing::RecordingMailer, state::AppState};

fn setup() -> (TestServer, Arc<RecordingMailer>) {
    let (state, mailer) = AppState::fake();
    let server = TestServer::new(build_app(state)).unwrap();
    (server, mailer)
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
}

/// Waits for the n-th email and pulls the token out of the link after `marker`.
async fn token_from_mail(mailer: &RecordingMailer, n: usize, marker: &str) -> String {
    for _ in 0..200 {
        let sent = mailer.sent();
        if sent.len() >= n {
            let body = &sent[n - 1].body;
            let start = body.find(marker).expect("link in email") + marker.len();
            return body[start..]
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("email #{n} never arrived");
}

fn kind(res: &TestResponse) -> String {
    res.json::<Value>()["kind"].as_str().unwrap_or_default().to_string()
}

async fn signup(server: &TestServer, email: &str, password: &str) -> TestResponse {
    server
        .post("/signup")
        .json(&json!({ "email": email, "password": password, "confirmation": password }))
        .await
}

async fn login(server: &TestServer, email: &str, password: &str) -> TestResponse {
    server
        .post("/auth/login")
        .json(&json!({ "email": email, "password": password }))
        .await
}

fn access_token(res: &TestResponse) -> String {
    res.json::<Value>()["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_check() {
    let (server, _) = setup();
    server.get("/health").await.assert_status_ok();
}

#[tokio::test]
async fn signup_then_verify_twice() {
    let (server, mailer) = setup();

    let res = signup(&server, "a@x.com", "Abc12345").await;
    res.assert_status(StatusCode::CREATED);
    assert_eq!(res.json::<Value>()["email"], "a@x.com");

    let t1 = token_from_mail(&mailer, 1, "/verify-email/").await;

    let res = server.get(&format!("/verify-email/{t1}")).await;
    res.assert_status_ok();

    let res = login(&server, "a@x.com", "Abc12345").await;
    res.assert_status_ok();
    assert_eq!(res.json::<Value>()["user"]["is_verified"], true);

    let res = server.get(&format!("/verify-email/{t1}")).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "already_verified");
}

#[tokio::test]
async fn verify_with_garbage_token_is_bad_request() {
    let (server, _) = setup();
    let res = server.get("/verify-email/not-a-token").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "malformed");
}

#[tokio::test]
async fn signup_with_mismatched_or_weak_password() {
    let (server, _) = setup();
    let res = server
        .post("/signup")
        .json(&json!({ "email": "a@x.com", "password": "Abc12345", "confirmation": "Abc1234" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "password_mismatch");

    let res = signup(&server, "a@x.com", "qwerty").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "weak_password");

    signup(&server, "a@x.com", "Abc12345").await.assert_status(StatusCode::CREATED);
    let res = signup(&server, "a@x.com", "Abc12345").await;
    res.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn resend_verification_flow() {
    let (server, mailer) = setup();
    signup(&server, "a@x.com", "Abc12345").await;

    let res = server
        .post("/verify-email/resend")
        .json(&json!({ "email": "a@x.com" }))
        .await;
    res.assert_status_ok();

    // both the original and the re-sent token work; the first one wins
    let first = token_from_mail(&mailer, 1, "/verify-email/").await;
    let second = token_from_mail(&mailer, 2, "/verify-email/").await;
    server.get(&format!("/verify-email/{second}")).await.assert_status_ok();
    let res = server.get(&format!("/verify-email/{first}")).await;
    assert_eq!(kind(&res), "already_verified");

    let res = server
        .post("/verify-email/resend")
        .json(&json!({ "email": "a@x.com" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "already_verified");

    let res = server
        .post("/verify-email/resend")
        .json(&json!({ "email": "nobody@x.com" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "user_not_found");
}

#[tokio::test]
async fn password_reset_flow() {
    let (server, mailer) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let old_session = access_token(&login(&server, "a@x.com", "Abc12345").await);

    server
        .post("/password-reset")
        .json(&json!({ "email": "a@x.com" }))
        .await
        .assert_status_ok();
    let t2 = token_from_mail(&mailer, 2, "/password-reset/").await;

    let res = server
        .put(&format!("/password-reset-done/{t2}"))
        .json(&json!({ "new_password": "Lantern-77", "confirmation": "Lantern-77" }))
        .await;
    res.assert_status(StatusCode::NO_CONTENT);

    login(&server, "a@x.com", "Lantern-77").await.assert_status_ok();
    let res = login(&server, "a@x.com", "Abc12345").await;
    res.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(kind(&res), "invalid_credentials");

    // sessions from before the reset are gone
    let res = server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&old_session))
        .await;
    res.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_rejections() {
    let (server, _) = setup();

    let res = server
        .post("/password-reset")
        .json(&json!({ "email": "nobody@x.com" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "user_not_found");

    let res = server
        .put("/password-reset/whatever")
        .json(&json!({ "new_password": "Abc12345", "confirmation": "Abc12346" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "password_mismatch");

    let res = server
        .put("/password-reset/whatever")
        .json(&json!({ "new_password": "Abc12345", "confirmation": "Abc12345" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "malformed");
}

#[tokio::test]
async fn verification_token_cannot_reset_password() {
    let (server, mailer) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let verify_token = token_from_mail(&mailer, 1, "/verify-email/").await;

    let res = server
        .put(&format!("/password-reset/{verify_token}"))
        .json(&json!({ "new_password": "Lantern-77", "confirmation": "Lantern-77" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "malformed");
}

#[tokio::test]
async fn profile_requires_verified_user() {
    let (server, mailer) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let token = access_token(&login(&server, "a@x.com", "Abc12345").await);

    server.get("/profile").await.assert_status(StatusCode::UNAUTHORIZED);

    let res = server
        .get("/profile")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    res.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(kind(&res), "not_verified");

    let t1 = token_from_mail(&mailer, 1, "/verify-email/").await;
    server.get(&format!("/verify-email/{t1}")).await.assert_status_ok();

    let res = server
        .get("/profile")
        .add_header(AUTHORIZATION, bearer(&token))
        .await;
    res.assert_status_ok();
    let body = res.json::<Value>();
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["image"], "accounts/avatars/default.jpg");

    let res = server
        .patch("/profile")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "first_name": "Ada", "description": "writes about compilers" }))
        .await;
    res.assert_status_ok();
    let body = res.json::<Value>();
    assert_eq!(body["first_name"], "Ada");
    assert_eq!(body["description"], "writes about compilers");
    assert_eq!(body["last_name"], Value::Null);
}

#[tokio::test]
async fn anonymous_routes_reject_signed_in_users() {
    let (server, _) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let token = access_token(&login(&server, "a@x.com", "Abc12345").await);

    let res = server
        .post("/signup")
        .add_header(AUTHORIZATION, bearer(&token))
        .json(&json!({ "email": "b@x.com", "password": "Abc12345", "confirmation": "Abc12345" }))
        .await;
    res.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(kind(&res), "already_authenticated");

    // a stale or bogus token does not count as signed in
    signup(&server, "b@x.com", "Abc12345")
        .await
        .assert_status(StatusCode::CREATED);
    let res = server
        .post("/signup")
        .add_header(AUTHORIZATION, bearer("bogus"))
        .json(&json!({ "email": "c@x.com", "password": "Abc12345", "confirmation": "Abc12345" }))
        .await;
    res.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn change_password_rotates_sessions() {
    let (server, mailer) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let t1 = token_from_mail(&mailer, 1, "/verify-email/").await;
    server.get(&format!("/verify-email/{t1}")).await.assert_status_ok();

    let other_session = access_token(&login(&server, "a@x.com", "Abc12345").await);
    let session = access_token(&login(&server, "a@x.com", "Abc12345").await);

    let res = server
        .put("/change-password")
        .add_header(AUTHORIZATION, bearer(&session))
        .json(&json!({
            "old_password": "Abc12345",
            "new_password": "Lantern-77",
            "confirmation": "Lantern-77"
        }))
        .await;
    res.assert_status_ok();
    let fresh = access_token(&res);

    server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&fresh))
        .await
        .assert_status_ok();
    server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&other_session))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unreadable_bodies_get_the_error_envelope() {
    let (server, _) = setup();

    let res = server
        .put("/password-reset/whatever")
        .json(&json!({ "new_password": "Abc12345" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "invalid_body");
    assert!(res.json::<Value>()["detail"]
        .as_str()
        .unwrap_or_default()
        .contains("confirmation"));

    let res = server
        .post("/signup")
        .json(&json!({ "email": "a@x.com", "password": "Abc12345" }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "invalid_body");

    let res = server
        .post("/auth/login")
        .json(&json!({ "email": "a@x.com", "password": 12345678 }))
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "invalid_body");

    let res = server.post("/verify-email/resend").text("a@x.com").await;
    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(kind(&res), "invalid_body");
}

#[tokio::test]
async fn logout_ends_every_session() {
    let (server, _) = setup();
    signup(&server, "a@x.com", "Abc12345").await;
    let session = access_token(&login(&server, "a@x.com", "Abc12345").await);
    let other_session = access_token(&login(&server, "a@x.com", "Abc12345").await);

    server.post("/auth/logout").await.assert_status(StatusCode::UNAUTHORIZED);

    server
        .post("/auth/logout")
        .add_header(AUTHORIZATION, bearer(&session))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    for token in [&session, &other_session] {
        let res = server
            .get("/me")
            .add_header(AUTHORIZATION, bearer(token))
            .await;
        res.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(kind(&res), "unauthenticated");
    }

    // signing in again issues a token for the new session
    let fresh = access_token(&login(&server, "a@x.com", "Abc12345").await);
    server
        .get("/me")
        .add_header(AUTHORIZATION, bearer(&fresh))
        .await
        .assert_status_ok();
}
