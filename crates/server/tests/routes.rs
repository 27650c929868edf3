use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::{Value, json};
use tower::ServiceExt;

use engine::{AccessPolicy, Engine, SubscriptionUpdate};
use migration::MigratorTrait;
use server::{
    ServerState,
    types::{
        access::{AccessReasonView, AccessView},
        account::{ProfileView, SubscriptionView},
        auth::SessionToken,
        plans::PlansResponse,
    },
};

async fn setup_with_db(policy: AccessPolicy) -> (Router, Arc<Engine>, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db.clone()).build().await.unwrap();
    let engine = Arc::new(engine);
    let app = server::router(ServerState::new(engine.clone(), policy));
    (app, engine, db)
}

async fn setup(policy: AccessPolicy) -> (Router, Arc<Engine>) {
    let (app, engine, _db) = setup_with_db(policy).await;
    (app, engine)
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    authorization: Option<String>,
    body: Option<Value>,
) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

async fn register(app: &Router, username: &str) -> SessionToken {
    let response = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": "password", "full_name": "Test User" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await
}

#[tokio::test]
async fn new_user_can_open_the_dashboard() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;
    assert_eq!(session.user_id, "alice");

    let response = send(
        &app,
        Method::GET,
        "/dashboard",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = json_body(response).await;
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["full_name"], "Test User");
}

#[tokio::test]
async fn anonymous_requests_are_sent_to_login() {
    let (app, _engine) = setup(AccessPolicy::default()).await;

    for uri in ["/dashboard", "/profile", "/subscription", "/plans"] {
        let response = send(&app, Method::GET, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
        assert_eq!(location(&response), "/login");
    }

    let response = send(
        &app,
        Method::GET,
        "/dashboard",
        Some(bearer("not-a-token")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn expired_trial_is_sent_to_profile() {
    let (app, engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;
    engine
        .set_trial_end("alice", Utc::now() - Duration::days(1))
        .await
        .unwrap();

    let response = send(
        &app,
        Method::GET,
        "/dashboard",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile");

    let response = send(
        &app,
        Method::GET,
        "/profile",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: ProfileView = json_body(response).await;
    let trial = profile.trial.unwrap();
    assert!(!trial.is_trial_active);
    assert!(!trial.has_access);
    assert_eq!(trial.days_remaining, 0);
    assert!(profile.subscription.is_none());
}

#[tokio::test]
async fn active_subscription_unlocks_the_dashboard() {
    let (app, engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;
    engine
        .set_trial_end("alice", Utc::now() - Duration::days(1))
        .await
        .unwrap();
    engine
        .upsert_billing_customer("alice", "cus_alice")
        .await
        .unwrap();
    engine
        .upsert_subscription(
            "cus_alice",
            SubscriptionUpdate {
                status: "active".to_string(),
                price_id: Some("price_1SHmZMEtRKYSN4c1nsPg51FI".to_string()),
                ..SubscriptionUpdate::default()
            },
        )
        .await
        .unwrap();

    let response = send(
        &app,
        Method::GET,
        "/dashboard",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        Method::GET,
        "/subscription",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let subscription: SubscriptionView = json_body(response).await;
    assert!(subscription.is_active);
    assert_eq!(subscription.status, "active");
    assert_eq!(
        subscription.plan_name.as_deref(),
        Some("Control Tips - All Green")
    );
    assert!(!subscription.is_trialing);
    let plan = subscription.plan.unwrap();
    assert_eq!(plan.currency_symbol, "R$");
    assert_eq!(plan.price_id, "price_1SHmZMEtRKYSN4c1nsPg51FI");

    let response = send(&app, Method::GET, "/access", Some(bearer(&session.token)), None).await;
    let access: AccessView = json_body(response).await;
    assert!(access.has_access);
    assert_eq!(access.reason, AccessReasonView::Subscription);
}

#[tokio::test]
async fn subscription_page_without_subscription_is_404() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;

    let response = send(
        &app,
        Method::GET,
        "/subscription",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = json_body(response).await;
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn plans_lists_the_catalogue() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;

    let response = send(&app, Method::GET, "/plans", Some(bearer(&session.token)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let plans: PlansResponse = json_body(response).await;
    assert_eq!(plans.plans.len(), 1);
    assert_eq!(plans.plans[0].price_minor, 1999);
    assert_eq!(plans.plans[0].currency, "brl");
    assert_eq!(plans.plans[0].currency_symbol, "R$");
}

#[tokio::test]
async fn access_requires_a_session() {
    let (app, _engine) = setup(AccessPolicy::default()).await;

    let response = send(&app, Method::GET, "/access", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let session = register(&app, "alice").await;
    let response = send(&app, Method::GET, "/access", Some(bearer(&session.token)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let access: AccessView = json_body(response).await;
    assert!(access.has_access);
    assert_eq!(access.reason, AccessReasonView::Trial);
}

#[tokio::test]
async fn sign_in_with_basic_auth() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    register(&app, "alice").await;

    let response = send(
        &app,
        Method::POST,
        "/auth/session",
        Some(basic("alice", "password")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionToken = json_body(response).await;
    assert!(session.expires_at > Utc::now());

    let response = send(
        &app,
        Method::POST,
        "/auth/session",
        Some(basic("alice", "wrong")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(&app, Method::POST, "/auth/session", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_session_requires_admin() {
    let (app, engine) = setup(AccessPolicy::default()).await;
    register(&app, "alice").await;

    let response = send(
        &app,
        Method::POST,
        "/auth/admin-session",
        Some(basic("alice", "password")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    engine.set_admin("alice", true).await.unwrap();
    let response = send(
        &app,
        Method::POST,
        "/auth/admin-session",
        Some(basic("alice", "password")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    register(&app, "alice").await;

    let response = send(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": "alice", "password": "other" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn refresh_then_sign_out() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;

    let response = send(
        &app,
        Method::POST,
        "/auth/refresh",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed: SessionToken = json_body(response).await;
    assert_eq!(refreshed.token, session.token);
    assert!(refreshed.expires_at >= session.expires_at);

    let response = send(
        &app,
        Method::DELETE,
        "/auth/session",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app,
        Method::GET,
        "/dashboard",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = send(
        &app,
        Method::POST,
        "/auth/refresh",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_the_account_signs_out() {
    let (app, _engine) = setup(AccessPolicy::default()).await;
    let session = register(&app, "alice").await;

    let response = send(
        &app,
        Method::DELETE,
        "/account",
        Some(bearer(&session.token)),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(
        &app,
        Method::POST,
        "/auth/session",
        Some(basic("alice", "password")),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn missing_profile_follows_the_policy() {
    for (policy, expected) in [
        (AccessPolicy::FAIL_OPEN, true),
        (AccessPolicy::FAIL_CLOSED, false),
    ] {
        let (app, _engine, db) = setup_with_db(policy).await;
        let session = register(&app, "alice").await;
        db.execute(Statement::from_sql_and_values(
            db.get_database_backend(),
            "DELETE FROM profiles WHERE id = ?",
            ["alice".into()],
        ))
        .await
        .unwrap();

        let response = send(&app, Method::GET, "/access", Some(bearer(&session.token)), None).await;
        let access: AccessView = json_body(response).await;
        assert_eq!(access.has_access, expected);
        assert_eq!(access.reason, AccessReasonView::MissingProfile);

        let response = send(
            &app,
            Method::GET,
            "/dashboard",
            Some(bearer(&session.token)),
            None,
        )
        .await;
        if expected {
            assert_eq!(response.status(), StatusCode::OK);
        } else {
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
            assert_eq!(location(&response), "/profile");
        }
    }
}

async fn follow_to_profile(app: &Router, token: &str) -> ProfileView {
    let response = send(app, Method::GET, "/dashboard", Some(bearer(token)), None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response).to_string();
    assert_eq!(target, "/profile");

    let response = send(app, Method::GET, &target, Some(bearer(token)), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn fallback_page_renders_without_a_profile() {
    let (app, _engine, db) = setup_with_db(AccessPolicy::FAIL_CLOSED).await;
    let session = register(&app, "alice").await;
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "DELETE FROM profiles WHERE id = ?",
        ["alice".into()],
    ))
    .await
    .unwrap();

    let profile = follow_to_profile(&app, &session.token).await;
    assert_eq!(profile.user_id, "alice");
    assert_eq!(profile.full_name, None);
    assert!(!profile.is_admin);
    assert_eq!(profile.created_at, None);
    assert!(profile.trial.is_none());
    assert!(profile.subscription.is_none());
}

#[tokio::test]
async fn fallback_page_renders_with_an_unreadable_trial_end() {
    let (app, _engine, db) = setup_with_db(AccessPolicy::FAIL_CLOSED).await;
    let session = register(&app, "alice").await;
    db.execute(Statement::from_sql_and_values(
        db.get_database_backend(),
        "UPDATE profiles SET trial_ends_at = ? WHERE id = ?",
        ["next tuesday".into(), "alice".into()],
    ))
    .await
    .unwrap();

    let profile = follow_to_profile(&app, &session.token).await;
    assert_eq!(profile.user_id, "alice");
    assert_eq!(profile.full_name.as_deref(), Some("Test User"));
    assert!(profile.created_at.is_some());
    assert!(profile.trial.is_none());
}
