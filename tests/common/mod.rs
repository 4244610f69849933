#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use tower_http::normalize_path::NormalizePath;
use wearup_api::{
    config::AppConfig,
    db,
    entities::{user_profile, UserProfile, UserRole},
    events, AppState,
};

/// Application backed by a throwaway SQLite file and media directory.
pub struct TestApp {
    app: NormalizePath<Router>,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

/// A registered account and its access token.
pub struct TestUser {
    pub id: String,
    pub username: String,
    pub access: String,
    pub refresh: String,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("wearup_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "integration_signing_key_with_enough_entropy_9f3a1c".to_string(),
            3600,
            86_400,
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        cfg.db_max_connections = 4;
        cfg.db_min_connections = 1;
        cfg.media_root = dir.path().join("media").display().to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (state, event_rx) = AppState::new(Arc::new(pool), cfg);
        let event_task = tokio::spawn(events::process_events(event_rx));

        Self {
            app: wearup_api::app(state.clone()),
            state,
            _event_task: event_task,
            _dir: dir,
        }
    }

    /// Send a request with an optional JSON body and bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Sends the request and returns status plus parsed JSON body (`Null` when empty).
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn register(&self, username: &str) -> TestUser {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/register/",
                Some(json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "correct-horse-battery",
                    "first_name": username,
                    "last_name": "Tester",
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

        TestUser {
            id: body["user"]["id"].as_str().expect("user id").to_string(),
            username: username.to_string(),
            access: body["tokens"]["access"].as_str().expect("access").to_string(),
            refresh: body["tokens"]["refresh"].as_str().expect("refresh").to_string(),
        }
    }

    /// Promotes an account to admin directly in the database.
    pub async fn make_admin(&self, user: &TestUser) {
        let user_id: uuid::Uuid = user.id.parse().expect("uuid");
        UserProfile::update_many()
            .col_expr(user_profile::Column::Role, Expr::value(UserRole::Admin))
            .filter(user_profile::Column::UserId.eq(user_id))
            .exec(&*self.state.db)
            .await
            .expect("promote to admin");
    }

    /// Creates a product as `seller` and returns its JSON projection.
    pub async fn create_product(&self, seller: &TestUser, body: Value) -> Value {
        let (status, product) = self
            .call(Method::POST, "/api/products/", Some(body), Some(&seller.access))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create product failed: {product}");
        product
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal field serialized as a string.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
        .parse()
        .expect("decimal")
}
