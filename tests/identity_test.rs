//! Accounts, tokens, profiles and addresses driven through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use common::{TestApp, TestUser};
use serde_json::{json, Value};

fn address(kind: &str, city: &str, is_default: bool) -> Value {
    json!({
        "address_type": kind,
        "full_name": "Alice Tester",
        "street_address": "12 MG Road",
        "city": city,
        "state": "Karnataka",
        "postal_code": "560001",
        "phone": "+91 9000000000",
        "is_default": is_default,
    })
}

async fn add_address(app: &TestApp, user: &TestUser, body: Value) -> Value {
    let (status, created) = app
        .call(Method::POST, "/api/addresses/", Some(body), Some(&user.access))
        .await;
    assert_eq!(status, StatusCode::CREATED, "create address failed: {created}");
    created
}

#[tokio::test]
async fn login_refresh_and_logout() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/login/",
            Some(json!({ "email": "alice@example.com", "password": "wrong-password" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().is_some());

    let (status, session) = app
        .call(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "email": "ALICE@example.com", "password": "correct-horse-battery" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["user"]["username"], "alice");
    let refresh = session["tokens"]["refresh"].as_str().unwrap().to_string();

    let (status, fresh) = app
        .call(
            Method::POST,
            "/api/auth/token/refresh/",
            Some(json!({ "refresh": refresh })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(fresh["access"].as_str().is_some());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/logout/",
            Some(json!({ "refresh_token": refresh })),
            Some(&alice.access),
        )
        .await;
    assert_eq!(status, StatusCode::RESET_CONTENT);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/token/refresh",
            Some(json!({ "refresh": refresh })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_rejects_someone_elses_token() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/logout",
            Some(json!({ "refresh_token": bob.refresh })),
            Some(&alice.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/logout",
            Some(json!({ "refresh_token": "not-a-token" })),
            Some(&alice.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = TestApp::new().await;
    app.register("carol").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            Some(json!({
                "username": "carol",
                "email": "other@example.com",
                "password": "correct-horse-battery",
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn malformed_json_uses_error_envelope() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::POST, "/api/auth/login", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = common::response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn profile_updates_and_role_guard() {
    let app = TestApp::new().await;
    let dana = app.register("dana").await;

    let (status, profile) = app
        .call(Method::GET, "/api/auth/profile/", None, Some(&dana.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["role"], "buyer");

    let (status, updated) = app
        .call(
            Method::PATCH,
            "/api/auth/profile",
            Some(json!({
                "role": "seller",
                "bio": "Vintage denim",
                "website": "",
                "phone": "+91 9876543210",
            })),
            Some(&dana.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "profile update failed: {updated}");
    assert_eq!(updated["role"], "seller");
    assert_eq!(updated["bio"], "Vintage denim");
    assert!(updated["website"].is_null());
    assert_eq!(updated["phone"], "+91 9876543210");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/auth/profile",
            Some(json!({ "role": "admin" })),
            Some(&dana.access),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/auth/profile",
            Some(json!({ "website": "ftp://nope" })),
            Some(&dana.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn public_profile_hides_private_fields() {
    let app = TestApp::new().await;
    let erin = app.register("erin").await;
    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/auth/profile",
            Some(json!({
                "role": "seller",
                "phone": "+91 9123456789",
                "alternate_email": "erin.alt@example.com",
                "date_of_birth": "1995-04-12",
            })),
            Some(&erin.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.create_product(&erin, json!({ "product_name": "Batik Shirt", "base_price": "25.00" }))
        .await;

    let (status, public) = app
        .call(Method::GET, &format!("/api/users/{}/", erin.id), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(public["username"], "erin");
    assert_eq!(public["products_count"], 1);
    let fields = public.as_object().unwrap();
    for private in ["phone", "alternate_email", "date_of_birth", "email"] {
        assert!(!fields.contains_key(private), "{private} leaked");
    }
}

#[tokio::test]
async fn second_default_address_clears_the_first() {
    let app = TestApp::new().await;
    let frank = app.register("frank").await;

    let first = add_address(&app, &frank, address("shipping", "Bengaluru", true)).await;
    assert_eq!(first["country"], "India");
    let billing = add_address(&app, &frank, address("billing", "Mysuru", true)).await;
    let second = add_address(&app, &frank, address("shipping", "Chennai", true)).await;

    let (status, list) = app
        .call(Method::GET, "/api/addresses", None, Some(&frank.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 3);

    let default_of = |id: &Value| {
        list.iter()
            .find(|a| a["id"] == *id)
            .map(|a| a["is_default"].as_bool().unwrap())
            .unwrap()
    };
    assert!(!default_of(&first["id"]));
    assert!(default_of(&second["id"]));
    // Defaults are tracked per address type.
    assert!(default_of(&billing["id"]));

    // Promoting the first back via PATCH demotes the second.
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/addresses/{}", first["id"].as_str().unwrap()),
            Some(json!({ "is_default": true })),
            Some(&frank.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, again) = app
        .call(
            Method::GET,
            &format!("/api/addresses/{}", second["id"].as_str().unwrap()),
            None,
            Some(&frank.access),
        )
        .await;
    assert_eq!(again["is_default"], false);
}

#[tokio::test]
async fn addresses_are_private_to_their_owner() {
    let app = TestApp::new().await;
    let owner = app.register("owner").await;
    let other = app.register("other").await;
    let created = add_address(&app, &owner, address("shipping", "Pune", false)).await;
    let uri = format!("/api/addresses/{}", created["id"].as_str().unwrap());

    let (status, _) = app.call(Method::GET, &uri, None, Some(&other.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(Method::DELETE, &uri, None, Some(&other.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(Method::DELETE, &uri, None, Some(&owner.access)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_user_id_is_a_bad_request() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/users/not-a-uuid/", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().is_some());
}
