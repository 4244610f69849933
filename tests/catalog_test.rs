//! Catalog and social flows driven through the HTTP router.

mod common;

use std::{collections::HashSet, sync::Arc};

use axum::http::{Method, StatusCode};
use common::{decimal, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::task::JoinSet;

/// The eight-byte PNG signature, enough to pass image sniffing.
const PNG_DATA_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

#[tokio::test]
async fn red_scarf_pricing_and_like_toggle() {
    let app = TestApp::new().await;
    let alice = app.register("alice").await;

    let product = app
        .create_product(
            &alice,
            json!({
                "product_name": "Red Scarf",
                "base_price": "20.00",
                "discount_percentage": "10",
                "gender": "Women",
                "stock_quantity": 5,
            }),
        )
        .await;
    let id = product["id"].as_str().unwrap().to_string();
    assert_eq!(product["slug"], "red-scarf");

    let (status, fetched) = app
        .call(Method::GET, &format!("/api/products/{id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&fetched["final_price"]), dec!(18.00));
    assert_eq!(decimal(&fetched["price"]), dec!(18.00));
    assert_eq!(fetched["seller"]["handle"], "@alice");

    let toggle = format!("/api/products/{id}/toggle-like/");
    let (status, liked) = app
        .call(Method::POST, &toggle, None, Some(&alice.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["likes_count"], 1);

    let (_, seen) = app
        .call(Method::GET, &format!("/api/products/{id}"), None, Some(&alice.access))
        .await;
    assert_eq!(seen["likes"], 1);
    assert_eq!(seen["user_liked"], true);

    let (_, unliked) = app
        .call(Method::POST, &toggle, None, Some(&alice.access))
        .await;
    assert_eq!(unliked["liked"], false);
    assert_eq!(unliked["likes_count"], 0);
}

#[tokio::test]
async fn duplicate_names_get_suffixed_slugs() {
    let app = TestApp::new().await;
    let seller = app.register("shirtmaker").await;
    let body = json!({ "product_name": "Blue Shirt", "base_price": "30.00", "gender": "Men" });

    let first = app.create_product(&seller, body.clone()).await;
    let second = app.create_product(&seller, body).await;

    assert_eq!(first["slug"], "blue-shirt");
    assert_eq!(second["slug"], "blue-shirt-1");
}

#[tokio::test]
async fn product_in_an_order_cannot_be_deleted() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;

    let product = app
        .create_product(
            &seller,
            json!({ "product_name": "Linen Trousers", "base_price": "45.00", "stock_quantity": 3 }),
        )
        .await;
    let id = product["id"].as_str().unwrap();

    let (status, _) = app
        .call(
            Method::POST,
            "/api/cart-items/",
            Some(json!({ "product": id, "quantity": 1 })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call(Method::POST, "/api/orders/checkout/", None, Some(&buyer.access))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/products/{id}/"), None, Some(&seller.access))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().is_some());

    let (status, _) = app
        .call(Method::GET, &format!("/api/products/{id}/"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unreferenced_product_is_deleted() {
    let app = TestApp::new().await;
    let seller = app.register("tidy").await;
    let product = app
        .create_product(&seller, json!({ "product_name": "Sample", "base_price": "1.00" }))
        .await;
    let uri = format!("/api/products/{}", product["id"].as_str().unwrap());

    let (status, _) = app.call(Method::DELETE, &uri, None, Some(&seller.access)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn listing_is_paginated_and_slash_insensitive() {
    let app = TestApp::new().await;
    let seller = app.register("pager").await;
    for name in ["Alpha Tee", "Beta Tee", "Gamma Tee"] {
        app.create_product(&seller, json!({ "product_name": name, "base_price": "10.00" }))
            .await;
    }

    for uri in ["/api/products?per_page=2", "/api/products/?per_page=2"] {
        let (status, page) = app.call(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["data"].as_array().unwrap().len(), 2);
        assert_eq!(page["pagination"]["total"], 3);
        assert_eq!(page["pagination"]["total_pages"], 2);
    }

    let (_, found) = app
        .call(Method::GET, "/api/products?search=gamma", None, None)
        .await;
    assert_eq!(found["pagination"]["total"], 1);
    assert_eq!(found["data"][0]["product_name"], "Gamma Tee");
}

#[tokio::test]
async fn invalid_product_payload_reports_fields() {
    let app = TestApp::new().await;
    let seller = app.register("sloppy").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/products/",
            Some(json!({ "product_name": "", "base_price": "-1" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["details"]["product_name"].is_array());
    assert!(body["details"]["base_price"].is_array());
}

#[tokio::test]
async fn creating_products_requires_authentication() {
    let app = TestApp::new().await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/products/",
            Some(json!({ "product_name": "Ghost", "base_price": "1.00" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn comment_threads_nest_one_level() {
    let app = TestApp::new().await;
    let seller = app.register("threads").await;
    let fan = app.register("fan").await;
    let product = app
        .create_product(&seller, json!({ "product_name": "Wool Coat", "base_price": "120.00" }))
        .await;
    let id = product["id"].as_str().unwrap();

    let (status, root) = app
        .call(
            Method::POST,
            "/api/product-comments/",
            Some(json!({ "product": id, "content": "Does it run small?" })),
            Some(&fan.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let root_id = root["id"].as_str().unwrap();

    let (status, _) = app
        .call(
            Method::POST,
            "/api/product-comments/",
            Some(json!({ "product": id, "content": "True to size.", "parent": root_id })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, threads) = app
        .call(Method::GET, &format!("/api/product-comments?product={id}"), None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let threads = threads.as_array().unwrap();
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0]["replies"][0]["content"], "True to size.");

    // Only the author may edit.
    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/product-comments/{root_id}"),
            Some(json!({ "content": "edited" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn taxonomy_is_collected_from_products() {
    let app = TestApp::new().await;
    let seller = app.register("tagger").await;
    app.create_product(
        &seller,
        json!({
            "product_name": "Denim Jacket",
            "base_price": "80.00",
            "sizes": ["M", "L"],
            "categories": "[\"Outerwear\"]",
        }),
    )
    .await;

    let (status, sizes) = app.call(Method::GET, "/api/sizes/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sizes.as_array().unwrap().len(), 2);

    let (_, categories) = app.call(Method::GET, "/api/categories", None, None).await;
    assert_eq!(categories[0]["name"], "Outerwear");
}

#[tokio::test]
async fn shares_are_append_only() {
    let app = TestApp::new().await;
    let seller = app.register("sharer").await;
    let fan = app.register("fan").await;
    let product = app
        .create_product(&seller, json!({ "product_name": "Cord Jacket", "base_price": "70.00" }))
        .await;
    let share = format!("/api/products/{}/share/", product["id"].as_str().unwrap());

    let (status, _) = app.call(Method::POST, &share, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for expected in 1..=3 {
        let (status, shared) = app.call(Method::POST, &share, None, Some(&fan.access)).await;
        assert_eq!(status, StatusCode::OK, "share failed: {shared}");
        assert_eq!(shared["shared"], true);
        assert_eq!(shared["platform"], "copy_link");
        assert_eq!(shared["shares_count"], expected);
    }

    let (_, mine) = app
        .call(Method::GET, "/api/product-shares", None, Some(&fan.access))
        .await;
    assert_eq!(mine.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn retrieving_a_product_counts_views() {
    let app = TestApp::new().await;
    let seller = app.register("viewed").await;
    let product = app
        .create_product(&seller, json!({ "product_name": "Suede Loafers", "base_price": "90.00" }))
        .await;
    let uri = format!("/api/products/{}", product["id"].as_str().unwrap());

    let (_, first) = app.call(Method::GET, &uri, None, None).await;
    let (_, second) = app.call(Method::GET, &uri, None, None).await;
    let (_, third) = app.call(Method::GET, &uri, None, Some(&seller.access)).await;

    let views = |v: &serde_json::Value| v["views"].as_i64().unwrap();
    assert!(views(&first) >= 1);
    assert!(views(&second) > views(&first));
    assert!(views(&third) > views(&second));
}

#[tokio::test]
async fn patch_leaves_omitted_relations_untouched() {
    let app = TestApp::new().await;
    let seller = app.register("patcher").await;
    let product = app
        .create_product(
            &seller,
            json!({
                "product_name": "Rain Parka",
                "base_price": "20.00",
                "gender": "Women",
                "sizes": ["M", "L"],
                "categories": "[\"Outerwear\"]",
                "main_image": PNG_DATA_URI,
            }),
        )
        .await;
    let uri = format!("/api/products/{}/", product["id"].as_str().unwrap());
    let image = product["image"].as_str().expect("main image url").to_string();

    let (status, patched) = app
        .call(
            Method::PATCH,
            &uri,
            Some(json!({ "base_price": "10.00", "discount_percentage": "33.33" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "patch failed: {patched}");
    assert_eq!(decimal(&patched["final_price"]), dec!(6.67));
    assert_eq!(patched["sizes"], json!(["L", "M"]));
    assert_eq!(patched["categories"], json!(["Outerwear"]));
    assert_eq!(patched["image"], image);
    assert_eq!(patched["images"].as_array().unwrap().len(), 1);

    // An empty encoded list is not a clear.
    let (status, same) = app
        .call(Method::PATCH, &uri, Some(json!({ "sizes": "" })), Some(&seller.access))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(same["sizes"], json!(["L", "M"]));

    let (status, _) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "product_name": "Rain Parka II" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "PUT must carry gender");

    let (status, replaced) = app
        .call(
            Method::PUT,
            &uri,
            Some(json!({ "product_name": "Rain Parka II", "gender": "Unisex" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "put failed: {replaced}");
    assert_eq!(replaced["product_name"], "Rain Parka II");
    assert_eq!(replaced["sizes"], json!(["L", "M"]));
}

#[tokio::test]
async fn bad_image_aborts_the_whole_update() {
    let app = TestApp::new().await;
    let seller = app.register("atomic").await;
    let product = app
        .create_product(
            &seller,
            json!({
                "product_name": "Silk Blouse",
                "base_price": "40.00",
                "sizes": ["S"],
                "main_image": PNG_DATA_URI,
            }),
        )
        .await;
    let uri = format!("/api/products/{}", product["id"].as_str().unwrap());

    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some(json!({
                "base_price": "5.00",
                "sizes": ["XL"],
                "main_image": "not-base64!!",
            })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("main_image"));

    let (_, after) = app.call(Method::GET, &uri, None, None).await;
    assert_eq!(decimal(&after["base_price"]), dec!(40.00));
    assert_eq!(after["sizes"], json!(["S"]));
    assert_eq!(after["image"], product["image"]);
}

#[tokio::test]
async fn malformed_ids_use_the_error_envelope() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(Method::GET, "/api/products/not-a-uuid/", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");
    assert!(body["message"].as_str().unwrap().starts_with("Invalid path parameter"));
    assert!(body["timestamp"].as_str().is_some());

    let (status, body) = app
        .call(Method::GET, "/api/products?page=first", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid query string"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_succeed_or_ask_for_retry() {
    let app = Arc::new(TestApp::new().await);
    let seller = app.register("racer").await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let app = Arc::clone(&app);
        let token = seller.access.clone();
        tasks.spawn(async move {
            app.call(
                Method::POST,
                "/api/products/",
                Some(json!({ "product_name": "Blue Shirt", "base_price": "30.00" })),
                Some(&token),
            )
            .await
        });
    }

    let mut slugs = HashSet::new();
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.expect("create task panicked");
        match status {
            StatusCode::CREATED => {
                let slug = body["slug"].as_str().unwrap().to_string();
                assert!(slugs.insert(slug), "duplicate slug in {body}");
            }
            StatusCode::CONFLICT => {
                assert!(body["message"].as_str().unwrap().contains("retry"), "{body}");
            }
            other => panic!("unexpected {other}: {body}"),
        }
    }
    assert!(slugs.contains("blue-shirt"));
}
