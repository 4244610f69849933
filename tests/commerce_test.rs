//! Cart, checkout, order and coupon flows driven through the HTTP router.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{decimal, TestApp, TestUser};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

async fn stocked_product(app: &TestApp, seller: &TestUser, name: &str) -> Value {
    app.create_product(
        seller,
        json!({
            "product_name": name,
            "base_price": "20.00",
            "discount_percentage": "10",
            "stock_quantity": 10,
        }),
    )
    .await
}

async fn add_to_cart(app: &TestApp, user: &TestUser, product: &str, quantity: i32) -> Value {
    let (status, item) = app
        .call(
            Method::POST,
            "/api/cart-items/",
            Some(json!({ "product": product, "quantity": quantity })),
            Some(&user.access),
        )
        .await;
    assert!(status.is_success(), "add to cart failed: {item}");
    item
}

#[tokio::test]
async fn cart_items_always_land_in_the_callers_cart() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let product = stocked_product(&app, &seller, "Silk Tie").await;

    let (status, bob_cart) = app
        .call(Method::POST, "/api/carts/", None, Some(&bob.access))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let bob_cart_id = bob_cart["id"].as_str().unwrap();

    let (status, item) = app
        .call(
            Method::POST,
            "/api/cart-items/",
            Some(json!({ "product": product["id"], "quantity": 1, "cart": bob_cart_id })),
            Some(&alice.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(item["cart"].as_str().unwrap(), bob_cart_id);

    let (_, bob_view) = app
        .call(Method::GET, &format!("/api/carts/{bob_cart_id}"), None, Some(&bob.access))
        .await;
    assert_eq!(bob_view["items"].as_array().unwrap().len(), 0);

    // Alice cannot read Bob's cart either.
    let (status, _) = app
        .call(Method::GET, &format!("/api/carts/{bob_cart_id}"), None, Some(&alice.access))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn adding_the_same_product_merges_lines() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;
    let product = stocked_product(&app, &seller, "Canvas Tote").await;
    let id = product["id"].as_str().unwrap();

    add_to_cart(&app, &buyer, id, 1).await;
    let (status, merged) = app
        .call(
            Method::POST,
            "/api/cart-items",
            Some(json!({ "product": id, "quantity": 2 })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged["quantity"], 3);

    let (_, carts) = app.call(Method::GET, "/api/carts", None, Some(&buyer.access)).await;
    assert_eq!(carts.as_array().unwrap().len(), 1);
    assert_eq!(decimal(&carts[0]["subtotal"]), dec!(54.00));
}

#[tokio::test]
async fn checkout_prices_reserves_and_clears_the_cart() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;
    let product = stocked_product(&app, &seller, "Knit Beanie").await;
    let id = product["id"].as_str().unwrap();
    add_to_cart(&app, &buyer, id, 2).await;

    let (status, order) = app
        .call(
            Method::POST,
            "/api/orders/checkout/",
            Some(json!({ "notes": "gift wrap" })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "checkout failed: {order}");

    // 2 × 18.00, 18% tax, 50.00 flat shipping
    assert_eq!(decimal(&order["subtotal"]), dec!(36.00));
    assert_eq!(decimal(&order["tax_amount"]), dec!(6.48));
    assert_eq!(decimal(&order["shipping_amount"]), dec!(50.00));
    assert_eq!(decimal(&order["total_amount"]), dec!(92.48));
    assert_eq!(order["status"], "pending");
    assert!(order["order_number"].as_str().unwrap().starts_with("WU-"));
    assert_eq!(order["order_items"].as_array().unwrap().len(), 1);

    let (_, fetched) = app
        .call(Method::GET, &format!("/api/products/{id}"), None, None)
        .await;
    assert_eq!(fetched["stock_quantity"], 8);

    let (_, items) = app
        .call(Method::GET, "/api/cart-items", None, Some(&buyer.access))
        .await;
    assert!(items.as_array().unwrap().is_empty());

    let (status, _) = app
        .call(Method::POST, "/api/orders/checkout", None, Some(&buyer.access))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "empty cart must not check out");
}

#[tokio::test]
async fn checkout_fails_without_enough_stock() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;
    let product = stocked_product(&app, &seller, "Rare Sneakers").await;
    let id = product["id"].as_str().unwrap();
    add_to_cart(&app, &buyer, id, 11).await;

    let (status, _) = app
        .call(Method::POST, "/api/orders/checkout", None, Some(&buyer.access))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (_, fetched) = app
        .call(Method::GET, &format!("/api/products/{id}"), None, None)
        .await;
    assert_eq!(fetched["stock_quantity"], 10);
}

#[tokio::test]
async fn order_lines_keep_their_price_after_repricing() {
    let app = TestApp::new().await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;
    let product = stocked_product(&app, &seller, "Leather Belt").await;
    let id = product["id"].as_str().unwrap();
    add_to_cart(&app, &buyer, id, 1).await;

    let (_, order) = app
        .call(Method::POST, "/api/orders/checkout", None, Some(&buyer.access))
        .await;
    let order_id = order["id"].as_str().unwrap();

    let (status, repriced) = app
        .call(
            Method::PATCH,
            &format!("/api/products/{id}/"),
            Some(json!({ "base_price": "99.00", "discount_percentage": "0" })),
            Some(&seller.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&repriced["final_price"]), dec!(99.00));

    let (_, after) = app
        .call(Method::GET, &format!("/api/orders/{order_id}"), None, Some(&buyer.access))
        .await;
    assert_eq!(decimal(&after["order_items"][0]["unit_price"]), dec!(18.00));
    assert_eq!(decimal(&after["total_amount"]), decimal(&order["total_amount"]));
}

#[tokio::test]
async fn shipped_orders_cannot_be_deleted() {
    let app = TestApp::new().await;
    let buyer = app.register("buyer").await;

    let (status, order) = app
        .call(
            Method::POST,
            "/api/orders",
            Some(json!({ "subtotal": "10.00", "shipping_amount": "5.00" })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(decimal(&order["total_amount"]), dec!(15.00));
    let uri = format!("/api/orders/{}", order["id"].as_str().unwrap());

    let (status, shipped) = app
        .call(
            Method::PATCH,
            &uri,
            Some(json!({ "status": "shipped", "tracking_number": "TRK-1" })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["tracking_number"], "TRK-1");

    let (status, _) = app.call(Method::DELETE, &uri, None, Some(&buyer.access)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let stranger = app.register("stranger").await;
    let (status, _) = app.call(Method::GET, &uri, None, Some(&stranger.access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn coupons_are_admin_only_and_discount_checkout() {
    let app = TestApp::new().await;
    let admin = app.register("admin").await;
    app.make_admin(&admin).await;
    let seller = app.register("seller").await;
    let buyer = app.register("buyer").await;

    let coupon = json!({
        "code": "save10",
        "discount_type": "percentage",
        "discount_value": "10",
        "valid_to": (Utc::now() + Duration::days(7)).to_rfc3339(),
    });
    let (status, _) = app
        .call(Method::POST, "/api/coupons/", Some(coupon.clone()), Some(&buyer.access))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .call(Method::POST, "/api/coupons/", Some(coupon), Some(&admin.access))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["code"], "SAVE10");

    let (status, check) = app
        .call(
            Method::GET,
            "/api/coupons/SAVE10/validate?subtotal=100",
            None,
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&check["discount_amount"]), dec!(10.00));

    let product = stocked_product(&app, &seller, "Pleated Skirt").await;
    add_to_cart(&app, &buyer, product["id"].as_str().unwrap(), 1).await;
    let (status, order) = app
        .call(
            Method::POST,
            "/api/orders/checkout",
            Some(json!({ "coupon_code": "save10" })),
            Some(&buyer.access),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["coupon_code"], "SAVE10");
    assert_eq!(decimal(&order["discount_amount"]), dec!(1.80));
}
