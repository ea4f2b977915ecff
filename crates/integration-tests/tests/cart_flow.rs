//! Cart line and shipping operations through the HTTP surface.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::json;

use eastwest_integration_tests::remote::products;
use eastwest_integration_tests::{TestContext, cents, money};

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_new_visitor_has_empty_cart() {
    let ctx = TestContext::new().await;
    let (status, cart) = ctx.get("/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert_eq!(money(&cart["total"]), cents(0));
    assert_eq!(cart["reconcile_status"], "idle");
}

#[tokio::test]
async fn test_add_prices_from_catalog() {
    let ctx = TestContext::new().await;

    let (status, cart) = ctx
        .post(
            "/cart/add",
            json!({ "product_id": products::STRAP, "quantity": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["title"], "Recovery Strap");
    assert_eq!(cart["item_count"], 2);
    assert_eq!(money(&cart["subtotal"]), cents(6_000));

    ctx.post("/cart/add", json!({ "product_id": products::SHACKLES }))
        .await;
    let cart = ctx.settled_cart().await;
    assert_eq!(cart["item_count"], 3);
    assert_eq!(money(&cart["subtotal"]), cents(8_000));
    assert_eq!(money(&cart["total"]), cents(8_000));
    assert!(!ctx.storage.is_empty().await);
}

#[tokio::test]
async fn test_add_rejects_unknown_and_unavailable_products() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.post("/cart/add", json!({ "product_id": 999 })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Product not found");

    let (status, _) = ctx
        .post("/cart/add", json!({ "product_id": products::LIFT_KIT }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx
        .post(
            "/cart/add",
            json!({ "product_id": products::STRAP, "quantity": 0 }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["quantity"].is_string());

    let (_, cart) = ctx.get("/cart").await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_line_quantity_changes() {
    let ctx = TestContext::new().await;
    let (_, cart) = ctx
        .post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let line_id = cart["items"][0]["id"].clone();

    let (_, cart) = ctx
        .post("/cart/increment", json!({ "line_id": line_id }))
        .await;
    assert_eq!(cart["items"][0]["quantity"], 2);

    let (_, cart) = ctx
        .post("/cart/decrement", json!({ "line_id": line_id }))
        .await;
    assert_eq!(cart["items"][0]["quantity"], 1);

    // Decrement floors at one
    let (status, cart) = ctx
        .post("/cart/decrement", json!({ "line_id": line_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"][0]["quantity"], 1);

    let (status, cart) = ctx.post("/cart/remove", json!({ "line_id": line_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert!(ctx.storage.is_empty().await);
}

#[tokio::test]
async fn test_unknown_line_is_not_found() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let (status, body) = ctx
        .post(
            "/cart/increment",
            json!({ "line_id": "00000000-0000-4000-8000-000000000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Cart line not found");
}

#[tokio::test]
async fn test_clear_empties_cart() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.post(
        "/cart/shipping",
        json!({ "method": "ground", "cost": "9.95" }),
    )
    .await;

    let (status, cart) = ctx.post("/cart/clear", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert!(cart["shipping"].is_null());
    assert!(ctx.storage.is_empty().await);
}

#[tokio::test]
async fn test_shipping_selection() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let (status, body) = ctx
        .post("/cart/shipping", json!({ "method": "  ", "cost": "-1" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["method"].is_string());
    assert!(body["fields"]["cost"].is_string());

    let (status, cart) = ctx
        .post(
            "/cart/shipping",
            json!({ "method": "ground", "cost": "9.95", "zip": "84532", "state": "UT" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["shipping"]["method"], "ground");
    assert_eq!(money(&cart["shipping_cost"]), cents(995));
    assert_eq!(money(&cart["total"]), cents(3_995));
}

#[tokio::test]
async fn test_address_check() {
    let ctx = TestContext::new().await;

    let (status, cart) = ctx
        .post("/cart/address-check", json!({ "zip": "84532", "state": "UT" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["address_discount"], true);

    let (_, cart) = ctx
        .post("/cart/address-check", json!({ "zip": "80202", "state": "CO" }))
        .await;
    assert_eq!(cart["address_discount"], false);

    let (status, _) = ctx
        .post("/cart/address-check", json!({ "zip": "", "state": "UT" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_visitors_have_separate_carts() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let other = ctx.second_visitor();
    let (_, cart) = ctx.get_as(&other, "/cart").await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);

    let (_, mine) = ctx.get("/cart").await;
    assert_eq!(mine["items"].as_array().unwrap().len(), 1);
}
