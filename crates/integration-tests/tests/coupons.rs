//! Coupon auto-apply, manual coupons, and debounced reconciliation.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use eastwest_integration_tests::remote::{fixed_coupon, products};
use eastwest_integration_tests::{StubRemote, TEST_DEBOUNCE, TestContext, cents, money};

/// Long enough that a handful of requests land inside one window.
const WIDE_DEBOUNCE: Duration = Duration::from_millis(300);

/// $5 off orders of $25 or more, applied automatically.
fn trail5() -> StubRemote {
    let remote = StubRemote::new();
    remote.add_coupon(fixed_coupon("TRAIL5", 500, Some(2_500), true));
    remote
}

/// $10 off orders of $50 or more, entered by hand.
fn with_min50(remote: StubRemote) -> StubRemote {
    remote.add_coupon(fixed_coupon("MIN50", 1_000, Some(5_000), false));
    remote
}

#[tokio::test]
async fn test_auto_applies_after_window() {
    let ctx = TestContext::start(trail5(), TEST_DEBOUNCE).await;

    let (_, cart) = ctx
        .post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    assert_eq!(cart["reconcile_status"], "scheduled");
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);

    let cart = ctx.settled_cart().await;
    assert_eq!(cart["coupons"][0]["code"], "TRAIL5");
    assert_eq!(money(&cart["discount_total"]), cents(500));
    assert_eq!(money(&cart["total"]), cents(2_500));
    assert_eq!(ctx.remote.eligible_calls(), 1);
}

#[tokio::test]
async fn test_rapid_changes_make_one_call() {
    let ctx = TestContext::start(trail5(), WIDE_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::SHACKLES }))
        .await;
    ctx.post("/cart/add", json!({ "product_id": products::SHACKLES }))
        .await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let cart = ctx.settled_cart().await;
    assert_eq!(ctx.remote.eligible_calls(), 1);
    assert_eq!(money(&cart["subtotal"]), cents(7_000));
    assert_eq!(cart["coupons"][0]["code"], "TRAIL5");
}

#[tokio::test]
async fn test_below_minimum_coupon_not_applied() {
    let ctx = TestContext::start(trail5(), TEST_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::SHACKLES }))
        .await;
    let cart = ctx.settled_cart().await;
    assert_eq!(ctx.remote.eligible_calls(), 1);
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);
    assert_eq!(money(&cart["total"]), cents(2_000));
}

#[tokio::test]
async fn test_manual_coupon_applies_and_is_withdrawn() {
    let ctx = TestContext::start(with_min50(StubRemote::new()), TEST_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::ROOF_RACK }))
        .await;
    let (_, cart) = ctx
        .post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let rack_line = cart["items"][0]["id"].clone();
    ctx.settled_cart().await;

    let (status, cart) = ctx.post("/cart/coupons", json!({ "code": " min50 " })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["coupons"][0]["code"], "MIN50");
    assert_eq!(money(&cart["discount_total"]), cents(1_000));
    // Applying a coupon does not itself reconcile
    assert_eq!(cart["reconcile_status"], "idle");

    // Dropping to $30 takes the cart below the coupon's minimum
    ctx.post("/cart/remove", json!({ "line_id": rack_line }))
        .await;
    let cart = ctx.settled_cart().await;
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);
    assert_eq!(money(&cart["total"]), cents(3_000));
}

#[tokio::test]
async fn test_manual_coupon_rejections() {
    let ctx = TestContext::start(with_min50(StubRemote::new()), TEST_DEBOUNCE).await;

    let (status, body) = ctx.post("/cart/coupons", json!({ "code": "MIN50" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "empty_cart");

    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let (status, body) = ctx.post("/cart/coupons", json!({ "code": "MIN50" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "below_minimum");

    let (status, body) = ctx.post("/cart/coupons", json!({ "code": "NOPE" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Coupon not found");

    let (status, body) = ctx
        .post("/cart/coupons", json!({ "code": "not a code!" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["code"].is_string());
}

#[tokio::test]
async fn test_remove_coupon() {
    let ctx = TestContext::start(trail5(), TEST_DEBOUNCE).await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.settled_cart().await;

    let (status, cart) = ctx.delete("/cart/coupons/TRAIL5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);
    assert_eq!(money(&cart["total"]), cents(3_000));

    let (status, _) = ctx.delete("/cart/coupons/TRAIL5").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_all_coupons_keeps_items() {
    let ctx = TestContext::start(trail5(), TEST_DEBOUNCE).await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.settled_cart().await;

    let (status, cart) = ctx.delete("/cart/coupons").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);
    assert_eq!(cart["items"].as_array().unwrap().len(), 1);
    assert_eq!(cart["reconcile_status"], "idle");
}

#[tokio::test]
async fn test_clear_inside_window_makes_no_call() {
    let ctx = TestContext::start(trail5(), WIDE_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let (_, cart) = ctx.post("/cart/clear", json!({})).await;
    assert_eq!(cart["reconcile_status"], "idle");

    tokio::time::sleep(WIDE_DEBOUNCE * 2).await;
    assert_eq!(ctx.remote.eligible_calls(), 0);
}

#[tokio::test]
async fn test_removing_last_line_makes_no_call() {
    let ctx = TestContext::start(trail5(), WIDE_DEBOUNCE).await;

    let (_, cart) = ctx
        .post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let line_id = cart["items"][0]["id"].clone();
    ctx.post("/cart/remove", json!({ "line_id": line_id }))
        .await;

    tokio::time::sleep(WIDE_DEBOUNCE * 2).await;
    assert_eq!(ctx.remote.eligible_calls(), 0);
    let cart = ctx.settled_cart().await;
    assert_eq!(cart["coupons"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_remote_failure_keeps_coupons() {
    let ctx = TestContext::start(trail5(), TEST_DEBOUNCE).await;

    let (_, cart) = ctx
        .post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let line_id = cart["items"][0]["id"].clone();
    ctx.settled_cart().await;

    ctx.remote.fail_eligible(true);
    ctx.post("/cart/increment", json!({ "line_id": line_id }))
        .await;
    let cart = ctx.settled_cart().await;

    assert_eq!(ctx.remote.eligible_calls(), 2);
    assert_eq!(cart["coupons"][0]["code"], "TRAIL5");
    assert_eq!(money(&cart["subtotal"]), cents(6_000));
}

#[tokio::test]
async fn test_shipping_change_without_coupons_makes_no_call() {
    let ctx = TestContext::start(StubRemote::new(), TEST_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.settled_cart().await;
    assert_eq!(ctx.remote.eligible_calls(), 1);

    ctx.post(
        "/cart/shipping",
        json!({ "method": "ground", "cost": "9.95" }),
    )
    .await;
    ctx.settled_cart().await;
    assert_eq!(ctx.remote.eligible_calls(), 1);
}
