//! Guest cart save/restore and the checkout flow.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use eastwest_integration_tests::remote::{fixed_coupon, products};
use eastwest_integration_tests::{
    StubRemote, TEST_DEBOUNCE, TestContext, cents, money, utah_address,
};

const GUEST_EMAIL: &str = "trail@example.com";

#[tokio::test]
async fn test_guest_cart_moves_between_visitors() {
    let remote = StubRemote::new();
    remote.add_coupon(fixed_coupon("TRAIL5", 500, Some(2_500), true));
    let ctx = TestContext::start(remote, TEST_DEBOUNCE).await;

    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.post("/cart/add", json!({ "product_id": products::SHACKLES }))
        .await;
    let cart = ctx.settled_cart().await;
    assert_eq!(cart["coupons"][0]["code"], "TRAIL5");

    let (status, saved) = ctx.post("/cart/guest", json!({ "email": GUEST_EMAIL })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["items"].as_array().unwrap().len(), 2);
    assert_eq!(saved["coupons"][0], "TRAIL5");
    assert!(ctx.remote.guest_cart(GUEST_EMAIL).is_some());

    // Saving again updates in place
    let (status, _) = ctx.post("/cart/guest", json!({ "email": GUEST_EMAIL })).await;
    assert_eq!(status, StatusCode::OK);

    let other = ctx.second_visitor();
    let (status, restored) = ctx
        .get_as(&other, &format!("/cart/guest?email={GUEST_EMAIL}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["items"].as_array().unwrap().len(), 2);
    assert_eq!(money(&restored["subtotal"]), cents(5_000));
    assert_eq!(restored["coupons"][0]["code"], "TRAIL5");
    assert_eq!(money(&restored["total"]), cents(4_500));

    // Restored carts are written to the cart cache
    assert_eq!(ctx.storage.len().await, 2);
}

#[tokio::test]
async fn test_guest_cart_errors() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx.post("/cart/guest", json!({ "email": GUEST_EMAIL })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx.post("/cart/guest", json!({ "email": "not-an-email" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["email"].is_string());

    let (status, body) = ctx
        .get(&format!("/cart/guest?email={GUEST_EMAIL}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Guest cart not found");
}

#[tokio::test]
async fn test_delete_guest_cart() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.post("/cart/guest", json!({ "email": GUEST_EMAIL })).await;

    let path = format!("/cart/guest?email={GUEST_EMAIL}");
    let (status, body) = ctx.delete(&path).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    assert!(ctx.remote.guest_cart(GUEST_EMAIL).is_none());

    let (status, _) = ctx.delete(&path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_tax_and_payment_intent() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::ROOF_RACK }))
        .await;
    ctx.settled_cart().await;

    let (status, totals) = ctx
        .post("/checkout/tax", json!({ "address": utah_address() }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&totals["subtotal"]), cents(25_000));
    assert_eq!(money(&totals["tax"]), cents(1_250));
    assert_eq!(money(&totals["total"]), cents(26_250));

    let (status, intent) = ctx
        .post(
            "/checkout/payment-intent",
            json!({ "address": utah_address(), "email": GUEST_EMAIL }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["id"], "pi_test_1");
    assert_eq!(money(&intent["amount"]), cents(26_250));
}

#[tokio::test]
async fn test_checkout_rejected_while_coupons_reconcile() {
    let ctx = TestContext::with_debounce(Duration::from_secs(1)).await;
    ctx.post("/cart/add", json!({ "product_id": products::ROOF_RACK }))
        .await;

    let body = json!({ "address": utah_address(), "email": GUEST_EMAIL });
    let (status, error) = ctx.post("/checkout/payment-intent", body.clone()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error["error"].as_str().unwrap().contains("try again"));

    let (status, _) = ctx
        .post(
            "/checkout/orders",
            json!({
                "address": utah_address(),
                "email": GUEST_EMAIL,
                "payment_intent_id": "pi_test_1"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(ctx.remote.orders().is_empty());

    ctx.settled_cart().await;
    let (status, _) = ctx.post("/checkout/payment-intent", body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_requires_items_and_address() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx
        .post("/checkout/tax", json!({ "address": utah_address() }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut address = utah_address();
    address["zip"] = json!("");
    let (status, body) = ctx.post("/checkout/tax", json!({ "address": address })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["address.zip"].is_string());
}

#[tokio::test]
async fn test_place_order_clears_cart() {
    let ctx = TestContext::new().await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.settled_cart().await;

    let (status, body) = ctx
        .post(
            "/checkout/orders",
            json!({ "address": utah_address(), "email": "nope", "payment_intent_id": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["email"].is_string());
    assert!(body["fields"]["payment_intent_id"].is_string());

    let (status, order) = ctx
        .post(
            "/checkout/orders",
            json!({
                "address": utah_address(),
                "email": GUEST_EMAIL,
                "payment_intent_id": "pi_test_1"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["number"], "EWO-1001");
    assert_eq!(money(&order["total"]), cents(3_150));

    let placed = ctx.remote.orders();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].payment_intent_id, "pi_test_1");

    let (_, cart) = ctx.get("/cart").await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert!(ctx.storage.is_empty().await);

    let (status, tracking) = ctx
        .get(&format!("/orders/track?number=EWO-1001&email={GUEST_EMAIL}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tracking["status"], "processing");

    let (status, _) = ctx
        .get("/orders/track?number=EWO-9999&email=trail@example.com")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
