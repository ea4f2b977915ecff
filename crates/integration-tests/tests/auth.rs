//! Sign-in, token refresh, and sign-out.

#![allow(clippy::unwrap_used)]

use reqwest::StatusCode;
use serde_json::{Value, json};

use eastwest_integration_tests::remote::{CUSTOMER_EMAIL, CUSTOMER_PASSWORD, products};
use eastwest_integration_tests::{TestContext, cents, money, utah_address};

async fn sign_in(ctx: &TestContext) -> Value {
    let (status, body) = ctx
        .post(
            "/auth/sign-in",
            json!({ "email": CUSTOMER_EMAIL, "password": CUSTOMER_PASSWORD }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "sign in: {body}");
    body
}

async fn place_order(ctx: &TestContext) {
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    ctx.settled_cart().await;
    let (status, _) = ctx
        .post(
            "/checkout/orders",
            json!({
                "address": utah_address(),
                "email": CUSTOMER_EMAIL,
                "payment_intent_id": "pi_test_1"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx
        .post(
            "/auth/sign-in",
            json!({ "email": CUSTOMER_EMAIL, "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid email or password");

    let (status, body) = ctx
        .post("/auth/sign-in", json!({ "email": "rider", "password": "" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["fields"]["email"].is_string());
    assert!(body["fields"]["password"].is_string());
}

#[tokio::test]
async fn test_sign_in_loads_first_time_discount() {
    let ctx = TestContext::new().await;
    let body = sign_in(&ctx).await;
    assert_eq!(body["customer"]["email"], CUSTOMER_EMAIL);
    assert_eq!(body["first_time_discount"]["eligible"], true);

    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;
    let cart = ctx.settled_cart().await;
    assert_eq!(money(&cart["first_time_discount"]), cents(300));
    assert_eq!(money(&cart["total"]), cents(2_700));
}

#[tokio::test]
async fn test_order_detail_requires_sign_in() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["redirect"], "/auth/sign-in");
}

#[tokio::test]
async fn test_expired_token_is_refreshed() {
    let ctx = TestContext::new().await;
    sign_in(&ctx).await;
    place_order(&ctx).await;

    let (status, order) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["number"], "EWO-1001");

    ctx.remote.expire_access_token();
    let (status, order) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["number"], "EWO-1001");

    // The refreshed token was kept in the session
    let (status, _) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx.get("/orders/42").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_refresh_ends_session() {
    let ctx = TestContext::new().await;
    sign_in(&ctx).await;

    ctx.remote.expire_access_token();
    ctx.remote.disable_refresh();

    let (status, body) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["redirect"], "/auth/sign-in");

    let (status, body) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Sign in required");
}

#[tokio::test]
async fn test_sign_out_clears_cart() {
    let ctx = TestContext::new().await;
    sign_in(&ctx).await;
    ctx.post("/cart/add", json!({ "product_id": products::STRAP }))
        .await;

    let (status, _) = ctx.post("/auth/sign-out", json!({})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let cart = ctx.settled_cart().await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
    assert_eq!(money(&cart["first_time_discount"]), cents(0));

    let (status, _) = ctx.get("/orders/1").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
