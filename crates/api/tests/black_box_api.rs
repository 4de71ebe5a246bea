use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use bazaar_api::app::services::AppServices;
use bazaar_api::config::AppConfig;
use bazaar_auth::{JwtClaims, Role};
use bazaar_core::UserId;
use bazaar_orders::ShippingPolicy;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            shipping: ShippingPolicy::flat(250),
            ..AppConfig::default()
        };
        let services = Arc::new(AppServices::in_memory(config.shipping));

        // Same router as prod, bound to an ephemeral port.
        let app = bazaar_api::app::build_app(&config, services);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(user_id: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: user_id,
        email: Some(format!("{}@example.com", user_id)),
        roles,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token() -> String {
    mint_jwt(UserId::new(), vec![Role::admin()])
}

/// `name=value` of the guest cart cookie set by a response, if any.
fn guest_cookie(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("guest_cart="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

fn address() -> Value {
    json!({
        "fullName": "Ada Buyer",
        "line1": "1 Market Street",
        "city": "Lahore",
        "country": "PK",
        "coordinates": { "lat": 31.52, "lng": 74.35 }
    })
}

async fn create_product(
    client: &reqwest::Client,
    srv: &TestServer,
    slug: &str,
    quantity: i64,
) -> Value {
    let res = client
        .post(srv.url("/admin/products"))
        .bearer_auth(admin_token())
        .json(&json!({
            "slug": slug,
            "name": slug.to_uppercase(),
            "price": 1000,
            "quantity": quantity,
            "lowStockThreshold": 2
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn product_page(client: &reqwest::Client, srv: &TestServer, slug: &str) -> Value {
    let res = client.get(srv.url(&format!("/products/{slug}"))).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_routes_require_the_admin_role() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = json!({ "slug": "tea", "name": "Tea", "price": 100 });

    let res = client.post(srv.url("/admin/products")).json(&body).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let customer = mint_jwt(UserId::new(), vec![Role::customer()]);
    let res = client
        .post(srv.url("/admin/products"))
        .bearer_auth(customer)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invalid_token_is_rejected_not_downgraded() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .get(srv.url("/cart"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn guest_cart_lives_in_the_cookie() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": product["id"], "quantity": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = guest_cookie(&res).expect("guest cart cookie");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["itemCount"], 2);

    let res = client.get(srv.url("/cart")).header("cookie", &cookie).send().await.unwrap();
    let cart: Value = res.json().await.unwrap();
    assert_eq!(cart["itemCount"], 2);
    assert_eq!(cart["subtotal"], 2000);
    assert_eq!(cart["items"][0]["isInStock"], true);
    assert_eq!(cart["items"][0]["availableQuantity"], 10);

    // Over the per-line limit: rejected, cookie untouched.
    let res = client
        .post(srv.url("/add-to-cart"))
        .header("cookie", &cookie)
        .json(&json!({ "productId": product["id"], "quantity": 101 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(guest_cookie(&res).is_none());

    // Beyond stock: 2 in cart, 10 on hand.
    let res = client
        .post(srv.url("/add-to-cart"))
        .header("cookie", &cookie)
        .json(&json!({ "productId": product["id"], "quantity": 9 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(err["availableQuantity"], 10);
    assert_eq!(err["currentInCart"], 2);
    assert_eq!(err["availableToAdd"], 8);

    let res = client.post(srv.url("/clear-cart")).header("cookie", &cookie).send().await.unwrap();
    let cleared = guest_cookie(&res).unwrap();
    assert_eq!(cleared, "guest_cart=");
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "itemCount": 0, "items": [] }));
}

#[tokio::test]
async fn update_cart_rechecks_stock_and_zero_removes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = admin_token();
    let tea = create_product(&client, &srv, "tea", 10).await;
    let mug = create_product(&client, &srv, "mug", 10).await;

    let update = |cookie: &str, product: &Value, quantity: i64| {
        client
            .post(srv.url("/update-cart"))
            .header("cookie", cookie.to_string())
            .json(&json!({ "productId": product["id"], "quantity": quantity }))
            .send()
    };

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": tea["id"], "quantity": 2 }))
        .send()
        .await
        .unwrap();
    let cookie = guest_cookie(&res).unwrap();

    let res = update(&cookie, &tea, 4).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = guest_cookie(&res).unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["itemCount"], 4);

    let res = update(&cookie, &tea, 11).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(guest_cookie(&res).is_none());
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(err["availableQuantity"], 10);
    assert_eq!(err["currentInCart"], 4);

    let res = update(&cookie, &mug, 1).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let tea_id = tea["id"].as_str().unwrap();
    let res = client
        .put(srv.url(&format!("/admin/products/{tea_id}")))
        .bearer_auth(&admin)
        .json(&json!({ "stockStatus": "discontinued" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = update(&cookie, &tea, 3).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "product_unavailable");
    assert_eq!(err["scope"], "product");
    assert_eq!(err["reason"], "discontinued");

    let res = update(&cookie, &tea, 0).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(guest_cookie(&res).as_deref(), Some("guest_cart="));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "itemCount": 0, "items": [] }));
}

#[tokio::test]
async fn malformed_quantities_are_bad_requests() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;

    for quantity in [json!(1.5), json!("2"), json!(0), json!(-1)] {
        let res = client
            .post(srv.url("/add-to-cart"))
            .json(&json!({ "productId": product["id"], "quantity": quantity }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "quantity {quantity}");
    }
}

#[tokio::test]
async fn remove_of_missing_line_is_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;
    let token = mint_jwt(UserId::new(), vec![Role::customer()]);

    let res = client
        .post(srv.url("/remove-from-cart"))
        .bearer_auth(&token)
        .json(&json!({ "productId": product["id"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guest_checkout_then_delete_restores_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": product["id"], "quantity": 3 }))
        .send()
        .await
        .unwrap();
    let cookie = guest_cookie(&res).unwrap();

    let res = client
        .post(srv.url("/create-order"))
        .header("cookie", &cookie)
        .json(&json!({
            "shippingAddress": address(),
            "paymentMethod": "cod",
            "currency": "usd",
            "guestEmail": "guest@example.com"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(guest_cookie(&res).as_deref(), Some("guest_cart="));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["order"]["total"], 3250);
    assert_eq!(body["order"]["status"], "pending");
    assert!(body["order"]["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    let page = product_page(&client, &srv, "tea").await;
    assert_eq!(page["product"]["quantity"], 7);
    assert_eq!(page["product"]["totalSold"], 3);

    let order_id = body["order"]["id"].as_str().unwrap();
    let res = client
        .delete(srv.url(&format!("/admin/orders/{order_id}")))
        .bearer_auth(admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: Value = res.json().await.unwrap();
    assert_eq!(report["restoredLines"], 1);

    let page = product_page(&client, &srv, "tea").await;
    assert_eq!(page["product"]["quantity"], 10);
    assert_eq!(page["product"]["totalSold"], 0);

    let res = client
        .delete(srv.url(&format!("/admin/orders/{order_id}")))
        .bearer_auth(admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn checkout_requires_coordinates_and_items() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(UserId::new(), vec![Role::customer()]);

    let mut no_coordinates = address();
    no_coordinates.as_object_mut().unwrap().remove("coordinates");
    let res = client
        .post(srv.url("/create-order"))
        .bearer_auth(&token)
        .json(&json!({
            "shippingAddress": no_coordinates,
            "paymentMethod": "cod",
            "currency": "usd"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/create-order"))
        .bearer_auth(&token)
        .json(&json!({ "shippingAddress": address(), "paymentMethod": "cod", "currency": "usd" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "empty_cart");
}

#[tokio::test]
async fn repeated_submission_returns_the_first_order() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;
    let token = mint_jwt(UserId::new(), vec![Role::customer()]);

    let body = json!({
        "shippingAddress": address(),
        "paymentMethod": "cod",
        "currency": "usd",
        "items": [{ "productId": product["id"], "quantity": 4 }]
    });

    let mut ids = Vec::new();
    for _ in 0..2 {
        let res = client
            .post(srv.url("/create-order"))
            .bearer_auth(&token)
            .header("Idempotency-Key", "checkout-1")
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created: Value = res.json().await.unwrap();
        ids.push(created["order"]["id"].clone());
    }
    assert_eq!(ids[0], ids[1]);

    let page = product_page(&client, &srv, "tea").await;
    assert_eq!(page["product"]["quantity"], 6);
}

#[tokio::test]
async fn merge_sums_guest_and_user_lines_and_clears_the_cookie() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let product = create_product(&client, &srv, "tea", 10).await;
    let token = mint_jwt(UserId::new(), vec![Role::customer()]);

    let res = client
        .post(srv.url("/add-to-cart"))
        .bearer_auth(&token)
        .json(&json!({ "productId": product["id"], "quantity": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": product["id"], "quantity": 2 }))
        .send()
        .await
        .unwrap();
    let cookie = guest_cookie(&res).unwrap();

    let res = client
        .post(srv.url("/merge-cart"))
        .bearer_auth(&token)
        .header("cookie", &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(guest_cookie(&res).as_deref(), Some("guest_cart="));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["itemCount"], 5);
    assert!(body.get("warnings").is_none());

    let res = client.get(srv.url("/cart")).bearer_auth(&token).send().await.unwrap();
    let cart: Value = res.json().await.unwrap();
    assert_eq!(cart["items"][0]["quantity"], 5);
}

#[tokio::test]
async fn merge_requires_a_signed_in_shopper() {
    let srv = TestServer::spawn().await;
    let res = reqwest::Client::new()
        .post(srv.url("/merge-cart"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn discontinued_product_blocks_its_variants() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = admin_token();
    let product = create_product(&client, &srv, "kettle", 0).await;
    let product_id = product["id"].as_str().unwrap().to_string();

    let res = client
        .post(srv.url(&format!("/admin/products/{product_id}/variants")))
        .bearer_auth(&admin)
        .json(&json!({
            "sku": "KET-RED",
            "quantity": 5,
            "isDefault": true,
            "options": { "color": "red" }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let variant: Value = res.json().await.unwrap();

    let res = client
        .post(srv.url(&format!("/admin/products/{product_id}/variants")))
        .bearer_auth(&admin)
        .json(&json!({ "sku": "KET-RED" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let page = product_page(&client, &srv, "kettle").await;
    assert_eq!(page["defaultVariantId"], variant["id"]);
    assert_eq!(page["purchasable"], true);

    let res = client
        .put(srv.url(&format!("/admin/products/{product_id}")))
        .bearer_auth(&admin)
        .json(&json!({ "stockStatus": "discontinued" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": product_id, "variantId": variant["id"], "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "product_unavailable");
    assert_eq!(err["scope"], "product");
    assert_eq!(err["reason"], "discontinued");
}

#[tokio::test]
async fn order_status_transitions_are_enforced() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let admin = admin_token();
    let product = create_product(&client, &srv, "tea", 10).await;

    let res = client
        .post(srv.url("/create-order"))
        .json(&json!({
            "shippingAddress": address(),
            "paymentMethod": "cod",
            "currency": "usd",
            "guestEmail": "guest@example.com",
            "items": [{ "productId": product["id"], "quantity": 1 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let order_url = srv.url(&format!("/admin/orders/{}", created["order"]["id"].as_str().unwrap()));

    let res = client
        .patch(&order_url)
        .bearer_auth(&admin)
        .json(&json!({ "status": "delivered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .patch(&order_url)
        .bearer_auth(&admin)
        .json(&json!({
            "status": "processing",
            "paymentStatus": "paid",
            "trackingNumber": "TRK-1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(&order_url).bearer_auth(&admin).send().await.unwrap();
    let order: Value = res.json().await.unwrap();
    assert_eq!(order["status"], "processing");
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["trackingNumber"], "TRK-1");
    assert_eq!(order["total"], 1250);
}

#[tokio::test]
async fn unknown_products_are_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/products/nope")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(srv.url("/add-to-cart"))
        .json(&json!({ "productId": bazaar_core::ProductId::new(), "quantity": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/admin/orders/not-a-uuid"))
        .bearer_auth(admin_token())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
