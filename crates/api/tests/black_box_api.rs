use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use serde_json::{json, Value};

use flashsale_api::app::{self, services::AppServices};
use flashsale_core::{ManualClock, OrderId, ProductId};
use flashsale_infra::ReservationSettings;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    clock: Arc<ManualClock>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let settings = ReservationSettings {
            order_lookup_attempts: 3,
            order_lookup_delay: Duration::from_millis(20),
            ..ReservationSettings::default()
        };
        let services = Arc::new(AppServices::in_memory(&settings, clock.clone()));

        // Same router as prod, bound to an ephemeral port.
        let app = app::build_app(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            clock,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn product(&self, stock: i64) -> String {
        self.services
            .insert_product("Limited Sneaker", 2_500, stock)
            .await
            .unwrap()
            .id
            .to_string()
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn available(&self, product_id: &str) -> i64 {
        let (status, body) = self.get(&format!("/products/{product_id}")).await;
        assert_eq!(status, StatusCode::OK);
        body["available_stock"].as_i64().unwrap()
    }

    async fn hold(&self, product_id: &str, quantity: i64) -> String {
        let (status, body) = self
            .post("/holds", json!({"product_id": product_id, "quantity": quantity}))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["hold_id"].as_str().unwrap().to_string()
    }

    async fn order(&self, hold_id: &str) -> String {
        let (status, body) = self.post("/orders", json!({"hold_id": hold_id})).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["order_id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn product_shows_committed_and_available_stock() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(10).await;

    let (status, body) = srv.get(&format!("/products/{product_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], product_id);
    assert_eq!(body["name"], "Limited Sneaker");
    assert_eq!(body["price"], 2_500);
    assert_eq!(body["stock"], 10);
    assert_eq!(body["available_stock"], 10);
}

#[tokio::test]
async fn unknown_and_malformed_products() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv.get(&format!("/products/{}", OrderId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = srv.get("/products/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn hold_order_pay_lifecycle() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(10).await;

    let (status, body) = srv
        .post("/holds", json!({"product_id": product_id, "quantity": 3}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["expires_at"].is_string());
    let hold_id = body["hold_id"].as_str().unwrap().to_string();
    assert_eq!(srv.available(&product_id).await, 7);

    let (status, body) = srv.post("/orders", json!({"hold_id": hold_id})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["total_price"], 7_500);
    let order_id = body["order_id"].as_str().unwrap().to_string();
    assert_eq!(srv.available(&product_id).await, 7);

    let (status, body) = srv
        .post(
            "/payments/webhook",
            json!({"idempotency_key": "pay-1", "order_id": order_id, "status": "success"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment successful");
    assert_eq!(body["order_status"], "paid");
    assert_eq!(body["replayed"], false);

    let (_, product) = srv.get(&format!("/products/{product_id}")).await;
    assert_eq!(product["stock"], 7);
    assert_eq!(product["available_stock"], 7);

    let (status, body) = srv.get(&format!("/orders/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");
}

#[tokio::test]
async fn hold_rejections() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(2).await;

    let (status, body) = srv
        .post("/holds", json!({"product_id": product_id, "quantity": 3}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_stock");
    assert!(body["message"].as_str().unwrap().contains("Insufficient stock"));

    let (status, body) = srv
        .post("/holds", json!({"product_id": product_id, "quantity": 0}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = srv
        .post("/holds", json!({"product_id": OrderId::new().to_string(), "quantity": 1}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(srv.available(&product_id).await, 2);
}

#[tokio::test]
async fn concurrent_holds_never_oversell() {
    let srv = Arc::new(TestServer::spawn().await);
    let product_id = srv.product(5).await;

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let srv = srv.clone();
        let product_id = product_id.clone();
        tasks.push(tokio::spawn(async move {
            srv.post("/holds", json!({"product_id": product_id, "quantity": 1}))
                .await
                .0
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => {}
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(created, 5);
    assert_eq!(srv.available(&product_id).await, 0);
}

#[tokio::test]
async fn hold_converts_into_one_order_only() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(5).await;
    let hold_id = srv.hold(&product_id, 1).await;
    srv.order(&hold_id).await;

    let (status, body) = srv.post("/orders", json!({"hold_id": hold_id})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "hold_already_used");
}

#[tokio::test]
async fn duplicate_webhooks_settle_once() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(5).await;
    let hold_id = srv.hold(&product_id, 2).await;
    let order_id = srv.order(&hold_id).await;

    let body = json!({"idempotency_key": "dup-key", "order_id": order_id, "status": "success"});
    let (_, first) = srv.post("/payments/webhook", body.clone()).await;
    let (status, second) = srv.post("/payments/webhook", body).await;

    assert_eq!(first["message"], "Payment successful");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "Webhook already processed");
    assert_eq!(second["replayed"], true);
    assert_eq!(second["order_status"], "paid");

    let (_, product) = srv.get(&format!("/products/{product_id}")).await;
    assert_eq!(product["stock"], 3);

    let (_, logs) = srv.get("/logs").await;
    let paid = logs["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["type"] == "order_paid")
        .count();
    assert_eq!(paid, 1);
}

#[tokio::test]
async fn failed_payment_cancels_and_frees_stock() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(4).await;
    let hold_id = srv.hold(&product_id, 4).await;
    let order_id = srv.order(&hold_id).await;
    assert_eq!(srv.available(&product_id).await, 0);

    let (status, body) = srv
        .post(
            "/payments/webhook",
            json!({"idempotency_key": "fail-1", "order_id": order_id, "status": "failed"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payment failed");
    assert_eq!(body["order_status"], "cancelled");

    let (_, product) = srv.get(&format!("/products/{product_id}")).await;
    assert_eq!(product["stock"], 4);
    assert_eq!(product["available_stock"], 4);
}

#[tokio::test]
async fn webhook_for_missing_order_fails_after_retries() {
    let srv = TestServer::spawn().await;

    let (status, body) = srv
        .post(
            "/payments/webhook",
            json!({"idempotency_key": "ghost", "order_id": OrderId::new().to_string(), "status": "success"}),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "order_not_found");
    assert!(body["message"].as_str().unwrap().contains("not found after retries"));
}

#[tokio::test]
async fn webhook_body_is_validated() {
    let srv = TestServer::spawn().await;
    let order_id = OrderId::new().to_string();

    let (status, body) = srv
        .post(
            "/payments/webhook",
            json!({"idempotency_key": "k", "order_id": order_id, "status": "maybe"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_status");

    let (status, _) = srv
        .post("/payments/webhook", json!({"order_id": order_id, "status": "success"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = srv
        .post(
            "/payments/webhook",
            json!({"idempotency_key": "  ", "order_id": order_id, "status": "success"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn manual_release_is_idempotent() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(3).await;
    let hold_id = srv.hold(&product_id, 2).await;

    let (status, first) = srv.post(&format!("/holds/{hold_id}/release"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert!(first["released_at"].is_string());
    assert_eq!(srv.available(&product_id).await, 3);

    let (status, second) = srv.post(&format!("/holds/{hold_id}/release"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["released_at"], first["released_at"]);
    assert_eq!(srv.available(&product_id).await, 3);

    let (status, body) = srv.post("/orders", json!({"hold_id": hold_id})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "hold_already_released");
}

#[tokio::test]
async fn expired_holds_block_orders_and_are_swept() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(5).await;
    let hold_id = srv.hold(&product_id, 3).await;
    assert_eq!(srv.available(&product_id).await, 2);

    srv.clock.advance(ChronoDuration::seconds(121));

    let (status, body) = srv.post("/orders", json!({"hold_id": hold_id})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "hold_expired");

    let (status, body) = srv.post("/holds/release-expired", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released_count"], 1);
    assert_eq!(body["skipped"], false);
    assert_eq!(srv.available(&product_id).await, 5);

    let (_, body) = srv.post("/holds/release-expired", json!({})).await;
    assert_eq!(body["released_count"], 0);

    let (status, hold) = srv.get(&format!("/holds/{hold_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(hold["released_at"].is_string());
    assert!(hold["used_at"].is_null());
}

#[tokio::test]
async fn logs_list_recent_events_first() {
    let srv = TestServer::spawn().await;
    let product_id = srv.product(5).await;
    let hold_id = srv.hold(&product_id, 1).await;
    srv.post(&format!("/holds/{hold_id}/release"), json!({})).await;

    let (status, body) = srv.get("/logs?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "hold_released");
    assert_eq!(events[0]["payload"]["reason"], "manual");
}

#[tokio::test]
async fn logs_return_every_event_without_a_limit() {
    let srv = TestServer::spawn().await;
    let product_id: ProductId = srv.product(500).await.parse().unwrap();
    for _ in 0..150 {
        srv.services
            .reservations
            .holds
            .create_hold(product_id, 1)
            .await
            .unwrap();
    }

    let (status, body) = srv.get("/logs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["events"].as_array().unwrap().len(), 150);
}
