use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{Value, json};

use stocklock_api::app::{AppServices, build_app};
use stocklock_infra::RetryPolicy;
use stocklock_inventory::SeedCatalog;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, bound to an ephemeral port.
        let services = Arc::new(AppServices::in_memory(RetryPolicy::default(), SeedCatalog::default()));
        services
            .coordinator
            .reset_inventory(&services.seed)
            .await
            .expect("failed to seed inventory");

        let app = build_app(services);
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

async fn place(
    client: &reqwest::Client,
    srv: &TestServer,
    strategy: &str,
    product_id: i64,
    quantity: i64,
    user: &str,
) -> (StatusCode, Value) {
    let res = client
        .post(srv.url(&format!("/api/orders/{strategy}")))
        .json(&json!({"productId": product_id, "quantity": quantity, "userId": user}))
        .send()
        .await
        .unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

async fn get_json(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let res = client.get(url).send().await.unwrap();
    let status = res.status();
    (status, res.json().await.unwrap())
}

#[tokio::test]
async fn health_is_public_and_tagged_with_request_id() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let generated = res.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let res = client
        .get(srv.url("/health"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers().get("x-request-id").unwrap(), "trace-me-123");
}

#[tokio::test]
async fn seeded_products_are_readable() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = get_json(&client, srv.url("/api/products/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": 1, "name": "Super Widget", "stock": 100, "version": 1}));

    let (status, body) = get_json(&client, srv.url("/api/products/2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stock"], 50);

    let (status, body) = get_json(&client, srv.url("/api/products/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn pessimistic_order_decrements_stock() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = place(&client, &srv, "pessimistic", 1, 10, "user-a").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["productId"], 1);
    assert_eq!(body["quantityOrdered"], 10);
    assert_eq!(body["stockRemaining"], 90);
    assert!(body["orderId"].as_i64().unwrap() > 0);
    assert!(body["newVersion"].is_null());

    let (_, product) = get_json(&client, srv.url("/api/products/1")).await;
    assert_eq!(product["stock"], 90);
    assert_eq!(product["version"], 2);
}

#[tokio::test]
async fn optimistic_order_reports_new_version() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = place(&client, &srv, "optimistic", 2, 5, "user-b").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["stockRemaining"], 45);
    assert_eq!(body["newVersion"], 2);

    let (status, body) = place(&client, &srv, "optimistic", 2, 5, "user-b").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["newVersion"], 3);
}

#[tokio::test]
async fn rejected_orders_map_to_client_errors_and_are_audited() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let (status, body) = place(&client, &srv, "pessimistic", 2, 51, "greedy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "insufficient_stock");

    let (status, _) = place(&client, &srv, "optimistic", 2, 51, "greedy").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = place(&client, &srv, "optimistic", 999, 1, "lost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    // Non-positive quantities never reach the store, so they leave no record.
    let (status, body) = place(&client, &srv, "pessimistic", 1, 0, "zero").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, stats) = get_json(&client, srv.url("/api/orders/stats")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        stats,
        json!({
            "totalOrders": 2,
            "successfulOrders": 0,
            "failedOutOfStock": 2,
            "failedConflict": 0,
        })
    );

    let (_, product) = get_json(&client, srv.url("/api/products/2")).await;
    assert_eq!(product["stock"], 50);
    assert_eq!(product["version"], 1);
}

#[tokio::test]
async fn malformed_order_bodies_get_json_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for strategy in ["pessimistic", "optimistic"] {
        let res = client
            .post(srv.url(&format!("/api/orders/{strategy}")))
            .json(&json!({"productId": 1}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let content_type = res.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.starts_with("application/json"));
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"].as_str().unwrap().contains("quantity"));

        let res = client
            .post(srv.url(&format!("/api/orders/{strategy}")))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    let (_, stats) = get_json(&client, srv.url("/api/orders/stats")).await;
    assert_eq!(stats["totalOrders"], 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pessimistic_orders_never_oversell() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let calls = (0..5).map(|i| {
        let client = client.clone();
        let url = srv.url("/api/orders/pessimistic");
        async move {
            client
                .post(url)
                .json(&json!({"productId": 1, "quantity": 30, "userId": format!("user-{i}")}))
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    let statuses: Vec<StatusCode> = futures_join_all(calls).await;

    let created = statuses.iter().filter(|s| **s == StatusCode::CREATED).count();
    let rejected = statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count();
    assert_eq!((created, rejected), (3, 2));

    let (_, product) = get_json(&client, srv.url("/api/products/1")).await;
    assert_eq!(product["stock"], 10);
    assert_eq!(product["version"], 4);

    let (_, stats) = get_json(&client, srv.url("/api/orders/stats")).await;
    assert_eq!(stats["totalOrders"], 5);
    assert_eq!(stats["successfulOrders"], 3);
    assert_eq!(stats["failedOutOfStock"], 2);
}

#[tokio::test]
async fn reset_restores_seed_and_clears_orders() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    place(&client, &srv, "pessimistic", 1, 40, "user-a").await;
    place(&client, &srv, "optimistic", 1, 40, "user-b").await;

    let res = client.post(srv.url("/api/products/reset")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"message": "Product inventory reset successfully."}));

    let (_, product) = get_json(&client, srv.url("/api/products/1")).await;
    assert_eq!(product["stock"], 100);
    assert_eq!(product["version"], 1);

    let (_, stats) = get_json(&client, srv.url("/api/orders/stats")).await;
    assert_eq!(stats["totalOrders"], 0);
}

/// Drive a set of request futures concurrently on the test runtime.
async fn futures_join_all<F>(futures: impl IntoIterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.into_iter().map(tokio::spawn).collect();
    let mut out = Vec::with_capacity(handles.len());
    for h in handles {
        out.push(h.await.unwrap());
    }
    out
}
