//! Common test utilities and helpers for hovel-api tests.

#![allow(dead_code)]

use axum::Router;
use serde_json::json;

use hovel_engine::test_utils::TestContext;
use hovel_engine::TEST_API_KEY;

/// Engine over temp dirs plus a router over it. Keep the whole struct
/// alive for the duration of a test: dropping it removes the temp dirs.
pub struct TestApp {
    pub ctx: TestContext,
    pub client: TestClient,
}

impl TestApp {
    pub fn new() -> Self {
        let ctx = TestContext::new();
        let client = TestClient {
            app: hovel_api::create_app(ctx.engine.clone()),
        };
        Self { ctx, client }
    }

    /// Build a fresh engine and router over the same workspaces root,
    /// simulating a controller restart, and run startup recovery.
    pub async fn restarted(&self) -> TestClient {
        let engine = self.ctx.restarted_engine();
        engine.recover().await.expect("recovery failed");
        TestClient {
            app: hovel_api::create_app(engine),
        }
    }
}

/// Minimal valid create body using the development test key.
pub fn create_body(name: &str) -> serde_json::Value {
    json!({
        "branch_name": name,
        "gemini_api_key": TEST_API_KEY,
    })
}

/// TestClient to encapsulate API interaction logic.
pub struct TestClient {
    pub app: Router,
}

impl TestClient {
    pub async fn send_request(
        &self,
        request: axum::http::Request<axum::body::Body>,
    ) -> axum::http::Response<axum::body::Body> {
        // Clone the app to allow reuse (Router is cheap to clone)
        use tower::ServiceExt;
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn post<T: serde::Serialize>(
        &self,
        uri: &str,
        body: &T,
    ) -> axum::http::Response<axum::body::Body> {
        let req_body = serde_json::to_string(body).expect("Failed to serialize request body");
        let request = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(axum::body::Body::from(req_body))
            .unwrap();
        self.send_request(request).await
    }

    /// POST with no body, for lifecycle endpoints.
    pub async fn post_empty(&self, uri: &str) -> axum::http::Response<axum::body::Body> {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        self.send_request(request).await
    }

    pub async fn get(&self, uri: &str) -> axum::http::Response<axum::body::Body> {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        self.send_request(request).await
    }

    pub async fn delete(&self, uri: &str) -> axum::http::Response<axum::body::Body> {
        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();
        self.send_request(request).await
    }
}

/// Helper to extract JSON body from axum response.
pub async fn extract_json_body<T>(response: axum::response::Response) -> T
where
    T: serde::de::DeserializeOwned,
{
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");

    serde_json::from_slice(&body).expect("Failed to deserialize JSON")
}
