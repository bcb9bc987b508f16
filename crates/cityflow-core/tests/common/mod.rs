//! Shared test utilities for CityFlow Core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use cityflow_abstraction::Model;
use cityflow_core::{Config, ForecastService, server};
use cityflow_models::mock::{MockArtifactSource, MockLoader};
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

/// Prediction produced by the mock forecaster.
pub const MOCK_PREDICTION: &str = "2";

/// Builds a service over mock artifacts, a mock loader and an optional LLM.
pub fn test_service(config: Config, llm: Option<Arc<dyn Model>>) -> (Arc<ForecastService>, Arc<MockArtifactSource>) {
    let source = Arc::new(MockArtifactSource::new());
    let loader = Arc::new(MockLoader::new("t5", MOCK_PREDICTION));
    let service = ForecastService::with_components(config, source.clone(), vec![loader], llm)
        .expect("service should build");
    (Arc::new(service), source)
}

/// Router over [`test_service`] with default config.
pub fn test_router(llm: Option<Arc<dyn Model>>) -> (Router, Arc<MockArtifactSource>) {
    let (service, source) = test_service(Config::default(), llm);
    (server::router(service), source)
}

/// Sends `request` and returns the status and parsed JSON body.
pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response<Body> = router.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body should be readable").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
