//! End-to-end forecast and chat scenarios over mock artifacts.

mod common;

use std::sync::Arc;

use cityflow_abstraction::{ChatMessage, ModelError};
use cityflow_core::{ChatRequest, Config, CoreError, InferenceRequest};
use cityflow_models::{ForecastError, MockModel};
use common::{MOCK_PREDICTION, post_json, send, test_router, test_service};
use http::StatusCode;
use serde_json::json;

fn inference(category: &str, model_type: &str) -> InferenceRequest {
    InferenceRequest {
        city: "New York City".to_string(),
        category: category.to_string(),
        model_type: model_type.to_string(),
        query: "predict next day".to_string(),
    }
}

#[tokio::test]
async fn test_baseline_forecast() {
    let (service, _) = test_service(Config::default(), None);
    let outcome = service.forecaster().run_forecast(&inference("Bar", "baseline")).await.unwrap();

    assert_eq!(outcome.identifier, service.registry().baseline().identifier);
    assert_eq!(outcome.model_label, "Baseline model");
    assert_eq!(outcome.prediction, MOCK_PREDICTION);
}

#[tokio::test]
async fn test_finetune_category_is_normalized() {
    let (service, source) = test_service(Config::default(), None);
    for category in ["Coffee Shop", "coffeeshop", "CoffeeShop"] {
        let outcome = service.forecaster().run_forecast(&inference(category, "finetune")).await.unwrap();
        assert_eq!(outcome.identifier, "Altheaa21/Category-CoffeeShop");
        assert_eq!(outcome.model_label, "CoffeeShop finetune model");
    }
    assert_eq!(source.fetch_count(), 1);
}

#[tokio::test]
async fn test_unsupported_finetune_category() {
    let (service, _) = test_service(Config::default(), None);
    let err = service.forecaster().run_forecast(&inference("Museum", "finetune")).await.unwrap_err();
    assert_eq!(err, ForecastError::UnsupportedCategory("Museum".to_string()));

    let err = CoreError::from(err);
    assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_without_messages() {
    let (service, _) = test_service(Config::default(), None);
    let request = ChatRequest {
        messages: vec![],
        city: "Sydney".to_string(),
        category: None,
        model_type: "baseline".to_string(),
    };
    let err = service.chat().respond(&request).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(ref m) if m == "No messages provided."));

    let (router, _) = test_router(None);
    let (status, body) =
        send(router, post_json("/t5-chat", &json!({ "messages": [], "city": "Sydney" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "No messages provided.");
}

#[tokio::test]
async fn test_chat_without_category_forces_baseline() {
    let llm = Arc::new(MockModel::replying("gemini-test", "Expect a typical day."));
    let (router, _) = test_router(Some(llm));
    let request = json!({
        "messages": [
            { "role": "user", "content": "How busy tomorrow?" },
            { "role": "assistant", "content": "Which city?" },
            { "role": "user", "content": "  Sydney, next Friday  " },
        ],
        "city": "Sydney",
        "model_type": "finetune",
    });

    let (status, body) = send(router, post_json("/t5-chat", &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["reply"],
        format!(
            "For **Sydney (all categories)**, using the **Baseline model** (mode: `baseline`), \
the T5 model predicts demand level:\n\n→ **{MOCK_PREDICTION}**\n\nExpect a typical day."
        )
    );
}

#[tokio::test]
async fn test_chat_llm_outage_uses_fallback() {
    let llm = Arc::new(MockModel::failing("gemini-test", ModelError::Timeout("deadline".to_string())));
    let (service, _) = test_service(Config::default(), Some(llm));
    let request = ChatRequest {
        messages: vec![ChatMessage::user("Friday evening")],
        city: "Moscow".to_string(),
        category: Some("Bar".to_string()),
        model_type: "finetune".to_string(),
    };

    let reply = service.chat().respond(&request).await.unwrap().reply;
    assert!(reply.starts_with("For **Moscow – Bar**, using the **Bar finetune model** (mode: `finetune`)"));
    assert!(reply.contains("For Moscow – Bar, the model **Bar finetune model** predicted demand level **2**"));
    assert!(reply.contains("> Friday evening"));
}
