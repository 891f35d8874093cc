//! HTTP surface: `POST /extract-bill-data` plus health and info routes.
//!
//! Every failure, including a body that does not parse, is answered with the
//! same [`ExtractionResponse`] envelope (`is_success: false`) so clients only
//! ever decode one shape.
//!
//! | Error kind          | Status |
//! |---------------------|--------|
//! | validation          | 400    |
//! | schema_validation   | 422    |
//! | downstream          | 502, or 503 on timeout |
//! | config / internal   | 500    |

use crate::error::{ErrorKind, ExtractError};
use crate::extract::{BillExtractor, ExtractionFailure};
use crate::types::{ExtractionRequest, ExtractionResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const SERVICE_NAME: &str = "Medical Bill Extraction API";

/// State shared by all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    pub extractor: Arc<BillExtractor>,
}

impl AppState {
    pub fn new(extractor: BillExtractor) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }
}

/// Build the router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .route("/extract-bill-data", post(extract_bill_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Handler for `POST /extract-bill-data`.
async fn extract_bill_data(
    State(state): State<AppState>,
    payload: Result<Json<ExtractionRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = ExtractError::InvalidBody(rejection.body_text());
            return failure_response(ExtractionFailure::from(err));
        }
    };

    match state.extractor.extract(&request.document).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(ExtractionResponse::success(outcome.data, outcome.token_usage)),
        )
            .into_response(),
        Err(failure) => failure_response(failure),
    }
}

fn failure_response(failure: ExtractionFailure) -> Response {
    let status = status_for(&failure.error);
    if status.is_server_error() {
        error!("Extraction failed ({}): {}", status, failure.error);
    } else {
        info!("Extraction rejected ({}): {}", status, failure.error);
    }
    let body = ExtractionResponse::failure(&failure.error, failure.token_usage);
    (status, Json(body)).into_response()
}

/// HTTP status for an extraction error.
pub fn status_for(err: &ExtractError) -> StatusCode {
    match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::SchemaValidation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Downstream if err.is_timeout() => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Downstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Config | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler for `GET /health`.
async fn health_check() -> Json<Value> {
    // The extractor cannot exist without a resolved provider.
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "model_configured": true,
    }))
}

/// Handler for `GET /`.
async fn service_info() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "accepts": "Image URLs only (http/https)",
        "endpoints": {
            "/extract-bill-data": "POST - Extract line items from a bill image URL",
            "/health": "GET - Health check",
        },
        "example_request": { "document": "https://example.com/medical-bill.png" },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ItemDefaults;
    use crate::error::ModelStage;
    use crate::pipeline::input::DocumentFetcher;
    use crate::pipeline::llm::{ModelClient, ModelReply};
    use crate::types::TokenUsage;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use edgequake_llm::ImageData;
    use reqwest::Url;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const CONSULTATION: &str = r#"{"pagewise_line_items":[{"page_no":"1","page_type":"Bill Detail","bill_items":[{"item_name":"Consultation Fee","item_amount":500.0,"item_rate":500.0,"item_quantity":1.0}]}],"total_item_count":1}"#;

    struct PngFetcher(AtomicUsize);

    #[async_trait]
    impl DocumentFetcher for PngFetcher {
        async fn fetch(&self, _url: &Url) -> Result<Vec<u8>, ExtractError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0])
        }
    }

    enum Reply {
        Json(&'static str),
        Fail,
        Timeout,
    }

    struct FixedModel(Reply);

    #[async_trait]
    impl ModelClient for FixedModel {
        async fn transcribe(&self, _image: ImageData) -> Result<ModelReply, ExtractError> {
            Ok(ModelReply {
                text: "Consultation Fee 500.00 x1".into(),
                usage: TokenUsage::new(1000, 50),
            })
        }

        async fn structure(&self, _prompt: &str) -> Result<ModelReply, ExtractError> {
            match &self.0 {
                Reply::Json(text) => Ok(ModelReply {
                    text: text.to_string(),
                    usage: TokenUsage::new(300, 100),
                }),
                Reply::Fail => Err(ExtractError::ModelCallFailed {
                    stage: ModelStage::Extraction,
                    message: "401 Unauthorized".into(),
                }),
                Reply::Timeout => Err(ExtractError::ModelTimeout {
                    stage: ModelStage::Extraction,
                    secs: 60,
                }),
            }
        }
    }

    fn app(reply: Reply) -> (Router, Arc<PngFetcher>) {
        let fetcher = Arc::new(PngFetcher(AtomicUsize::new(0)));
        let extractor = BillExtractor::new(
            Arc::clone(&fetcher) as Arc<dyn DocumentFetcher>,
            Arc::new(FixedModel(reply)),
            ItemDefaults::Reject,
        );
        (build_router(AppState::new(extractor)), fetcher)
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/extract-bill-data")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 65536).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn success_returns_200_with_summed_usage() {
        let (app, _) = app(Reply::Json(CONSULTATION));
        let response = app
            .oneshot(post_json(r#"{"document": "https://example.com/bill.png"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["is_success"], true);
        assert_eq!(json["data"]["total_item_count"], 1);
        assert_eq!(
            json["data"]["pagewise_line_items"][0]["bill_items"][0]["item_amount"],
            500.0
        );
        assert_eq!(json["token_usage"]["input_tokens"], 1300);
        assert_eq!(json["token_usage"]["output_tokens"], 150);
        assert_eq!(json["token_usage"]["total_tokens"], 1450);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn invalid_url_returns_400_without_outbound_call() {
        let (app, fetcher) = app(Reply::Json(CONSULTATION));
        let response = app
            .oneshot(post_json(r#"{"document": "not-a-url"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["is_success"], false);
        assert_eq!(json["error"]["kind"], "validation");
        assert_eq!(json["token_usage"]["total_tokens"], 0);
        assert!(json.get("data").is_none());
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_document_field_returns_400() {
        let (app, _) = app(Reply::Json(CONSULTATION));
        let response = app.oneshot(post_json(r#"{"url": "x"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["is_success"], false);
        assert_eq!(json["error"]["kind"], "validation");
    }

    #[tokio::test]
    async fn malformed_body_returns_400() {
        let (app, _) = app(Reply::Json(CONSULTATION));
        let response = app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn schema_failure_returns_422_with_partial_usage() {
        let (app, _) = app(Reply::Json(r#"{"total_item_count": 1}"#));
        let response = app
            .oneshot(post_json(r#"{"document": "https://example.com/bill.png"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["is_success"], false);
        assert_eq!(json["error"]["kind"], "schema_validation");
        assert_eq!(json["token_usage"]["total_tokens"], 1450);
    }

    #[tokio::test]
    async fn downstream_failure_returns_502() {
        let (app, _) = app(Reply::Fail);
        let response = app
            .oneshot(post_json(r#"{"document": "https://example.com/bill.png"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["error"]["kind"], "downstream");
        assert_eq!(json["token_usage"]["total_tokens"], 1050);
    }

    #[tokio::test]
    async fn downstream_timeout_returns_503() {
        let (app, _) = app(Reply::Timeout);
        let response = app
            .oneshot(post_json(r#"{"document": "https://example.com/bill.png"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_healthy() {
        let (app, _) = app(Reply::Fail);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn info_lists_endpoints() {
        let (app, _) = app(Reply::Fail);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json["endpoints"].get("/extract-bill-data").is_some());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_for(&ExtractError::InvalidBody("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ExtractError::MalformedJson("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ExtractError::DownloadTimeout {
                url: "u".into(),
                secs: 3
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&ExtractError::EmptyTranscription),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ExtractError::Internal("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
