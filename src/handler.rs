use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::job::{ErrorBody, JobOutcome, SuccessBody};
use crate::processor::CaptionPipeline;

/// 构建 HTTP 路由
///
/// - `POST /`、`POST /captions`：执行字幕任务
/// - `GET /`、`GET /health`：健康检查
pub fn router(pipeline: Arc<CaptionPipeline>) -> Router {
    Router::new()
        .route("/", get(health_check).post(handle_captions))
        .route("/health", get(health_check))
        .route("/captions", post(handle_captions))
        .layer(CorsLayer::permissive())
        .with_state(pipeline)
}

/// 字幕任务 Handler
///
/// 请求体按原始字节读取，这样缺少 Content-Type 或不是 JSON 时也能返回约定的 400 文本。
pub async fn handle_captions(
    State(pipeline): State<Arc<CaptionPipeline>>,
    body: Bytes,
) -> Response {
    info!("收到字幕任务请求: {} 字节", body.len());
    pipeline.handle_body(&body).await.into_response()
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "OK"
}

impl IntoResponse for JobOutcome {
    fn into_response(self) -> Response {
        match self {
            JobOutcome::Success { output_url } => (
                StatusCode::OK,
                Json(SuccessBody {
                    status: "success".to_string(),
                    output_url,
                }),
            )
                .into_response(),
            JobOutcome::Rejected(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            JobOutcome::Failed(error) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error })).into_response()
            }
        }
    }
}
