mod api;
mod error;
mod hub;
mod pages;
mod state;
mod stream;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::hub::DescriptionHub;
pub use self::state::*;
pub use self::types::FrameDescription;

/// 图片问答的默认问题
pub const DEFAULT_QUESTION: &str = "What is in this image?";
/// 视频画面描述的默认提示词
pub const DEFAULT_FRAME_PROMPT: &str = "Describe what is happening in this frame of the video.";

#[derive(OpenApi)]
#[openapi(
    paths(
        api::ask_handler,
        api::search_handler,
        stream::video_feed_handler,
        stream::descriptions_handler,
    ),
    components(schemas(
        types::AskForm,
        types::AskResponse,
        types::SearchRequest,
        types::SearchResponse,
        types::FrameDescription,
        crate::store::SearchHit,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::index_handler).post(pages::ask_page_handler))
        .route("/image/{*path}", get(pages::image_handler))
        .route("/process_video", post(pages::process_video_handler))
        .route("/video_feed", get(stream::video_feed_handler))
        .route("/descriptions", get(stream::descriptions_handler))
        .route("/api/ask", post(api::ask_handler))
        .route("/api/search", post(api::search_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
