use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use axum::Json;
use axum::extract::State;
use axum_typed_multipart::TypedMultipart;
use log::info;
use tokio::task::spawn_blocking;

use super::DEFAULT_QUESTION;
use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::image;

/// 上传一张图片并提问
#[utoipa::path(
    post,
    path = "/api/ask",
    request_body(content = AskForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = AskResponse),
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    TypedMultipart(data): TypedMultipart<AskRequest>,
) -> Result<Json<AskResponse>> {
    let start = Instant::now();

    let prompt = data
        .prompt
        .as_deref()
        .map(str::trim)
        .filter(|prompt| !prompt.is_empty())
        .unwrap_or(DEFAULT_QUESTION)
        .to_string();
    info!(
        "正在回答上传图片 {} 的问题: {prompt}",
        data.file.metadata.file_name.as_deref().unwrap_or("<unnamed>")
    );

    let max_size = state.max_size;
    let bytes = data.file.contents;
    let image = spawn_blocking(move || image::encode_image(&bytes, max_size)).await??;
    let answer = state.vision.ask(&image, &prompt).await?;

    Ok(Json(AskResponse { time: start.elapsed().as_millis() as u64, answer }))
}

/// 使用文本搜索图片
#[utoipa::path(
    post,
    path = "/api/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    let embedder = state
        .embedder
        .as_ref()
        .ok_or_else(|| anyhow!("未配置向量化模型，请设置 GOOGLE_API_KEY"))?;
    let result = state.store.search_text(embedder.as_ref(), &data.query, data.limit).await?;

    Ok(Json(SearchResponse { time: start.elapsed().as_millis() as u64, result }))
}
