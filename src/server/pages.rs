use std::path::{Path, PathBuf};
use std::sync::Arc;

use askama::Template;
use axum::Json;
use axum::extract::{Form, Path as UrlPath, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use log::{debug, info};
use mime_guess::mime;
use serde_json::json;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use super::{DEFAULT_FRAME_PROMPT, DEFAULT_QUESTION};
use crate::image::{self, ImageSource};
use crate::utils::normalize_path;

impl Default for IndexTemplate {
    fn default() -> Self {
        IndexTemplate {
            image_path: String::new(),
            prompt: String::new(),
            result: None,
            image_url: None,
            frame_prompt: DEFAULT_FRAME_PROMPT,
        }
    }
}

/// 首页
pub async fn index_handler() -> Result<Html<String>> {
    Ok(Html(IndexTemplate::default().render()?))
}

/// 针对本地图片提问，结果直接显示在页面上
pub async fn ask_page_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ImageForm>,
) -> Result<Html<String>> {
    let mut page = IndexTemplate {
        image_path: form.image_path.clone(),
        prompt: form.prompt.clone(),
        ..IndexTemplate::default()
    };

    let path = PathBuf::from(form.image_path.trim());
    if path.as_os_str().is_empty() || !path.is_file() {
        page.result = Some("Error: Image file not found".to_string());
        return Ok(Html(page.render()?));
    }

    let prompt = match form.prompt.trim() {
        "" => DEFAULT_QUESTION,
        prompt => prompt,
    };
    info!("正在询问图片 {}: {prompt}", path.display());
    let source = ImageSource::Path(path.clone());
    let answer = match image::load_image(&state.client, &source, state.max_size).await {
        Ok(image) => state.vision.ask(&image, prompt).await,
        Err(e) => Err(e),
    };

    page.result = Some(match answer {
        Ok(answer) => answer,
        Err(e) => format!("Error: {e:#}"),
    });
    page.image_url = Some(image_url(&path));
    Ok(Html(page.render()?))
}

/// 每一段路径单独转义，避免 `#`、`?` 等字符截断链接
pub(super) fn image_url(path: &Path) -> String {
    let path = normalize_path(path);
    let segments = path
        .trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>();
    format!("/image/{}", segments.join("/"))
}

/// 读取本地图片，只允许访问图片文件
pub async fn image_handler(UrlPath(path): UrlPath<String>) -> Response {
    let path = PathBuf::from(format!("/{}", path.trim_start_matches('/')));
    let not_found = || (StatusCode::NOT_FOUND, "Image not found").into_response();

    let Some(mime) = mime_guess::from_path(&path).first() else {
        return not_found();
    };
    if mime.type_() != mime::IMAGE || !path.is_file() {
        return not_found();
    }
    match tokio::fs::read(&path).await {
        Ok(data) => ([(header::CONTENT_TYPE, mime.to_string())], data).into_response(),
        Err(e) => {
            debug!("读取图片失败 {}: {e}", path.display());
            not_found()
        }
    }
}

/// 检查视频文件，返回前端用于打开视频流的参数
pub async fn process_video_handler(Form(form): Form<VideoForm>) -> Response {
    if !Path::new(&form.video_path).is_file() {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Video file not found" })))
            .into_response();
    }
    Json(json!({
        "status": "success",
        "video_path": form.video_path,
        "prompt": form.prompt,
    }))
    .into_response()
}
