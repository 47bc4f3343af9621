use askama::Template;
use axum::body::Bytes;
use axum_typed_multipart::{FieldData, TryFromMultipart};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::store::SearchHit;

/// 首页
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub image_path: String,
    pub prompt: String,
    /// 模型的回答，或者以 `Error:` 开头的错误信息
    pub result: Option<String>,
    pub image_url: Option<String>,
    pub frame_prompt: &'static str,
}

/// 首页的图片提问表单
#[derive(Debug, Deserialize)]
pub struct ImageForm {
    pub image_path: String,
    #[serde(default)]
    pub prompt: String,
}

/// 视频表单
#[derive(Debug, Deserialize)]
pub struct VideoForm {
    pub video_path: String,
    #[serde(default)]
    pub prompt: String,
}

/// 视频流和描述流的查询参数
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VideoQuery {
    /// 视频文件路径
    pub video_path: String,
    /// 描述画面使用的提示词，为空时使用默认提示词
    #[serde(default)]
    pub prompt: String,
}

/// 图片问答请求参数
#[derive(TryFromMultipart)]
pub struct AskRequest {
    pub file: FieldData<Bytes>,
    pub prompt: Option<String>,
}

/// 图片问答表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct AskForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 提出的问题，默认为 `What is in this image?`
    pub prompt: Option<String>,
}

/// 图片问答响应
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    /// 耗时，单位为毫秒
    pub time: u64,
    /// 模型的回答
    pub answer: String,
}

/// 文本搜索请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 搜索内容
    pub query: String,
    /// 返回结果数量
    #[schema(default = 5)]
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

/// 文本搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    /// 按相似度从高到低排序的结果
    pub result: Vec<SearchHit>,
}

/// 一秒画面的描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FrameDescription {
    /// 画面所在的秒数
    pub timestamp: u64,
    pub description: String,
}
