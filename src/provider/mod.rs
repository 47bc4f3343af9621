//! 视觉模型与文本向量化模型的客户端
//!
//! 所有的图片理解和向量生成都交给外部服务完成，这里只负责组装请求和解析响应。

mod gemini;
mod groq;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use self::gemini::{GeminiEmbedder, GeminiVision};
pub use self::groq::GroqVision;
use crate::config::{ApiOptions, EmbedOptions, ModelOptions, ProviderKind};
use crate::image::EncodedImage;
use crate::metrics;

/// 图片问答模型
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// 服务商名称
    fn provider(&self) -> &str;

    /// 模型名称
    fn model(&self) -> &str;

    /// 针对一张图片提问，返回模型的回答
    async fn ask(&self, image: &EncodedImage, prompt: &str) -> Result<String>;
}

/// 向量化的用途，服务端会据此生成不同的向量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedTask {
    /// 被检索的文档
    Document,
    /// 检索用的查询
    Query,
}

impl EmbedTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// 文本向量化模型
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 输出向量的维度
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>>;
}

/// 采样参数
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Sampling {
    pub fn from_options(opts: &ModelOptions, default_temperature: f32) -> Self {
        Self {
            temperature: opts.temperature.unwrap_or(default_temperature),
            max_tokens: opts.max_tokens,
            top_p: opts.top_p,
        }
    }
}

pub fn http_client(api: &ApiOptions) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(Duration::from_secs(api.timeout)).build()?)
}

/// 根据命令行参数创建视觉模型
pub fn build_vision(
    api: &ApiOptions,
    opts: &ModelOptions,
    default_temperature: f32,
) -> Result<Arc<dyn VisionModel>> {
    let client = http_client(api)?;
    let sampling = Sampling::from_options(opts, default_temperature);
    let model = opts.model_name().to_string();
    let vision: Arc<dyn VisionModel> = match opts.provider {
        ProviderKind::Gemini => {
            let key = require_key(api.google_api_key.as_deref(), "GOOGLE_API_KEY")?;
            Arc::new(GeminiVision::new(client, &api.gemini_base_url, key, model, sampling))
        }
        ProviderKind::Groq => {
            let key = require_key(api.groq_api_key.as_deref(), "GROQ_API_KEY")?;
            Arc::new(GroqVision::new(client, &api.groq_base_url, key, model, sampling))
        }
    };
    Ok(vision)
}

/// 根据命令行参数创建向量化模型，目前只支持 Gemini
pub fn build_embedder(api: &ApiOptions, opts: &EmbedOptions) -> Result<Arc<dyn Embedder>> {
    let client = http_client(api)?;
    let key = require_key(api.google_api_key.as_deref(), "GOOGLE_API_KEY")?;
    Ok(Arc::new(GeminiEmbedder::new(
        client,
        &api.gemini_base_url,
        key,
        opts.embed_model.clone(),
        opts.dimension as usize,
    )))
}

fn require_key(key: Option<&str>, env: &str) -> Result<String> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(anyhow!("请设置 {env} 环境变量，或在 .env 文件中配置")),
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// 发送 JSON 请求并记录指标，非 2xx 响应会连同响应体一起作为错误返回
async fn post_json<B, R>(
    request: reqwest::RequestBuilder,
    body: &B,
    provider: &str,
    model: &str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let start = Instant::now();
    let result = send_json(request, body).await;
    metrics::observe_request(provider, model, result.is_ok(), start.elapsed().as_secs_f32());
    result.map_err(|e| e.context(format!("{provider} 请求失败 ({model})")))
}

async fn send_json<B, R>(request: reqwest::RequestBuilder, body: &B) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("HTTP {status}: {}", text.trim()));
    }
    Ok(response.json::<R>().await?)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_key() {
        assert_eq!(require_key(Some(" abc "), "X").unwrap(), "abc");
        let err = require_key(Some("  "), "GROQ_API_KEY").unwrap_err();
        assert!(err.to_string().contains("GROQ_API_KEY"));
        assert!(require_key(None, "GOOGLE_API_KEY").is_err());
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("https://a.b/v1/"), "https://a.b/v1");
        assert_eq!(normalize_base_url("https://a.b/v1"), "https://a.b/v1");
    }

    #[test]
    fn test_embed_task() {
        assert_eq!(EmbedTask::Document.as_str(), "RETRIEVAL_DOCUMENT");
        assert_eq!(EmbedTask::Query.as_str(), "RETRIEVAL_QUERY");
    }
}
