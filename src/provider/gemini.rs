use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbedTask, Embedder, Sampling, VisionModel, normalize_base_url, post_json};
use crate::image::EncodedImage;

const PROVIDER: &str = "gemini";

/// Google Gemini `generateContent` 接口
pub struct GeminiVision {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    sampling: Sampling,
}

impl GeminiVision {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        model: String,
        sampling: Sampling,
    ) -> Self {
        Self { client, base_url: normalize_base_url(base_url), api_key, model, sampling }
    }

    fn endpoint(&self) -> String {
        model_endpoint(&self.base_url, &self.model, "generateContent")
    }
}

/// `models/` 前缀可有可无
fn model_endpoint(base_url: &str, model: &str, method: &str) -> String {
    let model = model.strip_prefix("models/").unwrap_or(model);
    format!("{base_url}/models/{model}:{method}")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: Blob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// 拼接第一个候选回答中的所有文本
    fn into_text(self) -> Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(anyhow!("Gemini 没有返回任何回答，原因: {reason}"));
        };
        let text = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        if text.is_empty() {
            let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
            return Err(anyhow!("Gemini 返回了空回答，原因: {reason}"));
        }
        Ok(text)
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, image: &EncodedImage, prompt: &str) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: Blob { mime_type: &image.mime_type, data: image.base64() },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: self.sampling.temperature,
                max_output_tokens: self.sampling.max_tokens,
                top_p: self.sampling.top_p,
            },
        };
        let request = self.client.post(self.endpoint()).header("x-goog-api-key", &self.api_key);
        let response: GenerateContentResponse =
            post_json(request, &body, PROVIDER, &self.model).await?;
        response.into_text()
    }
}

/// Google Gemini `embedContent` 接口
pub struct GeminiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl GeminiEmbedder {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: String,
        model: String,
        dimension: usize,
    ) -> Self {
        Self { client, base_url: normalize_base_url(base_url), api_key, model, dimension }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str, task: EmbedTask) -> Result<Vec<f32>> {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        let body = EmbedContentRequest {
            model: format!("models/{model}"),
            content: EmbedContent { parts: vec![Part::Text { text }] },
            task_type: task.as_str(),
            output_dimensionality: self.dimension,
        };
        let request = self
            .client
            .post(model_endpoint(&self.base_url, model, "embedContent"))
            .header("x-goog-api-key", &self.api_key);
        let response: EmbedContentResponse =
            post_json(request, &body, PROVIDER, &self.model).await?;

        let values = response.embedding.values;
        if values.len() != self.dimension {
            return Err(anyhow!(
                "向量维度不一致: 期望 {}，实际 {}",
                self.dimension,
                values.len()
            ));
        }
        Ok(values)
    }
}
