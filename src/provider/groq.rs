use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Sampling, VisionModel, normalize_base_url, post_json};
use crate::image::EncodedImage;

const PROVIDER: &str = "groq";

/// Groq 的 OpenAI 兼容 `chat/completions` 接口
pub struct GroqVision {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    sampling: Sampling,
}

impl GroqVision {
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
        if self.base_url.ends_with("/chat/completions") {
            return self.base_url.clone();
        }
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl VisionModel for GroqVision {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, image: &EncodedImage, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl { image_url: ImageUrl { url: image.data_url() } },
                ],
            }],
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
            top_p: self.sampling.top_p,
            stream: false,
        };
        let request = self.client.post(self.endpoint()).bearer_auth(&self.api_key);
        let response: ChatResponse = post_json(request, &body, PROVIDER, &self.model).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Groq 没有返回任何回答"))
    }
}
