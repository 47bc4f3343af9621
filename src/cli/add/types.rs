use std::sync::Arc;

use anyhow::Result;

use crate::image::{self, ImageSource};
use crate::provider::VisionModel;

/// 扫描到的图片文件
pub struct ImageFile {
    pub path: String,
}

pub struct DescribedImage {
    pub path: String,
    pub description: String,
}

pub struct EmbeddedImage {
    pub path: String,
    pub description: String,
    pub vector: Vec<f32>,
}

/// 图片描述的来源
pub enum Describer {
    /// 所有图片使用同一段描述
    Fixed(String),
    /// 由视觉模型生成描述
    Model {
        vision: Arc<dyn VisionModel>,
        client: reqwest::Client,
        prompt: String,
        max_size: (i32, i32),
    },
}

impl Describer {
    pub async fn describe(&self, path: &str) -> Result<String> {
        match self {
            Self::Fixed(description) => Ok(description.clone()),
            Self::Model { vision, client, prompt, max_size } => {
                let source = ImageSource::Path(path.into());
                let encoded = image::load_image(client, &source, *max_size).await?;
                Ok(vision.ask(&encoded, prompt).await?.trim().to_string())
            }
        }
    }
}
