use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{ImageOptions, ModelOptions, Opts};
use crate::image::{self, ImageSource};
use crate::provider;

/// 图片问答的默认采样温度
pub const IMAGE_TEMPERATURE: f32 = 1.0;

#[derive(Parser, Debug, Clone)]
pub struct AskCommand {
    #[command(flatten)]
    pub vision: ModelOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 图片路径或网络地址
    pub source: ImageSource,
    /// 提出的问题
    #[arg(default_value = "What is in this image?")]
    pub question: String,
}

impl SubCommandExtend for AskCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let vision = provider::build_vision(&opts.api, &self.vision, IMAGE_TEMPERATURE)?;
        let client = provider::http_client(&opts.api)?;

        let encoded = image::load_image(&client, &self.source, self.image.max_size).await?;
        info!("正在询问 {}/{}: {}", vision.provider(), vision.model(), self.source);

        let answer = vision.ask(&encoded, &self.question).await?;
        println!("{answer}");
        Ok(())
    }
}
