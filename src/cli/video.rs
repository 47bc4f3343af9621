use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{error, info};
use tokio::sync::mpsc::channel;
use tokio::task::spawn_blocking;

use crate::cli::SubCommandExtend;
use crate::config::{ImageOptions, ModelOptions, Opts};
use crate::image::{EncodedImage, encode_mat};
use crate::video::VideoReader;
use crate::{metrics, provider, utils};

/// 视频描述的默认采样温度
pub const VIDEO_TEMPERATURE: f32 = 0.7;

#[derive(Parser, Debug, Clone)]
pub struct VideoCommand {
    #[command(flatten)]
    pub vision: ModelOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 视频文件路径，不填则从标准输入读取
    pub path: Option<PathBuf>,
    /// 描述每一帧时使用的提示词
    #[arg(long, default_value = "What's in this image? Describe it briefly.")]
    pub prompt: String,
}

impl SubCommandExtend for VideoCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => PathBuf::from(utils::read_line("Enter the path to the video file: ")?),
        };
        if !path.is_file() {
            return Err(anyhow!("视频文件不存在: {}", path.display()));
        }

        let vision = provider::build_vision(&opts.api, &self.vision, VIDEO_TEMPERATURE)?;
        let mut reader = spawn_blocking(move || VideoReader::open(path)).await??;

        let video = reader.info();
        println!("FPS: {}", video.fps);
        println!("Total frames: {}", video.frame_count);
        println!("Duration: {:.2} seconds", video.duration);

        let max_size = self.image.max_size;
        let (tx, mut rx) = channel::<Result<(u64, EncodedImage)>>(2);
        let t = spawn_blocking(move || {
            loop {
                let frame = match reader.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.blocking_send(Err(e));
                        break;
                    }
                };
                if !frame.sampled {
                    continue;
                }
                let item = encode_mat(&frame.mat, max_size).map(|image| (frame.second, image));
                if tx.blocking_send(item).is_err() {
                    break;
                }
            }
        });

        while let Some(item) = rx.recv().await {
            let (second, image) = item?;
            println!("Processing frame at {second} seconds...");
            match vision.ask(&image, &self.prompt).await {
                Ok(description) => {
                    metrics::inc_frame_described(true);
                    println!("Description: {description}");
                }
                Err(e) => {
                    metrics::inc_frame_described(false);
                    error!("第 {second} 秒的画面描述失败: {e:#}");
                }
            }
        }
        t.await?;

        info!("视频处理完成");
        Ok(())
    }
}
