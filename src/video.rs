use std::path::Path;

use anyhow::{Result, anyhow};
use log::debug;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    /// 帧率，向下取整
    pub fps: u32,
    /// 总帧数
    pub frame_count: u64,
    /// 时长，单位为秒
    pub duration: f64,
}

impl VideoInfo {
    pub fn new(fps: f64, frame_count: f64) -> Result<Self> {
        let fps = if fps.is_finite() { fps as u32 } else { 0 };
        if fps == 0 {
            return Err(anyhow!("无法获取视频帧率"));
        }
        let frame_count = if frame_count.is_finite() && frame_count > 0. { frame_count as u64 } else { 0 };
        Ok(Self { fps, frame_count, duration: frame_count as f64 / fps as f64 })
    }
}

/// 每秒只选取一帧
#[derive(Debug, Clone)]
pub struct SecondSampler {
    fps: u64,
    last_second: Option<u64>,
}

impl SecondSampler {
    pub fn new(fps: u32) -> Result<Self> {
        if fps == 0 {
            return Err(anyhow!("帧率必须大于 0"));
        }
        Ok(Self { fps: fps as u64, last_second: None })
    }

    /// 如果这一帧是新的一秒中的第一帧，返回该秒数
    pub fn observe(&mut self, frame_number: u64) -> Option<u64> {
        let second = frame_number / self.fps;
        match self.last_second {
            Some(last) if second <= last => None,
            _ => {
                self.last_second = Some(second);
                Some(second)
            }
        }
    }
}

/// 一帧视频画面
pub struct VideoFrame {
    /// 帧序号，从 0 开始
    pub number: u64,
    /// 所在的秒数
    pub second: u64,
    /// 是否被选中用于描述
    pub sampled: bool,
    pub mat: Mat,
}

/// 顺序读取视频帧
pub struct VideoReader {
    capture: videoio::VideoCapture,
    info: VideoInfo,
    sampler: SecondSampler,
    frame_number: u64,
}

impl VideoReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let filename = path.to_str().ok_or_else(|| anyhow!("无效的视频路径: {}", path.display()))?;
        let capture = videoio::VideoCapture::from_file(filename, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(anyhow!("无法打开视频文件: {}", path.display()));
        }
        let info = VideoInfo::new(
            capture.get(videoio::CAP_PROP_FPS)?,
            capture.get(videoio::CAP_PROP_FRAME_COUNT)?,
        )?;
        debug!("打开视频 {}: {:?}", path.display(), info);
        let sampler = SecondSampler::new(info.fps)?;
        Ok(Self { capture, info, sampler, frame_number: 0 })
    }

    pub fn info(&self) -> VideoInfo {
        self.info
    }

    /// 读取下一帧，视频结束时返回 `None`
    pub fn next_frame(&mut self) -> Result<Option<VideoFrame>> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat)? || mat.rows() == 0 {
            return Ok(None);
        }
        let number = self.frame_number;
        self.frame_number += 1;
        let sampled = self.sampler.observe(number);
        Ok(Some(VideoFrame {
            number,
            second: number / self.info.fps as u64,
            sampled: sampled.is_some(),
            mat,
        }))
    }
}
