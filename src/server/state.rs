use std::sync::Arc;

use tokio::sync::Semaphore;

use super::hub::DescriptionHub;
use crate::ImageStore;
use crate::provider::{Embedder, VisionModel};

/// 应用状态
pub struct AppState {
    /// 图片问答使用的模型
    pub vision: Arc<dyn VisionModel>,
    /// 视频画面描述使用的模型
    pub frame_vision: Arc<dyn VisionModel>,
    /// 文本向量化模型，未配置时无法搜索
    pub embedder: Option<Arc<dyn Embedder>>,
    /// 图片向量数据库
    pub store: ImageStore,
    pub hub: DescriptionHub,
    /// 限制同时进行的画面描述数量
    pub limiter: Semaphore,
    pub client: reqwest::Client,
    /// 上传给模型的图片最大尺寸
    pub max_size: (i32, i32),
}

impl AppState {
    pub fn new(vision: Arc<dyn VisionModel>, store: ImageStore) -> Self {
        AppState {
            frame_vision: vision.clone(),
            vision,
            embedder: None,
            store,
            hub: DescriptionHub::default(),
            limiter: Semaphore::new(8),
            client: reqwest::Client::new(),
            max_size: (1920, 1080),
        }
    }

    pub fn frame_vision(mut self, vision: Arc<dyn VisionModel>) -> Self {
        self.frame_vision = vision;
        self
    }

    pub fn embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn max_concurrent(mut self, permits: usize) -> Self {
        self.limiter = Semaphore::new(permits.max(1));
        self
    }

    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn max_size(mut self, max_size: (i32, i32)) -> Self {
        self.max_size = max_size;
        self
    }
}
