use std::path::PathBuf;

use anyhow::anyhow;
use clap::Parser;
use log::{info, warn};

use crate::ImageStoreBuilder;
use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::utils::normalize_path;

#[derive(Parser, Debug, Clone)]
pub struct RemoveCommand {
    /// 需要删除的图片路径，需与添加时的路径一致
    pub paths: Vec<PathBuf>,
    /// 删除所有图片
    #[arg(long, conflicts_with = "paths")]
    pub all: bool,
}

impl SubCommandExtend for RemoveCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        if !self.all && self.paths.is_empty() {
            return Err(anyhow!("请指定需要删除的图片路径，或使用 --all"));
        }

        // 删除不需要向量，沿用数据库中已有的维度
        let store = ImageStoreBuilder::new(opts.conf_dir.clone()).open().await?;

        if self.all {
            let count = store.clear().await?;
            info!("已删除 {count} 张图片");
            return Ok(());
        }

        for path in &self.paths {
            let key = normalize_path(path);
            if store.remove(&key).await? {
                info!("已删除: {key}");
            } else {
                warn!("图片不存在: {key}");
            }
        }
        Ok(())
    }
}
