use std::path::PathBuf;
use std::sync::Arc;

use anyhow::anyhow;
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use tasks::*;
use types::Describer;

mod tasks;
mod types;

use crate::ImageStoreBuilder;
use crate::cli::search::{OutputFormat, print_result};
use crate::cli::{IMAGE_TEMPERATURE, SubCommandExtend};
use crate::config::{EmbedOptions, ImageOptions, ModelOptions, Opts, StoreOptions};
use crate::provider;
use crate::utils::{normalize_path, pb_style, suffix_regex};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub vision: ModelOptions,
    #[command(flatten)]
    pub embed: EmbedOptions,
    #[command(flatten)]
    pub store: StoreOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 图片所在目录，也可以是单张图片
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "png,jpg,jpeg")]
    pub suffix: String,
    /// 生成图片描述时使用的提示词
    #[arg(long, default_value = "Describe this image in detail")]
    pub prompt: String,
    /// 直接使用这段描述，不再调用视觉模型
    #[arg(long)]
    pub description: Option<String>,
    /// 如果图片已添加，是否覆盖旧的记录
    #[arg(long)]
    pub overwrite: bool,
    /// 同时进行的描述请求数量
    #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: u16,
    /// 添加完成后使用这段文本进行搜索
    #[arg(long, value_name = "QUERY")]
    pub search: Option<String>,
    /// 搜索结果数量
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        if !self.path.exists() {
            return Err(anyhow!("路径不存在: {}", self.path.display()));
        }
        let root = PathBuf::from(normalize_path(&self.path));
        let re_suf = suffix_regex(&self.suffix)?;

        let describer = match &self.description {
            Some(description) => Describer::Fixed(description.clone()),
            None => Describer::Model {
                vision: provider::build_vision(&opts.api, &self.vision, IMAGE_TEMPERATURE)?,
                client: provider::http_client(&opts.api)?,
                prompt: self.prompt.clone(),
                max_size: self.image.max_size,
            },
        };
        let embedder = provider::build_embedder(&opts.api, &self.embed)?;

        let store = Arc::new(
            ImageStoreBuilder::new(opts.conf_dir.clone())
                .in_memory(self.store.in_memory)
                .dimension(self.embed.dimension as usize)
                .open()
                .await?,
        );

        let pb = ProgressBar::no_length().with_style(pb_style());

        let (t1, rx) = task_scan(root, pb.clone(), re_suf);
        let (t2, rx) = task_filter(rx, pb.clone(), store.clone(), self.overwrite);
        let (t3, rx) =
            task_describe(rx, pb.clone(), Arc::new(describer), self.concurrency as usize);
        let (t4, rx) = task_embed(rx, pb.clone(), embedder.clone());
        let t5 = task_store(rx, pb.clone(), store.clone());

        // 等待所有任务完成
        tokio::try_join!(t1, t2, t3, t4, t5)?;

        pb.finish_with_message("图片添加完成");
        info!("数据库中共有 {} 张图片", store.count().await?);

        if let Some(query) = &self.search {
            let hits = store.search_text(embedder.as_ref(), query, self.limit).await?;
            print_result(&hits, &OutputFormat::Table)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ImageStore;
    use crate::db;
    use crate::image::tests::sample_jpeg;
    use crate::provider::testing::{FakeVision, KeywordEmbedder};
    use crate::provider::{EmbedTask, Embedder};
    use crate::store::image_id;

    #[tokio::test]
    async fn test_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cat.jpg"), sample_jpeg(32, 32)).unwrap();
        fs::write(dir.path().join("dog.PNG"), sample_jpeg(32, 32)).unwrap();
        fs::write(dir.path().join("notes.txt"), b"not an image").unwrap();
        fs::write(dir.path().join("broken.jpg"), b"not an image").unwrap();

        let db = db::init_db(None).await.unwrap();
        let store = Arc::new(ImageStore::with_database(db, 2).await.unwrap());
        let vision = Arc::new(FakeVision::new("a cat"));
        let describer = Describer::Model {
            vision: vision.clone(),
            client: reqwest::Client::new(),
            prompt: "Describe this image in detail".to_string(),
            max_size: (64, 64),
        };
        let embedder: Arc<dyn Embedder> =
            Arc::new(KeywordEmbedder { keywords: vec!["cat", "dog"] });

        let pb = ProgressBar::hidden();
        let re_suf = suffix_regex("png,jpg,jpeg").unwrap();
        let (t1, rx) = task_scan(dir.path().to_path_buf(), pb.clone(), re_suf);
        let (t2, rx) = task_filter(rx, pb.clone(), store.clone(), false);
        let (t3, rx) = task_describe(rx, pb.clone(), Arc::new(describer), 2);
        let (t4, rx) = task_embed(rx, pb.clone(), embedder.clone());
        let t5 = task_store(rx, pb.clone(), store.clone());
        tokio::try_join!(t1, t2, t3, t4, t5).unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        let broken = dir.path().join("broken.jpg");
        assert!(!store.contains(&broken.to_string_lossy()).await.unwrap());
        assert_eq!(vision.prompts.lock().unwrap().len(), 2);

        let cat = dir.path().join("cat.jpg").to_string_lossy().into_owned();
        let record = store.get(&cat).await.unwrap().unwrap();
        assert_eq!(record.id, image_id(&cat));
        assert_eq!(record.description, "a cat");

        let vector = embedder.embed("a cat", EmbedTask::Query).await.unwrap();
        assert_eq!(store.search(&vector, 1).await.unwrap()[0].description, "a cat");
    }

    #[tokio::test]
    async fn test_filter_skips_existing() {
        let db = db::init_db(None).await.unwrap();
        let store = Arc::new(ImageStore::with_database(db, 2).await.unwrap());
        store.upsert("/old.jpg", "old", &[1., 0.]).await.unwrap();

        for (overwrite, expected) in [(false, vec!["/new.jpg"]), (true, vec!["/old.jpg", "/new.jpg"])]
        {
            let (tx, rx) = tokio::sync::mpsc::channel(4);
            let (t, mut out) = task_filter(rx, ProgressBar::hidden(), store.clone(), overwrite);
            tx.send(types::ImageFile { path: "/old.jpg".to_string() }).await.unwrap();
            tx.send(types::ImageFile { path: "/new.jpg".to_string() }).await.unwrap();
            drop(tx);

            let mut paths = vec![];
            while let Some(data) = out.recv().await {
                paths.push(data.path);
            }
            t.await.unwrap();
            assert_eq!(paths, expected);
        }
    }

    #[tokio::test]
    async fn test_fixed_description() {
        let describer = Describer::Fixed("a sunset".to_string());
        assert_eq!(describer.describe("/whatever.jpg").await.unwrap(), "a sunset");
    }
}
