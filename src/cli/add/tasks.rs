use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use indicatif::ProgressBar;
use log::info;
use regex::Regex;
use tokio::sync::mpsc::{Receiver, channel};
use tokio::task::{JoinHandle, spawn_blocking};
use walkdir::WalkDir;

use super::types::*;
use crate::ImageStore;
use crate::provider::{EmbedTask, Embedder};
use crate::utils::has_suffix;

pub fn task_scan(
    path: PathBuf,
    pb: ProgressBar,
    re_suf: Regex,
) -> (JoinHandle<()>, Receiver<ImageFile>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = spawn_blocking(move || {
        let entries = if path.is_file() {
            vec![path.to_string_lossy().into_owned()]
        } else {
            info!("开始扫描目录: {}", path.display());
            WalkDir::new(&path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && has_suffix(entry.path(), &re_suf))
                .map(|entry| entry.path().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
        };
        info!("扫描完成，共 {} 张图片", entries.len());
        pb.set_length(entries.len() as u64);

        for path in entries {
            if tx.blocking_send(ImageFile { path }).is_err() {
                break;
            }
        }
    });
    (t, rx)
}

pub fn task_filter(
    mut lrx: Receiver<ImageFile>,
    pb: ProgressBar,
    store: Arc<ImageStore>,
    overwrite: bool,
) -> (JoinHandle<()>, Receiver<ImageFile>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        while let Some(data) = lrx.recv().await {
            if !overwrite {
                match store.contains(&data.path).await {
                    Ok(true) => {
                        pb.set_message(format!("跳过已添加图片: {}", data.path));
                        pb.inc(1);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        pb.println(format!("查询数据库失败 {}: {e:#}", data.path));
                        pb.inc(1);
                        continue;
                    }
                }
            }
            if tx.send(data).await.is_err() {
                break;
            }
        }
    });
    (t, rx)
}

/// 并发地为图片生成描述，同时进行的请求不超过 `concurrency` 个
pub fn task_describe(
    mut lrx: Receiver<ImageFile>,
    pb: ProgressBar,
    describer: Arc<Describer>,
    concurrency: usize,
) -> (JoinHandle<()>, Receiver<DescribedImage>) {
    let (tx, rx) = channel(concurrency);
    let t = tokio::spawn(async move {
        let mut results = futures::stream::poll_fn(move |cx| lrx.poll_recv(cx))
            .map(|data| {
                let describer = describer.clone();
                async move {
                    let result = describer.describe(&data.path).await;
                    (data, result)
                }
            })
            .buffer_unordered(concurrency);

        while let Some((data, result)) = results.next().await {
            match result {
                Ok(description) => {
                    let image = DescribedImage { path: data.path, description };
                    if tx.send(image).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    pb.println(format!("描述图片失败 {}: {e:#}", data.path));
                    pb.inc(1);
                }
            }
        }
    });
    (t, rx)
}

pub fn task_embed(
    mut lrx: Receiver<DescribedImage>,
    pb: ProgressBar,
    embedder: Arc<dyn Embedder>,
) -> (JoinHandle<()>, Receiver<EmbeddedImage>) {
    let (tx, rx) = channel(num_cpus::get());
    let t = tokio::spawn(async move {
        while let Some(data) = lrx.recv().await {
            match embedder.embed(&data.description, EmbedTask::Document).await {
                Ok(vector) => {
                    let image =
                        EmbeddedImage { path: data.path, description: data.description, vector };
                    if tx.send(image).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    pb.println(format!("生成向量失败 {}: {e:#}", data.path));
                    pb.inc(1);
                }
            }
        }
    });
    (t, rx)
}

pub fn task_store(
    mut lrx: Receiver<EmbeddedImage>,
    pb: ProgressBar,
    store: Arc<ImageStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(data) = lrx.recv().await {
            match store.upsert(&data.path, &data.description, &data.vector).await {
                Ok(_) => pb.set_message(data.path),
                Err(e) => pb.println(format!("保存图片失败 {}: {e:#}", data.path)),
            }
            pb.inc(1);
        }
    })
}
