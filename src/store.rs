use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::RwLock;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use utoipa::ToSchema;

use crate::config::ConfDir;
use crate::db::{self, Database, ImageRecord, crud};
use crate::provider::{EmbedTask, Embedder};

/// 默认的向量集合名称
pub const COLLECTION_NAME: &str = "image_collection";
/// 新建向量集合时的默认维度
pub const DEFAULT_DIMENSION: usize = 128;
const DISTANCE: &str = "cosine";

/// 一条搜索结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchHit {
    /// 图片路径
    pub image_path: String,
    /// 图片描述
    pub description: String,
    /// 余弦相似度
    pub similarity_score: f32,
}

pub struct ImageStoreBuilder {
    conf_dir: ConfDir,
    in_memory: bool,
    dimension: Option<usize>,
}

impl ImageStoreBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, in_memory: false, dimension: None }
    }

    /// 是否只使用内存数据库
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.in_memory = in_memory;
        self
    }

    /// 向量维度，不指定时沿用已有集合的维度
    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub async fn open(self) -> Result<ImageStore> {
        let filename = self.conf_dir.database();
        let db = db::init_db((!self.in_memory).then_some(filename.as_path())).await?;
        let dimension = match self.dimension {
            Some(dimension) => dimension,
            None => crud::get_collection(&db, COLLECTION_NAME)
                .await?
                .map_or(DEFAULT_DIMENSION, |collection| collection.dimension as usize),
        };
        ImageStore::with_database(db, dimension).await
    }
}

/// 图片向量数据库
///
/// 图片记录和向量保存在 sqlite 中，打开时向量会被载入内存中的 usearch 索引。
pub struct ImageStore {
    db: Database,
    index: RwLock<Index>,
    dimension: usize,
}

impl ImageStore {
    pub async fn with_database(db: Database, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(anyhow!("向量维度不能为 0"));
        }
        match crud::get_collection(&db, COLLECTION_NAME).await? {
            Some(collection) => {
                if collection.dimension as usize != dimension {
                    return Err(anyhow!(
                        "向量维度不一致: 数据库为 {}，当前为 {}",
                        collection.dimension,
                        dimension
                    ));
                }
                debug!("使用已有的向量集合: {}", collection.name);
            }
            None => {
                crud::create_collection(&db, COLLECTION_NAME, dimension as i64, DISTANCE).await?;
                info!("向量集合创建成功: {COLLECTION_NAME} ({dimension} 维)");
            }
        }

        let index = new_index(dimension)?;
        let vectors = crud::get_vectors(&db).await?;
        index.reserve(vectors.len().max(64))?;
        for record in vectors {
            let vector = bytes_to_vector(&record.vector);
            if vector.len() != dimension {
                return Err(anyhow!("图片 {} 的向量已损坏", record.id));
            }
            index.add(record.id as u64, vector.as_slice())?;
        }
        info!("已载入 {} 条图片向量", index.size());

        Ok(Self { db, index: RwLock::new(index), dimension })
    }

    /// 添加或替换一张图片，返回是否为新图片
    ///
    /// 先更新索引再写入数据库，数据库写入失败时索引恢复原状。
    pub async fn upsert(&self, path: &str, description: &str, vector: &[f32]) -> Result<bool> {
        self.check_dimension(vector)?;
        let id = image_id(path);
        let key = id as u64;

        let index = self.index.write().await;
        if index.size() + 1 > index.capacity() {
            let capacity = (index.capacity() * 2).max(64);
            index.reserve(capacity)?;
        }
        let previous = if index.contains(key) {
            crud::get_vector(&self.db, id).await?.map(|bytes| bytes_to_vector(&bytes))
        } else {
            None
        };

        if index.contains(key) {
            index.remove(key)?;
        }
        if let Err(e) = index.add(key, vector) {
            restore(&index, key, previous.as_deref());
            return Err(e.into());
        }

        let added = match crud::upsert_image(
            &self.db,
            id,
            path,
            description,
            bytemuck::cast_slice(vector),
        )
        .await
        {
            Ok(added) => added,
            Err(e) => {
                restore(&index, key, previous.as_deref());
                return Err(e.into());
            }
        };
        drop(index);

        debug!("已保存图片: {path}");
        Ok(added)
    }

    /// 搜索与查询向量最相似的图片，按相似度从高到低排序
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        self.check_dimension(query)?;
        if limit == 0 {
            return Ok(vec![]);
        }

        let matches = {
            let index = self.index.read().await;
            if index.size() == 0 {
                return Ok(vec![]);
            }
            index.search(query, limit)?
        };

        let mut results = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.into_iter().zip(matches.distances) {
            if let Some(record) = crud::get_image(&self.db, key as i64).await? {
                results.push(SearchHit {
                    image_path: record.path,
                    description: record.description,
                    similarity_score: 1. - distance,
                });
            }
        }
        results.sort_by(|a, b| b.similarity_score.total_cmp(&a.similarity_score));
        Ok(results)
    }

    /// 使用文本搜索图片
    pub async fn search_text(
        &self,
        embedder: &dyn Embedder,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(anyhow!("查询内容不能为空"));
        }
        let vector = embedder.embed(query, EmbedTask::Query).await?;
        self.search(&vector, limit).await
    }

    /// 根据路径获取图片记录
    pub async fn get(&self, path: &str) -> Result<Option<ImageRecord>> {
        Ok(crud::get_image(&self.db, image_id(path)).await?)
    }

    pub async fn contains(&self, path: &str) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }

    /// 删除一张图片，返回是否存在
    pub async fn remove(&self, path: &str) -> Result<bool> {
        let id = image_id(path);
        let index = self.index.write().await;
        let removed = crud::delete_image(&self.db, id).await?;
        if index.contains(id as u64) {
            index.remove(id as u64)?;
        }
        Ok(removed)
    }

    /// 删除所有图片，返回删除的数量
    pub async fn clear(&self) -> Result<u64> {
        let mut index = self.index.write().await;
        let count = crud::delete_all_images(&self.db).await?;
        *index = new_index(self.dimension)?;
        index.reserve(64)?;
        Ok(count)
    }

    pub async fn count(&self) -> Result<i64> {
        Ok(crud::count_images(&self.db).await?)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(anyhow!(
                "向量维度不一致: 期望 {}，实际 {}",
                self.dimension,
                vector.len()
            ));
        }
        Ok(())
    }
}

/// 将索引中的 key 恢复为之前的向量，之前不存在时删除
fn restore(index: &Index, key: u64, previous: Option<&[f32]>) {
    if index.contains(key) {
        if let Err(e) = index.remove(key) {
            warn!("恢复索引失败 {key}: {e}");
            return;
        }
    }
    if let Some(vector) = previous {
        if let Err(e) = index.add(key, vector) {
            warn!("恢复索引失败 {key}: {e}");
        }
    }
}

fn new_index(dimension: usize) -> Result<Index> {
    let options = IndexOptions {
        dimensions: dimension,
        metric: MetricKind::Cos,
        quantization: ScalarKind::F32,
        ..Default::default()
    };
    Ok(Index::new(&options)?)
}

/// 使用路径的 blake3 哈希作为图片 ID，保留 63 位以适配 sqlite 的 INTEGER
pub fn image_id(path: &str) -> i64 {
    let hash = blake3::hash(path.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    (u64::from_le_bytes(bytes) & i64::MAX as u64) as i64
}

fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytemuck::pod_collect_to_vec(bytes)
}
