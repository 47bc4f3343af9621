use sqlx::FromRow;

/// 向量集合信息
#[derive(Debug, FromRow)]
pub struct CollectionRecord {
    /// 集合名称
    pub name: String,
    /// 向量维度
    pub dimension: i64,
    /// 距离类型
    pub distance: String,
}

/// 图片记录
#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    /// 图片 ID，由图片路径的哈希得到
    pub id: i64,
    /// 图片路径
    pub path: String,
    /// 图片描述
    pub description: String,
}

/// 图片向量记录，向量按 f32 小端序存储
#[derive(FromRow)]
pub struct VectorRecord {
    pub id: i64,
    pub vector: Vec<u8>,
}
