use sqlx::{Result, SqlitePool};

use super::{CollectionRecord, ImageRecord, VectorRecord};

/// 获取向量集合信息
pub async fn get_collection(executor: &SqlitePool, name: &str) -> Result<Option<CollectionRecord>> {
    sqlx::query_as::<_, CollectionRecord>(
        r#"
        SELECT name, dimension, distance FROM collection WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(executor)
    .await
}

/// 创建向量集合
pub async fn create_collection(
    executor: &SqlitePool,
    name: &str,
    dimension: i64,
    distance: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO collection (name, dimension, distance)
        VALUES (?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(dimension)
    .bind(distance)
    .execute(executor)
    .await?;
    Ok(())
}

/// 添加或替换图片记录，返回是否为新记录
pub async fn upsert_image(
    executor: &SqlitePool,
    id: i64,
    path: &str,
    description: &str,
    vector: &[u8],
) -> Result<bool> {
    let mut tx = executor.begin().await?;
    let exists = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM image WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?
        > 0;
    sqlx::query(
        r#"
        INSERT INTO image (id, path, description, vector)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            path = excluded.path,
            description = excluded.description,
            vector = excluded.vector
        "#,
    )
    .bind(id)
    .bind(path)
    .bind(description)
    .bind(vector)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(!exists)
}

/// 根据 ID 获取图片记录
pub async fn get_image(executor: &SqlitePool, id: i64) -> Result<Option<ImageRecord>> {
    sqlx::query_as::<_, ImageRecord>(
        r#"
        SELECT id, path, description FROM image WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// 根据 ID 获取图片向量
pub async fn get_vector(executor: &SqlitePool, id: i64) -> Result<Option<Vec<u8>>> {
    sqlx::query_scalar::<_, Vec<u8>>(
        r#"
        SELECT vector FROM image WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// 获取所有图片向量
pub async fn get_vectors(executor: &SqlitePool) -> Result<Vec<VectorRecord>> {
    sqlx::query_as::<_, VectorRecord>(
        r#"
        SELECT id, vector FROM image ORDER BY id ASC
        "#,
    )
    .fetch_all(executor)
    .await
}

/// 删除图片记录，返回是否删除成功
pub async fn delete_image(executor: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM image WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// 删除所有图片记录
pub async fn delete_all_images(executor: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(r#"DELETE FROM image"#).execute(executor).await?;
    Ok(result.rows_affected())
}

/// 查询数据库中的图片数量
pub async fn count_images(executor: &SqlitePool) -> Result<i64> {
    sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM image"#).fetch_one(executor).await
}
