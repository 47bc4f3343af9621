use std::path::Path;

use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::*;

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 初始化数据库连接，`filename` 为空时使用内存数据库
pub async fn init_db(filename: Option<&Path>) -> Result<Database, sqlx::Error> {
    let pool = match filename {
        Some(filename) => {
            info!("初始化数据库连接: {}", filename.display());
            if let Some(parent) = filename.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let options = SqliteConnectOptions::new()
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .filename(filename)
                .create_if_missing(true);
            SqlitePool::connect_with(options).await?
        }
        None => {
            info!("初始化内存数据库");
            // 每个内存数据库连接都是独立的，因此只能保留一个连接
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(SqliteConnectOptions::new().in_memory(true))
                .await?
        }
    };

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await?;

    Ok(pool)
}
