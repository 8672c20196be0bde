use std::sync::Arc;

use application::{
    ChatRoomRepository, MemoryStorage, MessageRepository, PasswordHasher, UserRepository,
};
use sqlx::PgPool;
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

/// 使用内存存储的数据库地址
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub bcrypt_cost: Option<u32>,
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            database_url: MEMORY_DATABASE_URL.to_string(),
            max_connections: 5,
            bcrypt_cost: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 已装配好的存储后端与密码哈希
#[derive(Clone)]
pub struct Infrastructure {
    pub user_repository: Arc<dyn UserRepository>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    /// 仅 PostgreSQL 后端存在
    pub pool: Option<PgPool>,
}

impl Infrastructure {
    /// 根据 `database_url` 选择后端：`memory://` 使用内存仓储，
    /// 其余地址按 PostgreSQL 连接并执行迁移。
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let password_hasher: Arc<dyn PasswordHasher> =
            Arc::new(BcryptPasswordHasher::new(config.bcrypt_cost));

        if config.database_url == MEMORY_DATABASE_URL {
            tracing::warn!("using in-memory storage, data will not survive a restart");
            return Ok(Self::in_memory(password_hasher));
        }

        let pool = create_pg_pool(&config.database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;
        tracing::info!(
            max_connections = config.max_connections,
            "connected to postgres and applied migrations"
        );

        let storage = PgStorage::new(pool.clone());
        Ok(Self {
            user_repository: storage.user_repository,
            room_repository: storage.room_repository,
            message_repository: storage.message_repository,
            password_hasher,
            pool: Some(pool),
        })
    }

    /// 内存后端，可注入任意密码哈希（测试中常用低成本哈希）
    pub fn in_memory(password_hasher: Arc<dyn PasswordHasher>) -> Self {
        let storage = MemoryStorage::new();
        Self {
            user_repository: storage.user_repository,
            room_repository: storage.room_repository,
            message_repository: storage.message_repository,
            password_hasher,
            pool: None,
        }
    }
}
