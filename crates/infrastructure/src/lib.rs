//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、bcrypt 密码哈希，以及按配置在 PostgreSQL 与内存
//! 后端之间装配仓储的 [`Infrastructure`]，实现应用层定义的接口。

pub mod builder;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError, MEMORY_DATABASE_URL};
pub use application::memory::{
    MemoryChatRoomRepository, MemoryMessageRepository, MemoryStorage, MemoryUserRepository,
};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgChatRoomRepository, PgMessageRepository, PgStorage, PgUserRepository,
};
