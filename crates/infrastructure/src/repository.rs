use std::sync::Arc;

use application::repository::{ChatRoomRepository, MessageRepository, UserRepository};
use async_trait::async_trait;
use domain::{
    ChatRoom, Message, MessageContent, MessageId, PasswordHash, RepositoryError, RoomCode,
    RoomId, User, UserEmail, UserId, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let constraint = db_err.constraint().map(unique_column).unwrap_or("unknown");
            return RepositoryError::conflict(constraint);
        }
    }
    RepositoryError::storage_with_source("database query failed", err)
}

/// 唯一约束名 -> 冲突列名
fn unique_column(constraint: &str) -> &'static str {
    match constraint {
        "users_username_key" => "username",
        "users_email_key" => "email",
        "chat_rooms_code_key" => "code",
        _ => "unknown",
    }
}

fn invalid_data(err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::storage(format!("invalid stored data: {err}"))
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    is_admin: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::from(value.id),
            username: Username::parse(value.username).map_err(invalid_data)?,
            email: UserEmail::parse(value.email).map_err(invalid_data)?,
            password: PasswordHash::new(value.password_hash).map_err(invalid_data)?,
            is_admin: value.is_admin,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoomRecord {
    id: Uuid,
    name: String,
    code: String,
    created_by: Uuid,
    is_active: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<RoomRecord> for ChatRoom {
    type Error = RepositoryError;

    fn try_from(value: RoomRecord) -> Result<Self, Self::Error> {
        Ok(ChatRoom {
            id: RoomId::from(value.id),
            name: value.name,
            code: RoomCode::parse(value.code).map_err(invalid_data)?,
            created_by: UserId::from(value.created_by),
            is_active: value.is_active,
            created_at: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    room_id: Uuid,
    author_id: Uuid,
    author_name: String,
    content: String,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Message::new(
            MessageId::from(value.id),
            RoomId::from(value.room_id),
            UserId::from(value.author_id),
            value.author_name,
            MessageContent::new(value.content).map_err(invalid_data)?,
            value.created_at,
        ))
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, is_admin, created_at";
const ROOM_COLUMNS: &str = "id, name, code, created_by, is_active, created_at";
const MESSAGE_COLUMNS: &str = "id, room_id, author_id, author_name, content, created_at";

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, key: UserKey) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} = $1",
            key.column()
        );
        let query = sqlx::query_as::<_, UserRecord>(&sql);
        let query = match key {
            UserKey::Id(id) => query.bind(id),
            UserKey::Username(value) | UserKey::Email(value) => query.bind(value),
        };
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }
}

enum UserKey {
    Id(Uuid),
    Username(String),
    Email(String),
}

impl UserKey {
    fn column(&self) -> &'static str {
        match self {
            Self::Id(_) => "id",
            Self::Username(_) => "username",
            Self::Email(_) => "email",
        }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(user.id))
            .bind(user.username.as_str())
            .bind(user.email.as_str())
            .bind(user.password.as_str())
            .bind(user.is_admin)
            .bind(user.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        User::try_from(record)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.find_one(UserKey::Id(Uuid::from(id))).await
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        self.find_one(UserKey::Username(username.as_str().to_owned()))
            .await
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        self.find_one(UserKey::Email(email.as_str().to_owned()))
            .await
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at, username");
        sqlx::query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }
}

#[derive(Clone)]
pub struct PgChatRoomRepository {
    pool: PgPool,
}

impl PgChatRoomRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_rooms(&self, sql: &str) -> Result<Vec<ChatRoom>, RepositoryError> {
        sqlx::query_as::<_, RoomRecord>(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(ChatRoom::try_from)
            .collect()
    }
}

#[async_trait]
impl ChatRoomRepository for PgChatRoomRepository {
    async fn create(&self, room: ChatRoom) -> Result<ChatRoom, RepositoryError> {
        let sql = format!(
            "INSERT INTO chat_rooms ({ROOM_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ROOM_COLUMNS}"
        );
        let record = sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(Uuid::from(room.id))
            .bind(&room.name)
            .bind(room.code.as_str())
            .bind(Uuid::from(room.created_by))
            .bind(room.is_active)
            .bind(room.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        ChatRoom::try_from(record)
    }

    async fn find_by_code(&self, code: &RoomCode) -> Result<Option<ChatRoom>, RepositoryError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE code = $1");
        sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(ChatRoom::try_from)
            .transpose()
    }

    async fn find_active_by_code(
        &self,
        code: &RoomCode,
    ) -> Result<Option<ChatRoom>, RepositoryError> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE code = $1 AND is_active");
        sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(ChatRoom::try_from)
            .transpose()
    }

    async fn list_active(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        self.fetch_rooms(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE is_active ORDER BY created_at, code"
        ))
        .await
    }

    async fn list_all(&self) -> Result<Vec<ChatRoom>, RepositoryError> {
        self.fetch_rooms(&format!(
            "SELECT {ROOM_COLUMNS} FROM chat_rooms ORDER BY created_at, code"
        ))
        .await
    }

    async fn deactivate(&self, code: &RoomCode) -> Result<ChatRoom, RepositoryError> {
        let sql = format!(
            "UPDATE chat_rooms SET is_active = FALSE WHERE code = $1 RETURNING {ROOM_COLUMNS}"
        );
        let record = sqlx::query_as::<_, RoomRecord>(&sql)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;
        ChatRoom::try_from(record)
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<Message, RepositoryError> {
        let sql = format!(
            "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {MESSAGE_COLUMNS}"
        );
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::from(message.id))
            .bind(Uuid::from(message.room_id))
            .bind(Uuid::from(message.author_id))
            .bind(&message.author_name)
            .bind(message.content.as_str())
            .bind(message.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Message::try_from(record)
    }

    async fn list_by_room(&self, room_id: RoomId) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(Uuid::from(room_id))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }
}

/// PostgreSQL 仓储集合，共享同一个连接池
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub room_repository: Arc<PgChatRoomRepository>,
    pub message_repository: Arc<PgMessageRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            room_repository: Arc::new(PgChatRoomRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::unique_column;

    #[test]
    fn unique_constraints_map_to_column_names() {
        assert_eq!(unique_column("users_username_key"), "username");
        assert_eq!(unique_column("users_email_key"), "email");
        assert_eq!(unique_column("chat_rooms_code_key"), "code");
        assert_eq!(unique_column("something_else"), "unknown");
    }
}
