use crate::value_objects::{PasswordHash, Timestamp, UserEmail, UserId, Username};

/// 注册用户。注册后不可变，也不会被删除。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub is_admin: bool,
    pub created_at: Timestamp,
}

impl User {
    pub fn register(
        id: UserId,
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            username,
            email,
            password,
            is_admin: false,
            created_at: now,
        }
    }

    /// 创建管理员账号，仅用于启动时的引导配置。
    pub fn register_admin(
        id: UserId,
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            is_admin: true,
            ..Self::register(id, username, email, password, now)
        }
    }

    pub fn display_name(&self) -> &str {
        self.username.as_str()
    }
}
