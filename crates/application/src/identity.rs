//! 会话与身份上下文
//!
//! 身份以显式值的形式传入每一个核心操作：HTTP 请求和实时连接都只持有一个
//! [`SessionId`]，每次使用时通过 [`IdentityService::current_identity`] 解析，
//! 因此登出（[`IdentityService::clear`]）会立即对已建立的连接生效。

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use domain::{Timestamp, User, UserId, Username};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    clock::Clock, error::ApplicationError, password::PasswordHasher, repository::UserRepository,
};

/// 已认证的身份
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
    pub is_admin: bool,
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            display_name: user.display_name().to_owned(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SessionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<SessionId> for Uuid {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub expires_at: Timestamp,
}

/// 会话存储
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: Session);
    async fn get(&self, id: SessionId) -> Option<Session>;
    async fn remove(&self, id: SessionId) -> bool;
    /// 清理 `now` 之前过期的会话，返回清理数量
    async fn purge_expired(&self, now: Timestamp) -> usize;
}

/// 进程内会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: Session) {
        self.sessions.write().await.insert(session.id, session);
    }

    async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions.read().await.get(&id).cloned()
    }

    async fn remove(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    async fn purge_expired(&self, now: Timestamp) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.expires_at > now);
        before - sessions.len()
    }
}

pub struct IdentityServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub session_store: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub session_ttl: time::Duration,
}

pub struct IdentityService {
    deps: IdentityServiceDependencies,
}

impl IdentityService {
    pub fn new(deps: IdentityServiceDependencies) -> Self {
        Self { deps }
    }

    /// 用户名 + 密码认证。用户不存在与密码错误都返回 `None`。
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, ApplicationError> {
        let Ok(username) = Username::parse(username) else {
            return Ok(None);
        };
        let Some(user) = self.deps.user_repository.find_by_username(&username).await? else {
            return Ok(None);
        };

        let password_ok = self
            .deps
            .password_hasher
            .verify(password, &user.password)
            .await?;
        if !password_ok {
            return Ok(None);
        }

        Ok(Some(Identity::from(&user)))
    }

    /// 与 [`Self::authenticate`] 相同，但要求账号带有管理员标记
    pub async fn authenticate_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Identity>, ApplicationError> {
        Ok(self
            .authenticate(username, password)
            .await?
            .filter(|identity| identity.is_admin))
    }

    pub async fn open_session(&self, identity: Identity) -> Result<Session, ApplicationError> {
        let expires_at = self
            .deps
            .clock
            .now()
            .checked_add(self.deps.session_ttl)
            .ok_or_else(|| ApplicationError::infrastructure("session expiry out of range"))?;
        let session = Session {
            id: SessionId::generate(),
            expires_at,
            identity,
        };
        self.deps.session_store.insert(session.clone()).await;
        tracing::info!(
            user_id = %session.identity.user_id,
            session_id = %session.id,
            "session opened"
        );
        Ok(session)
    }

    pub async fn current_identity(&self, session_id: SessionId) -> Option<Identity> {
        let session = self.deps.session_store.get(session_id).await?;
        if session.expires_at <= self.deps.clock.now() {
            self.deps.session_store.remove(session_id).await;
            return None;
        }
        Some(session.identity)
    }

    pub async fn clear(&self, session_id: SessionId) {
        if self.deps.session_store.remove(session_id).await {
            tracing::info!(session_id = %session_id, "session cleared");
        }
    }

    pub async fn purge_expired(&self) -> usize {
        self.deps
            .session_store
            .purge_expired(self.deps.clock.now())
            .await
    }
}
