use std::sync::Arc;

use domain::{DomainError, RepositoryError, User, UserEmail, UserId, Username};

use crate::{
    clock::Clock, error::ApplicationError, password::PasswordHasher, repository::UserRepository,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册普通用户。用户名与邮箱分别校验唯一性。
    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let (username, email) = self.check_available(&request).await?;
        let password_hash = self.deps.password_hasher.hash(&request.password).await?;

        let user = User::register(
            UserId::generate(),
            username,
            email,
            password_hash,
            self.deps.clock.now(),
        );
        let stored = self.store(user).await?;
        tracing::info!(user_id = %stored.id, username = %stored.username, "user registered");
        Ok(stored)
    }

    /// 确保配置中的管理员账号存在。已存在同名账号时直接返回该账号。
    pub async fn bootstrap_admin(
        &self,
        request: RegisterUserRequest,
    ) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username.clone())?;
        if let Some(existing) = self.deps.user_repository.find_by_username(&username).await? {
            if !existing.is_admin {
                tracing::warn!(
                    username = %existing.username,
                    "bootstrap admin name belongs to a regular user"
                );
            }
            return Ok(existing);
        }

        let (username, email) = self.check_available(&request).await?;
        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let admin = User::register_admin(
            UserId::generate(),
            username,
            email,
            password_hash,
            self.deps.clock.now(),
        );
        let stored = self.store(admin).await?;
        tracing::info!(user_id = %stored.id, username = %stored.username, "admin account created");
        Ok(stored)
    }

    pub async fn find_by_id(&self, id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound.into())
    }

    pub async fn list_all_users(&self) -> Result<Vec<User>, ApplicationError> {
        Ok(self.deps.user_repository.list_all().await?)
    }

    async fn check_available(
        &self,
        request: &RegisterUserRequest,
    ) -> Result<(Username, UserEmail), ApplicationError> {
        let username = Username::parse(request.username.clone())?;
        let email = UserEmail::parse(request.email.clone())?;
        if request.password.is_empty() {
            return Err(DomainError::invalid_argument("password", "cannot be empty").into());
        }

        if self
            .deps
            .user_repository
            .find_by_username(&username)
            .await?
            .is_some()
        {
            return Err(DomainError::UsernameTaken.into());
        }
        if self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .is_some()
        {
            return Err(DomainError::EmailTaken.into());
        }
        Ok((username, email))
    }

    /// 并发注册可能绕过预检查，由存储层唯一约束兜底
    async fn store(&self, user: User) -> Result<User, ApplicationError> {
        match self.deps.user_repository.create(user).await {
            Ok(stored) => Ok(stored),
            Err(RepositoryError::Conflict { constraint }) if constraint == "username" => {
                Err(DomainError::UsernameTaken.into())
            }
            Err(RepositoryError::Conflict { constraint }) if constraint == "email" => {
                Err(DomainError::EmailTaken.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MockUserRepository;
    use crate::memory::MemoryUserRepository;
    use crate::test_support::{ManualClock, PlainPasswordHasher};

    fn service_with(users: Arc<dyn UserRepository>) -> UserService {
        UserService::new(UserServiceDependencies {
            user_repository: users,
            password_hasher: Arc::new(PlainPasswordHasher),
            clock: Arc::new(ManualClock::default()),
        })
    }

    fn request(username: &str, email: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            username: username.to_owned(),
            email: email.to_owned(),
            password: "secret".to_owned(),
        }
    }

    fn domain_error(result: Result<User, ApplicationError>) -> DomainError {
        match result {
            Err(ApplicationError::Domain(err)) => err,
            other => panic!("expected domain error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_hashes_password_and_stores_user() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));

        let user = service.register(request("alice", "a@x.com")).await.unwrap();

        assert_eq!(user.username.as_str(), "alice");
        assert!(!user.is_admin);
        assert_eq!(user.password.as_str(), "plain:secret");
        assert_eq!(service.find_by_id(user.id).await.unwrap(), user);
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected_independently() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));
        service.register(request("alice", "a@x.com")).await.unwrap();

        assert_eq!(
            domain_error(service.register(request("alice", "other@x.com")).await),
            DomainError::UsernameTaken
        );
        assert_eq!(
            domain_error(service.register(request("bob", "a@x.com")).await),
            DomainError::EmailTaken
        );
        assert_eq!(service.list_all_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_checks_hold_in_reverse_order() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));
        service.register(request("bob", "a@x.com")).await.unwrap();
        service.register(request("alice", "b@x.com")).await.unwrap();

        assert_eq!(
            domain_error(service.register(request("carol", "a@x.com")).await),
            DomainError::EmailTaken
        );
        assert_eq!(
            domain_error(service.register(request("alice", "c@x.com")).await),
            DomainError::UsernameTaken
        );
    }

    #[tokio::test]
    async fn storage_conflict_maps_to_domain_error() {
        let mut users = MockUserRepository::new();
        users.expect_find_by_username().returning(|_| Ok(None));
        users.expect_find_by_email().returning(|_| Ok(None));
        users
            .expect_create()
            .returning(|_| Err(RepositoryError::conflict("email")));
        let service = service_with(Arc::new(users));

        assert_eq!(
            domain_error(service.register(request("alice", "a@x.com")).await),
            DomainError::EmailTaken
        );
    }

    #[tokio::test]
    async fn invalid_fields_are_rejected() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));

        assert!(matches!(
            domain_error(service.register(request("  ", "a@x.com")).await),
            DomainError::InvalidArgument { .. }
        ));
        assert!(matches!(
            domain_error(service.register(request("alice", "nope")).await),
            DomainError::InvalidArgument { .. }
        ));
        let mut empty_password = request("alice", "a@x.com");
        empty_password.password.clear();
        assert!(matches!(
            domain_error(service.register(empty_password).await),
            DomainError::InvalidArgument { .. }
        ));
    }

    #[tokio::test]
    async fn bootstrap_admin_is_idempotent() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));

        let first = service
            .bootstrap_admin(request("root", "root@x.com"))
            .await
            .unwrap();
        let second = service
            .bootstrap_admin(request("root", "root@x.com"))
            .await
            .unwrap();

        assert!(first.is_admin);
        assert_eq!(first.id, second.id);
        assert_eq!(service.list_all_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let service = service_with(Arc::new(MemoryUserRepository::default()));
        assert!(matches!(
            service.find_by_id(UserId::generate()).await,
            Err(ApplicationError::Domain(DomainError::UserNotFound))
        ));
    }
}
