use std::sync::Arc;

use domain::{ChatRoom, DomainError, Message, RepositoryError, RoomCode, RoomId, UserId};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{ChatRoomRepository, MessageRepository},
    room_code::RoomCodeGenerator,
};

/// 房间码冲突时的最大尝试次数
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct CreateRoomRequest {
    pub name: String,
    pub created_by: UserId,
}

pub struct RoomServiceDependencies {
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub code_generator: Arc<dyn RoomCodeGenerator>,
    pub clock: Arc<dyn Clock>,
}

pub struct RoomService {
    deps: RoomServiceDependencies,
}

impl RoomService {
    pub fn new(deps: RoomServiceDependencies) -> Self {
        Self { deps }
    }

    /// 创建房间并分配随机房间码，码冲突时重新生成
    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<ChatRoom, ApplicationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let room = ChatRoom::new(
                RoomId::generate(),
                request.name.clone(),
                self.deps.code_generator.generate(),
                request.created_by,
                self.deps.clock.now(),
            )?;

            match self.deps.room_repository.create(room).await {
                Ok(stored) => {
                    tracing::info!(
                        room_code = %stored.code,
                        created_by = %stored.created_by,
                        "room created"
                    );
                    return Ok(stored);
                }
                Err(RepositoryError::Conflict { constraint })
                    if constraint == "code" && attempt < MAX_CODE_ATTEMPTS =>
                {
                    tracing::debug!(attempt, "room code collision, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub async fn list_active_rooms(&self) -> Result<Vec<ChatRoom>, ApplicationError> {
        Ok(self.deps.room_repository.list_active().await?)
    }

    pub async fn list_all_rooms(&self) -> Result<Vec<ChatRoom>, ApplicationError> {
        Ok(self.deps.room_repository.list_all().await?)
    }

    /// 按房间码查找房间，包括已停用的房间
    pub async fn find_room(&self, code: &RoomCode) -> Result<ChatRoom, ApplicationError> {
        self.deps
            .room_repository
            .find_by_code(code)
            .await?
            .ok_or_else(|| DomainError::RoomNotFound.into())
    }

    /// 房间内全部消息，按时间升序
    pub async fn history(&self, code: &RoomCode) -> Result<Vec<Message>, ApplicationError> {
        let room = self.find_room(code).await?;
        Ok(self.deps.message_repository.list_by_room(room.id).await?)
    }

    pub async fn deactivate_room(&self, code: &RoomCode) -> Result<ChatRoom, ApplicationError> {
        match self.deps.room_repository.deactivate(code).await {
            Ok(room) => {
                tracing::info!(room_code = %room.code, "room deactivated");
                Ok(room)
            }
            Err(RepositoryError::NotFound) => Err(DomainError::RoomNotFound.into()),
            Err(err) => Err(err.into()),
        }
    }
}
