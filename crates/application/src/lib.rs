//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、会话身份，
//! 以及实时广播核心（房间注册表 + 事件扇出）。

pub mod clock;
pub mod dto;
pub mod error;
pub mod identity;
pub mod memory;
pub mod password;
pub mod realtime;
pub mod repository;
pub mod room_code;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, SystemClock};
pub use dto::{IdentityDto, MessageDto, RoomDto, UserDto};
pub use error::ApplicationError;
pub use identity::{
    Identity, IdentityService, IdentityServiceDependencies, MemorySessionStore, Session,
    SessionId, SessionStore,
};
pub use memory::{
    MemoryChatRoomRepository, MemoryMessageRepository, MemoryStorage, MemoryUserRepository,
};
pub use password::{PasswordHasher, PasswordHasherError};
pub use realtime::{
    BroadcastCore, BroadcastCoreDependencies, ClientEvent, ConnectionId, DropReason,
    EventOutcome, Outbox, RealtimeSettings, RoomRegistry, ServerEvent,
};
pub use repository::{ChatRoomRepository, MessageRepository, UserRepository};
pub use room_code::{RandomRoomCodeGenerator, RoomCodeGenerator};
pub use services::{
    CreateRoomRequest, RegisterUserRequest, RoomService, RoomServiceDependencies, UserService,
    UserServiceDependencies,
};
