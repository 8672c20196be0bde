mod room_service;
mod user_service;

pub use room_service::{CreateRoomRequest, RoomService, RoomServiceDependencies};
pub use user_service::{RegisterUserRequest, UserService, UserServiceDependencies};
