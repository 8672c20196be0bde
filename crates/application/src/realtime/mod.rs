//! 实时层：房间注册表、线路事件与广播核心

mod broadcast;
mod events;
mod registry;

pub use broadcast::{
    BroadcastCore, BroadcastCoreDependencies, DropReason, EventOutcome, RealtimeSettings,
};
pub use events::{ClientEvent, ServerEvent};
pub use registry::{ConnectionId, Outbox, RoomRegistry};
