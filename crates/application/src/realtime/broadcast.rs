//! 实时广播核心
//!
//! 每个入站事件都显式携带调用方身份，处理结果以 [`EventOutcome`] 返回；
//! 被丢弃的事件在线路上不产生任何输出。
//!
//! `send_message` 在同一房间内串行执行“持久化 -> 广播”，
//! 因此持久化顺序与投递顺序一致；不同房间互不阻塞。

use std::{collections::HashMap, sync::Arc, time::Duration};

use domain::{Message, MessageContent, MessageId, RoomCode, RoomId, Timestamp};
use tokio::sync::{mpsc::error::TrySendError, Mutex};

use super::{
    events::{ClientEvent, ServerEvent},
    registry::{ConnectionId, Outbox, RoomRegistry},
};
use crate::{
    clock::Clock,
    identity::Identity,
    repository::{ChatRoomRepository, MessageRepository},
};

/// 事件被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Unauthenticated,
    RoomNotFound,
    InvalidMessage,
    PersistFailed,
    PersistTimedOut,
    /// 查询房间时存储不可用
    StoreUnavailable,
    /// 离开一个并未加入的房间
    NotAMember,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Delivered { recipients: usize },
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy)]
pub struct RealtimeSettings {
    pub persist_timeout: Duration,
    /// 加入房间前是否校验房间码对应一个有效房间
    pub strict_join: bool,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            persist_timeout: Duration::from_millis(2000),
            strict_join: false,
        }
    }
}

pub struct BroadcastCoreDependencies {
    pub registry: Arc<RoomRegistry>,
    pub room_repository: Arc<dyn ChatRoomRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub clock: Arc<dyn Clock>,
    pub settings: RealtimeSettings,
}

/// 房间消息流：串行化同一房间的发送，并记录上一条消息的时间戳
type RoomStream = Arc<Mutex<Option<Timestamp>>>;

pub struct BroadcastCore {
    deps: BroadcastCoreDependencies,
    streams: Mutex<HashMap<RoomId, RoomStream>>,
}

impl BroadcastCore {
    pub fn new(deps: BroadcastCoreDependencies) -> Self {
        Self {
            deps,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.deps.registry
    }

    /// 登记一条新连接
    pub async fn connect(&self, outbox: Outbox) -> ConnectionId {
        let connection = ConnectionId::generate();
        self.deps.registry.attach(connection, outbox).await;
        tracing::debug!(connection_id = %connection, "connection attached");
        connection
    }

    /// 房间停用后释放它的消息流
    pub async fn release_room(&self, room_id: RoomId) {
        if self.streams.lock().await.remove(&room_id).is_some() {
            tracing::debug!(room_id = %room_id, "room stream released");
        }
    }

    /// 连接终止时调用。连接从所有房间移除；
    /// 已认证的连接会向每个房间的剩余成员广播离开状态。
    pub async fn disconnect(
        &self,
        identity: Option<&Identity>,
        connection: ConnectionId,
    ) -> Vec<RoomCode> {
        let rooms = self.deps.registry.disconnect_all(connection).await;
        if let Some(identity) = identity {
            for room in &rooms {
                self.fan_out(room, None, ServerEvent::left(&identity.display_name))
                    .await;
            }
        }
        tracing::debug!(
            connection_id = %connection,
            rooms = rooms.len(),
            "connection detached"
        );
        rooms
    }

    /// 处理一帧原始文本。无法解析的帧记为 [`DropReason::Malformed`]。
    pub async fn handle_frame(
        &self,
        identity: Option<&Identity>,
        connection: ConnectionId,
        frame: &str,
    ) -> EventOutcome {
        match serde_json::from_str::<ClientEvent>(frame) {
            Ok(event) => self.handle(identity, connection, event).await,
            Err(err) => {
                tracing::debug!(connection_id = %connection, error = %err, "malformed frame");
                EventOutcome::Dropped(DropReason::Malformed)
            }
        }
    }

    pub async fn handle(
        &self,
        identity: Option<&Identity>,
        connection: ConnectionId,
        event: ClientEvent,
    ) -> EventOutcome {
        let name = event.name();
        let room = event.room().clone();

        let outcome = match identity {
            None => EventOutcome::Dropped(DropReason::Unauthenticated),
            Some(identity) => match event {
                ClientEvent::Join { room } => self.join(identity, connection, room).await,
                ClientEvent::Leave { room } => self.leave(identity, connection, room).await,
                ClientEvent::Typing { room } => self.typing(identity, connection, room).await,
                ClientEvent::SendMessage { room, message } => {
                    self.send_message(identity, room, message).await
                }
            },
        };

        match outcome {
            EventOutcome::Delivered { recipients } => tracing::debug!(
                connection_id = %connection,
                room_code = %room,
                event = name,
                recipients,
                "event delivered"
            ),
            EventOutcome::Dropped(reason) => tracing::debug!(
                connection_id = %connection,
                room_code = %room,
                event = name,
                ?reason,
                "event dropped"
            ),
        }
        outcome
    }

    async fn join(
        &self,
        identity: &Identity,
        connection: ConnectionId,
        room: RoomCode,
    ) -> EventOutcome {
        if self.deps.settings.strict_join {
            if let Err(reason) = self.resolve_active_room(&room).await {
                return EventOutcome::Dropped(reason);
            }
        }

        self.deps
            .registry
            .join(&room, connection, &identity.display_name)
            .await;
        tracing::info!(
            connection_id = %connection,
            room_code = %room,
            user_id = %identity.user_id,
            "joined room"
        );

        let recipients = self
            .fan_out(&room, None, ServerEvent::joined(&identity.display_name))
            .await;
        EventOutcome::Delivered { recipients }
    }

    async fn leave(
        &self,
        identity: &Identity,
        connection: ConnectionId,
        room: RoomCode,
    ) -> EventOutcome {
        if !self.deps.registry.leave(&room, connection).await {
            return EventOutcome::Dropped(DropReason::NotAMember);
        }
        tracing::info!(
            connection_id = %connection,
            room_code = %room,
            user_id = %identity.user_id,
            "left room"
        );

        let recipients = self
            .fan_out(&room, None, ServerEvent::left(&identity.display_name))
            .await;
        EventOutcome::Delivered { recipients }
    }

    async fn typing(
        &self,
        identity: &Identity,
        connection: ConnectionId,
        room: RoomCode,
    ) -> EventOutcome {
        let event = ServerEvent::Typing {
            username: identity.display_name.clone(),
        };
        let recipients = self.fan_out(&room, Some(connection), event).await;
        EventOutcome::Delivered { recipients }
    }

    async fn send_message(
        &self,
        identity: &Identity,
        code: RoomCode,
        message: String,
    ) -> EventOutcome {
        let Ok(content) = MessageContent::new(message) else {
            return EventOutcome::Dropped(DropReason::InvalidMessage);
        };
        let room_id = match self.resolve_active_room(&code).await {
            Ok(room_id) => room_id,
            Err(reason) => return EventOutcome::Dropped(reason),
        };

        let stream = self.stream(room_id).await;
        let mut last = stream.lock().await;

        let created_at = next_timestamp(*last, self.deps.clock.now());
        *last = Some(created_at);
        let message = Message::new(
            MessageId::generate(),
            room_id,
            identity.user_id,
            identity.display_name.clone(),
            content,
            created_at,
        );

        let persisted = tokio::time::timeout(
            self.deps.settings.persist_timeout,
            self.deps.message_repository.create(message),
        )
        .await;
        let stored = match persisted {
            Ok(Ok(stored)) => stored,
            Ok(Err(err)) => {
                tracing::warn!(room_code = %code, error = %err, "failed to persist message");
                return EventOutcome::Dropped(DropReason::PersistFailed);
            }
            Err(_) => {
                tracing::warn!(
                    room_code = %code,
                    timeout_ms = self.deps.settings.persist_timeout.as_millis() as u64,
                    "persisting message timed out"
                );
                return EventOutcome::Dropped(DropReason::PersistTimedOut);
            }
        };

        let event = ServerEvent::ReceiveMessage {
            username: stored.author_name,
            message: stored.content.as_str().to_owned(),
        };
        // 广播完成前不释放房间锁
        let recipients = self.fan_out(&code, None, event).await;
        drop(last);

        EventOutcome::Delivered { recipients }
    }

    async fn resolve_active_room(&self, code: &RoomCode) -> Result<RoomId, DropReason> {
        match self.deps.room_repository.find_active_by_code(code).await {
            Ok(Some(room)) => Ok(room.id),
            Ok(None) => Err(DropReason::RoomNotFound),
            Err(err) => {
                tracing::warn!(room_code = %code, error = %err, "room lookup failed");
                Err(DropReason::StoreUnavailable)
            }
        }
    }

    async fn stream(&self, room_id: RoomId) -> RoomStream {
        self.streams
            .lock()
            .await
            .entry(room_id)
            .or_default()
            .clone()
    }

    /// 非阻塞投递：出站通道已满或已关闭时只丢弃这一次投递
    async fn fan_out(
        &self,
        room: &RoomCode,
        exclude: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let recipients = self.deps.registry.recipients(room, exclude).await;
        let mut delivered = 0;
        for (connection, outbox) in recipients {
            match outbox.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => tracing::warn!(
                    connection_id = %connection,
                    room_code = %room,
                    "outbox full, dropping event"
                ),
                Err(TrySendError::Closed(_)) => tracing::debug!(
                    connection_id = %connection,
                    room_code = %room,
                    "outbox closed"
                ),
            }
        }
        delivered
    }
}

/// 同一房间内的消息时间戳严格递增，精度为微秒
fn next_timestamp(last: Option<Timestamp>, now: Timestamp) -> Timestamp {
    let now = now - time::Duration::nanoseconds(i64::from(now.nanosecond() % 1_000));
    match last {
        Some(last) if now <= last => last + time::Duration::microseconds(1),
        _ => now,
    }
}
