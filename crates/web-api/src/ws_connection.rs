use application::{Identity, ServerEvent, SessionId};
use axum::{
    body::Bytes,
    extract::ws::{Message as WsMessage, WebSocket},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接驱动
///
/// 每条连接在广播核心中登记一个出站队列。发送任务负责把队列中的
/// 服务端事件写回 socket，接收循环把客户端帧交给广播核心处理。
/// 身份在每一帧上重新解析，登出或会话过期后事件即被丢弃。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    session_id: Option<SessionId>,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, session_id: Option<SessionId>) -> Self {
        Self {
            socket,
            state,
            session_id,
        }
    }

    pub async fn run(self) {
        let Self {
            socket,
            state,
            session_id,
        } = self;

        let (outbox, mut events) = mpsc::channel::<ServerEvent>(state.outbox_capacity);
        let connection = state.broadcast_core.connect(outbox).await;
        let mut last_identity = resolve(&state, session_id).await;
        tracing::info!(
            connection_id = %connection,
            user = last_identity.as_ref().map(|identity| identity.display_name.as_str()),
            "WebSocket 连接已建立"
        );

        let (mut sender, mut incoming) = socket.split();
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(8);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data),
                    },
                    Some(event) = events.recv() => match serde_json::to_string(&event) {
                        Ok(json) => WsMessage::Text(json.into()),
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to serialize server event");
                            continue;
                        }
                    },
                    else => break,
                };

                if sender.send(frame).await.is_err() {
                    tracing::debug!(connection_id = %connection, "socket closed while sending");
                    break;
                }
            }
        });

        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => {
                    let identity = resolve(&state, session_id).await;
                    if identity.is_some() {
                        last_identity.clone_from(&identity);
                    }
                    state
                        .broadcast_core
                        .handle_frame(identity.as_ref(), connection, text.as_str())
                        .await;
                }
                WsMessage::Binary(_) => {
                    tracing::debug!(connection_id = %connection, "ignoring binary frame");
                }
                WsMessage::Ping(data) => {
                    if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                        break;
                    }
                }
                WsMessage::Pong(_) => {}
                WsMessage::Close(_) => {
                    tracing::debug!(connection_id = %connection, "收到关闭消息");
                    break;
                }
            }
        }

        // 注销连接后出站队列的发送端随之释放，发送任务会自然结束
        drop(cmd_tx);
        let rooms = state
            .broadcast_core
            .disconnect(last_identity.as_ref(), connection)
            .await;
        if let Err(err) = send_task.await {
            tracing::warn!(connection_id = %connection, error = %err, "send task failed");
        }

        tracing::info!(
            connection_id = %connection,
            rooms = rooms.len(),
            "WebSocket 连接已断开"
        );
    }
}

async fn resolve(state: &AppState, session_id: Option<SessionId>) -> Option<Identity> {
    state.identity_service.current_identity(session_id?).await
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Bytes),
}
