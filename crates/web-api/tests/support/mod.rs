#![allow(dead_code)]

use std::time::Duration;

use application::RegisterUserRequest;
use config::AppConfig;
use futures_util::{SinkExt, StreamExt};
use infrastructure::{Infrastructure, InfrastructureConfig};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::{router, AppState};

pub const PASSWORD: &str = "secret-pw";
pub const ADMIN_NAME: &str = "root";
pub const ADMIN_PASSWORD: &str = "admin-secret-pw";

const BASE_CONFIG: &str = r#"
[session]
secret = "integration-test-secret-with-32-plus-chars"

[security]
bcrypt_cost = 4
"#;

/// 在随机端口上运行的测试服务器，使用内存存储
pub struct TestServer {
    pub http: String,
    pub ws: String,
    pub client: Client,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn spawn_server() -> TestServer {
    spawn_server_with("").await
}

/// `extra` 追加在基础配置之后，用于打开 `strict_join` 等开关
pub async fn spawn_server_with(extra: &str) -> TestServer {
    let config = AppConfig::from_toml_str(&format!("{BASE_CONFIG}\n{extra}")).expect("config");
    config.validate().expect("valid config");

    let infra = Infrastructure::connect(InfrastructureConfig {
        bcrypt_cost: config.security.bcrypt_cost,
        ..InfrastructureConfig::default()
    })
    .await
    .expect("in-memory infrastructure");
    let state = AppState::new(&infra, &config);

    state
        .user_service
        .bootstrap_admin(RegisterUserRequest {
            username: ADMIN_NAME.into(),
            email: "root@example.com".into(),
            password: ADMIN_PASSWORD.into(),
        })
        .await
        .expect("bootstrap admin");

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let app = router(state);

    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        http: format!("http://{addr}"),
        ws: format!("ws://{addr}/api/v1/ws"),
        client: Client::new(),
        shutdown: Some(shutdown_tx),
    }
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.http)
    }

    pub async fn register(&self, username: &str) -> Value {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(&json!({
                "username": username,
                "email": format!("{username}@example.com"),
                "password": PASSWORD,
            }))
            .send()
            .await
            .expect("register request");
        assert_eq!(response.status(), StatusCode::CREATED, "register {username}");
        response.json().await.expect("user json")
    }

    pub async fn login_as(&self, path: &str, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request")
    }

    /// 注册并登录，返回令牌
    pub async fn user_token(&self, username: &str) -> String {
        self.register(username).await;
        self.token_for(username).await
    }

    /// 以已注册的用户登录，返回令牌
    pub async fn token_for(&self, username: &str) -> String {
        let response = self.login_as("/auth/login", username, PASSWORD).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.expect("login json");
        body["token"].as_str().expect("token").to_owned()
    }

    pub async fn admin(&self) -> String {
        let response = self
            .login_as("/auth/admin/login", ADMIN_NAME, ADMIN_PASSWORD)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.expect("login json");
        body["token"].as_str().expect("token").to_owned()
    }

    pub async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request")
    }

    pub async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .expect("post request")
    }

    /// 创建房间并返回房间码
    pub async fn create_room(&self, token: &str, name: &str) -> String {
        let response = self.post(token, "/rooms", json!({ "name": name })).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let room: Value = response.json().await.expect("room json");
        room["code"].as_str().expect("code").to_owned()
    }

    pub async fn connect(&self, token: Option<&str>) -> WsClient {
        let url = match token {
            Some(token) => format!("{}?token={token}", self.ws),
            None => self.ws.clone(),
        };
        let (stream, _) = connect_async(url).await.expect("websocket connect");
        WsClient { stream }
    }
}

pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl WsClient {
    pub async fn send(&mut self, event: &str, data: Value) {
        let frame = json!({ "event": event, "data": data }).to_string();
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, frame: &str) {
        self.stream
            .send(TungsteniteMessage::Text(frame.to_owned().into()))
            .await
            .expect("send frame");
    }

    pub async fn join(&mut self, room: &str) {
        self.send("join", json!({ "room": room })).await;
    }

    /// 下一条服务端事件，2 秒内未收到则失败
    pub async fn recv(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.next_event())
            .await
            .expect("timed out waiting for event")
            .expect("socket closed")
    }

    /// 断言短时间内没有任何事件到达
    pub async fn expect_silence(&mut self) {
        if let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(300), self.next_event()).await
        {
            panic!("unexpected event: {event}");
        }
    }

    pub async fn close(mut self) {
        self.stream.close(None).await.ok();
    }

    async fn next_event(&mut self) -> Option<Value> {
        while let Some(message) = self.stream.next().await {
            match message.ok()? {
                TungsteniteMessage::Text(text) => {
                    return Some(serde_json::from_str(text.as_str()).expect("event json"));
                }
                TungsteniteMessage::Close(_) => return None,
                _ => continue,
            }
        }
        None
    }
}

pub fn status(msg: &str) -> Value {
    json!({ "event": "status", "data": { "msg": msg } })
}

pub fn typing(username: &str) -> Value {
    json!({ "event": "typing", "data": { "username": username } })
}

pub fn received(username: &str, message: &str) -> Value {
    json!({ "event": "receive_message", "data": { "username": username, "message": message } })
}
