//! HTTP / WebSocket 接入层
//!
//! 提供 JSON API、管理端接口，以及驱动实时广播核心的 WebSocket 端点。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{AdminUser, Claims, CurrentUser, JwtService};
pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
pub use ws_connection::WebSocketConnection;
