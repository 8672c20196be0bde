//! roomchat 服务入口
//!
//! 加载配置、装配存储后端与应用服务，然后启动 Axum HTTP / WebSocket 服务。

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use application::{IdentityService, RegisterUserRequest};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState};

/// 过期会话的清理间隔
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    tracing::info!(config = %config.sanitized(), "配置加载完成");

    let infra = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        bcrypt_cost: config.security.bcrypt_cost,
    })
    .await
    .context("failed to initialize storage")?;

    let state = AppState::new(&infra, &config);

    if let Some(admin) = &config.admin {
        state
            .user_service
            .bootstrap_admin(RegisterUserRequest {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
            })
            .await
            .context("failed to bootstrap admin account")?;
    }

    tokio::spawn(purge_sessions(state.identity_service.clone()));

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

    tracing::info!(%address, "聊天室服务器已启动");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务器已停止");
    Ok(())
}

async fn purge_sessions(identity_service: Arc<IdentityService>) {
    let mut ticker = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        let purged = identity_service.purge_expired().await;
        if purged > 0 {
            tracing::debug!(purged, "expired sessions purged");
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到关闭信号，正在停止服务");
}
