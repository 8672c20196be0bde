use std::sync::Arc;

use application::{
    BroadcastCore, BroadcastCoreDependencies, Clock, IdentityService,
    IdentityServiceDependencies, MemorySessionStore, RandomRoomCodeGenerator, RealtimeSettings,
    RoomRegistry, RoomService, RoomServiceDependencies, SystemClock, UserService,
    UserServiceDependencies,
};
use config::AppConfig;
use infrastructure::Infrastructure;

use crate::auth::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub room_service: Arc<RoomService>,
    pub identity_service: Arc<IdentityService>,
    pub broadcast_core: Arc<BroadcastCore>,
    pub jwt_service: Arc<JwtService>,
    /// 每条 WebSocket 连接出站队列的容量
    pub outbox_capacity: usize,
}

impl AppState {
    /// 在已装配的基础设施之上构建全部应用服务
    pub fn new(infra: &Infrastructure, config: &AppConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let session_ttl =
            time::Duration::try_from(config.session.ttl()).unwrap_or(time::Duration::MAX);

        let user_service = UserService::new(UserServiceDependencies {
            user_repository: infra.user_repository.clone(),
            password_hasher: infra.password_hasher.clone(),
            clock: clock.clone(),
        });

        let room_service = RoomService::new(RoomServiceDependencies {
            room_repository: infra.room_repository.clone(),
            message_repository: infra.message_repository.clone(),
            code_generator: Arc::new(RandomRoomCodeGenerator),
            clock: clock.clone(),
        });

        let identity_service = IdentityService::new(IdentityServiceDependencies {
            user_repository: infra.user_repository.clone(),
            password_hasher: infra.password_hasher.clone(),
            session_store: Arc::new(MemorySessionStore::new()),
            clock: clock.clone(),
            session_ttl,
        });

        let broadcast_core = BroadcastCore::new(BroadcastCoreDependencies {
            registry: Arc::new(RoomRegistry::new()),
            room_repository: infra.room_repository.clone(),
            message_repository: infra.message_repository.clone(),
            clock,
            settings: RealtimeSettings {
                persist_timeout: config.realtime.persist_timeout(),
                strict_join: config.realtime.strict_join,
            },
        });

        Self {
            user_service: Arc::new(user_service),
            room_service: Arc::new(room_service),
            identity_service: Arc::new(identity_service),
            broadcast_core: Arc::new(broadcast_core),
            jwt_service: Arc::new(JwtService::new(&config.session.secret)),
            outbox_capacity: config.realtime.outbox_capacity,
        }
    }
}
