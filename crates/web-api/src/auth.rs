//! 会话令牌与请求身份提取
//!
//! 登录成功后签发一个 JWT，其中携带会话 id（`sid`）。令牌只证明会话的存在，
//! 身份本身每次都从会话存储中解析，因此登出后旧令牌立即失效。

use application::{Identity, Session, SessionId};
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// JWT Claims 结构
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 id
    pub sub: Uuid,
    /// 会话 id
    pub sid: Uuid,
    /// 过期时间 (Unix timestamp)
    pub exp: i64,
}

/// JWT Token 服务
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// 为会话签发令牌，过期时间与会话一致
    pub fn issue(&self, session: &Session) -> Result<String, ApiError> {
        let claims = Claims {
            sub: Uuid::from(session.identity.user_id),
            sid: Uuid::from(session.id),
            exp: session.expires_at.unix_timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|err| {
            tracing::error!(error = %err, "token generation failed");
            ApiError::internal_server_error("token generation failed")
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|token_data| token_data.claims)
            .map_err(|err| ApiError::unauthorized(format!("invalid token: {err}")))
    }

    /// 校验令牌并取出会话 id，令牌缺失或无效时返回 `None`
    pub fn session_id(&self, token: Option<&str>) -> Option<SessionId> {
        let claims = self.verify(token?).ok()?;
        Some(SessionId::from(claims.sid))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header format"))
}

/// 已登录的请求方
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: SessionId,
    pub identity: Identity,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = state.jwt_service.verify(token)?;
        let session_id = SessionId::from(claims.sid);

        let identity = state
            .identity_service
            .current_identity(session_id)
            .await
            .ok_or_else(|| ApiError::unauthorized("session expired or logged out"))?;

        Ok(Self {
            session_id,
            identity,
        })
    }
}

/// 带管理员标记的请求方
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.identity.is_admin {
            return Err(ApiError::forbidden("admin privileges required"));
        }
        Ok(Self(user))
    }
}
