//! 统一配置中心
//!
//! 加载顺序（后者覆盖前者）：
//! 1. 内置默认值
//! 2. 可选的 TOML 文件（`ROOMCHAT_CONFIG_FILE` 指定，默认 `roomchat.toml`，不存在则跳过）
//! 3. `ROOMCHAT_` 前缀的环境变量，层级用 `__` 分隔，如 `ROOMCHAT_SERVER__PORT=9000`

use std::{path::Path, time::Duration};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "ROOMCHAT_";
pub const CONFIG_FILE_VAR: &str = "ROOMCHAT_CONFIG_FILE";
pub const DEFAULT_CONFIG_FILE: &str = "roomchat.toml";

/// 会话签名密钥的最小长度（256 bit）
pub const MIN_SECRET_LEN: usize = 32;
/// 会话有效期上限（十年）
pub const MAX_SESSION_TTL_MINUTES: u64 = 525_600 * 10;

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub realtime: RealtimeConfig,
    pub security: SecurityConfig,
    /// 启动时确保存在的管理员账号
    pub admin: Option<AdminConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `memory://` 或 PostgreSQL 连接串
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "memory://".into(),
            max_connections: 5,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// 会话令牌签名密钥，无默认值，必须显式配置
    pub secret: String,
    pub ttl_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_minutes: 24 * 60,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &"[REDACTED]")
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// 每条连接出站队列的容量
    pub outbox_capacity: usize,
    pub persist_timeout_ms: u64,
    /// 加入房间前校验房间码
    pub strict_join: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: 64,
            persist_timeout_ms: 2000,
            strict_join: false,
        }
    }
}

impl RealtimeConfig {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    pub bcrypt_cost: Option<u32>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

impl AppConfig {
    /// 按默认值 -> 配置文件 -> 环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::extract(
            Self::base()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// 仅从 TOML 文本加载（叠加在默认值之上），不读取环境变量
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(Self::base().merge(Toml::string(toml)))
    }

    fn base() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerConfig(
                "host cannot be empty".into(),
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::InvalidDatabaseConfig(
                "url cannot be empty".into(),
            ));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidDatabaseConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.session.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidSessionSecret(format!(
                "secret must be at least {MIN_SECRET_LEN} characters long"
            )));
        }
        if self.session.ttl_minutes == 0 {
            return Err(ConfigError::InvalidSessionConfig(
                "ttl_minutes must be greater than 0".into(),
            ));
        }
        if self.session.ttl_minutes > MAX_SESSION_TTL_MINUTES {
            return Err(ConfigError::InvalidSessionConfig(format!(
                "ttl_minutes must not exceed {MAX_SESSION_TTL_MINUTES}"
            )));
        }

        if self.realtime.outbox_capacity == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "outbox_capacity must be greater than 0".into(),
            ));
        }
        if self.realtime.persist_timeout_ms == 0 {
            return Err(ConfigError::InvalidRealtimeConfig(
                "persist_timeout_ms must be greater than 0".into(),
            ));
        }

        if let Some(cost) = self.security.bcrypt_cost {
            if !(4..=31).contains(&cost) {
                return Err(ConfigError::InvalidSecurityConfig(
                    "bcrypt_cost must be between 4 and 31".into(),
                ));
            }
        }

        if let Some(admin) = &self.admin {
            if admin.username.trim().is_empty() || admin.password.is_empty() {
                return Err(ConfigError::InvalidAdminConfig(
                    "username and password are required".into(),
                ));
            }
        }

        Ok(())
    }

    /// 适合写入日志的配置摘要，隐去数据库凭据与密钥
    pub fn sanitized(&self) -> String {
        let database = match self.database.url.split_once('@') {
            Some((_, host)) => format!("postgres://[REDACTED]@{host}"),
            None => self.database.url.clone(),
        };
        format!(
            "server={} database={} max_connections={} session_ttl_minutes={} \
             outbox_capacity={} persist_timeout_ms={} strict_join={} admin={}",
            self.server.bind_address(),
            database,
            self.database.max_connections,
            self.session.ttl_minutes,
            self.realtime.outbox_capacity,
            self.realtime.persist_timeout_ms,
            self.realtime.strict_join,
            self.admin
                .as_ref()
                .map_or("none", |admin| admin.username.as_str()),
        )
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("invalid database configuration: {0}")]
    InvalidDatabaseConfig(String),
    #[error("invalid session secret: {0}")]
    InvalidSessionSecret(String),
    #[error("invalid session configuration: {0}")]
    InvalidSessionConfig(String),
    #[error("invalid realtime configuration: {0}")]
    InvalidRealtimeConfig(String),
    #[error("invalid security configuration: {0}")]
    InvalidSecurityConfig(String),
    #[error("invalid admin configuration: {0}")]
    InvalidAdminConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-with-at-least-32-characters";

    fn minimal() -> String {
        format!("[session]\nsecret = \"{SECRET}\"\n")
    }

    #[test]
    fn defaults_fill_everything_but_the_secret() {
        let config = AppConfig::from_toml_str(&minimal()).unwrap();

        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.database.url, "memory://");
        assert_eq!(config.session.ttl_minutes, 1440);
        assert_eq!(config.realtime.outbox_capacity, 64);
        assert_eq!(config.realtime.persist_timeout(), Duration::from_millis(2000));
        assert!(!config.realtime.strict_join);
        assert!(config.admin.is_none());
    }

    #[test]
    fn missing_or_short_secret_is_rejected() {
        assert!(matches!(
            AppConfig::from_toml_str(""),
            Err(ConfigError::InvalidSessionSecret(_))
        ));
        assert!(matches!(
            AppConfig::from_toml_str("[session]\nsecret = \"short\"\n"),
            Err(ConfigError::InvalidSessionSecret(_))
        ));
    }

    #[test]
    fn file_values_override_defaults() {
        let toml = format!(
            "{}\n[server]\nport = 9000\n\n[realtime]\nstrict_join = true\npersist_timeout_ms = 250\n\n\
             [admin]\nusername = \"root\"\nemail = \"root@example.com\"\npassword = \"pw\"\n",
            minimal()
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.realtime.strict_join);
        assert_eq!(config.realtime.persist_timeout_ms, 250);
        assert_eq!(config.admin.unwrap().username, "root");
    }

    #[test]
    fn bcrypt_cost_must_be_in_range() {
        let toml = format!("{}\n[security]\nbcrypt_cost = 2\n", minimal());
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(ConfigError::InvalidSecurityConfig(_))
        ));

        let toml = format!("{}\n[security]\nbcrypt_cost = 10\n", minimal());
        assert_eq!(
            AppConfig::from_toml_str(&toml).unwrap().security.bcrypt_cost,
            Some(10)
        );
    }

    #[test]
    fn session_ttl_must_be_bounded() {
        for ttl in [0, MAX_SESSION_TTL_MINUTES + 1, i64::MAX as u64] {
            let toml = format!("{}ttl_minutes = {ttl}\n", minimal());
            assert!(
                matches!(
                    AppConfig::from_toml_str(&toml),
                    Err(ConfigError::InvalidSessionConfig(_))
                ),
                "ttl_minutes = {ttl}"
            );
        }

        let toml = format!("{}ttl_minutes = {MAX_SESSION_TTL_MINUTES}\n", minimal());
        let config = AppConfig::from_toml_str(&toml).unwrap();
        assert_eq!(
            config.session.ttl(),
            Duration::from_secs(MAX_SESSION_TTL_MINUTES * 60)
        );
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let toml = format!("{}\n[realtime]\noutbox_capacity = 0\n", minimal());
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(ConfigError::InvalidRealtimeConfig(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "roomchat.toml",
                &format!("{}\n[server]\nport = 9000\n", minimal()),
            )?;
            jail.set_env("ROOMCHAT_SERVER__PORT", "9100");
            jail.set_env("ROOMCHAT_REALTIME__STRICT_JOIN", "true");

            let config = AppConfig::load_from(Path::new("roomchat.toml"))
                .map_err(|err| err.to_string())?;
            assert_eq!(config.server.port, 9100);
            assert!(config.realtime.strict_join);
            Ok(())
        });
    }

    #[test]
    fn sanitized_summary_hides_credentials() {
        let mut config = AppConfig::from_toml_str(&minimal()).unwrap();
        config.database.url = "postgres://user:hunter2@db:5432/chat".into();

        let summary = config.sanitized();
        assert!(summary.contains("postgres://[REDACTED]@db:5432/chat"));
        assert!(!summary.contains("hunter2"));
        assert!(!summary.contains(SECRET));
    }
}
