//! 单元测试共用的样例数据、时钟与密码哈希

use std::sync::Mutex;

use async_trait::async_trait;
use domain::{
    ChatRoom, PasswordHash, RoomCode, RoomId, Timestamp, User, UserEmail, UserId, Username,
};
use time::macros::datetime;

use crate::{
    clock::Clock,
    password::{PasswordHasher, PasswordHasherError},
    room_code::RoomCodeGenerator,
};

pub fn stored_user(username: &str, email: &str, password: &str, is_admin: bool) -> User {
    let build = if is_admin {
        User::register_admin
    } else {
        User::register
    };
    build(
        UserId::generate(),
        Username::parse(username).unwrap(),
        UserEmail::parse(email).unwrap(),
        PasswordHash::new(format!("plain:{password}")).unwrap(),
        datetime!(2024-01-01 00:00 UTC),
    )
}

pub fn active_room(code: &str) -> ChatRoom {
    ChatRoom::new(
        RoomId::generate(),
        format!("room {code}"),
        RoomCode::parse(code).unwrap(),
        UserId::generate(),
        datetime!(2024-01-01 00:00 UTC),
    )
    .unwrap()
}

/// 手动推进的时钟，默认停在固定时刻
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(datetime!(2024-06-01 12:00 UTC)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: time::Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap()
    }
}

/// 明文“哈希”，只用于测试
pub struct PlainPasswordHasher;

#[async_trait]
impl PasswordHasher for PlainPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

/// 按顺序吐出预设房间码，用完后重复最后一个
pub struct ScriptedCodes {
    codes: Mutex<Vec<RoomCode>>,
}

impl ScriptedCodes {
    pub fn new(codes: &[&str]) -> Self {
        let mut codes: Vec<RoomCode> = codes
            .iter()
            .map(|code| RoomCode::parse(*code).unwrap())
            .collect();
        codes.reverse();
        Self {
            codes: Mutex::new(codes),
        }
    }
}

impl RoomCodeGenerator for ScriptedCodes {
    fn generate(&self) -> RoomCode {
        let mut codes = self.codes.lock().unwrap();
        if codes.len() > 1 {
            codes.pop().unwrap()
        } else {
            codes[0].clone()
        }
    }
}
