use domain::RoomCode;
use rand::Rng;

/// 房间码生成器
pub trait RoomCodeGenerator: Send + Sync {
    fn generate(&self) -> RoomCode;
}

/// 从 URL 安全字母表中均匀随机取 [`RoomCode::LENGTH`] 个字符（48 bit 熵）。
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomRoomCodeGenerator;

impl RoomCodeGenerator for RandomRoomCodeGenerator {
    fn generate(&self) -> RoomCode {
        let mut rng = rand::rng();
        let code: String = (0..RoomCode::LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..RoomCode::ALPHABET.len());
                char::from(RoomCode::ALPHABET[idx])
            })
            .collect();
        RoomCode::parse(code).expect("alphabet characters always form a valid room code")
    }
}
