//! 릴레이 메시지 프로토콜 정의
//!
//! 방 입장 파라미터, 브로드캐스트 메시지 형식, TCP 핸드셰이크 메시지를 정의합니다.
//!
//! # 브로드캐스트 형식
//!
//! ```text
//! {identity}: {payload}
//! ```
//!
//! payload는 보낸 사람이 제출한 원본 바이트 그대로이며 이스케이프나 봉투 구조가 없습니다.
//!
//! # TCP 핸드셰이크
//!
//! ```text
//! 클라이언트 → 서버: {"room": "lobby", "identity": "alice"}
//! 서버 → 클라이언트: {"type": "Joined", "room": "lobby", "identity": "alice"}
//!                  {"type": "Error", "code": 400, "message": "..."}
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::tool::error::{RelayError, RelayResult};

/// 입장 파라미터 누락 시 클라이언트에게 돌려주는 메시지
pub const MISSING_PARAMS_MESSAGE: &str = "Room name and username are required";

/// 방 이름 쿼리 파라미터 키
pub const ROOM_PARAM: &str = "room";

/// 사용자 이름 쿼리 파라미터 키
pub const USERNAME_PARAM: &str = "username";

/// 검증된 방 입장 파라미터
///
/// 방 이름과 사용자 이름이 모두 비어있지 않을 때만 생성됩니다.
/// 경계 계층은 이 값을 만들지 못하면 코어와 상호작용하기 전에 연결을 거부합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    room: String,
    identity: String,
}

impl JoinParams {
    /// 선택적 값들로부터 입장 파라미터를 검증합니다.
    pub fn from_parts(room: Option<String>, identity: Option<String>) -> RelayResult<Self> {
        match (room, identity) {
            (Some(room), Some(identity)) if !room.is_empty() && !identity.is_empty() => {
                Ok(Self { room, identity })
            }
            _ => Err(RelayError::MissingJoinParams),
        }
    }

    /// 업그레이드 요청의 쿼리 문자열에서 입장 파라미터를 추출합니다.
    ///
    /// `room`과 `username` 키를 사용합니다. 같은 키가 여러 번 나오면 첫 번째 값을 사용합니다.
    pub fn from_query(query: Option<&str>) -> RelayResult<Self> {
        let mut room = None;
        let mut identity = None;

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match &*key {
                    ROOM_PARAM if room.is_none() => room = Some(value.into_owned()),
                    USERNAME_PARAM if identity.is_none() => identity = Some(value.into_owned()),
                    _ => {}
                }
            }
        }

        Self::from_parts(room, identity)
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// 브로드캐스트 메시지를 만듭니다.
///
/// 보낸 사람의 identity를 payload 앞에 붙여 `"{identity}: {payload}"` 형식의 바이트를 반환합니다.
pub fn format_broadcast(identity: &str, payload: &[u8]) -> Bytes {
    let mut message = BytesMut::with_capacity(identity.len() + 2 + payload.len());
    message.put_slice(identity.as_bytes());
    message.put_slice(b": ");
    message.put_slice(payload);
    message.freeze()
}

/// TCP 핸드셰이크 요청 (클라이언트 → 서버)
///
/// 연결 후 첫 번째 프레임으로 전송됩니다. 필드 누락은 역직렬화 단계가 아니라
/// [`JoinParams::from_parts`] 검증 단계에서 거부됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
}

impl JoinRequest {
    /// 프레임 바이트에서 핸드셰이크 요청을 읽습니다.
    pub fn from_frame(frame: &[u8]) -> RelayResult<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| RelayError::protocol(format!("잘못된 핸드셰이크 요청: {}", e)))
    }

    /// 핸드셰이크 요청을 프레임 바이트로 직렬화합니다.
    pub fn to_frame(&self) -> RelayResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| RelayError::protocol(format!("핸드셰이크 요청 직렬화 실패: {}", e)))
    }

    /// 검증된 입장 파라미터로 변환합니다.
    pub fn into_params(self) -> RelayResult<JoinParams> {
        JoinParams::from_parts(self.room, self.identity)
    }
}

/// TCP 핸드셰이크 응답 (서버 → 클라이언트)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerReply {
    /// 입장 성공. 이후 프레임은 모두 브로드캐스트 메시지입니다.
    Joined { room: String, identity: String },

    /// 입장 거부. 서버는 이 프레임을 보낸 뒤 연결을 닫습니다.
    ///
    /// * `code` - HTTP 상태 코드와 같은 의미의 에러 코드
    /// * `message` - 에러 설명 메시지
    Error { code: u16, message: String },
}

impl ServerReply {
    /// 입장 파라미터 누락 응답
    pub fn missing_params() -> Self {
        ServerReply::Error {
            code: 400,
            message: MISSING_PARAMS_MESSAGE.to_string(),
        }
    }

    pub fn joined(params: &JoinParams) -> Self {
        ServerReply::Joined {
            room: params.room().to_string(),
            identity: params.identity().to_string(),
        }
    }

    pub fn to_frame(&self) -> RelayResult<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| RelayError::protocol(format!("응답 직렬화 실패: {}", e)))
    }

    pub fn from_frame(frame: &[u8]) -> RelayResult<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| RelayError::protocol(format!("잘못된 서버 응답: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_broadcast() {
        let message = format_broadcast("alice", b"hi");
        assert_eq!(&message[..], b"alice: hi");

        // payload는 이스케이프 없이 그대로 붙는다
        let message = format_broadcast("bob", b"a: b\n\"c\"");
        assert_eq!(&message[..], b"bob: a: b\n\"c\"");

        let message = format_broadcast("carol", b"");
        assert_eq!(&message[..], b"carol: ");
    }

    #[test]
    fn test_join_params_validation() {
        let params = JoinParams::from_parts(Some("lobby".into()), Some("alice".into())).unwrap();
        assert_eq!(params.room(), "lobby");
        assert_eq!(params.identity(), "alice");

        assert!(matches!(
            JoinParams::from_parts(None, Some("alice".into())),
            Err(RelayError::MissingJoinParams)
        ));
        assert!(matches!(
            JoinParams::from_parts(Some("lobby".into()), Some(String::new())),
            Err(RelayError::MissingJoinParams)
        ));
        assert!(matches!(
            JoinParams::from_parts(None, None),
            Err(RelayError::MissingJoinParams)
        ));
    }

    #[test]
    fn test_join_params_from_query() {
        let params = JoinParams::from_query(Some("room=lobby&username=alice")).unwrap();
        assert_eq!(params.room(), "lobby");
        assert_eq!(params.identity(), "alice");

        // 퍼센트 인코딩 해제
        let params = JoinParams::from_query(Some("room=game%20night&username=bob+smith")).unwrap();
        assert_eq!(params.room(), "game night");
        assert_eq!(params.identity(), "bob smith");

        assert!(JoinParams::from_query(Some("room=lobby")).is_err());
        assert!(JoinParams::from_query(Some("room=&username=alice")).is_err());
        assert!(JoinParams::from_query(None).is_err());
    }

    #[test]
    fn test_join_request_missing_fields() {
        let request = JoinRequest::from_frame(br#"{"room": "lobby"}"#).unwrap();
        assert_eq!(request.room.as_deref(), Some("lobby"));
        assert!(request.identity.is_none());
        assert!(request.into_params().is_err());

        assert!(JoinRequest::from_frame(b"not json").is_err());
    }

    #[test]
    fn test_server_reply_wire_format() {
        let frame = ServerReply::missing_params().to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "Error");
        assert_eq!(value["code"], 400);
        assert_eq!(value["message"], MISSING_PARAMS_MESSAGE);

        let params = JoinParams::from_parts(Some("lobby".into()), Some("alice".into())).unwrap();
        let frame = ServerReply::joined(&params).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["type"], "Joined");
        assert_eq!(value["room"], "lobby");
        assert_eq!(value["identity"], "alice");
    }
}
