//! 공통 에러 처리 시스템
//!
//! 릴레이 서버에서 발생하는 모든 에러를 체계적으로 관리합니다.
//! 멤버 단위 에러는 해당 멤버의 정리로 끝나며 방 루프나 다른 멤버에게 전파되지 않습니다.

use thiserror::Error;
use tracing::{error, info, warn};

/// 릴레이 서버 에러 타입
#[derive(Debug, Error)]
pub enum RelayError {
    /// 방 이름 또는 사용자 이름 누락 (경계 계층에서 거부)
    #[error("방 이름과 사용자 이름이 필요합니다")]
    MissingJoinParams,

    /// 전송 계층 읽기/쓰기 실패
    #[error("전송 에러 [작업: {operation}]: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// 프레임/핸드셰이크 형식 에러
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 이미 닫힌 방에 대한 요청
    #[error("방 {room}이(가) 닫혔습니다")]
    RoomClosed { room: String },

    /// 읽기 유휴 시간 초과
    #[error("유휴 시간 초과 ({secs}초)")]
    IdleTimeout { secs: u64 },

    /// 쓰기 시간 초과
    #[error("쓰기 시간 초과 ({secs}초)")]
    WriteTimeout { secs: u64 },

    /// 설정 관련 에러
    #[error("설정 에러 [키: {key}]: {message}")]
    Configuration { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl RelayError {
    /// 전송 에러 생성
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    /// 프로토콜 에러 생성
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// 설정 에러 생성
    pub fn configuration(key: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// 상대방 연결이 끊어진 경우인지 확인합니다.
    ///
    /// 정상적인 연결 종료와 비슷하게 취급되어 경고 대신 정보 로그로 남깁니다.
    pub fn is_disconnect(&self) -> bool {
        match self {
            RelayError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
            ),
            RelayError::WebSocket(e) => matches!(
                e,
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed
            ),
            _ => false,
        }
    }
}

/// 편의를 위한 타입 별칭
pub type RelayResult<T> = Result<T, RelayError>;

/// 에러 심각도 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// 정보성 - 정상 동작 중 발생하는 예상 가능한 상황
    Info,
    /// 경고 - 주의가 필요하지만 서비스는 계속 가능
    Warning,
    /// 에러 - 기능에 영향을 주지만 복구 가능
    Error,
    /// 치명적 - 프로세스 종료가 필요한 심각한 문제
    Critical,
}

/// 에러 핸들러
///
/// 에러를 심각도에 맞는 로그 레벨로 한 곳에서 기록합니다.
pub struct ErrorHandler;

impl ErrorHandler {
    /// 에러를 처리하고 로깅합니다.
    ///
    /// # Arguments
    ///
    /// * `error` - 처리할 에러
    /// * `severity` - 에러 심각도
    /// * `component` - 에러가 발생한 컴포넌트
    /// * `operation` - 에러가 발생한 작업
    ///
    /// # Examples
    ///
    /// ```rust
    /// use relayserver::tool::error::{ErrorHandler, ErrorSeverity, RelayError};
    ///
    /// ErrorHandler::handle_error(
    ///     &RelayError::transport("read_frame", "connection reset"),
    ///     ErrorSeverity::Warning,
    ///     "Member",
    ///     "inbound_pump",
    /// );
    /// ```
    pub fn handle_error(
        error: &RelayError,
        severity: ErrorSeverity,
        component: &str,
        operation: &str,
    ) {
        match severity {
            ErrorSeverity::Info => info!(component, operation, "{}", error),
            ErrorSeverity::Warning => warn!(component, operation, "{}", error),
            ErrorSeverity::Error => error!(component, operation, "{}", error),
            ErrorSeverity::Critical => {
                error!(component, operation, "🚨 CRITICAL: {}", error);
            }
        }
    }

    /// 멤버 펌프에서 발생한 전송 에러를 처리합니다.
    ///
    /// 연결 끊김은 정보성으로, 나머지는 경고로 기록합니다.
    pub fn handle_transport_error(error: &RelayError, component: &str, operation: &str) {
        let severity = if error.is_disconnect() {
            ErrorSeverity::Info
        } else {
            ErrorSeverity::Warning
        };
        Self::handle_error(error, severity, component, operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RelayError::RoomClosed {
            room: "lobby".to_string(),
        };
        assert_eq!(error.to_string(), "방 lobby이(가) 닫혔습니다");

        let error = RelayError::transport("write_frame", "broken pipe");
        assert_eq!(error.to_string(), "전송 에러 [작업: write_frame]: broken pipe");
    }

    #[test]
    fn test_disconnect_classification() {
        let reset = RelayError::from(std::io::Error::from(std::io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());

        let closed = RelayError::from(tokio_tungstenite::tungstenite::Error::ConnectionClosed);
        assert!(closed.is_disconnect());

        assert!(!RelayError::protocol("bad frame").is_disconnect());
        assert!(!RelayError::MissingJoinParams.is_disconnect());
    }

    #[test]
    fn test_handle_error_does_not_panic() {
        let error = RelayError::configuration("PORT", "0은 사용할 수 없습니다");
        ErrorHandler::handle_error(&error, ErrorSeverity::Critical, "RelayConfig", "validate");
        ErrorHandler::handle_transport_error(&error, "Member", "outbound_pump");
    }
}
