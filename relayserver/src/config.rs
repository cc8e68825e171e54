//! 릴레이 서버 환경 설정 모듈
//!
//! .env 파일과 시스템 환경변수에서 설정을 로드하고 관리합니다.
//! 해석할 수 없는 값은 경고를 남기고 기본값을 사용합니다.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::service::member::PumpOptions;
use crate::tool::error::{RelayError, RelayResult};

/// 전송 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// 쿼리 파라미터 기반 HTTP 업그레이드
    WebSocket,
    /// 4바이트 길이 헤더 프레임 + JSON 핸드셰이크
    Tcp,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" => Ok(TransportKind::WebSocket),
            "tcp" => Ok(TransportKind::Tcp),
            other => Err(format!("알 수 없는 전송 방식: {}", other)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => write!(f, "websocket"),
            TransportKind::Tcp => write!(f, "tcp"),
        }
    }
}

/// 릴레이 서버 설정 구조체
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// 바인딩 호스트 주소
    pub host: String,
    /// 바인딩 포트 번호
    pub port: u16,
    pub transport: TransportKind,
    /// 멤버별 송신 큐 용량
    pub queue_capacity: usize,
    /// 방별 요청 채널 용량
    pub room_intake_capacity: usize,
    /// 메시지 최대 크기 (바이트)
    pub max_frame_bytes: usize,
    /// 읽기 유휴 시간 제한 (0 = 사용 안 함)
    pub idle_timeout_secs: u64,
    /// 쓰기 시간 제한 (0 = 사용 안 함)
    pub write_timeout_secs: u64,
    /// 빈 방 정리 간격 (0 = 정리 안 함)
    pub room_reap_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            transport: TransportKind::WebSocket,
            queue_capacity: 256,
            room_intake_capacity: 1024,
            max_frame_bytes: 64 * 1024,
            idle_timeout_secs: 0,
            write_timeout_secs: 0,
            room_reap_secs: 0,
        }
    }
}

impl RelayConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// 로드 순서:
    /// 1. .env 파일 (현재 디렉토리, 상위, 상위의 상위)
    /// 2. 시스템 환경변수
    /// 3. 기본값
    pub fn from_env() -> RelayResult<Self> {
        Self::load_env_file();

        let config = Self::from_lookup(|key| std::env::var(key).ok());
        info!("릴레이 서버 설정 로드 완료: {:?}", config);
        Ok(config)
    }

    /// 키 조회 함수로부터 설정을 만듭니다.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            host: lookup("relay_host").unwrap_or(defaults.host),
            port: parse_or(&lookup, "PORT", defaults.port),
            transport: parse_or(&lookup, "relay_transport", defaults.transport),
            queue_capacity: parse_or(&lookup, "relay_queue_capacity", defaults.queue_capacity),
            room_intake_capacity: parse_or(
                &lookup,
                "relay_room_intake_capacity",
                defaults.room_intake_capacity,
            ),
            max_frame_bytes: parse_or(&lookup, "relay_max_frame_bytes", defaults.max_frame_bytes),
            idle_timeout_secs: parse_or(&lookup, "relay_idle_timeout_secs", defaults.idle_timeout_secs),
            write_timeout_secs: parse_or(
                &lookup,
                "relay_write_timeout_secs",
                defaults.write_timeout_secs,
            ),
            room_reap_secs: parse_or(&lookup, "relay_room_reap_secs", defaults.room_reap_secs),
        }
    }

    /// 서버 바인딩 주소를 반환합니다.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions::from_secs(self.idle_timeout_secs, self.write_timeout_secs)
    }

    /// 빈 방 정리 간격. 정리하지 않으면 `None`.
    pub fn reap_interval(&self) -> Option<Duration> {
        (self.room_reap_secs > 0).then(|| Duration::from_secs(self.room_reap_secs))
    }

    /// .env 파일을 로드합니다.
    fn load_env_file() {
        let env_paths = [
            ".env",       // 현재 디렉토리
            "../.env",    // 상위 디렉토리
            "../../.env", // 상위의 상위 디렉토리 (프로젝트 루트)
        ];

        let mut loaded = false;
        for path in env_paths {
            if Path::new(path).exists() && dotenv::from_filename(path).is_ok() {
                info!(".env 파일 로드 성공: {}", path);
                loaded = true;
                break;
            }
        }

        if !loaded {
            warn!(".env 파일을 찾을 수 없습니다. 기본값과 시스템 환경변수를 사용합니다.");
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + fmt::Display,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("환경변수 {} 값 '{}'을(를) 해석할 수 없어 기본값 {}을(를) 사용합니다", key, raw, default);
                default
            }
        },
        None => default,
    }
}

/// 설정 검증 유틸리티
///
/// 잘못된 값은 해당 환경변수 키와 함께 [`RelayError::Configuration`]으로 보고합니다.
pub fn validate_config(config: &RelayConfig) -> RelayResult<()> {
    if config.port == 0 {
        return Err(RelayError::configuration(
            "PORT",
            format!("유효하지 않은 포트 번호: {}", config.port),
        ));
    }

    if config.host.is_empty() {
        return Err(RelayError::configuration("relay_host", "호스트 주소가 비어있습니다"));
    }

    if config.queue_capacity == 0 {
        return Err(RelayError::configuration(
            "relay_queue_capacity",
            "송신 큐 용량은 0보다 커야 합니다",
        ));
    }

    if config.room_intake_capacity == 0 {
        return Err(RelayError::configuration(
            "relay_room_intake_capacity",
            "방 요청 채널 용량은 0보다 커야 합니다",
        ));
    }

    if config.max_frame_bytes == 0 {
        return Err(RelayError::configuration(
            "relay_max_frame_bytes",
            "최대 메시지 크기는 0보다 커야 합니다",
        ));
    }

    Ok(())
}
