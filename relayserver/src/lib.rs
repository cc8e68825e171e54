//! 릴레이 서버 라이브러리
//!
//! 이름 있는 방 단위의 실시간 브로드캐스트 릴레이입니다.
//! 클라이언트는 방 이름과 사용자 이름을 가지고 접속하며, 누군가 보낸 메시지는
//! `"{identity}: {payload}"` 형식으로 같은 방의 모든 멤버에게 전달됩니다.
//!
//! # 주요 기능
//!
//! - **방 루프**: 방마다 하나의 태스크가 멤버 집합을 소유하고 요청을 도착 순서대로 처리
//! - **느린 멤버 퇴출**: 송신 큐가 가득 찬 멤버는 기다리지 않고 즉시 제거
//! - **연결별 펌프**: 수신/송신 펌프가 독립적으로 실행되고 종료 시 서로를 깨움
//! - **전송 계층 추상화**: WebSocket, 길이 헤더 TCP, 프로세스 내부 채널
//! - **에러 처리**: 멤버 단위 에러는 해당 연결 정리로 끝남
//!
//! # 아키텍처
//!
//! ```text
//! Relay Server
//! ├── Transport Layer (전송 계층)
//! │   ├── WsEndpoint (쿼리 파라미터 업그레이드)
//! │   ├── TcpEndpoint (길이 헤더 프레임 + JSON 핸드셰이크)
//! │   └── MemoryEndpoint (프로세스 내부)
//! ├── Handler Layer
//! │   └── ConnectionHandler (경계 → 코어)
//! ├── Service Layer
//! │   ├── RoomRegistry (방 디렉토리)
//! │   ├── Room (방 루프)
//! │   ├── Member (수신/송신 펌프)
//! │   └── RoomReaper (빈 방 정리)
//! ├── Tool Layer
//! │   └── Error (에러 처리)
//! └── Protocol (입장 파라미터, 브로드캐스트 형식)
//! ```
//!
//! # 사용 예시
//!
//! ```rust
//! use relayserver::{RelayConfig, RelayServer};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = RelayConfig::from_env()?;
//! let server = RelayServer::new(config);
//! server.serve(CancellationToken::new()).await?;
//! ```

/// 환경 설정 관리
///
/// 서버 실행에 필요한 환경변수 및 설정을 관리합니다.
pub mod config;

/// 입장 파라미터와 메시지 형식
pub mod protocol;

/// 방, 멤버, 레지스트리 서비스
pub mod service;

/// 연결 처리 핸들러
pub mod handler;

/// 연결 엔드포인트 추상화와 전송 구현
pub mod transport;

/// accept 루프
pub mod server;

/// 공통 유틸리티 도구
pub mod tool;

pub use config::{validate_config, RelayConfig, TransportKind};
pub use handler::ConnectionHandler;
pub use protocol::{format_broadcast, JoinParams, JoinRequest, ServerReply, MISSING_PARAMS_MESSAGE};
pub use server::RelayServer;
pub use service::{
    Member, MemberId, MemberReport, PumpOptions, RoomHandle, RoomReaper, RoomRegistry,
    RoomSnapshot, StopReason,
};
pub use tool::error::{ErrorHandler, ErrorSeverity, RelayError, RelayResult};
pub use transport::{Endpoint, FrameReader, FrameWriter, MemoryEndpoint, MemoryPeer, TcpEndpoint, WsEndpoint};
