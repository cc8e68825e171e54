//! 릴레이 서버 핸들러 레이어
//!
//! 전송 계층에서 넘어온 연결을 코어 서비스에 연결합니다.

pub mod connection_handler;

pub use connection_handler::ConnectionHandler;
