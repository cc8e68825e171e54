//! 전송 계층
//!
//! 코어(방/멤버)는 연결을 불투명한 양방향 프레임 스트림으로만 다룹니다.
//! 한 번의 읽기는 하나의 메시지, 한 번의 쓰기는 하나의 메시지에 대응합니다.
//!
//! ```text
//! Endpoint ──split──> FrameReader  (멤버 수신 펌프가 소유)
//!                 └─> FrameWriter  (멤버 송신 펌프가 소유)
//! ```
//!
//! 각 펌프는 자기 몫의 절반만 소유하고 종료 시 해제합니다.
//! [`FrameWriter::close`]는 여러 번 호출해도 한 번만 효과가 있어야 합니다.

use async_trait::async_trait;
use bytes::Bytes;

use crate::tool::error::RelayResult;

pub mod memory;
pub mod tcp;
pub mod websocket;

pub use memory::{MemoryEndpoint, MemoryPeer};
pub use tcp::TcpEndpoint;
pub use websocket::WsEndpoint;

/// 수신 방향 절반
#[async_trait]
pub trait FrameReader: Send + 'static {
    /// 다음 메시지 하나를 기다립니다.
    ///
    /// 상대방이 정상적으로 연결을 닫았으면 `Ok(None)`을 반환합니다.
    async fn read_frame(&mut self) -> RelayResult<Option<Bytes>>;
}

/// 송신 방향 절반
#[async_trait]
pub trait FrameWriter: Send + 'static {
    /// 메시지 하나를 씁니다.
    async fn write_frame(&mut self, frame: Bytes) -> RelayResult<()>;

    /// 송신 방향을 닫습니다. 두 번째 호출부터는 아무 일도 하지 않습니다.
    async fn close(&mut self) -> RelayResult<()>;
}

/// 전송 계층이 코어에 넘겨주는 연결 엔드포인트
pub trait Endpoint: Send + 'static {
    type Reader: FrameReader;
    type Writer: FrameWriter;

    /// 읽기/쓰기 절반으로 분리합니다.
    fn split(self) -> (Self::Reader, Self::Writer);

    /// 로그용 상대 주소
    fn peer(&self) -> String;
}
